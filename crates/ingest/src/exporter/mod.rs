//! Built-in [`TraceConsumer`](jtrace_core::TraceConsumer) implementations.

pub mod logging;
pub mod otlp;

pub use logging::LoggingConsumer;
pub use otlp::{ForwardCompression, ForwardConfig, ForwardProtocol, OtlpForwardConsumer};
