pub mod config;
pub mod consumer;
pub mod error;
pub mod ids;
pub mod model;
pub mod time;

pub use consumer::{ConsumerError, TraceConsumer};
pub use error::{JtraceError, Result};
