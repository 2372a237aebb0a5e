pub mod exporter;
pub mod jaeger;
pub mod receiver;
pub mod translate;

pub use receiver::{JaegerReceiver, ReceiverConfig};
