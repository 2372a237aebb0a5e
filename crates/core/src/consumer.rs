use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::TraceData;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsumerError {
    /// The batch was processed and refused.
    #[error("consumer rejected batch: {0}")]
    Rejected(String),

    /// The consumer cannot take the batch right now (backpressure, downstream offline).
    #[error("consumer unavailable: {0}")]
    Unavailable(String),

    #[error("consumer call cancelled")]
    Cancelled,
}

/// Downstream sink for translated batches. Implementations are shared across
/// concurrent requests.
#[async_trait]
pub trait TraceConsumer: Send + Sync {
    /// Takes ownership of one batch and returns how many spans were accepted.
    async fn consume(&self, data: TraceData) -> Result<usize, ConsumerError>;
}

#[async_trait]
impl<T> TraceConsumer for Arc<T>
where
    T: TraceConsumer + ?Sized,
{
    async fn consume(&self, data: TraceData) -> Result<usize, ConsumerError> {
        (**self).consume(data).await
    }
}
