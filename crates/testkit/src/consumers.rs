use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use jtrace_core::model::TraceData;
use jtrace_core::{ConsumerError, TraceConsumer};
use tokio::sync::Notify;

/// Records every batch it is given.
#[derive(Default)]
pub struct SinkConsumer {
    batches: Mutex<Vec<TraceData>>,
    delivered: Notify,
}

impl SinkConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<TraceData> {
        self.batches
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    pub fn span_count(&self) -> usize {
        self.batches
            .lock()
            .map(|b| b.iter().map(TraceData::span_count).sum())
            .unwrap_or_default()
    }

    /// Waits until at least `n` batches have arrived.
    pub async fn wait_for_batches(&self, n: usize) -> Vec<TraceData> {
        loop {
            let delivered = self.delivered.notified();
            let batches = self.batches();
            if batches.len() >= n {
                return batches;
            }
            delivered.await;
        }
    }
}

#[async_trait]
impl TraceConsumer for SinkConsumer {
    async fn consume(&self, data: TraceData) -> Result<usize, ConsumerError> {
        let count = data.span_count();
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(data);
        }
        self.delivered.notify_waiters();
        Ok(count)
    }
}

/// Fails every call with the configured error.
pub struct FailingConsumer(pub ConsumerError);

#[async_trait]
impl TraceConsumer for FailingConsumer {
    async fn consume(&self, _data: TraceData) -> Result<usize, ConsumerError> {
        Err(self.0.clone())
    }
}

/// Never completes.
pub struct PendingConsumer;

#[async_trait]
impl TraceConsumer for PendingConsumer {
    async fn consume(&self, _data: TraceData) -> Result<usize, ConsumerError> {
        std::future::pending().await
    }
}

/// Never completes; counts calls that were started and calls whose future
/// was dropped before finishing.
#[derive(Default)]
pub struct AbandonedConsumer {
    started: AtomicUsize,
    dropped: AtomicUsize,
    started_signal: Notify,
    dropped_signal: Notify,
}

impl AbandonedConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    pub async fn wait_started(&self) {
        while self.started() == 0 {
            self.started_signal.notified().await;
        }
    }

    pub async fn wait_dropped(&self) {
        while self.dropped() == 0 {
            self.dropped_signal.notified().await;
        }
    }
}

struct DropGuard<'a>(&'a AbandonedConsumer);

impl Drop for DropGuard<'_> {
    fn drop(&mut self) {
        self.0.dropped.fetch_add(1, Ordering::SeqCst);
        self.0.dropped_signal.notify_one();
    }
}

#[async_trait]
impl TraceConsumer for AbandonedConsumer {
    async fn consume(&self, _data: TraceData) -> Result<usize, ConsumerError> {
        let _guard = DropGuard(self);
        self.started.fetch_add(1, Ordering::SeqCst);
        self.started_signal.notify_one();
        std::future::pending().await
    }
}
