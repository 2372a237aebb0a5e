//! Collector endpoints and the shared delivery path behind them.

pub mod grpc;
pub mod http;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use jtrace_core::config::Config;
use jtrace_core::error::{JtraceError, Result};
use jtrace_core::{ConsumerError, TraceConsumer};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

use crate::translate::{BatchError, BatchOutcome, SpanRejection};

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("failed to decode request: {0}")]
    Decode(String),

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Consumer(#[from] ConsumerError),

    #[error("consumer did not finish within {0:?}")]
    DeadlineExceeded(Duration),
}

impl AdapterError {
    pub fn http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::Decode(_) | Self::UnsupportedContentType(_) | Self::Batch(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Consumer(ConsumerError::Rejected(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Consumer(ConsumerError::Unavailable(_) | ConsumerError::Cancelled) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn grpc_status(&self) -> tonic::Status {
        let message = self.to_string();
        match self {
            Self::Decode(_) | Self::UnsupportedContentType(_) | Self::Batch(_) => {
                tonic::Status::invalid_argument(message)
            }
            Self::Consumer(ConsumerError::Rejected(_)) => tonic::Status::internal(message),
            Self::Consumer(ConsumerError::Unavailable(_)) => tonic::Status::unavailable(message),
            Self::Consumer(ConsumerError::Cancelled) => tonic::Status::cancelled(message),
            Self::DeadlineExceeded(_) => tonic::Status::deadline_exceeded(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandleOutcome {
    pub accepted: usize,
    pub rejected: Vec<SpanRejection>,
}

/// Hands a translated batch to the consumer, bounded by `deadline`.
///
/// Batches where every span was rejected, or that carried none, never reach
/// the consumer.
pub async fn deliver(
    consumer: &dyn TraceConsumer,
    outcome: BatchOutcome,
    deadline: Duration,
) -> std::result::Result<HandleOutcome, AdapterError> {
    let BatchOutcome {
        trace_data,
        rejected,
    } = outcome;

    for rejection in &rejected {
        tracing::warn!(
            index = rejection.index,
            error = %rejection.error,
            source_format = %trace_data.source_format,
            "jaeger span rejected"
        );
    }

    if trace_data.spans.is_empty() {
        return Ok(HandleOutcome {
            accepted: 0,
            rejected,
        });
    }

    let accepted = tokio::time::timeout(deadline, consumer.consume(trace_data))
        .await
        .map_err(|_| AdapterError::DeadlineExceeded(deadline))??;

    Ok(HandleOutcome { accepted, rejected })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverConfig {
    pub http_addr: Option<SocketAddr>,
    pub grpc_addr: Option<SocketAddr>,
    pub max_request_bytes: usize,
    pub consumer_timeout: Duration,
}

impl ReceiverConfig {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let parse = |raw: &str, what: &str| -> Result<SocketAddr> {
            raw.parse()
                .map_err(|e| JtraceError::Config(format!("bad {what} address {raw}: {e}")))
        };
        Ok(Self {
            http_addr: cfg
                .http_enabled
                .then(|| parse(&cfg.collector_http_addr, "collector HTTP"))
                .transpose()?,
            grpc_addr: cfg
                .grpc_enabled
                .then(|| parse(&cfg.collector_grpc_addr, "collector gRPC"))
                .transpose()?,
            max_request_bytes: cfg.max_request_bytes,
            consumer_timeout: cfg.consumer_timeout,
        })
    }
}

/// Running HTTP and gRPC collector listeners sharing one consumer.
pub struct JaegerReceiver {
    http_addr: Option<SocketAddr>,
    grpc_addr: Option<SocketAddr>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<Result<()>>)>,
}

impl JaegerReceiver {
    /// Binds every enabled listener before returning, so the reported
    /// addresses are usable immediately (including port 0 binds).
    pub async fn start(config: ReceiverConfig, consumer: Arc<dyn TraceConsumer>) -> Result<Self> {
        if config.http_addr.is_none() && config.grpc_addr.is_none() {
            return Err(JtraceError::Config(
                "at least one of the HTTP or gRPC collector endpoints must be enabled".into(),
            ));
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();
        let mut http_addr = None;
        let mut grpc_addr = None;

        if let Some(addr) = config.http_addr {
            let listener = TcpListener::bind(addr).await.map_err(|e| {
                JtraceError::Ingest(format!("failed to bind collector HTTP on {addr}: {e}"))
            })?;
            let local = listener.local_addr()?;
            let router = http::router(http::HttpCollectorState {
                consumer: consumer.clone(),
                consumer_timeout: config.consumer_timeout,
                max_request_bytes: config.max_request_bytes,
            });
            let mut rx = shutdown_rx.clone();
            let task = tokio::spawn(async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        let _ = rx.wait_for(|stop| *stop).await;
                    })
                    .await
                    .map_err(|e| JtraceError::Ingest(format!("HTTP server failed: {e}")))
            });
            tracing::info!(addr = %local, "jaeger thrift http collector listening");
            http_addr = Some(local);
            tasks.push(("HTTP", task));
        }

        if let Some(addr) = config.grpc_addr {
            let listener = TcpListener::bind(addr).await.map_err(|e| {
                JtraceError::Ingest(format!("failed to bind collector gRPC on {addr}: {e}"))
            })?;
            let local = listener.local_addr()?;
            let service = grpc::GrpcCollector::new(consumer.clone(), config.consumer_timeout)
                .into_service(config.max_request_bytes);
            let incoming = TcpListenerStream::new(listener);
            let mut rx = shutdown_rx.clone();
            let task = tokio::spawn(async move {
                Server::builder()
                    .add_service(service)
                    .serve_with_incoming_shutdown(incoming, async move {
                        let _ = rx.wait_for(|stop| *stop).await;
                    })
                    .await
                    .map_err(|e| JtraceError::Ingest(format!("gRPC server failed: {e}")))
            });
            tracing::info!(addr = %local, "jaeger grpc collector listening");
            grpc_addr = Some(local);
            tasks.push(("gRPC", task));
        }

        Ok(Self {
            http_addr,
            grpc_addr,
            shutdown,
            tasks,
        })
    }

    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    pub fn grpc_addr(&self) -> Option<SocketAddr> {
        self.grpc_addr
    }

    /// Signals both servers to drain and waits for them to exit.
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        let mut first_err = None;
        for (name, task) in self.tasks {
            let res = task
                .await
                .map_err(|e| JtraceError::Ingest(format!("{name} task join failed: {e}")))
                .and_then(|inner| inner);
            if let Err(e) = res {
                tracing::warn!(server = name, error = %e, "collector server stopped with error");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => {
                tracing::info!("jaeger receiver stopped");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use jtrace_core::model::{Process, SourceFormat, TraceData};

    use super::*;

    struct Fixed(std::result::Result<usize, ConsumerError>);

    #[async_trait]
    impl TraceConsumer for Fixed {
        async fn consume(&self, _data: TraceData) -> std::result::Result<usize, ConsumerError> {
            self.0.clone()
        }
    }

    struct Stalled;

    #[async_trait]
    impl TraceConsumer for Stalled {
        async fn consume(&self, _data: TraceData) -> std::result::Result<usize, ConsumerError> {
            std::future::pending().await
        }
    }

    fn outcome(spans: usize) -> BatchOutcome {
        let span = jtrace_core::model::Span {
            trace_id: jtrace_core::ids::TraceId::from_high_low(0, 1).unwrap(),
            span_id: jtrace_core::ids::SpanId::from_u64(1).unwrap(),
            parent_span_id: None,
            name: "op".into(),
            kind: Default::default(),
            start_time: chrono::DateTime::from_timestamp(0, 0).unwrap(),
            end_time: chrono::DateTime::from_timestamp(0, 0).unwrap(),
            status: Default::default(),
            attributes: Default::default(),
            references: vec![],
            events: vec![],
        };
        BatchOutcome {
            trace_data: TraceData {
                process: Process::default(),
                spans: vec![span; spans],
                source_format: SourceFormat::JaegerProto,
            },
            rejected: vec![],
        }
    }

    #[tokio::test]
    async fn deliver_reports_consumer_count() {
        let res = deliver(&Fixed(Ok(2)), outcome(2), Duration::from_secs(1)).await;
        assert_eq!(res.unwrap().accepted, 2);
    }

    #[tokio::test]
    async fn empty_batch_skips_consumer() {
        let res = deliver(
            &Fixed(Err(ConsumerError::Rejected("called".into()))),
            outcome(0),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(res.unwrap().accepted, 0);
    }

    #[tokio::test]
    async fn consumer_errors_map_to_wire_statuses() {
        let cases = [
            (
                ConsumerError::Rejected("no".into()),
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                tonic::Code::Internal,
            ),
            (
                ConsumerError::Unavailable("full".into()),
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                tonic::Code::Unavailable,
            ),
            (
                ConsumerError::Cancelled,
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                tonic::Code::Cancelled,
            ),
        ];
        for (err, http, grpc) in cases {
            let res = deliver(&Fixed(Err(err)), outcome(1), Duration::from_secs(1)).await;
            let err = res.unwrap_err();
            assert_eq!(err.http_status(), http);
            assert_eq!(err.grpc_status().code(), grpc);
        }
    }

    #[tokio::test]
    async fn stalled_consumer_hits_deadline() {
        let err = deliver(&Stalled, outcome(1), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::DeadlineExceeded(_)));
        assert_eq!(err.http_status(), axum::http::StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.grpc_status().code(), tonic::Code::DeadlineExceeded);
    }

    #[test]
    fn batch_errors_are_client_errors() {
        let err = AdapterError::from(BatchError::MissingProcess);
        assert_eq!(err.http_status(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(err.grpc_status().code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn receiver_config_respects_enable_flags() {
        let mut cfg = Config::default();
        cfg.grpc_enabled = false;
        let rc = ReceiverConfig::from_config(&cfg).unwrap();
        assert_eq!(rc.http_addr, Some("0.0.0.0:14268".parse().unwrap()));
        assert_eq!(rc.grpc_addr, None);

        cfg.collector_http_addr = "nowhere".into();
        assert!(ReceiverConfig::from_config(&cfg).is_err());
    }

    #[tokio::test]
    async fn start_requires_an_endpoint() {
        let cfg = ReceiverConfig {
            http_addr: None,
            grpc_addr: None,
            max_request_bytes: 1024,
            consumer_timeout: Duration::from_secs(1),
        };
        assert!(
            JaegerReceiver::start(cfg, Arc::new(Fixed(Ok(0))))
                .await
                .is_err()
        );
    }
}
