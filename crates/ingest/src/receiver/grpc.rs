use std::sync::Arc;
use std::time::Duration;

use jtrace_core::TraceConsumer;
use tonic::codec::CompressionEncoding;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};

use crate::jaeger::api_v2::collector_service_server::{CollectorService, CollectorServiceServer};
use crate::jaeger::api_v2::{PostSpansRequest, PostSpansResponse};
use crate::receiver::{AdapterError, HandleOutcome, deliver};
use crate::translate::translate_batch;

#[derive(Clone)]
pub struct GrpcCollector {
    consumer: Arc<dyn TraceConsumer>,
    consumer_timeout: Duration,
}

impl GrpcCollector {
    pub fn new(consumer: Arc<dyn TraceConsumer>, consumer_timeout: Duration) -> Self {
        Self {
            consumer,
            consumer_timeout,
        }
    }

    pub fn into_service(self, max_request_bytes: usize) -> CollectorServiceServer<Self> {
        CollectorServiceServer::new(self)
            .accept_compressed(CompressionEncoding::Gzip)
            .max_decoding_message_size(max_request_bytes)
    }

    async fn handle(
        &self,
        request: Request<PostSpansRequest>,
    ) -> Result<HandleOutcome, AdapterError> {
        let deadline = self.deadline(request.metadata());
        let batch = request
            .into_inner()
            .batch
            .ok_or_else(|| AdapterError::Decode("request carries no batch".into()))?;
        let outcome = translate_batch(&batch)?;
        deliver(self.consumer.as_ref(), outcome, deadline).await
    }

    fn deadline(&self, metadata: &MetadataMap) -> Duration {
        metadata
            .get("grpc-timeout")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_grpc_timeout)
            .map_or(self.consumer_timeout, |t| t.min(self.consumer_timeout))
    }
}

#[tonic::async_trait]
impl CollectorService for GrpcCollector {
    async fn post_spans(
        &self,
        request: Request<PostSpansRequest>,
    ) -> std::result::Result<Response<PostSpansResponse>, Status> {
        match self.handle(request).await {
            Ok(outcome) => {
                tracing::debug!(
                    count = outcome.accepted,
                    rejected = outcome.rejected.len(),
                    "jaeger grpc spans accepted"
                );
                Ok(Response::new(PostSpansResponse {}))
            }
            Err(err) => {
                tracing::warn!(error = %err, "jaeger grpc request failed");
                Err(err.grpc_status())
            }
        }
    }
}

/// Parses a `grpc-timeout` header value: up to eight digits and a unit
/// (`H`, `M`, `S`, `m`, `u`, `n`).
pub fn parse_grpc_timeout(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.len() < 2 || !raw.is_ascii() {
        return None;
    }
    let (digits, unit) = raw.split_at(raw.len() - 1);
    if digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u64 = digits.parse().ok()?;
    let duration = match unit {
        "H" => Duration::from_secs(value * 3600),
        "M" => Duration::from_secs(value * 60),
        "S" => Duration::from_secs(value),
        "m" => Duration::from_millis(value),
        "u" => Duration::from_micros(value),
        "n" => Duration::from_nanos(value),
        _ => return None,
    };
    Some(duration)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use jtrace_core::ConsumerError;
    use jtrace_core::model::{AttributeValue, TraceData};
    use tokio::sync::Mutex;

    use super::*;
    use crate::jaeger::api_v2::{Batch, KeyValue, Process, Span};

    #[derive(Default)]
    struct Capture {
        batches: Mutex<Vec<TraceData>>,
    }

    #[async_trait]
    impl TraceConsumer for Capture {
        async fn consume(&self, data: TraceData) -> Result<usize, ConsumerError> {
            let n = data.span_count();
            self.batches.lock().await.push(data);
            Ok(n)
        }
    }

    struct Never;

    #[async_trait]
    impl TraceConsumer for Never {
        async fn consume(&self, _data: TraceData) -> Result<usize, ConsumerError> {
            std::future::pending().await
        }
    }

    fn span(id: u8) -> Span {
        Span {
            trace_id: vec![1; 16],
            span_id: vec![0, 0, 0, 0, 0, 0, 0, id],
            operation_name: "op".into(),
            start_time: Some(prost_types::Timestamp {
                seconds: 1_542_158_650,
                nanos: 0,
            }),
            ..Span::default()
        }
    }

    fn request(process: Option<Process>) -> PostSpansRequest {
        PostSpansRequest {
            batch: Some(Batch {
                spans: vec![span(1), span(2)],
                process,
            }),
        }
    }

    #[tokio::test]
    async fn post_spans_delivers_native_process_tags() {
        let consumer = Arc::new(Capture::default());
        let svc = GrpcCollector::new(consumer.clone(), Duration::from_secs(1));
        let process = Process {
            service_name: "api".into(),
            tags: vec![KeyValue::int64("pid", 42)],
        };
        svc.post_spans(Request::new(request(Some(process))))
            .await
            .unwrap();

        let batches = consumer.batches.lock().await;
        assert_eq!(batches[0].span_count(), 2);
        assert_eq!(
            batches[0].process.attributes.get("pid"),
            Some(&AttributeValue::Int(42))
        );
    }

    #[tokio::test]
    async fn missing_batch_or_process_is_invalid_argument() {
        let svc = GrpcCollector::new(Arc::new(Capture::default()), Duration::from_secs(1));
        let err = svc
            .post_spans(Request::new(PostSpansRequest { batch: None }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);

        let err = svc.post_spans(Request::new(request(None))).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn grpc_timeout_header_bounds_consumer() {
        let svc = GrpcCollector::new(Arc::new(Never), Duration::from_secs(30));
        let mut req = Request::new(request(Some(Process {
            service_name: "api".into(),
            tags: vec![],
        })));
        req.metadata_mut()
            .insert("grpc-timeout", "20m".parse().unwrap());
        let err = svc.post_spans(req).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::DeadlineExceeded);
    }

    #[test]
    fn parses_grpc_timeout_units() {
        assert_eq!(parse_grpc_timeout("1H"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_grpc_timeout("2M"), Some(Duration::from_secs(120)));
        assert_eq!(parse_grpc_timeout("3S"), Some(Duration::from_secs(3)));
        assert_eq!(parse_grpc_timeout("250m"), Some(Duration::from_millis(250)));
        assert_eq!(parse_grpc_timeout("7u"), Some(Duration::from_micros(7)));
        assert_eq!(parse_grpc_timeout("9n"), Some(Duration::from_nanos(9)));
        assert_eq!(parse_grpc_timeout("123456789S"), None);
        assert_eq!(parse_grpc_timeout("S"), None);
        assert_eq!(parse_grpc_timeout("10x"), None);
    }
}
