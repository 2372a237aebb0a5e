use async_trait::async_trait;
use jtrace_core::model::TraceData;
use jtrace_core::{ConsumerError, TraceConsumer};

/// Logs a summary of each batch and accepts every span.
#[derive(Debug, Clone, Default)]
pub struct LoggingConsumer {
    verbose: bool,
}

impl LoggingConsumer {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

#[async_trait]
impl TraceConsumer for LoggingConsumer {
    async fn consume(&self, data: TraceData) -> Result<usize, ConsumerError> {
        let count = data.span_count();
        tracing::info!(
            spans = count,
            service = %data.process.service_name,
            source_format = %data.source_format,
            "trace batch received"
        );
        if self.verbose {
            for span in &data.spans {
                tracing::debug!(
                    trace_id = %span.trace_id,
                    span_id = %span.span_id,
                    name = %span.name,
                    status = span.status.code.name(),
                    duration_us = span.duration().num_microseconds().unwrap_or_default(),
                    "span"
                );
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use jtrace_core::model::{Process, SourceFormat};

    use super::*;

    #[tokio::test]
    async fn accepts_all_spans() {
        let data = TraceData {
            process: Process {
                service_name: "api".into(),
                ..Process::default()
            },
            spans: vec![],
            source_format: SourceFormat::JaegerThrift,
        };
        assert_eq!(LoggingConsumer::new(true).consume(data).await, Ok(0));
    }
}
