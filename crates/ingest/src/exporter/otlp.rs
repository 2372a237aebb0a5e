//! Re-exports translated batches as OTLP traces.
//!
//! Each `consume` call performs one export and reports the downstream result
//! directly; there is no queue or retry loop here.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use jtrace_core::config::Config;
use jtrace_core::error::{JtraceError, Result};
use jtrace_core::model::{
    AttributeValue, Attributes, ReferenceKind, Span, SpanKind, TraceData,
};
use jtrace_core::time::dt_to_nanos;
use jtrace_core::{ConsumerError, TraceConsumer};
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::trace_service_client::TraceServiceClient;
use opentelemetry_proto::tonic::common::v1::any_value::Value;
use opentelemetry_proto::tonic::common::v1::{AnyValue, InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::span::{Event, Link, SpanKind as OtlpSpanKind};
use opentelemetry_proto::tonic::trace::v1::status::StatusCode as OtlpStatusCode;
use opentelemetry_proto::tonic::trace::v1::{
    ResourceSpans, ScopeSpans, Span as OtlpSpan, Status as OtlpStatus,
};
use prost::Message;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tonic::codec::CompressionEncoding;
use tonic::metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue};
use tonic::transport::Channel;

#[derive(Debug, Clone, PartialEq)]
pub struct ForwardConfig {
    pub endpoint: String,
    pub protocol: ForwardProtocol,
    pub compression: ForwardCompression,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl ForwardConfig {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let endpoint = cfg.forward_otlp_endpoint.clone().ok_or_else(|| {
            JtraceError::Config("otlp exporter requires forward_otlp_endpoint".into())
        })?;
        Ok(Self {
            endpoint,
            protocol: ForwardProtocol::parse(&cfg.forward_otlp_protocol),
            compression: ForwardCompression::parse(&cfg.forward_otlp_compression),
            headers: cfg.forward_otlp_headers.clone(),
            timeout: cfg.forward_otlp_timeout,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardProtocol {
    Grpc,
    HttpProtobuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardCompression {
    None,
    Gzip,
}

impl ForwardProtocol {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "http" | "http/protobuf" | "httpprotobuf" => Self::HttpProtobuf,
            _ => Self::Grpc,
        }
    }
}

impl ForwardCompression {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "gzip" => Self::Gzip,
            _ => Self::None,
        }
    }
}

enum Transport {
    Grpc {
        client: TraceServiceClient<Channel>,
        metadata: MetadataMap,
    },
    Http {
        client: Client,
        url: String,
        headers: HeaderMap,
    },
}

pub struct OtlpForwardConsumer {
    transport: Transport,
    compression: ForwardCompression,
    timeout: Duration,
}

impl OtlpForwardConsumer {
    /// Must be called inside a tokio runtime; the gRPC channel connects lazily.
    pub fn new(cfg: ForwardConfig) -> Result<Self> {
        let transport = match cfg.protocol {
            ForwardProtocol::Grpc => {
                let endpoint = normalize_grpc_endpoint(&cfg.endpoint);
                let channel = Channel::from_shared(endpoint.clone())
                    .map_err(|e| {
                        JtraceError::Config(format!("invalid gRPC forward endpoint {endpoint}: {e}"))
                    })?
                    .connect_lazy();
                let client = match cfg.compression {
                    ForwardCompression::Gzip => TraceServiceClient::new(channel)
                        .send_compressed(CompressionEncoding::Gzip)
                        .accept_compressed(CompressionEncoding::Gzip),
                    ForwardCompression::None => TraceServiceClient::new(channel),
                };
                Transport::Grpc {
                    client,
                    metadata: build_grpc_metadata(&cfg.headers),
                }
            }
            ForwardProtocol::HttpProtobuf => {
                let client = Client::builder()
                    .timeout(cfg.timeout)
                    .build()
                    .map_err(|e| {
                        JtraceError::Export(format!("failed to build forward http client: {e}"))
                    })?;
                Transport::Http {
                    client,
                    url: format!("{}/v1/traces", cfg.endpoint.trim_end_matches('/')),
                    headers: build_http_headers(&cfg.headers),
                }
            }
        };
        Ok(Self {
            transport,
            compression: cfg.compression,
            timeout: cfg.timeout,
        })
    }

    async fn export(&self, req: ExportTraceServiceRequest) -> std::result::Result<(), ConsumerError> {
        match &self.transport {
            Transport::Grpc { client, metadata } => {
                let mut request = tonic::Request::new(req);
                request.set_timeout(self.timeout);
                *request.metadata_mut() = metadata.clone();
                client
                    .clone()
                    .export(request)
                    .await
                    .map(|_| ())
                    .map_err(grpc_status_to_consumer_error)
            }
            Transport::Http {
                client,
                url,
                headers,
            } => {
                let (body, content_encoding) =
                    maybe_compress_http_body(req.encode_to_vec(), self.compression).map_err(
                        |e| ConsumerError::Rejected(format!("failed to compress payload: {e}")),
                    )?;
                let mut request = client
                    .post(url)
                    .header("content-type", "application/x-protobuf")
                    .headers(headers.clone());
                if let Some(encoding) = content_encoding {
                    request = request.header("content-encoding", encoding);
                }
                let resp = request
                    .body(body)
                    .send()
                    .await
                    .map_err(|e| ConsumerError::Unavailable(format!("POST {url}: {e}")))?;
                let status = resp.status();
                if status.is_success() {
                    Ok(())
                } else if status.is_server_error() || status.as_u16() == 429 {
                    Err(ConsumerError::Unavailable(format!("POST {url}: {status}")))
                } else {
                    Err(ConsumerError::Rejected(format!("POST {url}: {status}")))
                }
            }
        }
    }
}

#[async_trait]
impl TraceConsumer for OtlpForwardConsumer {
    async fn consume(&self, data: TraceData) -> std::result::Result<usize, ConsumerError> {
        let count = data.span_count();
        self.export(to_export_request(&data)).await?;
        tracing::debug!(count, "otlp forward succeeded");
        Ok(count)
    }
}

fn grpc_status_to_consumer_error(status: tonic::Status) -> ConsumerError {
    match status.code() {
        tonic::Code::Unavailable | tonic::Code::ResourceExhausted | tonic::Code::DeadlineExceeded => {
            ConsumerError::Unavailable(status.message().to_string())
        }
        tonic::Code::Cancelled => ConsumerError::Cancelled,
        _ => ConsumerError::Rejected(format!("{:?}: {}", status.code(), status.message())),
    }
}

pub fn to_export_request(data: &TraceData) -> ExportTraceServiceRequest {
    let mut resource_attributes = vec![string_kv("service.name", &data.process.service_name)];
    resource_attributes.extend(to_key_values(&data.process.attributes));

    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource: Some(Resource {
                attributes: resource_attributes,
                ..Default::default()
            }),
            scope_spans: vec![ScopeSpans {
                scope: Some(InstrumentationScope {
                    name: "jtrace".into(),
                    version: env!("CARGO_PKG_VERSION").into(),
                    attributes: vec![string_kv("jtrace.source_format", data.source_format.as_str())],
                    ..Default::default()
                }),
                spans: data.spans.iter().map(to_otlp_span).collect(),
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

fn to_otlp_span(span: &Span) -> OtlpSpan {
    let links = span
        .references
        .iter()
        .filter(|r| {
            !(r.kind == ReferenceKind::ChildOf
                && r.trace_id == span.trace_id
                && Some(r.span_id) == span.parent_span_id)
        })
        .map(|r| Link {
            trace_id: r.trace_id.as_bytes().to_vec(),
            span_id: r.span_id.as_bytes().to_vec(),
            ..Default::default()
        })
        .collect();

    let events = span
        .events
        .iter()
        .map(|e| Event {
            time_unix_nano: dt_to_nanos(e.time),
            name: e
                .attributes
                .get("event")
                .and_then(AttributeValue::as_str)
                .unwrap_or("log")
                .to_string(),
            attributes: to_key_values(&e.attributes),
            ..Default::default()
        })
        .collect();

    let status = if span.status.is_ok() {
        OtlpStatus::default()
    } else {
        OtlpStatus {
            message: span.status.message.clone(),
            code: OtlpStatusCode::Error as i32,
        }
    };

    OtlpSpan {
        trace_id: span.trace_id.as_bytes().to_vec(),
        span_id: span.span_id.as_bytes().to_vec(),
        parent_span_id: span
            .parent_span_id
            .map(|p| p.as_bytes().to_vec())
            .unwrap_or_default(),
        name: span.name.clone(),
        kind: otlp_kind(span.kind) as i32,
        start_time_unix_nano: dt_to_nanos(span.start_time),
        end_time_unix_nano: dt_to_nanos(span.end_time),
        attributes: to_key_values(&span.attributes),
        events,
        links,
        status: Some(status),
        ..Default::default()
    }
}

fn otlp_kind(kind: SpanKind) -> OtlpSpanKind {
    match kind {
        SpanKind::Unspecified => OtlpSpanKind::Unspecified,
        SpanKind::Server => OtlpSpanKind::Server,
        SpanKind::Client => OtlpSpanKind::Client,
        SpanKind::Producer => OtlpSpanKind::Producer,
        SpanKind::Consumer => OtlpSpanKind::Consumer,
    }
}

fn to_key_values(attributes: &Attributes) -> Vec<KeyValue> {
    attributes
        .iter()
        .map(|(k, v)| KeyValue {
            key: k.clone(),
            value: Some(AnyValue {
                value: Some(match v {
                    AttributeValue::Bool(b) => Value::BoolValue(*b),
                    AttributeValue::Int(i) => Value::IntValue(*i),
                    AttributeValue::Double(d) => Value::DoubleValue(*d),
                    AttributeValue::String(s) => Value::StringValue(s.clone()),
                    AttributeValue::Bytes(b) => Value::BytesValue(b.clone()),
                }),
            }),
        })
        .collect()
}

fn string_kv(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(Value::StringValue(value.to_string())),
        }),
    }
}

fn normalize_grpc_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

fn build_grpc_metadata(headers: &[(String, String)]) -> MetadataMap {
    let mut metadata = MetadataMap::new();
    for (k, v) in headers {
        let key = MetadataKey::<Ascii>::from_bytes(k.as_bytes());
        let value = MetadataValue::try_from(v.as_str());
        match (key, value) {
            (Ok(key), Ok(value)) => {
                metadata.insert(key, value);
            }
            _ => {
                tracing::warn!(header = %k, "ignored invalid forward gRPC header");
            }
        }
    }
    metadata
}

fn build_http_headers(headers: &[(String, String)]) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (k, v) in headers {
        match (HeaderName::try_from(k.as_str()), HeaderValue::try_from(v.as_str())) {
            (Ok(name), Ok(value)) => {
                out.insert(name, value);
            }
            _ => {
                tracing::warn!(header = %k, "ignored invalid forward HTTP header");
            }
        }
    }
    out
}

fn maybe_compress_http_body(
    body: Vec<u8>,
    compression: ForwardCompression,
) -> std::io::Result<(Vec<u8>, Option<&'static str>)> {
    match compression {
        ForwardCompression::None => Ok((body, None)),
        ForwardCompression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&body)?;
            Ok((encoder.finish()?, Some("gzip")))
        }
    }
}
