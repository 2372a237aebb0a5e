//! Shared fixtures for receiver tests: one two-span batch in both Jaeger wire
//! formats, the `TraceData` each should translate to, and a few consumers.

pub mod consumers;

use chrono::{DateTime, Duration, Utc};
use jtrace_core::ids::{SpanId, TraceId};
use jtrace_core::model::{
    AttributeValue, Attributes, Process, ReferenceKind, SourceFormat, Span, SpanKind,
    SpanReference, Status, StatusCode, TraceData,
};
use jtrace_ingest::jaeger::{api_v2, thrift};
use jtrace_ingest::translate::tags::{ERROR, STATUS_CODE, STATUS_MESSAGE};

pub use consumers::{AbandonedConsumer, FailingConsumer, PendingConsumer, SinkConsumer};

pub const SERVICE: &str = "issaTest";

pub const TRACE_ID: [u8; 16] = [
    0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA, 0xFB, 0xFC, 0xFD, 0xFE, 0xFF, 0x80,
];
pub const PARENT_SPAN_ID: [u8; 8] = [0x1F, 0x1E, 0x1D, 0x1C, 0x1B, 0x1A, 0x19, 0x18];
pub const CHILD_SPAN_ID: [u8; 8] = [0xAF, 0xAE, 0xAD, 0xAC, 0xAB, 0xAA, 0xA9, 0xA8];

const CHILD_DURATION_SECS: i64 = 600;
const PARENT_DURATION_SECS: i64 = 2;

pub fn base_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_542_158_650, 536_343_000).expect("fixture timestamp")
}

pub fn trace_id() -> TraceId {
    TraceId::from_array(TRACE_ID).expect("fixture trace id")
}

pub fn parent_span_id() -> SpanId {
    SpanId::from_array(PARENT_SPAN_ID).expect("fixture parent span id")
}

pub fn child_span_id() -> SpanId {
    SpanId::from_array(CHILD_SPAN_ID).expect("fixture child span id")
}

fn be_i64(bytes: &[u8]) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    i64::from_be_bytes(raw)
}

/// The scenario batch as a Jaeger Thrift `Batch`.
pub fn thrift_batch() -> thrift::Batch {
    let trace_id_high = be_i64(&TRACE_ID[..8]);
    let trace_id_low = be_i64(&TRACE_ID[8..]);
    let start = base_time().timestamp_micros();
    let child_micros = CHILD_DURATION_SECS * 1_000_000;

    thrift::Batch {
        process: thrift::Process {
            service_name: SERVICE.into(),
            tags: Some(vec![
                thrift::Tag::bool("bool", true),
                thrift::Tag::string("string", "yes"),
                thrift::Tag::long("int64", 10_000_000),
            ]),
        },
        spans: vec![
            thrift::Span {
                trace_id_low,
                trace_id_high,
                span_id: be_i64(&CHILD_SPAN_ID),
                parent_span_id: be_i64(&PARENT_SPAN_ID),
                operation_name: "DBSearch".into(),
                start_time: start,
                duration: child_micros,
                tags: Some(vec![
                    thrift::Tag::string(STATUS_MESSAGE, "Stale indices"),
                    thrift::Tag::long(STATUS_CODE, i64::from(StatusCode::NotFound.code())),
                    thrift::Tag::bool(ERROR, true),
                ]),
                ..thrift::Span::default()
            },
            thrift::Span {
                trace_id_low,
                trace_id_high,
                span_id: be_i64(&PARENT_SPAN_ID),
                operation_name: "ProxyFetch".into(),
                start_time: start + child_micros,
                duration: PARENT_DURATION_SECS * 1_000_000,
                tags: Some(vec![
                    thrift::Tag::string(STATUS_MESSAGE, "Frontend crash"),
                    thrift::Tag::long(STATUS_CODE, i64::from(StatusCode::Internal.code())),
                    thrift::Tag::bool(ERROR, true),
                ]),
                ..thrift::Span::default()
            },
        ],
        seq_no: None,
    }
}

/// Binary-protocol body for `POST /api/traces`.
pub fn thrift_body() -> Vec<u8> {
    thrift::encode_batch(&thrift_batch()).expect("fixture batch encodes")
}

fn proto_timestamp(ts: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: ts.timestamp(),
        nanos: ts.timestamp_subsec_nanos() as i32,
    }
}

fn proto_span(
    span_id: [u8; 8],
    name: &str,
    start: DateTime<Utc>,
    seconds: i64,
    code: StatusCode,
    message: &str,
) -> api_v2::Span {
    api_v2::Span {
        trace_id: TRACE_ID.to_vec(),
        span_id: span_id.to_vec(),
        operation_name: name.into(),
        start_time: Some(proto_timestamp(start)),
        duration: Some(prost_types::Duration { seconds, nanos: 0 }),
        tags: vec![
            api_v2::KeyValue::string(STATUS_MESSAGE, message),
            api_v2::KeyValue::int64(STATUS_CODE, i64::from(code.code())),
            api_v2::KeyValue::bool(ERROR, true),
        ],
        ..api_v2::Span::default()
    }
}

/// The scenario batch as a gRPC `PostSpansRequest`.
pub fn grpc_request() -> api_v2::PostSpansRequest {
    let start = base_time();
    let mut child = proto_span(
        CHILD_SPAN_ID,
        "DBSearch",
        start,
        CHILD_DURATION_SECS,
        StatusCode::NotFound,
        "Stale indices",
    );
    child.references = vec![api_v2::SpanRef {
        trace_id: TRACE_ID.to_vec(),
        span_id: PARENT_SPAN_ID.to_vec(),
        ref_type: api_v2::SpanRefType::ChildOf as i32,
    }];
    let parent = proto_span(
        PARENT_SPAN_ID,
        "ProxyFetch",
        start + Duration::seconds(CHILD_DURATION_SECS),
        PARENT_DURATION_SECS,
        StatusCode::Internal,
        "Frontend crash",
    );

    api_v2::PostSpansRequest {
        batch: Some(api_v2::Batch {
            spans: vec![child, parent],
            process: Some(api_v2::Process {
                service_name: SERVICE.into(),
                tags: vec![
                    api_v2::KeyValue::bool("bool", true),
                    api_v2::KeyValue::string("string", "yes"),
                    api_v2::KeyValue::int64("int64", 10_000_000),
                ],
            }),
        }),
    }
}

/// What the scenario translates to. Thrift process tags arrive as text, the
/// gRPC path keeps their native types.
pub fn expected_trace_data(source_format: SourceFormat) -> TraceData {
    let process_attributes = match source_format {
        SourceFormat::JaegerThrift => [
            ("bool", AttributeValue::from("true")),
            ("string", AttributeValue::from("yes")),
            ("int64", AttributeValue::from("10000000")),
        ],
        SourceFormat::JaegerProto => [
            ("bool", AttributeValue::Bool(true)),
            ("string", AttributeValue::from("yes")),
            ("int64", AttributeValue::Int(10_000_000)),
        ],
    };

    let t1 = base_time();
    let t2 = t1 + Duration::seconds(CHILD_DURATION_SECS);
    let t3 = t2 + Duration::seconds(PARENT_DURATION_SECS);
    let error_attr = || Attributes::from([(ERROR.to_string(), AttributeValue::Bool(true))]);

    TraceData {
        process: Process {
            service_name: SERVICE.into(),
            attributes: process_attributes
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        },
        spans: vec![
            Span {
                trace_id: trace_id(),
                span_id: child_span_id(),
                parent_span_id: Some(parent_span_id()),
                name: "DBSearch".into(),
                kind: SpanKind::Unspecified,
                start_time: t1,
                end_time: t2,
                status: Status::new(StatusCode::NotFound, "Stale indices"),
                attributes: error_attr(),
                references: vec![SpanReference {
                    trace_id: trace_id(),
                    span_id: parent_span_id(),
                    kind: ReferenceKind::ChildOf,
                }],
                events: vec![],
            },
            Span {
                trace_id: trace_id(),
                span_id: parent_span_id(),
                parent_span_id: None,
                name: "ProxyFetch".into(),
                kind: SpanKind::Unspecified,
                start_time: t2,
                end_time: t3,
                status: Status::new(StatusCode::Internal, "Frontend crash"),
                attributes: error_attr(),
                references: vec![],
                events: vec![],
            },
        ],
        source_format,
    }
}

#[cfg(test)]
mod tests {
    use jtrace_ingest::translate::thrift::trace_data_to_batch;
    use jtrace_ingest::translate::translate_batch;

    use super::*;

    #[test]
    fn thrift_fixture_translates_to_expected() {
        let batch = thrift::decode_batch(&thrift_body()).unwrap();
        let outcome = translate_batch(&batch).unwrap();
        assert!(outcome.rejected.is_empty());
        assert_eq!(
            outcome.trace_data,
            expected_trace_data(SourceFormat::JaegerThrift)
        );
    }

    #[test]
    fn grpc_fixture_translates_to_expected() {
        let batch = grpc_request().batch.unwrap();
        let outcome = translate_batch(&batch).unwrap();
        assert!(outcome.rejected.is_empty());
        assert_eq!(
            outcome.trace_data,
            expected_trace_data(SourceFormat::JaegerProto)
        );
    }

    #[test]
    fn scenario_survives_outbound_thrift() {
        let expected = expected_trace_data(SourceFormat::JaegerThrift);
        let bytes = thrift::encode_batch(&trace_data_to_batch(&expected)).unwrap();
        let outcome = translate_batch(&thrift::decode_batch(&bytes).unwrap()).unwrap();
        assert_eq!(outcome.trace_data, expected);
    }
}
