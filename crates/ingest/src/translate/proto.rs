use chrono::{DateTime, TimeDelta, Utc};
use jtrace_core::ids::{SpanId, TraceId};
use jtrace_core::model::{
    AttributeValue, Process, ReferenceKind, SourceFormat, Span, SpanReference, TimeEvent,
};

use crate::jaeger::api_v2::{self as wire, KeyValue, SpanRefType, ValueType};
use crate::translate::tags::{self, SpanTags};
use crate::translate::{BatchError, SpanTranslationError, WireBatch};

impl WireBatch for wire::Batch {
    type Span = wire::Span;

    fn source_format(&self) -> SourceFormat {
        SourceFormat::JaegerProto
    }

    /// Batch level process, else the first span that carries one.
    fn process(&self) -> Result<Process, BatchError> {
        self.process
            .as_ref()
            .or_else(|| self.spans.iter().find_map(|s| s.process.as_ref()))
            .map(process_from_proto)
            .ok_or(BatchError::MissingProcess)
    }

    fn spans(&self) -> &[wire::Span] {
        &self.spans
    }

    fn translate_span(span: &wire::Span) -> Result<Span, SpanTranslationError> {
        span_from_proto(span)
    }
}

pub fn process_from_proto(process: &wire::Process) -> Process {
    Process {
        service_name: process.service_name.clone(),
        attributes: tags::collect(process.tags.iter().map(kv_pair)),
    }
}

pub fn span_from_proto(span: &wire::Span) -> Result<Span, SpanTranslationError> {
    let trace_id =
        TraceId::from_bytes(&span.trace_id).map_err(SpanTranslationError::id("trace id"))?;
    let span_id = SpanId::from_bytes(&span.span_id).map_err(SpanTranslationError::id("span id"))?;

    let start = span
        .start_time
        .as_ref()
        .ok_or(SpanTranslationError::MissingTimestamp {
            field: "start time",
        })?;
    let start_time = timestamp_to_dt(start, "start time")?;

    let duration = match &span.duration {
        Some(d) => duration_to_delta(d)?,
        None => TimeDelta::zero(),
    };
    let end_time = start_time
        .checked_add_signed(duration)
        .ok_or(SpanTranslationError::TimestampOutOfRange { field: "end time" })?;

    let references = span
        .references
        .iter()
        .map(reference_from_proto)
        .collect::<Result<Vec<_>, _>>()?;
    let parent_span_id = references
        .iter()
        .find(|r| r.kind == ReferenceKind::ChildOf && r.trace_id == trace_id)
        .map(|r| r.span_id);

    let events = span
        .logs
        .iter()
        .map(|log| -> Result<TimeEvent, SpanTranslationError> {
            let ts = log
                .timestamp
                .as_ref()
                .ok_or(SpanTranslationError::MissingTimestamp {
                    field: "log timestamp",
                })?;
            Ok(TimeEvent {
                time: timestamp_to_dt(ts, "log timestamp")?,
                attributes: tags::collect(log.fields.iter().map(kv_pair)),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let SpanTags {
        status,
        kind,
        attributes,
    } = tags::split_reserved(tags::collect(span.tags.iter().map(kv_pair)));

    Ok(Span {
        trace_id,
        span_id,
        parent_span_id,
        name: span.operation_name.clone(),
        kind,
        start_time,
        end_time,
        status,
        attributes,
        references,
        events,
    })
}

fn reference_from_proto(r: &wire::SpanRef) -> Result<SpanReference, SpanTranslationError> {
    let trace_id =
        TraceId::from_bytes(&r.trace_id).map_err(SpanTranslationError::id("reference trace id"))?;
    let span_id =
        SpanId::from_bytes(&r.span_id).map_err(SpanTranslationError::id("reference span id"))?;
    let kind = match SpanRefType::try_from(r.ref_type) {
        Ok(SpanRefType::ChildOf) => ReferenceKind::ChildOf,
        Ok(SpanRefType::FollowsFrom) => ReferenceKind::FollowsFrom,
        Err(_) => ReferenceKind::Unspecified,
    };
    Ok(SpanReference {
        trace_id,
        span_id,
        kind,
    })
}

fn kv_pair(kv: &KeyValue) -> (String, AttributeValue) {
    let value = match ValueType::try_from(kv.v_type) {
        Ok(ValueType::String) => AttributeValue::String(kv.v_str.clone()),
        Ok(ValueType::Bool) => AttributeValue::Bool(kv.v_bool),
        Ok(ValueType::Int64) => AttributeValue::Int(kv.v_int64),
        Ok(ValueType::Float64) => AttributeValue::Double(kv.v_float64),
        Ok(ValueType::Binary) => AttributeValue::Bytes(kv.v_binary.clone()),
        Err(_) => AttributeValue::String(kv.v_str.clone()),
    };
    (kv.key.clone(), value)
}

fn timestamp_to_dt(
    ts: &prost_types::Timestamp,
    field: &'static str,
) -> Result<DateTime<Utc>, SpanTranslationError> {
    u32::try_from(ts.nanos)
        .ok()
        .filter(|n| *n < 1_000_000_000)
        .and_then(|nanos| DateTime::<Utc>::from_timestamp(ts.seconds, nanos))
        .ok_or(SpanTranslationError::TimestampOutOfRange { field })
}

fn duration_to_delta(d: &prost_types::Duration) -> Result<TimeDelta, SpanTranslationError> {
    let delta = TimeDelta::try_seconds(d.seconds)
        .and_then(|secs| secs.checked_add(&TimeDelta::nanoseconds(i64::from(d.nanos))))
        .ok_or(SpanTranslationError::TimestampOutOfRange { field: "duration" })?;
    if delta < TimeDelta::zero() {
        return Err(SpanTranslationError::NegativeDuration {
            micros: delta.num_microseconds().unwrap_or(i64::MIN),
        });
    }
    Ok(delta)
}
