use jtrace_core::ids::{SpanId, TraceId};
use jtrace_core::model::{
    AttributeValue, Process, ReferenceKind, SourceFormat, Span, SpanReference, TimeEvent,
    TraceData,
};
use jtrace_core::time::{dt_to_micros, micros_to_dt};

use crate::jaeger::thrift::{self as wire, SpanRefType, Tag, TagType};
use crate::translate::tags::{self, SpanTags};
use crate::translate::{BatchError, SpanTranslationError, WireBatch};

impl WireBatch for wire::Batch {
    type Span = wire::Span;

    fn source_format(&self) -> SourceFormat {
        SourceFormat::JaegerThrift
    }

    fn process(&self) -> Result<Process, BatchError> {
        Ok(process_from_thrift(&self.process))
    }

    fn spans(&self) -> &[wire::Span] {
        &self.spans
    }

    fn translate_span(span: &wire::Span) -> Result<Span, SpanTranslationError> {
        span_from_thrift(span)
    }
}

/// Process tags are carried as strings on this path.
pub fn process_from_thrift(process: &wire::Process) -> Process {
    let attributes = process
        .tags
        .iter()
        .flatten()
        .map(|tag| (tag.key.clone(), tag_value(tag).into_text()))
        .collect();
    Process {
        service_name: process.service_name.clone(),
        attributes,
    }
}

pub fn span_from_thrift(span: &wire::Span) -> Result<Span, SpanTranslationError> {
    let trace_id = TraceId::from_high_low(span.trace_id_high as u64, span.trace_id_low as u64)
        .map_err(SpanTranslationError::id("trace id"))?;
    let span_id =
        SpanId::from_u64(span.span_id as u64).map_err(SpanTranslationError::id("span id"))?;

    if span.duration < 0 {
        return Err(SpanTranslationError::NegativeDuration {
            micros: span.duration,
        });
    }
    let start_time = micros_to_dt(span.start_time).ok_or(
        SpanTranslationError::TimestampOutOfRange {
            field: "start time",
        },
    )?;
    let end_time = span
        .start_time
        .checked_add(span.duration)
        .and_then(micros_to_dt)
        .ok_or(SpanTranslationError::TimestampOutOfRange { field: "end time" })?;

    let mut references = span
        .references
        .iter()
        .flatten()
        .map(reference_from_thrift)
        .collect::<Result<Vec<_>, _>>()?;

    let parent_span_id = if span.parent_span_id != 0 {
        let parent = SpanId::from_u64(span.parent_span_id as u64)
            .map_err(SpanTranslationError::id("parent span id"))?;
        let listed = references.iter().any(|r| {
            r.kind == ReferenceKind::ChildOf && r.trace_id == trace_id && r.span_id == parent
        });
        if !listed {
            references.insert(
                0,
                SpanReference {
                    trace_id,
                    span_id: parent,
                    kind: ReferenceKind::ChildOf,
                },
            );
        }
        Some(parent)
    } else {
        references
            .iter()
            .find(|r| r.kind == ReferenceKind::ChildOf && r.trace_id == trace_id)
            .map(|r| r.span_id)
    };

    let events = span
        .logs
        .iter()
        .flatten()
        .map(|log| -> Result<TimeEvent, SpanTranslationError> {
            let time = micros_to_dt(log.timestamp).ok_or(
                SpanTranslationError::TimestampOutOfRange {
                    field: "log timestamp",
                },
            )?;
            Ok(TimeEvent {
                time,
                attributes: tags::collect(log.fields.iter().map(tag_pair)),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let SpanTags {
        status,
        kind,
        attributes,
    } = tags::split_reserved(tags::collect(span.tags.iter().flatten().map(tag_pair)));

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

fn reference_from_thrift(r: &wire::SpanRef) -> Result<SpanReference, SpanTranslationError> {
    let trace_id = TraceId::from_high_low(r.trace_id_high as u64, r.trace_id_low as u64)
        .map_err(SpanTranslationError::id("reference trace id"))?;
    let span_id =
        SpanId::from_u64(r.span_id as u64).map_err(SpanTranslationError::id("reference span id"))?;
    let kind = match SpanRefType::from_i32(r.ref_type) {
        Some(SpanRefType::ChildOf) => ReferenceKind::ChildOf,
        Some(SpanRefType::FollowsFrom) => ReferenceKind::FollowsFrom,
        None => ReferenceKind::Unspecified,
    };
    Ok(SpanReference {
        trace_id,
        span_id,
        kind,
    })
}

fn tag_pair(tag: &Tag) -> (String, AttributeValue) {
    (tag.key.clone(), tag_value(tag))
}

fn tag_value(tag: &Tag) -> AttributeValue {
    match TagType::from_i32(tag.v_type) {
        Some(TagType::String) => AttributeValue::String(tag.v_str.clone().unwrap_or_default()),
        Some(TagType::Double) => AttributeValue::Double(tag.v_double.unwrap_or_default()),
        Some(TagType::Bool) => AttributeValue::Bool(tag.v_bool.unwrap_or_default()),
        Some(TagType::Long) => AttributeValue::Int(tag.v_long.unwrap_or_default()),
        Some(TagType::Binary) => AttributeValue::Bytes(tag.v_binary.clone().unwrap_or_default()),
        // Unknown type tag: keep whichever value slot is populated, as text.
        None => {
            let value = if let Some(s) = &tag.v_str {
                AttributeValue::String(s.clone())
            } else if let Some(v) = tag.v_long {
                AttributeValue::Int(v)
            } else if let Some(v) = tag.v_double {
                AttributeValue::Double(v)
            } else if let Some(v) = tag.v_bool {
                AttributeValue::Bool(v)
            } else if let Some(v) = &tag.v_binary {
                AttributeValue::Bytes(v.clone())
            } else {
                AttributeValue::String(String::new())
            };
            value.into_text()
        }
    }
}

/// Writes a [`TraceData`] back out as a Thrift batch.
///
/// Process attributes become string tags. Status and kind are re-emitted as
/// the reserved tags, so a batch read from this output translates to the
/// same spans for any input that already carried its own `error` tag.
pub fn trace_data_to_batch(data: &TraceData) -> wire::Batch {
    let process_tags: Vec<Tag> = data
        .process
        .attributes
        .iter()
        .map(|(k, v)| Tag::string(k.clone(), v.to_text()))
        .collect();

    wire::Batch {
        process: wire::Process {
            service_name: data.process.service_name.clone(),
            tags: non_empty(process_tags),
        },
        spans: data.spans.iter().map(span_to_thrift).collect(),
        seq_no: None,
    }
}

fn span_to_thrift(span: &Span) -> wire::Span {
    let (high, low) = span.trace_id.to_high_low();
    let start = dt_to_micros(span.start_time);

    let mut wire_tags: Vec<Tag> = span.attributes.iter().map(|(k, v)| to_tag(k, v)).collect();
    wire_tags.extend(
        tags::reserved_pairs(&span.status, span.kind, &span.attributes)
            .iter()
            .map(|(k, v)| to_tag(k, v)),
    );

    let references = span
        .references
        .iter()
        .map(|r| {
            let (high, low) = r.trace_id.to_high_low();
            wire::SpanRef {
                ref_type: match r.kind {
                    ReferenceKind::ChildOf => SpanRefType::ChildOf as i32,
                    ReferenceKind::FollowsFrom | ReferenceKind::Unspecified => {
                        SpanRefType::FollowsFrom as i32
                    }
                },
                trace_id_low: low as i64,
                trace_id_high: high as i64,
                span_id: r.span_id.to_u64() as i64,
            }
        })
        .collect();

    let logs = span
        .events
        .iter()
        .map(|event| wire::Log {
            timestamp: dt_to_micros(event.time),
            fields: event.attributes.iter().map(|(k, v)| to_tag(k, v)).collect(),
        })
        .collect();

    wire::Span {
        trace_id_low: low as i64,
        trace_id_high: high as i64,
        span_id: span.span_id.to_u64() as i64,
        parent_span_id: span.parent_span_id.map(|p| p.to_u64() as i64).unwrap_or(0),
        operation_name: span.name.clone(),
        references: non_empty(references),
        flags: 1,
        start_time: start,
        duration: dt_to_micros(span.end_time) - start,
        tags: non_empty(wire_tags),
        logs: non_empty(logs),
    }
}

fn to_tag(key: &str, value: &AttributeValue) -> Tag {
    match value {
        AttributeValue::Bool(b) => Tag::bool(key, *b),
        AttributeValue::Int(i) => Tag::long(key, *i),
        AttributeValue::Double(d) => Tag::double(key, *d),
        AttributeValue::String(s) => Tag::string(key, s.clone()),
        AttributeValue::Bytes(b) => Tag::binary(key, b.clone()),
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() { None } else { Some(items) }
}
