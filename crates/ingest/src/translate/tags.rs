//! Reserved tag handling.
//!
//! Protocol tags are first turned into typed `(key, value)` pairs by the
//! protocol module; [`split_reserved`] then lifts status and kind out of the
//! resulting map. Outbound helpers do the reverse for Thrift export.

use jtrace_core::model::{AttributeValue, Attributes, SpanKind, Status, StatusCode};

pub const STATUS_CODE: &str = "status.code";
pub const STATUS_MESSAGE: &str = "status.message";
pub const ERROR: &str = "error";
pub const SPAN_KIND: &str = "span.kind";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpanTags {
    pub status: Status,
    pub kind: SpanKind,
    pub attributes: Attributes,
}

/// Later pairs overwrite earlier ones with the same key.
pub fn collect<I>(pairs: I) -> Attributes
where
    I: IntoIterator<Item = (String, AttributeValue)>,
{
    pairs.into_iter().collect()
}

pub fn split_reserved(mut attributes: Attributes) -> SpanTags {
    let explicit_code = attributes.get(STATUS_CODE).and_then(interpret_status_code);
    if explicit_code.is_some() {
        attributes.remove(STATUS_CODE);
    }

    let message = attributes
        .remove(STATUS_MESSAGE)
        .map(|v| v.to_text())
        .unwrap_or_default();

    let code = explicit_code.unwrap_or_else(|| {
        if attributes.get(ERROR).is_some_and(is_truthy) {
            StatusCode::Unknown
        } else {
            StatusCode::Ok
        }
    });

    let kind = attributes
        .get(SPAN_KIND)
        .and_then(AttributeValue::as_str)
        .and_then(SpanKind::parse);
    if kind.is_some() {
        attributes.remove(SPAN_KIND);
    }

    SpanTags {
        status: Status::new(code, message),
        kind: kind.unwrap_or_default(),
        attributes,
    }
}

/// Reserved tags to append when writing a span back out, in emission order.
pub fn reserved_pairs(
    status: &Status,
    kind: SpanKind,
    attributes: &Attributes,
) -> Vec<(&'static str, AttributeValue)> {
    let mut out = Vec::new();
    if !status.is_ok() {
        out.push((STATUS_CODE, AttributeValue::Int(i64::from(status.code.code()))));
    }
    if !status.message.is_empty() {
        out.push((STATUS_MESSAGE, AttributeValue::String(status.message.clone())));
    }
    if !status.is_ok() && !attributes.contains_key(ERROR) {
        out.push((ERROR, AttributeValue::Bool(true)));
    }
    if let Some(kind) = kind.as_str() {
        out.push((SPAN_KIND, AttributeValue::from(kind)));
    }
    out
}

fn interpret_status_code(value: &AttributeValue) -> Option<StatusCode> {
    match value {
        AttributeValue::Int(code) => Some(code_or_unknown(*code)),
        AttributeValue::Double(d) if d.fract() == 0.0 => Some(code_or_unknown(*d as i64)),
        AttributeValue::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(code) => Some(code_or_unknown(code)),
                Err(_) => StatusCode::from_name(s),
            }
        }
        _ => None,
    }
}

fn code_or_unknown(code: i64) -> StatusCode {
    StatusCode::from_code(code).unwrap_or(StatusCode::Unknown)
}

fn is_truthy(value: &AttributeValue) -> bool {
    match value {
        AttributeValue::Bool(b) => *b,
        AttributeValue::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, AttributeValue)]) -> Attributes {
        collect(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())))
    }

    #[test]
    fn explicit_code_and_message_are_lifted() {
        let tags = split_reserved(attrs(&[
            (STATUS_CODE, AttributeValue::Int(5)),
            (STATUS_MESSAGE, "not found".into()),
            ("http.path", "/x".into()),
        ]));
        assert_eq!(tags.status, Status::new(StatusCode::NotFound, "not found"));
        assert_eq!(tags.attributes, attrs(&[("http.path", "/x".into())]));
    }

    #[test]
    fn error_flag_without_code_is_unknown_and_kept() {
        let tags = split_reserved(attrs(&[(ERROR, AttributeValue::Bool(true))]));
        assert_eq!(tags.status.code, StatusCode::Unknown);
        assert!(tags.status.message.is_empty());
        assert_eq!(tags.attributes.get(ERROR), Some(&AttributeValue::Bool(true)));

        let tags = split_reserved(attrs(&[(ERROR, "true".into())]));
        assert_eq!(tags.status.code, StatusCode::Unknown);
    }

    #[test]
    fn explicit_code_wins_over_error_flag() {
        let tags = split_reserved(attrs(&[
            (ERROR, AttributeValue::Bool(true)),
            (STATUS_CODE, AttributeValue::Int(13)),
        ]));
        assert_eq!(tags.status.code, StatusCode::Internal);
        assert!(tags.attributes.contains_key(ERROR));
    }

    #[test]
    fn absent_status_is_ok() {
        let tags = split_reserved(attrs(&[(ERROR, AttributeValue::Bool(false))]));
        assert_eq!(tags.status, Status::default());
    }

    #[test]
    fn out_of_range_code_maps_to_unknown() {
        let tags = split_reserved(attrs(&[(STATUS_CODE, AttributeValue::Int(99))]));
        assert_eq!(tags.status.code, StatusCode::Unknown);
        let tags = split_reserved(attrs(&[(STATUS_CODE, AttributeValue::Int(-3))]));
        assert_eq!(tags.status.code, StatusCode::Unknown);
    }

    #[test]
    fn string_codes_parse_as_number_or_name() {
        let tags = split_reserved(attrs(&[(STATUS_CODE, "14".into())]));
        assert_eq!(tags.status.code, StatusCode::Unavailable);
        let tags = split_reserved(attrs(&[(STATUS_CODE, "DEADLINE_EXCEEDED".into())]));
        assert_eq!(tags.status.code, StatusCode::DeadlineExceeded);
    }

    #[test]
    fn uninterpretable_code_stays_as_attribute() {
        let tags = split_reserved(attrs(&[(STATUS_CODE, "broken".into())]));
        assert_eq!(tags.status.code, StatusCode::Ok);
        assert_eq!(tags.attributes.get(STATUS_CODE), Some(&AttributeValue::from("broken")));
    }

    #[test]
    fn non_string_message_is_stringified() {
        let tags = split_reserved(attrs(&[(STATUS_MESSAGE, AttributeValue::Int(42))]));
        assert_eq!(tags.status.message, "42");
        assert!(tags.attributes.is_empty());
    }

    #[test]
    fn span_kind_lifted_when_recognised() {
        let tags = split_reserved(attrs(&[(SPAN_KIND, "server".into())]));
        assert_eq!(tags.kind, SpanKind::Server);
        assert!(tags.attributes.is_empty());

        let tags = split_reserved(attrs(&[(SPAN_KIND, "gateway".into())]));
        assert_eq!(tags.kind, SpanKind::Unspecified);
        assert_eq!(tags.attributes.get(SPAN_KIND), Some(&AttributeValue::from("gateway")));
    }

    #[test]
    fn duplicate_keys_keep_last() {
        let map = collect(vec![
            ("k".to_string(), AttributeValue::Int(1)),
            ("k".to_string(), AttributeValue::Int(2)),
            (STATUS_CODE.to_string(), AttributeValue::Int(3)),
            (STATUS_CODE.to_string(), AttributeValue::Int(4)),
        ]);
        let tags = split_reserved(map);
        assert_eq!(tags.attributes.get("k"), Some(&AttributeValue::Int(2)));
        assert_eq!(tags.status.code, StatusCode::DeadlineExceeded);
    }

    #[test]
    fn reserved_pairs_reemit_status_and_kind() {
        let status = Status::new(StatusCode::Internal, "boom");
        let pairs = reserved_pairs(&status, SpanKind::Client, &Attributes::new());
        assert_eq!(
            pairs,
            vec![
                (STATUS_CODE, AttributeValue::Int(13)),
                (STATUS_MESSAGE, "boom".into()),
                (ERROR, AttributeValue::Bool(true)),
                (SPAN_KIND, "client".into()),
            ]
        );

        let existing = attrs(&[(ERROR, AttributeValue::Bool(true))]);
        let pairs = reserved_pairs(&status, SpanKind::Unspecified, &existing);
        assert_eq!(pairs.len(), 2);
        assert!(reserved_pairs(&Status::default(), SpanKind::Unspecified, &existing).is_empty());
    }
}
