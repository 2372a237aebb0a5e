use std::collections::BTreeMap;
use std::fmt;

use base64::Engine;
use serde::{Deserialize, Serialize};

pub type Attributes = BTreeMap<String, AttributeValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Canonical text form used wherever the target only carries strings.
    pub fn to_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Double(d) => d.to_string(),
            Self::String(s) => s.clone(),
            Self::Bytes(b) => base64::engine::general_purpose::STANDARD.encode(b),
        }
    }

    pub fn into_text(self) -> Self {
        match self {
            Self::String(_) => self,
            other => Self::String(other.to_text()),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_forms_are_canonical() {
        assert_eq!(AttributeValue::Bool(true).to_text(), "true");
        assert_eq!(AttributeValue::Bool(false).to_text(), "false");
        assert_eq!(AttributeValue::Int(10_000_000).to_text(), "10000000");
        assert_eq!(AttributeValue::Int(-42).to_text(), "-42");
        assert_eq!(AttributeValue::Double(1e7).to_text(), "10000000");
        assert_eq!(AttributeValue::Double(0.25).to_text(), "0.25");
        assert_eq!(AttributeValue::Bytes(vec![0xde, 0xad]).to_text(), "3q0=");
    }

    #[test]
    fn into_text_keeps_strings() {
        assert_eq!(
            AttributeValue::from("yes").into_text(),
            AttributeValue::String("yes".into())
        );
        assert_eq!(
            AttributeValue::Bool(true).into_text(),
            AttributeValue::String("true".into())
        );
    }
}
