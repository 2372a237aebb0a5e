use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::attribute::Attributes;
use crate::model::span::Span;

/// Identifies which wire protocol produced a [`TraceData`] batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceFormat {
    #[serde(rename = "jaeger")]
    JaegerThrift,
    #[serde(rename = "jaeger-proto")]
    JaegerProto,
}

impl SourceFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JaegerThrift => "jaeger",
            Self::JaegerProto => "jaeger-proto",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Process {
    pub service_name: String,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceData {
    pub process: Process,
    pub spans: Vec<Span>,
    pub source_format: SourceFormat,
}

impl TraceData {
    pub fn span_count(&self) -> usize {
        self.spans.len()
    }
}
