//! Wire batch → [`TraceData`] translation shared by both collector protocols.

pub mod proto;
pub mod tags;
pub mod thrift;

use jtrace_core::ids::IdError;
use jtrace_core::model::{Process, SourceFormat, Span, TraceData};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpanTranslationError {
    #[error("invalid {field}: {source}")]
    Id {
        field: &'static str,
        #[source]
        source: IdError,
    },

    #[error("missing {field}")]
    MissingTimestamp { field: &'static str },

    #[error("{field} out of range")]
    TimestampOutOfRange { field: &'static str },

    #[error("negative duration: {micros}us")]
    NegativeDuration { micros: i64 },
}

impl SpanTranslationError {
    pub(crate) fn id(field: &'static str) -> impl FnOnce(IdError) -> Self {
        move |source| Self::Id { field, source }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("batch carries no process")]
    MissingProcess,
}

/// A span that could not be translated, by position in the wire batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanRejection {
    pub index: usize,
    pub error: SpanTranslationError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub trace_data: TraceData,
    pub rejected: Vec<SpanRejection>,
}

impl BatchOutcome {
    pub fn accepted(&self) -> usize {
        self.trace_data.spans.len()
    }
}

/// A protocol batch the receiver knows how to normalise.
pub trait WireBatch {
    type Span;

    fn source_format(&self) -> SourceFormat;

    fn process(&self) -> Result<Process, BatchError>;

    fn spans(&self) -> &[Self::Span];

    fn translate_span(span: &Self::Span) -> Result<Span, SpanTranslationError>;
}

/// Builds the process once and translates every span in order. Span failures
/// are collected, never fatal; only a missing process rejects the batch.
pub fn translate_batch<B: WireBatch>(batch: &B) -> Result<BatchOutcome, BatchError> {
    let process = batch.process()?;
    let wire_spans = batch.spans();
    let mut spans = Vec::with_capacity(wire_spans.len());
    let mut rejected = Vec::new();
    for (index, wire) in wire_spans.iter().enumerate() {
        match B::translate_span(wire) {
            Ok(span) => spans.push(span),
            Err(error) => rejected.push(SpanRejection { index, error }),
        }
    }
    Ok(BatchOutcome {
        trace_data: TraceData {
            process,
            spans,
            source_format: batch.source_format(),
        },
        rejected,
    })
}
