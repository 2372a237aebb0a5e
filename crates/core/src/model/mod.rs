pub mod attribute;
pub mod span;
pub mod trace;

pub use attribute::{AttributeValue, Attributes};
pub use span::{ReferenceKind, Span, SpanKind, SpanReference, Status, StatusCode, TimeEvent};
pub use trace::{Process, SourceFormat, TraceData};
