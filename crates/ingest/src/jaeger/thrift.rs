//! `jaeger.thrift` structures with binary-protocol readers and writers.
//!
//! The collector HTTP endpoint receives a bare `Batch` struct serialized with
//! `TBinaryProtocol` (no message envelope). Field ids and types follow the
//! IDL exactly; unknown fields are skipped so newer clients keep working.

use ::thrift::protocol::{
    TBinaryInputProtocol, TBinaryOutputProtocol, TFieldIdentifier, TInputProtocol,
    TListIdentifier, TMapIdentifier, TMessageIdentifier, TOutputProtocol, TSetIdentifier,
    TStructIdentifier, TType,
};
use ::thrift::{ProtocolError, ProtocolErrorKind};
use thiserror::Error;

/// Upper bound on speculative list preallocation; sizes come from the wire.
const MAX_PREALLOC: usize = 1024;

#[derive(Debug, Error)]
pub enum ThriftError {
    #[error("thrift protocol error: {0}")]
    Protocol(#[from] ::thrift::Error),

    #[error("missing required field {field} in {strukt}")]
    MissingField {
        strukt: &'static str,
        field: &'static str,
    },

    #[error("negative list size {0}")]
    NegativeSize(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum TagType {
    String = 0,
    Double = 1,
    Bool = 2,
    Long = 3,
    Binary = 4,
}

impl TagType {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::String),
            1 => Some(Self::Double),
            2 => Some(Self::Bool),
            3 => Some(Self::Long),
            4 => Some(Self::Binary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SpanRefType {
    ChildOf = 0,
    FollowsFrom = 1,
}

impl SpanRefType {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::ChildOf),
            1 => Some(Self::FollowsFrom),
            _ => None,
        }
    }
}

/// `v_type` is kept raw so values with a type this build does not know still
/// reach the translator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tag {
    pub key: String,
    pub v_type: i32,
    pub v_str: Option<String>,
    pub v_double: Option<f64>,
    pub v_bool: Option<bool>,
    pub v_long: Option<i64>,
    pub v_binary: Option<Vec<u8>>,
}

impl Tag {
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            v_type: TagType::String as i32,
            v_str: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn double(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            v_type: TagType::Double as i32,
            v_double: Some(value),
            ..Self::default()
        }
    }

    pub fn bool(key: impl Into<String>, value: bool) -> Self {
        Self {
            key: key.into(),
            v_type: TagType::Bool as i32,
            v_bool: Some(value),
            ..Self::default()
        }
    }

    pub fn long(key: impl Into<String>, value: i64) -> Self {
        Self {
            key: key.into(),
            v_type: TagType::Long as i32,
            v_long: Some(value),
            ..Self::default()
        }
    }

    pub fn binary(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            v_type: TagType::Binary as i32,
            v_binary: Some(value),
            ..Self::default()
        }
    }

    fn read(i: &mut dyn TInputProtocol) -> Result<Self, ThriftError> {
        i.read_struct_begin()?;
        let mut key = None;
        let mut v_type = None;
        let mut tag = Tag::default();
        loop {
            let field = i.read_field_begin()?;
            if field.field_type == TType::Stop {
                break;
            }
            match (field.id, field.field_type) {
                (Some(1), TType::String) => key = Some(i.read_string()?),
                (Some(2), TType::I32) => v_type = Some(i.read_i32()?),
                (Some(3), TType::String) => tag.v_str = Some(i.read_string()?),
                (Some(4), TType::Double) => tag.v_double = Some(i.read_double()?),
                (Some(5), TType::Bool) => tag.v_bool = Some(i.read_bool()?),
                (Some(6), TType::I64) => tag.v_long = Some(i.read_i64()?),
                (Some(7), TType::String) => tag.v_binary = Some(i.read_bytes()?),
                (_, other) => i.skip(other)?,
            }
            i.read_field_end()?;
        }
        i.read_struct_end()?;
        tag.key = required(key, "Tag", "key")?;
        tag.v_type = required(v_type, "Tag", "vType")?;
        Ok(tag)
    }

    fn write(&self, o: &mut dyn TOutputProtocol) -> Result<(), ThriftError> {
        o.write_struct_begin(&struct_ident("Tag"))?;
        o.write_field_begin(&field("key", TType::String, 1))?;
        o.write_string(&self.key)?;
        o.write_field_end()?;
        o.write_field_begin(&field("vType", TType::I32, 2))?;
        o.write_i32(self.v_type)?;
        o.write_field_end()?;
        if let Some(v) = &self.v_str {
            o.write_field_begin(&field("vStr", TType::String, 3))?;
            o.write_string(v)?;
            o.write_field_end()?;
        }
        if let Some(v) = self.v_double {
            o.write_field_begin(&field("vDouble", TType::Double, 4))?;
            o.write_double(v)?;
            o.write_field_end()?;
        }
        if let Some(v) = self.v_bool {
            o.write_field_begin(&field("vBool", TType::Bool, 5))?;
            o.write_bool(v)?;
            o.write_field_end()?;
        }
        if let Some(v) = self.v_long {
            o.write_field_begin(&field("vLong", TType::I64, 6))?;
            o.write_i64(v)?;
            o.write_field_end()?;
        }
        if let Some(v) = &self.v_binary {
            o.write_field_begin(&field("vBinary", TType::String, 7))?;
            o.write_bytes(v)?;
            o.write_field_end()?;
        }
        o.write_field_stop()?;
        o.write_struct_end()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Log {
    pub timestamp: i64,
    pub fields: Vec<Tag>,
}

impl Log {
    fn read(i: &mut dyn TInputProtocol) -> Result<Self, ThriftError> {
        i.read_struct_begin()?;
        let mut timestamp = None;
        let mut fields = None;
        loop {
            let field = i.read_field_begin()?;
            if field.field_type == TType::Stop {
                break;
            }
            match (field.id, field.field_type) {
                (Some(1), TType::I64) => timestamp = Some(i.read_i64()?),
                (Some(2), TType::List) => fields = Some(read_tags(i)?),
                (_, other) => i.skip(other)?,
            }
            i.read_field_end()?;
        }
        i.read_struct_end()?;
        Ok(Self {
            timestamp: required(timestamp, "Log", "timestamp")?,
            fields: required(fields, "Log", "fields")?,
        })
    }

    fn write(&self, o: &mut dyn TOutputProtocol) -> Result<(), ThriftError> {
        o.write_struct_begin(&struct_ident("Log"))?;
        o.write_field_begin(&field("timestamp", TType::I64, 1))?;
        o.write_i64(self.timestamp)?;
        o.write_field_end()?;
        o.write_field_begin(&field("fields", TType::List, 2))?;
        write_tags(o, &self.fields)?;
        o.write_field_end()?;
        o.write_field_stop()?;
        o.write_struct_end()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpanRef {
    pub ref_type: i32,
    pub trace_id_low: i64,
    pub trace_id_high: i64,
    pub span_id: i64,
}

impl SpanRef {
    fn read(i: &mut dyn TInputProtocol) -> Result<Self, ThriftError> {
        i.read_struct_begin()?;
        let mut ref_type = None;
        let mut trace_id_low = None;
        let mut trace_id_high = None;
        let mut span_id = None;
        loop {
            let field = i.read_field_begin()?;
            if field.field_type == TType::Stop {
                break;
            }
            match (field.id, field.field_type) {
                (Some(1), TType::I32) => ref_type = Some(i.read_i32()?),
                (Some(2), TType::I64) => trace_id_low = Some(i.read_i64()?),
                (Some(3), TType::I64) => trace_id_high = Some(i.read_i64()?),
                (Some(4), TType::I64) => span_id = Some(i.read_i64()?),
                (_, other) => i.skip(other)?,
            }
            i.read_field_end()?;
        }
        i.read_struct_end()?;
        Ok(Self {
            ref_type: required(ref_type, "SpanRef", "refType")?,
            trace_id_low: required(trace_id_low, "SpanRef", "traceIdLow")?,
            trace_id_high: required(trace_id_high, "SpanRef", "traceIdHigh")?,
            span_id: required(span_id, "SpanRef", "spanId")?,
        })
    }

    fn write(&self, o: &mut dyn TOutputProtocol) -> Result<(), ThriftError> {
        o.write_struct_begin(&struct_ident("SpanRef"))?;
        o.write_field_begin(&field("refType", TType::I32, 1))?;
        o.write_i32(self.ref_type)?;
        o.write_field_end()?;
        o.write_field_begin(&field("traceIdLow", TType::I64, 2))?;
        o.write_i64(self.trace_id_low)?;
        o.write_field_end()?;
        o.write_field_begin(&field("traceIdHigh", TType::I64, 3))?;
        o.write_i64(self.trace_id_high)?;
        o.write_field_end()?;
        o.write_field_begin(&field("spanId", TType::I64, 4))?;
        o.write_i64(self.span_id)?;
        o.write_field_end()?;
        o.write_field_stop()?;
        o.write_struct_end()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Span {
    pub trace_id_low: i64,
    pub trace_id_high: i64,
    pub span_id: i64,
    pub parent_span_id: i64,
    pub operation_name: String,
    pub references: Option<Vec<SpanRef>>,
    pub flags: i32,
    /// Microseconds since the Unix epoch.
    pub start_time: i64,
    /// Microseconds.
    pub duration: i64,
    pub tags: Option<Vec<Tag>>,
    pub logs: Option<Vec<Log>>,
}

impl Span {
    fn read(i: &mut dyn TInputProtocol) -> Result<Self, ThriftError> {
        i.read_struct_begin()?;
        let mut trace_id_low = None;
        let mut trace_id_high = None;
        let mut span_id = None;
        let mut parent_span_id = None;
        let mut operation_name = None;
        let mut flags = None;
        let mut start_time = None;
        let mut duration = None;
        let mut span = Span::default();
        loop {
            let field = i.read_field_begin()?;
            if field.field_type == TType::Stop {
                break;
            }
            match (field.id, field.field_type) {
                (Some(1), TType::I64) => trace_id_low = Some(i.read_i64()?),
                (Some(2), TType::I64) => trace_id_high = Some(i.read_i64()?),
                (Some(3), TType::I64) => span_id = Some(i.read_i64()?),
                (Some(4), TType::I64) => parent_span_id = Some(i.read_i64()?),
                (Some(5), TType::String) => operation_name = Some(i.read_string()?),
                (Some(6), TType::List) => {
                    let size = read_list_size(i)?;
                    let mut refs = Vec::with_capacity(size.min(MAX_PREALLOC));
                    for _ in 0..size {
                        refs.push(SpanRef::read(i)?);
                    }
                    i.read_list_end()?;
                    span.references = Some(refs);
                }
                (Some(7), TType::I32) => flags = Some(i.read_i32()?),
                (Some(8), TType::I64) => start_time = Some(i.read_i64()?),
                (Some(9), TType::I64) => duration = Some(i.read_i64()?),
                (Some(10), TType::List) => span.tags = Some(read_tags(i)?),
                (Some(11), TType::List) => {
                    let size = read_list_size(i)?;
                    let mut logs = Vec::with_capacity(size.min(MAX_PREALLOC));
                    for _ in 0..size {
                        logs.push(Log::read(i)?);
                    }
                    i.read_list_end()?;
                    span.logs = Some(logs);
                }
                (_, other) => i.skip(other)?,
            }
            i.read_field_end()?;
        }
        i.read_struct_end()?;
        span.trace_id_low = required(trace_id_low, "Span", "traceIdLow")?;
        span.trace_id_high = required(trace_id_high, "Span", "traceIdHigh")?;
        span.span_id = required(span_id, "Span", "spanId")?;
        span.parent_span_id = required(parent_span_id, "Span", "parentSpanId")?;
        span.operation_name = required(operation_name, "Span", "operationName")?;
        span.flags = required(flags, "Span", "flags")?;
        span.start_time = required(start_time, "Span", "startTime")?;
        span.duration = required(duration, "Span", "duration")?;
        Ok(span)
    }

    fn write(&self, o: &mut dyn TOutputProtocol) -> Result<(), ThriftError> {
        o.write_struct_begin(&struct_ident("Span"))?;
        o.write_field_begin(&field("traceIdLow", TType::I64, 1))?;
        o.write_i64(self.trace_id_low)?;
        o.write_field_end()?;
        o.write_field_begin(&field("traceIdHigh", TType::I64, 2))?;
        o.write_i64(self.trace_id_high)?;
        o.write_field_end()?;
        o.write_field_begin(&field("spanId", TType::I64, 3))?;
        o.write_i64(self.span_id)?;
        o.write_field_end()?;
        o.write_field_begin(&field("parentSpanId", TType::I64, 4))?;
        o.write_i64(self.parent_span_id)?;
        o.write_field_end()?;
        o.write_field_begin(&field("operationName", TType::String, 5))?;
        o.write_string(&self.operation_name)?;
        o.write_field_end()?;
        if let Some(refs) = &self.references {
            o.write_field_begin(&field("references", TType::List, 6))?;
            write_list_size(o, refs.len())?;
            for r in refs {
                r.write(o)?;
            }
            o.write_list_end()?;
            o.write_field_end()?;
        }
        o.write_field_begin(&field("flags", TType::I32, 7))?;
        o.write_i32(self.flags)?;
        o.write_field_end()?;
        o.write_field_begin(&field("startTime", TType::I64, 8))?;
        o.write_i64(self.start_time)?;
        o.write_field_end()?;
        o.write_field_begin(&field("duration", TType::I64, 9))?;
        o.write_i64(self.duration)?;
        o.write_field_end()?;
        if let Some(tags) = &self.tags {
            o.write_field_begin(&field("tags", TType::List, 10))?;
            write_tags(o, tags)?;
            o.write_field_end()?;
        }
        if let Some(logs) = &self.logs {
            o.write_field_begin(&field("logs", TType::List, 11))?;
            write_list_size(o, logs.len())?;
            for log in logs {
                log.write(o)?;
            }
            o.write_list_end()?;
            o.write_field_end()?;
        }
        o.write_field_stop()?;
        o.write_struct_end()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Process {
    pub service_name: String,
    pub tags: Option<Vec<Tag>>,
}

impl Process {
    fn read(i: &mut dyn TInputProtocol) -> Result<Self, ThriftError> {
        i.read_struct_begin()?;
        let mut service_name = None;
        let mut tags = None;
        loop {
            let field = i.read_field_begin()?;
            if field.field_type == TType::Stop {
                break;
            }
            match (field.id, field.field_type) {
                (Some(1), TType::String) => service_name = Some(i.read_string()?),
                (Some(2), TType::List) => tags = Some(read_tags(i)?),
                (_, other) => i.skip(other)?,
            }
            i.read_field_end()?;
        }
        i.read_struct_end()?;
        Ok(Self {
            service_name: required(service_name, "Process", "serviceName")?,
            tags,
        })
    }

    fn write(&self, o: &mut dyn TOutputProtocol) -> Result<(), ThriftError> {
        o.write_struct_begin(&struct_ident("Process"))?;
        o.write_field_begin(&field("serviceName", TType::String, 1))?;
        o.write_string(&self.service_name)?;
        o.write_field_end()?;
        if let Some(tags) = &self.tags {
            o.write_field_begin(&field("tags", TType::List, 2))?;
            write_tags(o, tags)?;
            o.write_field_end()?;
        }
        o.write_field_stop()?;
        o.write_struct_end()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    pub process: Process,
    pub spans: Vec<Span>,
    pub seq_no: Option<i64>,
}

impl Batch {
    fn read(i: &mut dyn TInputProtocol) -> Result<Self, ThriftError> {
        i.read_struct_begin()?;
        let mut process = None;
        let mut spans = None;
        let mut seq_no = None;
        loop {
            let field = i.read_field_begin()?;
            if field.field_type == TType::Stop {
                break;
            }
            match (field.id, field.field_type) {
                (Some(1), TType::Struct) => process = Some(Process::read(i)?),
                (Some(2), TType::List) => {
                    let size = read_list_size(i)?;
                    let mut out = Vec::with_capacity(size.min(MAX_PREALLOC));
                    for _ in 0..size {
                        out.push(Span::read(i)?);
                    }
                    i.read_list_end()?;
                    spans = Some(out);
                }
                (Some(3), TType::I64) => seq_no = Some(i.read_i64()?),
                // 4: ClientStats is agent bookkeeping and carries no span data.
                (_, other) => i.skip(other)?,
            }
            i.read_field_end()?;
        }
        i.read_struct_end()?;
        Ok(Self {
            process: required(process, "Batch", "process")?,
            spans: required(spans, "Batch", "spans")?,
            seq_no,
        })
    }

    fn write(&self, o: &mut dyn TOutputProtocol) -> Result<(), ThriftError> {
        o.write_struct_begin(&struct_ident("Batch"))?;
        o.write_field_begin(&field("process", TType::Struct, 1))?;
        self.process.write(o)?;
        o.write_field_end()?;
        o.write_field_begin(&field("spans", TType::List, 2))?;
        write_list_size(o, self.spans.len())?;
        for span in &self.spans {
            span.write(o)?;
        }
        o.write_list_end()?;
        o.write_field_end()?;
        if let Some(seq_no) = self.seq_no {
            o.write_field_begin(&field("seqNo", TType::I64, 3))?;
            o.write_i64(seq_no)?;
            o.write_field_end()?;
        }
        o.write_field_stop()?;
        o.write_struct_end()?;
        Ok(())
    }
}

pub fn decode_batch(bytes: &[u8]) -> Result<Batch, ThriftError> {
    let mut protocol = SliceInput::new(bytes);
    Batch::read(&mut protocol)
}

pub fn encode_batch(batch: &Batch) -> Result<Vec<u8>, ThriftError> {
    let mut buf = Vec::new();
    {
        let mut protocol = TBinaryOutputProtocol::new(&mut buf, true);
        batch.write(&mut protocol)?;
        protocol.flush()?;
    }
    Ok(buf)
}

/// Binary protocol over an in-memory body. String and binary lengths are
/// checked against the bytes left before anything is allocated.
struct SliceInput<'a> {
    inner: TBinaryInputProtocol<&'a [u8]>,
}

impl<'a> SliceInput<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            inner: TBinaryInputProtocol::new(bytes, true),
        }
    }
}

fn size_error(kind: ProtocolErrorKind, message: String) -> ::thrift::Error {
    ::thrift::Error::Protocol(ProtocolError::new(kind, message))
}

impl TInputProtocol for SliceInput<'_> {
    fn read_message_begin(&mut self) -> ::thrift::Result<TMessageIdentifier> {
        self.inner.read_message_begin()
    }

    fn read_message_end(&mut self) -> ::thrift::Result<()> {
        self.inner.read_message_end()
    }

    fn read_struct_begin(&mut self) -> ::thrift::Result<Option<TStructIdentifier>> {
        self.inner.read_struct_begin()
    }

    fn read_struct_end(&mut self) -> ::thrift::Result<()> {
        self.inner.read_struct_end()
    }

    fn read_field_begin(&mut self) -> ::thrift::Result<TFieldIdentifier> {
        self.inner.read_field_begin()
    }

    fn read_field_end(&mut self) -> ::thrift::Result<()> {
        self.inner.read_field_end()
    }

    fn read_bool(&mut self) -> ::thrift::Result<bool> {
        self.inner.read_bool()
    }

    fn read_bytes(&mut self) -> ::thrift::Result<Vec<u8>> {
        let len = self.inner.read_i32()?;
        let len = usize::try_from(len).map_err(|_| {
            size_error(
                ProtocolErrorKind::NegativeSize,
                format!("negative byte length {len}"),
            )
        })?;
        let remaining = self.inner.transport;
        if len > remaining.len() {
            return Err(size_error(
                ProtocolErrorKind::SizeLimit,
                format!(
                    "byte length {len} exceeds the {} bytes left",
                    remaining.len()
                ),
            ));
        }
        let (head, tail) = remaining.split_at(len);
        self.inner.transport = tail;
        Ok(head.to_vec())
    }

    fn read_i8(&mut self) -> ::thrift::Result<i8> {
        self.inner.read_i8()
    }

    fn read_i16(&mut self) -> ::thrift::Result<i16> {
        self.inner.read_i16()
    }

    fn read_i32(&mut self) -> ::thrift::Result<i32> {
        self.inner.read_i32()
    }

    fn read_i64(&mut self) -> ::thrift::Result<i64> {
        self.inner.read_i64()
    }

    fn read_double(&mut self) -> ::thrift::Result<f64> {
        self.inner.read_double()
    }

    fn read_string(&mut self) -> ::thrift::Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(From::from)
    }

    fn read_list_begin(&mut self) -> ::thrift::Result<TListIdentifier> {
        self.inner.read_list_begin()
    }

    fn read_list_end(&mut self) -> ::thrift::Result<()> {
        self.inner.read_list_end()
    }

    fn read_set_begin(&mut self) -> ::thrift::Result<TSetIdentifier> {
        self.inner.read_set_begin()
    }

    fn read_set_end(&mut self) -> ::thrift::Result<()> {
        self.inner.read_set_end()
    }

    fn read_map_begin(&mut self) -> ::thrift::Result<TMapIdentifier> {
        self.inner.read_map_begin()
    }

    fn read_map_end(&mut self) -> ::thrift::Result<()> {
        self.inner.read_map_end()
    }

    fn read_byte(&mut self) -> ::thrift::Result<u8> {
        self.inner.read_byte()
    }
}

fn required<T>(value: Option<T>, strukt: &'static str, field: &'static str) -> Result<T, ThriftError> {
    value.ok_or(ThriftError::MissingField { strukt, field })
}

fn struct_ident(name: &str) -> TStructIdentifier {
    TStructIdentifier {
        name: name.to_string(),
    }
}

fn field(name: &str, field_type: TType, id: i16) -> TFieldIdentifier {
    TFieldIdentifier {
        name: Some(name.to_string()),
        field_type,
        id: Some(id),
    }
}

fn read_list_size(i: &mut dyn TInputProtocol) -> Result<usize, ThriftError> {
    let ident = i.read_list_begin()?;
    usize::try_from(ident.size).map_err(|_| ThriftError::NegativeSize(ident.size))
}

fn write_list_size(o: &mut dyn TOutputProtocol, len: usize) -> Result<(), ThriftError> {
    let size = i32::try_from(len).map_err(|_| {
        ::thrift::Error::Protocol(::thrift::ProtocolError::new(
            ::thrift::ProtocolErrorKind::SizeLimit,
            format!("list of {len} elements exceeds thrift limits"),
        ))
    })?;
    o.write_list_begin(&TListIdentifier {
        element_type: TType::Struct,
        size,
    })?;
    Ok(())
}

fn read_tags(i: &mut dyn TInputProtocol) -> Result<Vec<Tag>, ThriftError> {
    let size = read_list_size(i)?;
    let mut tags = Vec::with_capacity(size.min(MAX_PREALLOC));
    for _ in 0..size {
        tags.push(Tag::read(i)?);
    }
    i.read_list_end()?;
    Ok(tags)
}

fn write_tags(o: &mut dyn TOutputProtocol, tags: &[Tag]) -> Result<(), ThriftError> {
    write_list_size(o, tags.len())?;
    for tag in tags {
        tag.write(o)?;
    }
    o.write_list_end()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_batch() -> Batch {
        Batch {
            process: Process {
                service_name: "issaTest".into(),
                tags: Some(vec![
                    Tag::bool("bool", true),
                    Tag::string("string", "yes"),
                    Tag::long("int64", 10_000_000),
                ]),
            },
            spans: vec![Span {
                trace_id_low: 0x0102030405060708,
                trace_id_high: 0x1112131415161718,
                span_id: 7,
                parent_span_id: 3,
                operation_name: "DBSearch".into(),
                references: Some(vec![SpanRef {
                    ref_type: SpanRefType::ChildOf as i32,
                    trace_id_low: 0x0102030405060708,
                    trace_id_high: 0x1112131415161718,
                    span_id: 3,
                }]),
                flags: 1,
                start_time: 1_542_158_650_536_343,
                duration: 600_000_000,
                tags: Some(vec![Tag::double("ratio", 0.5), Tag::binary("blob", vec![1, 2])]),
                logs: Some(vec![Log {
                    timestamp: 1_542_158_650_600_000,
                    fields: vec![Tag::string("event", "retry")],
                }]),
            }],
            seq_no: Some(9),
        }
    }

    #[test]
    fn encodes_and_decodes_batch() {
        let batch = sample_batch();
        let bytes = encode_batch(&batch).unwrap();
        assert_eq!(decode_batch(&bytes).unwrap(), batch);
    }

    #[test]
    fn binary_layout_starts_with_process_struct_field() {
        let bytes = encode_batch(&sample_batch()).unwrap();
        // field header: type STRUCT (12), id 1
        assert_eq!(&bytes[..3], &[12, 0, 1]);
    }

    #[test]
    fn rejects_truncated_payload() {
        let bytes = encode_batch(&sample_batch()).unwrap();
        assert!(decode_batch(&bytes[..bytes.len() / 2]).is_err());
        assert!(decode_batch(b"not thrift").is_err());
    }

    #[test]
    fn string_length_is_checked_against_remaining_bytes() {
        // Batch.process (STRUCT, 1) -> Process.serviceName (STRING, 1), length -1
        let negative = [0x0c_u8, 0, 1, 0x0b, 0, 1, 0xff, 0xff, 0xff, 0xff];
        assert!(matches!(
            decode_batch(&negative),
            Err(ThriftError::Protocol(::thrift::Error::Protocol(ProtocolError {
                kind: ProtocolErrorKind::NegativeSize,
                ..
            })))
        ));

        // length 0x7fff_fff0 with three bytes behind it
        let oversized = [0x0c_u8, 0, 1, 0x0b, 0, 1, 0x7f, 0xff, 0xff, 0xf0, b'a', b'b', b'c'];
        assert!(matches!(
            decode_batch(&oversized),
            Err(ThriftError::Protocol(::thrift::Error::Protocol(ProtocolError {
                kind: ProtocolErrorKind::SizeLimit,
                ..
            })))
        ));
    }

    #[test]
    fn skipped_binary_field_length_is_checked() {
        // unknown Batch field 9 of type STRING claiming 2 GiB
        let bytes = [0x0b_u8, 0, 9, 0x7f, 0xff, 0xff, 0xff, 0];
        assert!(decode_batch(&bytes).is_err());
    }

    #[test]
    fn missing_required_field_is_reported() {
        let process = Process {
            service_name: "svc".into(),
            tags: None,
        };
        let mut buf = Vec::new();
        {
            let mut protocol = TBinaryOutputProtocol::new(&mut buf, true);
            protocol
                .write_field_begin(&field("process", TType::Struct, 1))
                .unwrap();
            process.write(&mut protocol).unwrap();
            protocol.write_field_end().unwrap();
            protocol.write_field_stop().unwrap();
            protocol.flush().unwrap();
        }

        let err = decode_batch(&buf).unwrap_err();
        assert!(matches!(
            err,
            ThriftError::MissingField {
                strukt: "Batch",
                field: "spans"
            }
        ));
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let mut buf = Vec::new();
        {
            let mut protocol = TBinaryOutputProtocol::new(&mut buf, true);
            protocol.write_struct_begin(&struct_ident("Process")).unwrap();
            protocol
                .write_field_begin(&field("future", TType::I32, 42))
                .unwrap();
            protocol.write_i32(5).unwrap();
            protocol.write_field_end().unwrap();
            protocol
                .write_field_begin(&field("serviceName", TType::String, 1))
                .unwrap();
            protocol.write_string("svc").unwrap();
            protocol.write_field_end().unwrap();
            protocol.write_field_stop().unwrap();
            protocol.write_struct_end().unwrap();
            protocol.flush().unwrap();
        }
        let mut protocol = TBinaryInputProtocol::new(&buf[..], true);
        let process = Process::read(&mut protocol).unwrap();
        assert_eq!(process.service_name, "svc");
        assert!(process.tags.is_none());
    }
}
