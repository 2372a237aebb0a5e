use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::error::{JtraceError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("invalid {kind} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{kind} must not be all zeros")]
    Zero { kind: &'static str },
}

/// 128-bit trace identifier, stored big-endian exactly as it appears on the
/// protobuf wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId([u8; 16]);

/// 64-bit span identifier, stored big-endian.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId([u8; 8]);

impl TraceId {
    pub const LEN: usize = 16;

    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, IdError> {
        let raw: [u8; 16] = bytes.try_into().map_err(|_| IdError::InvalidLength {
            kind: "trace id",
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Self::from_array(raw)
    }

    /// The all-zero id means "no trace" on both Jaeger wires and is refused
    /// with [`IdError::Zero`].
    pub fn from_array(raw: [u8; 16]) -> std::result::Result<Self, IdError> {
        if raw == [0; 16] {
            return Err(IdError::Zero { kind: "trace id" });
        }
        Ok(Self(raw))
    }

    /// Builds an id from the Thrift `(traceIdHigh, traceIdLow)` pair.
    pub fn from_high_low(high: u64, low: u64) -> std::result::Result<Self, IdError> {
        let mut raw = [0u8; 16];
        raw[..8].copy_from_slice(&high.to_be_bytes());
        raw[8..].copy_from_slice(&low.to_be_bytes());
        Self::from_array(raw)
    }

    pub fn to_high_low(&self) -> (u64, u64) {
        let mut high = [0u8; 8];
        let mut low = [0u8; 8];
        high.copy_from_slice(&self.0[..8]);
        low.copy_from_slice(&self.0[8..]);
        (u64::from_be_bytes(high), u64::from_be_bytes(low))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn parse(input: &str) -> Result<Self> {
        let raw = decode_hex::<16>(input)
            .ok_or_else(|| JtraceError::Parse(format!("invalid trace id: {input}")))?;
        Self::from_array(raw).map_err(|e| JtraceError::Parse(e.to_string()))
    }

    pub fn to_hex(&self) -> String {
        encode_hex(&self.0)
    }
}

impl SpanId {
    pub const LEN: usize = 8;

    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, IdError> {
        let raw: [u8; 8] = bytes.try_into().map_err(|_| IdError::InvalidLength {
            kind: "span id",
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Self::from_array(raw)
    }

    /// Refuses the all-zero id, which Thrift uses for "no parent".
    pub fn from_array(raw: [u8; 8]) -> std::result::Result<Self, IdError> {
        if raw == [0; 8] {
            return Err(IdError::Zero { kind: "span id" });
        }
        Ok(Self(raw))
    }

    pub fn from_u64(value: u64) -> std::result::Result<Self, IdError> {
        Self::from_array(value.to_be_bytes())
    }

    pub fn to_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub fn parse(input: &str) -> Result<Self> {
        let raw = decode_hex::<8>(input)
            .ok_or_else(|| JtraceError::Parse(format!("invalid span id: {input}")))?;
        Self::from_array(raw).map_err(|e| JtraceError::Parse(e.to_string()))
    }

    pub fn to_hex(&self) -> String {
        encode_hex(&self.0)
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn decode_hex<const N: usize>(input: &str) -> Option<[u8; N]> {
    if input.len() != N * 2 || !input.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let mut out = [0u8; N];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&input[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({})", self.to_hex())
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({})", self.to_hex())
    }
}

impl Serialize for TraceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TraceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl Serialize for SpanId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SpanId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: [u8; 16] = [
        0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA, 0xFB, 0xFC, 0xFD, 0xFE, 0xFF,
        0x80,
    ];
    const SPAN: [u8; 8] = [0xAF, 0xAE, 0xAD, 0xAC, 0xAB, 0xAA, 0xA9, 0xA8];

    #[test]
    fn bytes_round_trip() {
        let trace = TraceId::from_bytes(&TRACE).unwrap();
        let span = SpanId::from_bytes(&SPAN).unwrap();
        assert_eq!(trace.as_bytes(), &TRACE);
        assert_eq!(span.as_bytes(), &SPAN);
    }

    #[test]
    fn high_low_preserves_byte_order() {
        let trace = TraceId::from_bytes(&TRACE).unwrap();
        let (high, low) = trace.to_high_low();
        assert_eq!(high, 0xF1F2F3F4F5F6F7F8);
        assert_eq!(low, 0xF9FAFBFCFDFEFF80);
        assert_eq!(TraceId::from_high_low(high, low).unwrap(), trace);

        let span = SpanId::from_bytes(&SPAN).unwrap();
        assert_eq!(span.to_u64(), 0xAFAEADACABAAA9A8);
        assert_eq!(SpanId::from_u64(span.to_u64()).unwrap(), span);
    }

    #[test]
    fn signed_thrift_values_round_trip() {
        let low = -0x0605040302010080_i64;
        let trace = TraceId::from_high_low(-1_i64 as u64, low as u64).unwrap();
        let (high, back) = trace.to_high_low();
        assert_eq!(high as i64, -1);
        assert_eq!(back as i64, low);
    }

    #[test]
    fn rejects_wrong_lengths() {
        let err = TraceId::from_bytes(&TRACE[..15]).unwrap_err();
        assert_eq!(
            err,
            IdError::InvalidLength {
                kind: "trace id",
                expected: 16,
                actual: 15
            }
        );
        assert!(TraceId::from_bytes(&[1; 17]).is_err());
        assert!(SpanId::from_bytes(&SPAN[..7]).is_err());
        assert!(SpanId::from_bytes(&[]).is_err());
    }

    #[test]
    fn rejects_zero_ids() {
        assert_eq!(
            TraceId::from_high_low(0, 0).unwrap_err(),
            IdError::Zero { kind: "trace id" }
        );
        assert!(SpanId::from_u64(0).is_err());
    }

    #[test]
    fn parses_and_renders_hex() {
        let trace = TraceId::parse("F1F2F3F4F5F6F7F8F9FAFBFCFDFEFF80").unwrap();
        assert_eq!(trace.to_hex(), "f1f2f3f4f5f6f7f8f9fafbfcfdfeff80");
        let span = SpanId::parse("1f1e1d1c1b1a1918").unwrap();
        assert_eq!(span.to_string(), "1f1e1d1c1b1a1918");
        assert!(TraceId::parse("abc").is_err());
        assert!(SpanId::parse("zzzzzzzzzzzzzzzz").is_err());
    }

    #[test]
    fn serializes_as_hex_string() {
        let span = SpanId::from_bytes(&SPAN).unwrap();
        let json = serde_json::to_string(&span).unwrap();
        assert_eq!(json, "\"afaeadacabaaa9a8\"");
        let back: SpanId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, span);
    }
}
