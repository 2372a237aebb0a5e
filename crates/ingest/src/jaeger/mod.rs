//! Wire-level object graphs for the two Jaeger collector protocols.
//!
//! `thrift` mirrors `jaeger.thrift` (agent/collector HTTP submission) and
//! `api_v2` mirrors the `jaeger.api_v2` protobuf package used by the gRPC
//! collector. Identifier encoding and tag typing differ between the two.

pub mod api_v2;
pub mod thrift;
