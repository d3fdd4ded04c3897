//! Zipkin Span Collector
//!
//! Forwards finished distributed-tracing spans to a Zipkin collector. Each
//! span is translated to the Zipkin v1 Thrift model, serialized with the
//! Thrift binary protocol, base64-encoded into a Scribe `LogEntry` with
//! category `zipkin`, and delivered with one `Log` call over a pooled, framed
//! TCP connection.
//!
//! ```text
//! tracer → SpanCollector::collect(&Span)
//!            ├─ EndpointCache::get_or_create   (per annotation)
//!            ├─ translate_annotation           (ms → µs, optional duration)
//!            ├─ assemble_span                  (debug = true, no tags)
//!            ├─ codec::log_entry               (thrift → base64 → LogEntry)
//!            └─ LogTransport::log              (Scribe Log over ConnectionPool)
//! ```
//!
//! `collect` never fails: failures are logged through `tracing` and counted
//! in [`CollectorMetrics`]. Use [`SpanCollector::forward`] to observe the
//! outcome directly, or [`AsyncSpanForwarder`] to hand spans off without
//! waiting for the collector.
//!
//! # Native Async Traits
//!
//! [`LogTransport`] uses native async fn in traits (no `#[async_trait]`
//! macro); [`LogTransportBoxed`] is its object-safe counterpart.

pub mod async_bridge;
pub mod client;
pub mod codec;
pub mod collector;
pub mod config;
pub mod constants;
pub mod convert;
pub mod endpoint_cache;
pub mod error;
pub mod logging;
pub mod pool;
pub mod span;
pub mod thrift;
pub mod wire;

// Re-export main types
pub use async_bridge::{AsyncSpanForwarder, ForwarderMetrics, SubmitError};
pub use client::{LogTransport, LogTransportBoxed, ScribeClient};
pub use collector::{CollectStage, CollectorMetrics, SpanCollector};
pub use config::{CollectorConfig, ForwarderConfig, ProtocolVersion};
pub use convert::{assemble_span, translate_annotation};
pub use endpoint_cache::EndpointCache;
pub use error::{CollectError, ConfigError, SerializationError, TransportError};
pub use pool::ConnectionPool;
pub use span::{Annotation, Endpoint, Span};
pub use wire::{LogEntry, ResultCode, WireAnnotation, WireEndpoint, WireSpan};
