//! Translation from the tracer's span model to the collector's wire model.

use crate::span::Annotation;
use crate::wire::{WireAnnotation, WireEndpoint, WireSpan};
use std::sync::Arc;

/// Debug flag stamped on every span this crate emits.
///
/// Fixed policy: the collector must keep every forwarded span regardless of
/// its own sampling.
pub const DEBUG_POLICY: bool = true;

/// Converts a millisecond timestamp to the collector's microseconds.
///
/// No range validation; values outside `i64::MIN / 1000..=i64::MAX / 1000`
/// wrap.
#[inline]
pub fn to_wire_timestamp(timestamp_ms: i64) -> i64 {
    timestamp_ms.wrapping_mul(1000)
}

/// Translates one annotation. The duration is copied as-is, without unit
/// conversion, and stays absent when the source has none.
pub fn translate_annotation(annotation: &Annotation, host: Arc<WireEndpoint>) -> WireAnnotation {
    WireAnnotation {
        timestamp: to_wire_timestamp(annotation.timestamp_ms),
        value: annotation.name.clone(),
        host: Some(host),
        duration: annotation.duration,
    }
}

/// Builds the wire span from identity fields and already translated
/// annotations, preserving their order.
///
/// Binary annotations are always empty; tags are not recorded by the tracer.
pub fn assemble_span(
    trace_id: i64,
    name: &str,
    id: i64,
    parent_id: Option<i64>,
    annotations: Vec<WireAnnotation>,
) -> WireSpan {
    WireSpan {
        trace_id,
        name: name.to_owned(),
        id,
        parent_id,
        annotations,
        binary_annotations: Vec::new(),
        debug: Some(DEBUG_POLICY),
    }
}
