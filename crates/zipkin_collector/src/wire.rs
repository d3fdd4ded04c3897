//! Collector-facing span model.
//!
//! These types mirror the Zipkin v1 Thrift schema field for field. Optional
//! Thrift fields are `Option`s so "absent" never collides with a zero value.

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// Wire encoding of an [`Endpoint`](crate::span::Endpoint).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WireEndpoint {
    pub ipv4: i32,
    pub port: i16,
    pub service_name: String,
}

/// Wire encoding of an [`Annotation`](crate::span::Annotation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireAnnotation {
    /// Unix epoch microseconds
    pub timestamp: i64,
    pub value: String,
    pub host: Option<Arc<WireEndpoint>>,
    pub duration: Option<i32>,
}

/// Value type tag of a binary annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationType {
    Bool,
    Bytes,
    I16,
    I32,
    I64,
    Double,
    String,
}

impl AnnotationType {
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Bool => 0,
            Self::Bytes => 1,
            Self::I16 => 2,
            Self::I32 => 3,
            Self::I64 => 4,
            Self::Double => 5,
            Self::String => 6,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        Some(match value {
            0 => Self::Bool,
            1 => Self::Bytes,
            2 => Self::I16,
            3 => Self::I32,
            4 => Self::I64,
            5 => Self::Double,
            6 => Self::String,
            _ => return None,
        })
    }
}

/// Key/value tag on a span.
///
/// Spans assembled by this crate never carry any; the type exists so the
/// schema can be decoded in full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireBinaryAnnotation {
    pub key: String,
    pub value: Bytes,
    pub annotation_type: AnnotationType,
    pub host: Option<Arc<WireEndpoint>>,
}

/// Wire encoding of a [`Span`](crate::span::Span).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireSpan {
    pub trace_id: i64,
    pub name: String,
    pub id: i64,
    pub parent_id: Option<i64>,
    pub annotations: Vec<WireAnnotation>,
    pub binary_annotations: Vec<WireBinaryAnnotation>,
    pub debug: Option<bool>,
}

/// Scribe log entry carrying one base64-encoded span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub category: String,
    pub message: String,
}

impl LogEntry {
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
        }
    }
}

/// Outcome of a Scribe `Log` call. Zero means accepted; anything else is a
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(i32);

impl ResultCode {
    pub const OK: Self = Self(0);
    pub const TRY_LATER: Self = Self(1);

    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i32 {
        self.0
    }

    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }
}

impl From<i32> for ResultCode {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::OK => write!(f, "OK"),
            Self::TRY_LATER => write!(f, "TRY_LATER"),
            Self(other) => write!(f, "{}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_display() {
        assert_eq!(ResultCode::OK.to_string(), "OK");
        assert_eq!(ResultCode::TRY_LATER.to_string(), "TRY_LATER");
        assert_eq!(ResultCode::new(7).to_string(), "7");
        assert!(!ResultCode::new(-1).is_ok());
    }

    #[test]
    fn test_annotation_type_tags() {
        for tag in 0..7 {
            let ty = AnnotationType::from_i32(tag).unwrap();
            assert_eq!(ty.as_i32(), tag);
        }
        assert_eq!(AnnotationType::from_i32(7), None);
    }
}
