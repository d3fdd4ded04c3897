//! Span serialization and the Scribe text envelope.
//!
//! A span travels as `LogEntry { category: "zipkin", message: base64(thrift(span)) }`.

use crate::constants::ZIPKIN_CATEGORY;
use crate::error::SerializationError;
use crate::thrift::{self, ThriftReader, ThriftWriter};
use crate::wire::{LogEntry, WireSpan};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;

/// Serializes a span with the Thrift binary protocol.
///
/// Equal spans always produce identical bytes.
pub fn serialize_span(span: &WireSpan) -> Result<Bytes, SerializationError> {
    let hint = 64 + span.name.len() + span.annotations.len() * 48;
    let mut w = ThriftWriter::with_capacity(hint);
    thrift::write_span(&mut w, span)?;
    Ok(w.finish())
}

/// Decodes bytes produced by [`serialize_span`].
pub fn deserialize_span(bytes: &[u8]) -> Result<WireSpan, SerializationError> {
    let mut r = ThriftReader::new(bytes);
    let span = thrift::read_span(&mut r)?;
    r.finish()?;
    Ok(span)
}

/// Standard, padded base64.
pub fn encode_for_transport(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_from_transport(text: &str) -> Result<Vec<u8>, SerializationError> {
    STANDARD
        .decode(text)
        .map_err(|e| SerializationError::InvalidBase64(e.to_string()))
}

/// Wraps a serialized span in a `zipkin` log entry.
pub fn log_entry(span: &WireSpan) -> Result<LogEntry, SerializationError> {
    let bytes = serialize_span(span)?;
    Ok(LogEntry::new(ZIPKIN_CATEGORY, encode_for_transport(&bytes)))
}

/// Decodes the span carried by a base64 message.
pub fn decode_span(message: &str) -> Result<WireSpan, SerializationError> {
    deserialize_span(&decode_from_transport(message)?)
}

/// Decodes the span inside a log entry. Entries of other categories yield
/// `Ok(None)`.
pub fn decode_log_entry(entry: &LogEntry) -> Result<Option<WireSpan>, SerializationError> {
    if entry.category != ZIPKIN_CATEGORY {
        return Ok(None);
    }
    decode_span(&entry.message).map(Some)
}
