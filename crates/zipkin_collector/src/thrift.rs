//! Thrift binary protocol codec for the Zipkin and Scribe schemas.
//!
//! Only the pieces the collector needs are implemented: primitive read/write,
//! struct encoding for the span schema, and the `Log` call/reply envelopes.
//! All integers are big-endian. Structs are written field by field in
//! ascending id order and terminated by `STOP`, which makes encoding
//! deterministic.

use crate::config::ProtocolVersion;
use crate::constants::LOG_METHOD;
use crate::error::SerializationError;
use crate::wire::{
    AnnotationType, LogEntry, ResultCode, WireAnnotation, WireBinaryAnnotation, WireEndpoint,
    WireSpan,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::sync::Arc;

pub const T_STOP: u8 = 0;
pub const T_BOOL: u8 = 2;
pub const T_BYTE: u8 = 3;
pub const T_DOUBLE: u8 = 4;
pub const T_I16: u8 = 6;
pub const T_I32: u8 = 8;
pub const T_I64: u8 = 10;
pub const T_STRING: u8 = 11;
pub const T_STRUCT: u8 = 12;
pub const T_MAP: u8 = 13;
pub const T_SET: u8 = 14;
pub const T_LIST: u8 = 15;

const VERSION_1: u32 = 0x8001_0000;
const VERSION_MASK: u32 = 0xffff_0000;

/// Deepest struct/container nesting the decoder follows when skipping
const MAX_SKIP_DEPTH: usize = 64;

/// Thrift message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Call,
    Reply,
    Exception,
    Oneway,
}

impl MessageType {
    fn as_u8(self) -> u8 {
        match self {
            Self::Call => 1,
            Self::Reply => 2,
            Self::Exception => 3,
            Self::Oneway => 4,
        }
    }

    fn from_u8(value: u8) -> Result<Self, SerializationError> {
        match value {
            1 => Ok(Self::Call),
            2 => Ok(Self::Reply),
            3 => Ok(Self::Exception),
            4 => Ok(Self::Oneway),
            other => Err(SerializationError::BadMessageHeader(format!(
                "unknown message type {}",
                other
            ))),
        }
    }
}

fn checked_len(what: &'static str, len: usize) -> Result<i32, SerializationError> {
    i32::try_from(len).map_err(|_| SerializationError::TooLarge { what, len })
}

// =============================================================================
// WRITER
// =============================================================================

/// Appends binary-protocol values to a growable buffer.
#[derive(Debug, Default)]
pub struct ThriftWriter {
    buf: BytesMut,
}

impl ThriftWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn write_message_begin(
        &mut self,
        name: &str,
        message_type: MessageType,
        seq_id: i32,
        protocol: ProtocolVersion,
    ) -> Result<(), SerializationError> {
        match protocol {
            ProtocolVersion::Binary => {
                self.buf.put_u32(VERSION_1 | u32::from(message_type.as_u8()));
                self.write_string(name)?;
            }
            ProtocolVersion::BinaryLegacy => {
                self.write_string(name)?;
                self.buf.put_u8(message_type.as_u8());
            }
        }
        self.buf.put_i32(seq_id);
        Ok(())
    }

    pub fn write_field_begin(&mut self, field_type: u8, id: i16) {
        self.buf.put_u8(field_type);
        self.buf.put_i16(id);
    }

    pub fn write_field_stop(&mut self) {
        self.buf.put_u8(T_STOP);
    }

    pub fn write_list_begin(&mut self, elem_type: u8, len: usize) -> Result<(), SerializationError> {
        let len = checked_len("list", len)?;
        self.buf.put_u8(elem_type);
        self.buf.put_i32(len);
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.put_i16(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    pub fn write_string(&mut self, value: &str) -> Result<(), SerializationError> {
        self.write_binary(value.as_bytes())
    }

    pub fn write_binary(&mut self, value: &[u8]) -> Result<(), SerializationError> {
        let len = checked_len("string", value.len())?;
        self.buf.put_i32(len);
        self.buf.put_slice(value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

// =============================================================================
// READER
// =============================================================================

/// Reads binary-protocol values from a byte slice.
#[derive(Debug)]
pub struct ThriftReader<'a> {
    buf: &'a [u8],
}

impl<'a> ThriftReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, n: usize, what: &'static str) -> Result<(), SerializationError> {
        if self.buf.remaining() < n {
            return Err(SerializationError::Truncated(what));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, SerializationError> {
        self.ensure(1, "byte")?;
        Ok(self.buf.get_u8())
    }

    pub fn read_bool(&mut self) -> Result<bool, SerializationError> {
        self.ensure(1, "bool")?;
        Ok(self.buf.get_u8() != 0)
    }

    pub fn read_i16(&mut self) -> Result<i16, SerializationError> {
        self.ensure(2, "i16")?;
        Ok(self.buf.get_i16())
    }

    pub fn read_i32(&mut self) -> Result<i32, SerializationError> {
        self.ensure(4, "i32")?;
        Ok(self.buf.get_i32())
    }

    pub fn read_i64(&mut self) -> Result<i64, SerializationError> {
        self.ensure(8, "i64")?;
        Ok(self.buf.get_i64())
    }

    fn read_len(&mut self) -> Result<usize, SerializationError> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| SerializationError::NegativeLength(len))
    }

    pub fn read_binary(&mut self) -> Result<Bytes, SerializationError> {
        let len = self.read_len()?;
        self.ensure(len, "binary")?;
        Ok(self.buf.copy_to_bytes(len))
    }

    pub fn read_string(&mut self) -> Result<String, SerializationError> {
        let len = self.read_len()?;
        self.read_string_body(len)
    }

    fn read_string_body(&mut self, len: usize) -> Result<String, SerializationError> {
        self.ensure(len, "string")?;
        let (head, tail) = self.buf.split_at(len);
        let value = std::str::from_utf8(head)
            .map_err(|_| SerializationError::InvalidUtf8)?
            .to_owned();
        self.buf = tail;
        Ok(value)
    }

    /// Returns `None` at the struct's `STOP` marker.
    pub fn read_field_begin(&mut self) -> Result<Option<(u8, i16)>, SerializationError> {
        let field_type = self.read_u8()?;
        if field_type == T_STOP {
            return Ok(None);
        }
        let id = self.read_i16()?;
        Ok(Some((field_type, id)))
    }

    pub fn read_list_begin(&mut self) -> Result<(u8, usize), SerializationError> {
        let elem_type = self.read_u8()?;
        let len = self.read_len()?;
        Ok((elem_type, len))
    }

    /// Reads a strict or non-strict message header.
    pub fn read_message_begin(&mut self) -> Result<(String, MessageType, i32), SerializationError> {
        let first = self.read_i32()?;
        if first < 0 {
            let word = first as u32;
            if word & VERSION_MASK != VERSION_1 {
                return Err(SerializationError::BadMessageHeader(format!(
                    "unsupported version word {:#010x}",
                    word
                )));
            }
            let message_type = MessageType::from_u8((word & 0xff) as u8)?;
            let name = self.read_string()?;
            let seq_id = self.read_i32()?;
            Ok((name, message_type, seq_id))
        } else {
            let name = self.read_string_body(first as usize)?;
            let message_type = MessageType::from_u8(self.read_u8()?)?;
            let seq_id = self.read_i32()?;
            Ok((name, message_type, seq_id))
        }
    }

    /// Skips a value of the given type, including nested containers.
    pub fn skip(&mut self, field_type: u8) -> Result<(), SerializationError> {
        self.skip_depth(field_type, 0)
    }

    fn skip_depth(&mut self, field_type: u8, depth: usize) -> Result<(), SerializationError> {
        if depth > MAX_SKIP_DEPTH {
            return Err(SerializationError::NestingTooDeep(MAX_SKIP_DEPTH));
        }
        match field_type {
            T_BOOL | T_BYTE => self.advance(1, "byte"),
            T_I16 => self.advance(2, "i16"),
            T_I32 => self.advance(4, "i32"),
            T_DOUBLE | T_I64 => self.advance(8, "i64"),
            T_STRING => {
                let len = self.read_len()?;
                self.advance(len, "string")
            }
            T_STRUCT => {
                while let Some((ty, _)) = self.read_field_begin()? {
                    self.skip_depth(ty, depth + 1)?;
                }
                Ok(())
            }
            T_MAP => {
                let key_type = self.read_u8()?;
                let value_type = self.read_u8()?;
                let len = self.read_len()?;
                for _ in 0..len {
                    self.skip_depth(key_type, depth + 1)?;
                    self.skip_depth(value_type, depth + 1)?;
                }
                Ok(())
            }
            T_SET | T_LIST => {
                let (elem_type, len) = self.read_list_begin()?;
                for _ in 0..len {
                    self.skip_depth(elem_type, depth + 1)?;
                }
                Ok(())
            }
            other => Err(SerializationError::InvalidFieldType {
                what: "skipped value",
                found: other,
            }),
        }
    }

    fn advance(&mut self, n: usize, what: &'static str) -> Result<(), SerializationError> {
        self.ensure(n, what)?;
        self.buf.advance(n);
        Ok(())
    }

    /// Fails if any input is left after the last value.
    pub fn finish(self) -> Result<(), SerializationError> {
        match self.buf.remaining() {
            0 => Ok(()),
            n => Err(SerializationError::TrailingBytes(n)),
        }
    }
}

fn expect_elem(what: &'static str, expected: u8, found: u8) -> Result<(), SerializationError> {
    if expected == found {
        Ok(())
    } else {
        Err(SerializationError::InvalidFieldType { what, found })
    }
}

/// Reads a list of structs, rejecting lists of any other element type.
fn read_struct_list<T>(
    r: &mut ThriftReader<'_>,
    what: &'static str,
    mut read: impl FnMut(&mut ThriftReader<'_>) -> Result<T, SerializationError>,
) -> Result<Vec<T>, SerializationError> {
    let (elem_type, len) = r.read_list_begin()?;
    expect_elem(what, T_STRUCT, elem_type)?;
    // Each struct needs at least its STOP byte.
    let mut items = Vec::with_capacity(len.min(r.remaining()));
    for _ in 0..len {
        items.push(read(r)?);
    }
    Ok(items)
}

// =============================================================================
// ZIPKIN SCHEMA
// =============================================================================

pub fn write_endpoint(w: &mut ThriftWriter, endpoint: &WireEndpoint) -> Result<(), SerializationError> {
    w.write_field_begin(T_I32, 1);
    w.write_i32(endpoint.ipv4);
    w.write_field_begin(T_I16, 2);
    w.write_i16(endpoint.port);
    w.write_field_begin(T_STRING, 3);
    w.write_string(&endpoint.service_name)?;
    w.write_field_stop();
    Ok(())
}

pub fn read_endpoint(r: &mut ThriftReader<'_>) -> Result<WireEndpoint, SerializationError> {
    let mut endpoint = WireEndpoint {
        ipv4: 0,
        port: 0,
        service_name: String::new(),
    };
    while let Some((ty, id)) = r.read_field_begin()? {
        match (id, ty) {
            (1, T_I32) => endpoint.ipv4 = r.read_i32()?,
            (2, T_I16) => endpoint.port = r.read_i16()?,
            (3, T_STRING) => endpoint.service_name = r.read_string()?,
            _ => r.skip(ty)?,
        }
    }
    Ok(endpoint)
}

pub fn write_annotation(
    w: &mut ThriftWriter,
    annotation: &WireAnnotation,
) -> Result<(), SerializationError> {
    w.write_field_begin(T_I64, 1);
    w.write_i64(annotation.timestamp);
    w.write_field_begin(T_STRING, 2);
    w.write_string(&annotation.value)?;
    if let Some(host) = &annotation.host {
        w.write_field_begin(T_STRUCT, 3);
        write_endpoint(w, host)?;
    }
    if let Some(duration) = annotation.duration {
        w.write_field_begin(T_I32, 4);
        w.write_i32(duration);
    }
    w.write_field_stop();
    Ok(())
}

pub fn read_annotation(r: &mut ThriftReader<'_>) -> Result<WireAnnotation, SerializationError> {
    let mut annotation = WireAnnotation {
        timestamp: 0,
        value: String::new(),
        host: None,
        duration: None,
    };
    while let Some((ty, id)) = r.read_field_begin()? {
        match (id, ty) {
            (1, T_I64) => annotation.timestamp = r.read_i64()?,
            (2, T_STRING) => annotation.value = r.read_string()?,
            (3, T_STRUCT) => annotation.host = Some(Arc::new(read_endpoint(r)?)),
            (4, T_I32) => annotation.duration = Some(r.read_i32()?),
            _ => r.skip(ty)?,
        }
    }
    Ok(annotation)
}

pub fn write_binary_annotation(
    w: &mut ThriftWriter,
    annotation: &WireBinaryAnnotation,
) -> Result<(), SerializationError> {
    w.write_field_begin(T_STRING, 1);
    w.write_string(&annotation.key)?;
    w.write_field_begin(T_STRING, 2);
    w.write_binary(&annotation.value)?;
    w.write_field_begin(T_I32, 3);
    w.write_i32(annotation.annotation_type.as_i32());
    if let Some(host) = &annotation.host {
        w.write_field_begin(T_STRUCT, 4);
        write_endpoint(w, host)?;
    }
    w.write_field_stop();
    Ok(())
}

pub fn read_binary_annotation(
    r: &mut ThriftReader<'_>,
) -> Result<WireBinaryAnnotation, SerializationError> {
    let mut key = String::new();
    let mut value = Bytes::new();
    let mut annotation_type = AnnotationType::Bytes;
    let mut host = None;
    while let Some((ty, id)) = r.read_field_begin()? {
        match (id, ty) {
            (1, T_STRING) => key = r.read_string()?,
            (2, T_STRING) => value = r.read_binary()?,
            (3, T_I32) => {
                let tag = r.read_i32()?;
                annotation_type = AnnotationType::from_i32(tag).ok_or(
                    SerializationError::InvalidEnumValue {
                        what: "annotation_type",
                        value: tag,
                    },
                )?;
            }
            (4, T_STRUCT) => host = Some(Arc::new(read_endpoint(r)?)),
            _ => r.skip(ty)?,
        }
    }
    Ok(WireBinaryAnnotation {
        key,
        value,
        annotation_type,
        host,
    })
}

pub fn write_span(w: &mut ThriftWriter, span: &WireSpan) -> Result<(), SerializationError> {
    w.write_field_begin(T_I64, 1);
    w.write_i64(span.trace_id);
    w.write_field_begin(T_STRING, 3);
    w.write_string(&span.name)?;
    w.write_field_begin(T_I64, 4);
    w.write_i64(span.id);
    if let Some(parent_id) = span.parent_id {
        w.write_field_begin(T_I64, 5);
        w.write_i64(parent_id);
    }
    w.write_field_begin(T_LIST, 6);
    w.write_list_begin(T_STRUCT, span.annotations.len())?;
    for annotation in &span.annotations {
        write_annotation(w, annotation)?;
    }
    w.write_field_begin(T_LIST, 8);
    w.write_list_begin(T_STRUCT, span.binary_annotations.len())?;
    for annotation in &span.binary_annotations {
        write_binary_annotation(w, annotation)?;
    }
    if let Some(debug) = span.debug {
        w.write_field_begin(T_BOOL, 9);
        w.write_bool(debug);
    }
    w.write_field_stop();
    Ok(())
}

pub fn read_span(r: &mut ThriftReader<'_>) -> Result<WireSpan, SerializationError> {
    let mut trace_id = None;
    let mut id = None;
    let mut span = WireSpan {
        trace_id: 0,
        name: String::new(),
        id: 0,
        parent_id: None,
        annotations: Vec::new(),
        binary_annotations: Vec::new(),
        debug: None,
    };
    while let Some((ty, field_id)) = r.read_field_begin()? {
        match (field_id, ty) {
            (1, T_I64) => trace_id = Some(r.read_i64()?),
            (3, T_STRING) => span.name = r.read_string()?,
            (4, T_I64) => id = Some(r.read_i64()?),
            (5, T_I64) => span.parent_id = Some(r.read_i64()?),
            (6, T_LIST) => span.annotations = read_struct_list(r, "annotations", read_annotation)?,
            (8, T_LIST) => {
                span.binary_annotations =
                    read_struct_list(r, "binary_annotations", read_binary_annotation)?;
            }
            (9, T_BOOL) => span.debug = Some(r.read_bool()?),
            _ => r.skip(ty)?,
        }
    }
    span.trace_id = trace_id.ok_or(SerializationError::MissingField("trace_id"))?;
    span.id = id.ok_or(SerializationError::MissingField("id"))?;
    Ok(span)
}

// =============================================================================
// SCRIBE SCHEMA
// =============================================================================

pub fn write_log_entry(w: &mut ThriftWriter, entry: &LogEntry) -> Result<(), SerializationError> {
    w.write_field_begin(T_STRING, 1);
    w.write_string(&entry.category)?;
    w.write_field_begin(T_STRING, 2);
    w.write_string(&entry.message)?;
    w.write_field_stop();
    Ok(())
}

pub fn read_log_entry(r: &mut ThriftReader<'_>) -> Result<LogEntry, SerializationError> {
    let mut category = None;
    let mut message = None;
    while let Some((ty, id)) = r.read_field_begin()? {
        match (id, ty) {
            (1, T_STRING) => category = Some(r.read_string()?),
            (2, T_STRING) => message = Some(r.read_string()?),
            _ => r.skip(ty)?,
        }
    }
    Ok(LogEntry {
        category: category.ok_or(SerializationError::MissingField("category"))?,
        message: message.ok_or(SerializationError::MissingField("message"))?,
    })
}

/// Encodes a `Log(messages)` call, unframed.
pub fn write_log_call(
    entries: &[LogEntry],
    seq_id: i32,
    protocol: ProtocolVersion,
) -> Result<Bytes, SerializationError> {
    let hint: usize = entries
        .iter()
        .map(|e| e.category.len() + e.message.len() + 16)
        .sum();
    let mut w = ThriftWriter::with_capacity(hint + 32);
    w.write_message_begin(LOG_METHOD, MessageType::Call, seq_id, protocol)?;
    w.write_field_begin(T_LIST, 1);
    w.write_list_begin(T_STRUCT, entries.len())?;
    for entry in entries {
        write_log_entry(&mut w, entry)?;
    }
    w.write_field_stop();
    Ok(w.finish())
}

/// Decodes a `Log` call as a collector would receive it.
///
/// Returns the sequence id and the submitted entries.
pub fn read_log_call(payload: &[u8]) -> Result<(i32, Vec<LogEntry>), SerializationError> {
    let mut r = ThriftReader::new(payload);
    let (name, message_type, seq_id) = r.read_message_begin()?;
    if name != LOG_METHOD || !matches!(message_type, MessageType::Call | MessageType::Oneway) {
        return Err(SerializationError::BadMessageHeader(format!(
            "expected Log call, got {:?} {}",
            message_type, name
        )));
    }
    let mut entries = Vec::new();
    while let Some((ty, id)) = r.read_field_begin()? {
        match (id, ty) {
            (1, T_LIST) => entries = read_struct_list(&mut r, "messages", read_log_entry)?,
            _ => r.skip(ty)?,
        }
    }
    r.finish()?;
    Ok((seq_id, entries))
}

/// Outcome carried by a `Log` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    Success(ResultCode),
    Exception { kind: i32, message: String },
}

/// Decoded reply envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogReply {
    pub name: String,
    pub seq_id: i32,
    pub outcome: ReplyOutcome,
}

/// Encodes a successful `Log` reply carrying `code`.
pub fn write_log_reply(
    seq_id: i32,
    code: ResultCode,
    protocol: ProtocolVersion,
) -> Result<Bytes, SerializationError> {
    let mut w = ThriftWriter::with_capacity(32);
    w.write_message_begin(LOG_METHOD, MessageType::Reply, seq_id, protocol)?;
    w.write_field_begin(T_I32, 0);
    w.write_i32(code.value());
    w.write_field_stop();
    Ok(w.finish())
}

/// Encodes a `TApplicationException` reply.
pub fn write_exception_reply(
    seq_id: i32,
    kind: i32,
    message: &str,
    protocol: ProtocolVersion,
) -> Result<Bytes, SerializationError> {
    let mut w = ThriftWriter::with_capacity(32 + message.len());
    w.write_message_begin(LOG_METHOD, MessageType::Exception, seq_id, protocol)?;
    w.write_field_begin(T_STRING, 1);
    w.write_string(message)?;
    w.write_field_begin(T_I32, 2);
    w.write_i32(kind);
    w.write_field_stop();
    Ok(w.finish())
}

pub fn read_log_reply(payload: &[u8]) -> Result<LogReply, SerializationError> {
    let mut r = ThriftReader::new(payload);
    let (name, message_type, seq_id) = r.read_message_begin()?;
    let outcome = match message_type {
        MessageType::Reply => {
            let mut success = None;
            while let Some((ty, id)) = r.read_field_begin()? {
                match (id, ty) {
                    (0, T_I32) => success = Some(r.read_i32()?),
                    _ => r.skip(ty)?,
                }
            }
            let code = success.ok_or(SerializationError::MissingField("success"))?;
            ReplyOutcome::Success(ResultCode::new(code))
        }
        MessageType::Exception => {
            let mut message = String::new();
            let mut kind = 0;
            while let Some((ty, id)) = r.read_field_begin()? {
                match (id, ty) {
                    (1, T_STRING) => message = r.read_string()?,
                    (2, T_I32) => kind = r.read_i32()?,
                    _ => r.skip(ty)?,
                }
            }
            ReplyOutcome::Exception { kind, message }
        }
        other => {
            return Err(SerializationError::BadMessageHeader(format!(
                "unexpected {:?} in reply",
                other
            )))
        }
    };
    r.finish()?;
    Ok(LogReply {
        name,
        seq_id,
        outcome,
    })
}
