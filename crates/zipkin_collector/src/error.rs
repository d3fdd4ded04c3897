//! Error types for span forwarding.

use crate::collector::CollectStage;
use crate::wire::ResultCode;
use thiserror::Error;

/// Errors raised while encoding or decoding Thrift payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializationError {
    /// A string or list does not fit the protocol's i32 length prefix
    #[error("{what} of length {len} exceeds the protocol limit")]
    TooLarge { what: &'static str, len: usize },
    /// Input ended in the middle of a value
    #[error("unexpected end of input while reading {0}")]
    Truncated(&'static str),
    /// A field or element carried a type tag the schema does not allow
    #[error("invalid thrift type {found} for {what}")]
    InvalidFieldType { what: &'static str, found: u8 },
    /// An enum field carried a value outside its defined range
    #[error("invalid value {value} for {what}")]
    InvalidEnumValue { what: &'static str, value: i32 },
    /// A negative length prefix
    #[error("negative length {0}")]
    NegativeLength(i32),
    /// String payload is not valid UTF-8
    #[error("string field is not valid utf-8")]
    InvalidUtf8,
    /// A required struct field was not present
    #[error("missing required field {0}")]
    MissingField(&'static str),
    /// Log entry message is not valid base64
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),
    /// Message header could not be interpreted
    #[error("bad message header: {0}")]
    BadMessageHeader(String),
    /// Structs or containers nested deeper than the decoder allows
    #[error("value nested deeper than {0} levels")]
    NestingTooDeep(usize),
    /// Bytes left over after a complete value was decoded
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
}

/// Errors raised by the remote call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket-level failure (connect, read, write)
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Peer announced a frame larger than we accept
    #[error("frame of {0} bytes exceeds maximum frame size")]
    FrameTooLarge(usize),
    /// Reply did not match the call we made
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Remote side answered with a `TApplicationException`
    #[error("remote exception (type {kind}): {message}")]
    RemoteException { kind: i32, message: String },
    /// Request could not be encoded or reply could not be decoded
    #[error("codec error: {0}")]
    Codec(#[from] SerializationError),
    /// The connection pool has been closed
    #[error("connection pool is closed")]
    Closed,
}

/// Outcome of a failed `forward` call.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("serialization failed: {0}")]
    Serialization(#[from] SerializationError),
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
    #[error("collector rejected span, result code {0}")]
    Rejected(ResultCode),
}

impl CollectError {
    /// Stage the pipeline was in when this error occurred
    pub fn stage(&self) -> CollectStage {
        match self {
            Self::Serialization(_) => CollectStage::Serializing,
            Self::Transport(_) | Self::Rejected(_) => CollectStage::Submitting,
        }
    }

    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Serialization(_) => "serialization",
            Self::Transport(_) => "transport",
            Self::Rejected(_) => "rejected",
        }
    }

    /// Returns the remote result code for rejections
    pub fn result_code(&self) -> Option<ResultCode> {
        match self {
            Self::Rejected(code) => Some(*code),
            _ => None,
        }
    }
}

/// Invalid collector or forwarder configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("collector host must not be empty")]
    EmptyHost,
    #[error("max_connections must be at least 1")]
    ZeroConnections,
    #[error("queue_capacity must be at least 1")]
    ZeroQueueCapacity,
    #[error("max_in_flight must be at least 1")]
    ZeroInFlight,
    #[error("invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),
}
