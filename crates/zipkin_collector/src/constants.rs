//! Well-known annotation values and Scribe envelope names.

/// The client sent ("cs") a request to a server.
///
/// Marks the start of a client-side RPC span.
pub const CLIENT_SEND: &str = "cs";

/// The client received ("cr") a response from a server.
pub const CLIENT_RECV: &str = "cr";

/// The server sent ("ss") a response to a client.
pub const SERVER_SEND: &str = "ss";

/// The server received ("sr") a request from a client.
///
/// Marks the start of a server-side RPC span.
pub const SERVER_RECV: &str = "sr";

/// Scribe category the Zipkin collector reads spans from.
pub const ZIPKIN_CATEGORY: &str = "zipkin";

/// Name of the Scribe RPC method.
pub const LOG_METHOD: &str = "Log";
