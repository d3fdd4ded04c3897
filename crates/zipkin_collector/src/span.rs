use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// A network peer that recorded an annotation.
///
/// Compared and hashed by value so it can key the endpoint cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// IPv4 address as a host-order 32-bit integer
    pub ipv4: u32,
    /// Port the peer is listening on (0 if unknown)
    pub port: u16,
    /// Logical service name
    pub service_name: String,
}

impl Endpoint {
    /// Creates a new endpoint
    pub fn new(ipv4: u32, port: u16, service_name: impl Into<String>) -> Self {
        Self {
            ipv4,
            port,
            service_name: service_name.into(),
        }
    }

    /// Creates an endpoint from a parsed IPv4 address
    pub fn from_addr(addr: Ipv4Addr, port: u16, service_name: impl Into<String>) -> Self {
        Self::new(u32::from(addr), port, service_name)
    }

    /// Returns the address as an `Ipv4Addr`
    pub fn addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ipv4)
    }
}

/// One timestamped event in a span's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Unix epoch milliseconds
    pub timestamp_ms: i64,
    /// Annotation name, e.g. "cs" or "sr"
    pub name: String,
    /// Peer that recorded the event
    pub endpoint: Endpoint,
    /// Optional duration, in whatever unit the tracer recorded it
    pub duration: Option<i32>,
}

impl Annotation {
    /// Creates an annotation without a duration
    pub fn new(timestamp_ms: i64, name: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            timestamp_ms,
            name: name.into(),
            endpoint,
            duration: None,
        }
    }

    /// Sets the duration
    pub fn with_duration(mut self, duration: i32) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// One unit of traced work, as handed over by the tracer once it completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Trace identifier shared by every span of a trace
    pub trace_id: i64,
    /// Span identifier
    pub id: i64,
    /// Parent span identifier (`None` for a root span)
    pub parent_id: Option<i64>,
    /// Operation name
    pub name: String,
    /// Annotations in recording order
    pub annotations: Vec<Annotation>,
}

impl Span {
    /// Creates a span with no annotations
    pub fn new(trace_id: i64, id: i64, parent_id: Option<i64>, name: impl Into<String>) -> Self {
        Self {
            trace_id,
            id,
            parent_id,
            name: name.into(),
            annotations: Vec::new(),
        }
    }

    /// Appends an annotation, keeping recording order
    pub fn add_annotation(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }

    /// Builder-style variant of [`Span::add_annotation`]
    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.add_annotation(annotation);
        self
    }

    /// Returns true if this span has no parent
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
