//! Configuration for the collector client and the async forwarder.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Thrift binary protocol flavour used for message headers.
///
/// Struct encoding is identical for both; only the call/reply envelope differs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVersion {
    /// Strict header: versioned word `0x8001_0000 | type`, name, seqid
    #[default]
    Binary,
    /// Non-strict header: name, type byte, seqid
    BinaryLegacy,
}

fn default_max_connections() -> usize {
    1
}

/// Remote collector settings.
///
/// `host` and `port` are required. The single-connection default serializes
/// all outbound calls through one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Collector host name or address
    pub host: String,
    /// Collector Scribe port (9410 for a stock Zipkin collector)
    pub port: u16,
    /// Maximum concurrent connections to the collector
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Message header flavour
    #[serde(default)]
    pub protocol: ProtocolVersion,
}

impl CollectorConfig {
    /// Creates a configuration with the default pool size and protocol
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            max_connections: default_max_connections(),
            protocol: ProtocolVersion::default(),
        }
    }

    /// Parses a JSON document, e.g. `{"host": "zipkin", "port": 9410}`
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the connection pool capacity.
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Sets the protocol flavour.
    pub fn with_protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.max_connections == 0 {
            return Err(ConfigError::ZeroConnections);
        }
        Ok(())
    }

    /// `host:port` string suitable for `TcpStream::connect`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration for [`AsyncSpanForwarder`](crate::AsyncSpanForwarder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwarderConfig {
    /// Spans that may wait in the queue before new ones are dropped
    pub queue_capacity: usize,
    /// Maximum spans being forwarded at once
    pub max_in_flight: usize,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_in_flight: 1,
        }
    }
}

impl ForwarderConfig {
    /// Sets the queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the in-flight limit.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::ZeroInFlight);
        }
        Ok(())
    }
}
