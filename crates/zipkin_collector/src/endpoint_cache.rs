//! Memoized wire encodings of endpoints.
//!
//! Every annotation carries an endpoint, and a process usually talks to a
//! handful of peers, so the wire form is built once per distinct endpoint and
//! shared through an `Arc`.
//!
//! The cache is append-only: entries live as long as the cache does. Callers
//! needing bounded memory have to wrap it with their own eviction.

use crate::span::Endpoint;
use crate::wire::WireEndpoint;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

impl From<&Endpoint> for WireEndpoint {
    fn from(endpoint: &Endpoint) -> Self {
        Self {
            ipv4: endpoint.ipv4 as i32,
            port: endpoint.port as i16,
            service_name: endpoint.service_name.clone(),
        }
    }
}

/// Concurrent `Endpoint -> Arc<WireEndpoint>` map.
#[derive(Debug, Default)]
pub struct EndpointCache {
    entries: RwLock<HashMap<Endpoint, Arc<WireEndpoint>>>,
}

impl EndpointCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached wire endpoint for `endpoint`, creating it on first use.
    ///
    /// Insertion happens under the write lock via `entry`, so two callers
    /// racing on the same endpoint always get the same `Arc`.
    pub fn get_or_create(&self, endpoint: &Endpoint) -> Arc<WireEndpoint> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(wire) = entries.get(endpoint) {
                return Arc::clone(wire);
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let wire = entries
            .entry(endpoint.clone())
            .or_insert_with(|| Arc::new(WireEndpoint::from(endpoint)));
        Arc::clone(wire)
    }

    /// Number of distinct endpoints seen so far
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
