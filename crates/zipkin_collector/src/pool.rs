//! Bounded pool of TCP connections to the collector.
//!
//! At most `max_connections` connections are checked out at once; further
//! callers wait on the semaphore. Connections are opened lazily and returned
//! to the idle list on drop unless they were marked broken.

use crate::error::TransportError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::net::TcpStream;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::debug;

pub struct ConnectionPool {
    address: String,
    max_connections: usize,
    permits: Semaphore,
    idle: Mutex<Vec<TcpStream>>,
    connections_opened: AtomicU64,
}

impl ConnectionPool {
    pub fn new(address: impl Into<String>, max_connections: usize) -> Self {
        Self {
            address: address.into(),
            max_connections,
            permits: Semaphore::new(max_connections),
            idle: Mutex::new(Vec::with_capacity(max_connections)),
            connections_opened: AtomicU64::new(0),
        }
    }

    /// Checks out a connection, waiting while the pool is at capacity.
    pub async fn acquire(&self) -> Result<PooledConnection<'_>, TransportError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| TransportError::Closed)?;

        let reused = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop();
        let stream = match reused {
            Some(stream) => stream,
            None => {
                let stream = TcpStream::connect(&self.address).await?;
                stream.set_nodelay(true)?;
                let opened = self.connections_opened.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(address = %self.address, opened, "opened collector connection");
                stream
            }
        };

        Ok(PooledConnection {
            pool: self,
            stream: Some(stream),
            broken: false,
            _permit: permit,
        })
    }

    /// Closes the pool. Waiting and future `acquire` calls fail with
    /// [`TransportError::Closed`]; idle connections are dropped.
    pub fn close(&self) {
        self.permits.close();
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Total TCP connections opened over the pool's lifetime
    pub fn connections_opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }

    pub fn idle_connections(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, stream: TcpStream) {
        if self.is_closed() {
            return;
        }
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(stream);
    }
}

/// A checked-out connection. Holds one pool permit until dropped.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    stream: Option<TcpStream>,
    broken: bool,
    // Released after `Drop::drop` has returned the stream to the idle list.
    _permit: SemaphorePermit<'a>,
}

impl PooledConnection<'_> {
    pub fn stream(&mut self) -> Result<&mut TcpStream, TransportError> {
        self.stream.as_mut().ok_or(TransportError::Closed)
    }

    /// Discards the connection instead of returning it to the pool.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// Returns the connection to the pool on drop. Only call this once the
    /// stream is back at a message boundary.
    pub fn mark_reusable(&mut self) {
        self.broken = false;
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if self.broken {
                debug!(address = %self.pool.address, "discarding broken collector connection");
            } else {
                self.pool.release(stream);
            }
        }
    }
}
