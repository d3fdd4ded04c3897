//! Scribe client: one framed Thrift `Log` call per submission.

use crate::config::CollectorConfig;
use crate::constants::LOG_METHOD;
use crate::error::{ConfigError, TransportError};
use crate::pool::{ConnectionPool, PooledConnection};
use crate::thrift::{self, ReplyOutcome};
use crate::wire::{LogEntry, ResultCode};
use bytes::{BufMut, BytesMut};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI32, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame accepted in either direction (16 MiB)
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Trait for delivering log entries to a collector.
///
/// Uses native async fn in traits. For dynamic dispatch use
/// [`LogTransportBoxed`], which every `LogTransport` implements.
pub trait LogTransport: Send + Sync {
    /// Sends the entries in one call and returns the remote result code.
    fn log(
        &self,
        entries: Vec<LogEntry>,
    ) -> impl Future<Output = Result<ResultCode, TransportError>> + Send;

    /// Returns the transport name for logging.
    fn name(&self) -> &str;
}

/// Object-safe version of [`LogTransport`].
pub trait LogTransportBoxed: Send + Sync {
    fn log_boxed(
        &self,
        entries: Vec<LogEntry>,
    ) -> Pin<Box<dyn Future<Output = Result<ResultCode, TransportError>> + Send + '_>>;

    fn name(&self) -> &str;
}

impl<T: LogTransport> LogTransportBoxed for T {
    fn log_boxed(
        &self,
        entries: Vec<LogEntry>,
    ) -> Pin<Box<dyn Future<Output = Result<ResultCode, TransportError>> + Send + '_>> {
        Box::pin(self.log(entries))
    }

    fn name(&self) -> &str {
        LogTransport::name(self)
    }
}

/// Writes one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(payload.len()));
    }
    let mut frame = BytesMut::with_capacity(4 + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_slice(payload);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(len));
    }
    let mut payload = vec![0; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Client for a Zipkin collector's Scribe endpoint.
pub struct ScribeClient {
    config: CollectorConfig,
    pool: ConnectionPool,
    next_seq_id: AtomicI32,
}

impl ScribeClient {
    /// Creates a client. No connection is opened until the first submission.
    pub fn new(config: CollectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let pool = ConnectionPool::new(config.address(), config.max_connections);
        Ok(Self {
            config,
            pool,
            next_seq_id: AtomicI32::new(0),
        })
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Performs one `Log(entries)` call and waits for the reply.
    ///
    /// A connection goes back to the pool only after its reply has been read
    /// in full. If the call fails, or the future is dropped mid-call, the
    /// connection is discarded. No timeout is applied beyond what the socket
    /// provides.
    pub async fn submit(&self, entries: &[LogEntry]) -> Result<ResultCode, TransportError> {
        let seq_id = self.next_seq_id.fetch_add(1, Ordering::Relaxed);
        let payload = thrift::write_log_call(entries, seq_id, self.config.protocol)?;
        if payload.len() > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(payload.len()));
        }

        let mut conn = self.pool.acquire().await?;
        // The stream may hold a partial request or an unread reply until
        // `call` returns successfully.
        conn.mark_broken();
        let outcome = call(&mut conn, &payload, seq_id).await?;
        conn.mark_reusable();

        match outcome {
            ReplyOutcome::Success(code) => Ok(code),
            ReplyOutcome::Exception { kind, message } => {
                Err(TransportError::RemoteException { kind, message })
            }
        }
    }

    /// Closes the connection pool; later submissions fail.
    pub fn close(&self) {
        self.pool.close();
    }
}

async fn call(
    conn: &mut PooledConnection<'_>,
    payload: &[u8],
    seq_id: i32,
) -> Result<ReplyOutcome, TransportError> {
    let stream = conn.stream()?;
    write_frame(stream, payload).await?;
    let reply = read_frame(stream).await?;
    let reply = thrift::read_log_reply(&reply)?;

    if reply.name != LOG_METHOD {
        return Err(TransportError::Protocol(format!(
            "reply for unexpected method {:?}",
            reply.name
        )));
    }
    if reply.seq_id != seq_id {
        return Err(TransportError::Protocol(format!(
            "sequence id mismatch: sent {}, received {}",
            seq_id, reply.seq_id
        )));
    }
    Ok(reply.outcome)
}

impl LogTransport for ScribeClient {
    async fn log(&self, entries: Vec<LogEntry>) -> Result<ResultCode, TransportError> {
        self.submit(&entries).await
    }

    fn name(&self) -> &str {
        "scribe"
    }
}
