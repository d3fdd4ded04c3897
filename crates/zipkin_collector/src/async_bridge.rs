//! Fire-and-forget forwarding on top of [`SpanCollector`].
//!
//! Tracers hand spans to a bounded queue and return immediately. A consumer
//! task drains the queue and forwards spans with at most `max_in_flight`
//! collector calls outstanding. A full queue drops the span; nothing waits
//! and nothing is retried.

use crate::collector::SpanCollector;
use crate::config::ForwarderConfig;
use crate::error::ConfigError;
use crate::span::Span;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, warn};

/// Errors from span submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// Queue is full; the span was dropped
    #[error("forwarding queue is full")]
    Full,
    /// Forwarder has been shut down
    #[error("forwarder is closed")]
    Closed,
}

/// Thread-safe queue counters (atomics, relaxed).
#[derive(Debug, Default)]
pub struct ForwarderMetrics {
    /// Spans accepted into the queue
    pub spans_queued: AtomicU64,
    /// Spans refused because the queue was full
    pub spans_dropped: AtomicU64,
    /// Spans the consumer has finished forwarding (any outcome)
    pub spans_forwarded: AtomicU64,
    /// Current in-flight collector calls
    pub inflight: AtomicU64,
}

impl ForwarderMetrics {
    pub fn spans_queued(&self) -> u64 {
        self.spans_queued.load(Ordering::Relaxed)
    }

    pub fn spans_dropped(&self) -> u64 {
        self.spans_dropped.load(Ordering::Relaxed)
    }

    pub fn spans_forwarded(&self) -> u64 {
        self.spans_forwarded.load(Ordering::Relaxed)
    }

    pub fn inflight(&self) -> u64 {
        self.inflight.load(Ordering::Relaxed)
    }
}

/// Bounded, non-blocking front end for a [`SpanCollector`].
pub struct AsyncSpanForwarder {
    tx: Option<mpsc::Sender<Span>>,
    consumer_task: Option<JoinHandle<()>>,
    collector: Arc<SpanCollector>,
    metrics: Arc<ForwarderMetrics>,
}

impl AsyncSpanForwarder {
    /// Spawns the consumer task on the current tokio runtime.
    pub fn new(collector: Arc<SpanCollector>, config: ForwarderConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let (tx, mut rx) = mpsc::channel::<Span>(config.queue_capacity);
        let metrics = Arc::new(ForwarderMetrics::default());

        let collector_clone = Arc::clone(&collector);
        let metrics_clone = Arc::clone(&metrics);
        let max_in_flight = config.max_in_flight;

        let consumer_task = tokio::spawn(async move {
            let permits = Arc::new(Semaphore::new(max_in_flight));
            let mut tasks: JoinSet<()> = JoinSet::new();

            loop {
                tokio::select! {
                    // Reap finished forwards so the set does not grow unbounded
                    Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                        if let Err(e) = result {
                            error!(error = %e, "span forwarding task panicked");
                        }
                    }

                    received = rx.recv() => {
                        let Some(span) = received else { break };
                        let permit = match Arc::clone(&permits).acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => break,
                        };
                        let collector = Arc::clone(&collector_clone);
                        let metrics = Arc::clone(&metrics_clone);
                        metrics.inflight.fetch_add(1, Ordering::Relaxed);

                        tasks.spawn(async move {
                            collector.collect(&span).await;
                            metrics.inflight.fetch_sub(1, Ordering::Relaxed);
                            metrics.spans_forwarded.fetch_add(1, Ordering::Relaxed);
                            drop(permit);
                        });
                    }
                }
            }

            // Queue closed and drained; wait for in-flight forwards
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    error!(error = %e, "span forwarding task panicked during shutdown");
                }
            }
            debug!("span forwarder stopped");
        });

        Ok(Self {
            tx: Some(tx),
            consumer_task: Some(consumer_task),
            collector,
            metrics,
        })
    }

    /// Queues a span without waiting. Drops it if the queue is full.
    pub fn try_submit(&self, span: Span) -> Result<(), SubmitError> {
        let tx = self.tx.as_ref().ok_or(SubmitError::Closed)?;
        match tx.try_send(span) {
            Ok(()) => {
                self.metrics.spans_queued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(span)) => {
                self.metrics.spans_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(trace_id = span.trace_id, span_id = span.id, "forwarding queue full, dropping span");
                Err(SubmitError::Full)
            }
            Err(TrySendError::Closed(_)) => Err(SubmitError::Closed),
        }
    }

    pub fn metrics(&self) -> &Arc<ForwarderMetrics> {
        &self.metrics
    }

    pub fn collector(&self) -> &Arc<SpanCollector> {
        &self.collector
    }

    /// Stops accepting spans, forwards everything already queued and waits
    /// for in-flight calls to finish.
    pub async fn shutdown(mut self) {
        // Dropping the sender ends the consumer loop once the queue is empty.
        self.tx.take();
        if let Some(task) = self.consumer_task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "span forwarder task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LogTransport;
    use crate::error::TransportError;
    use crate::wire::{LogEntry, ResultCode};
    use std::time::Duration;

    struct CountingTransport {
        calls: AtomicU64,
        max_concurrent: AtomicU64,
        current: AtomicU64,
        delay: Duration,
    }

    impl CountingTransport {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU64::new(0),
                max_concurrent: AtomicU64::new(0),
                current: AtomicU64::new(0),
                delay,
            })
        }
    }

    impl LogTransport for CountingTransport {
        async fn log(&self, _entries: Vec<LogEntry>) -> Result<ResultCode, TransportError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ResultCode::OK)
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    /// Blocks every call until the gate is opened.
    struct GatedTransport {
        gate: Semaphore,
    }

    impl LogTransport for GatedTransport {
        async fn log(&self, _entries: Vec<LogEntry>) -> Result<ResultCode, TransportError> {
            let _open = self.gate.acquire().await.map_err(|_| TransportError::Closed)?;
            Ok(ResultCode::OK)
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    fn span(i: i64) -> Span {
        Span::new(1, i, Some(1), format!("op-{}", i))
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let transport = CountingTransport::new(Duration::from_millis(1));
        let collector = Arc::new(SpanCollector::new(transport.clone()));
        let forwarder = AsyncSpanForwarder::new(collector.clone(), ForwarderConfig::default()).unwrap();

        for i in 0..100 {
            forwarder.try_submit(span(i)).unwrap();
        }
        forwarder.shutdown().await;

        assert_eq!(transport.calls.load(Ordering::SeqCst), 100);
        assert_eq!(collector.metrics().spans_accepted(), 100);
    }

    #[tokio::test]
    async fn test_in_flight_is_bounded() {
        let transport = CountingTransport::new(Duration::from_millis(5));
        let collector = Arc::new(SpanCollector::new(transport.clone()));
        let config = ForwarderConfig::default().with_max_in_flight(2);
        let forwarder = AsyncSpanForwarder::new(collector, config).unwrap();

        for i in 0..20 {
            forwarder.try_submit(span(i)).unwrap();
        }
        let metrics = Arc::clone(forwarder.metrics());
        forwarder.shutdown().await;

        assert_eq!(metrics.spans_forwarded(), 20);
        assert_eq!(metrics.inflight(), 0);
        assert!(transport.max_concurrent.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_full_queue_drops_span() {
        let transport = Arc::new(GatedTransport { gate: Semaphore::new(0) });
        let collector = Arc::new(SpanCollector::new(transport.clone()));
        let config = ForwarderConfig::default().with_queue_capacity(1);
        let forwarder = AsyncSpanForwarder::new(collector.clone(), config).unwrap();

        // The consumer takes the first span and blocks on the gate while
        // holding its only permit, so the queue fills up behind it.
        forwarder.try_submit(span(0)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        forwarder.try_submit(span(1)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        forwarder.try_submit(span(2)).unwrap();

        assert_eq!(forwarder.try_submit(span(3)), Err(SubmitError::Full));
        assert_eq!(forwarder.metrics().spans_dropped(), 1);

        transport.gate.add_permits(1);
        forwarder.shutdown().await;
        assert_eq!(collector.metrics().spans_accepted(), 3);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let transport = CountingTransport::new(Duration::ZERO);
        let collector = Arc::new(SpanCollector::new(transport));
        let result = AsyncSpanForwarder::new(collector, ForwarderConfig::default().with_queue_capacity(0));
        assert!(matches!(result, Err(ConfigError::ZeroQueueCapacity)));
    }
}
