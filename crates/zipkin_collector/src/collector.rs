//! The public entry point: converts a finished span and forwards it.
//!
//! `collect` is best-effort. Every failure is logged and counted, never
//! returned, so tracing cannot disturb the instrumented application.

use crate::client::{LogTransportBoxed, ScribeClient};
use crate::codec;
use crate::config::CollectorConfig;
use crate::convert::{assemble_span, translate_annotation};
use crate::endpoint_cache::EndpointCache;
use crate::error::{CollectError, ConfigError};
use crate::span::Span;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

/// Pipeline stages of one `collect` call, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectStage {
    Translating,
    Assembling,
    Serializing,
    Submitting,
}

impl CollectStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Translating => "translating",
            Self::Assembling => "assembling",
            Self::Serializing => "serializing",
            Self::Submitting => "submitting",
        }
    }
}

impl fmt::Display for CollectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for forwarded spans, one per outcome.
#[derive(Debug, Default)]
pub struct CollectorMetrics {
    /// Spans handed to `collect`/`forward`
    pub spans_received: AtomicU64,
    /// Spans the collector answered with `OK`
    pub spans_accepted: AtomicU64,
    /// Spans answered with a non-zero result code
    pub spans_rejected: AtomicU64,
    /// Spans that could not be encoded
    pub serialization_errors: AtomicU64,
    /// Spans lost to connection or protocol failures
    pub transport_errors: AtomicU64,
    /// Sum of per-span forwarding latency
    pub total_latency_micros: AtomicU64,
}

// Relaxed everywhere: these are statistics, nothing synchronizes on them.
impl CollectorMetrics {
    pub fn spans_received(&self) -> u64 {
        self.spans_received.load(Ordering::Relaxed)
    }

    pub fn spans_accepted(&self) -> u64 {
        self.spans_accepted.load(Ordering::Relaxed)
    }

    pub fn spans_rejected(&self) -> u64 {
        self.spans_rejected.load(Ordering::Relaxed)
    }

    pub fn serialization_errors(&self) -> u64 {
        self.serialization_errors.load(Ordering::Relaxed)
    }

    pub fn transport_errors(&self) -> u64 {
        self.transport_errors.load(Ordering::Relaxed)
    }

    pub fn total_latency(&self) -> Duration {
        Duration::from_micros(self.total_latency_micros.load(Ordering::Relaxed))
    }

    /// Spans that did not reach the collector or were refused by it
    pub fn spans_failed(&self) -> u64 {
        self.spans_rejected() + self.serialization_errors() + self.transport_errors()
    }

    fn record(&self, outcome: &Result<(), CollectError>, elapsed: Duration) {
        self.spans_received.fetch_add(1, Ordering::Relaxed);
        self.total_latency_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        let counter = match outcome {
            Ok(()) => &self.spans_accepted,
            Err(CollectError::Rejected(_)) => &self.spans_rejected,
            Err(CollectError::Serialization(_)) => &self.serialization_errors,
            Err(CollectError::Transport(_)) => &self.transport_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Converts spans to the Zipkin wire model and sends each one to the
/// collector in its own `Log` call.
///
/// Typically one instance per process, shared by every tracer through an
/// `Arc`.
pub struct SpanCollector {
    transport: Arc<dyn LogTransportBoxed>,
    endpoints: Arc<EndpointCache>,
    metrics: Arc<CollectorMetrics>,
}

impl SpanCollector {
    /// Creates a collector over any transport, with its own endpoint cache.
    pub fn new(transport: Arc<dyn LogTransportBoxed>) -> Self {
        Self::with_cache(transport, Arc::new(EndpointCache::new()))
    }

    /// Creates a collector sharing an existing endpoint cache.
    pub fn with_cache(transport: Arc<dyn LogTransportBoxed>, endpoints: Arc<EndpointCache>) -> Self {
        Self {
            transport,
            endpoints,
            metrics: Arc::new(CollectorMetrics::default()),
        }
    }

    /// Creates a collector talking Scribe to `config.host:config.port`.
    pub fn connect(config: CollectorConfig) -> Result<Self, ConfigError> {
        let client = ScribeClient::new(config)?;
        Ok(Self::new(Arc::new(client)))
    }

    pub fn endpoint_cache(&self) -> &Arc<EndpointCache> {
        &self.endpoints
    }

    pub fn metrics(&self) -> &Arc<CollectorMetrics> {
        &self.metrics
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Forwards a finished span. Never fails from the caller's point of view.
    ///
    /// Waits for the collector's reply; with a single-connection pool,
    /// concurrent callers queue for the connection.
    pub async fn collect(&self, span: &Span) {
        let start = Instant::now();
        let outcome = self.forward_inner(span).await;
        let elapsed = start.elapsed();
        self.metrics.record(&outcome, elapsed);

        match &outcome {
            Ok(()) => {}
            Err(CollectError::Rejected(code)) => {
                error!(
                    trace_id = span.trace_id,
                    span_id = span.id,
                    result_code = code.value(),
                    "persisting span failed. ResultCode: {}",
                    code
                );
            }
            Err(e) => {
                error!(
                    trace_id = span.trace_id,
                    span_id = span.id,
                    stage = %e.stage(),
                    kind = e.kind(),
                    error = %e,
                    "persisting span failed"
                );
            }
        }
        debug!(
            trace_id = span.trace_id,
            span_id = span.id,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "converting and persisting span"
        );
    }

    /// Same pipeline as [`collect`](Self::collect), but the outcome is
    /// returned to the caller. Failures are neither logged nor counted.
    pub async fn forward(&self, span: &Span) -> Result<(), CollectError> {
        self.forward_inner(span).await
    }

    async fn forward_inner(&self, span: &Span) -> Result<(), CollectError> {
        trace!(span_id = span.id, stage = %CollectStage::Translating);
        let annotations = span
            .annotations
            .iter()
            .map(|annotation| {
                let host = self.endpoints.get_or_create(&annotation.endpoint);
                translate_annotation(annotation, host)
            })
            .collect();

        trace!(span_id = span.id, stage = %CollectStage::Assembling);
        let wire = assemble_span(span.trace_id, &span.name, span.id, span.parent_id, annotations);

        trace!(span_id = span.id, stage = %CollectStage::Serializing);
        let entry = codec::log_entry(&wire)?;

        trace!(span_id = span.id, stage = %CollectStage::Submitting);
        let code = self.transport.log_boxed(vec![entry]).await?;
        if code.is_ok() {
            Ok(())
        } else {
            Err(CollectError::Rejected(code))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LogTransport;
    use crate::codec::decode_log_entry;
    use crate::error::TransportError;
    use crate::span::{Annotation, Endpoint};
    use crate::wire::{LogEntry, ResultCode, WireSpan};
    use std::sync::Mutex;
    use tracing::instrument::WithSubscriber;

    /// Transport that records every call and answers with a fixed outcome.
    struct RecordingTransport {
        calls: Mutex<Vec<Vec<LogEntry>>>,
        reply: fn() -> Result<ResultCode, TransportError>,
    }

    impl RecordingTransport {
        fn new(reply: fn() -> Result<ResultCode, TransportError>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                reply,
            })
        }

        fn spans(&self) -> Vec<WireSpan> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .flatten()
                .map(|entry| decode_log_entry(entry).unwrap().unwrap())
                .collect()
        }
    }

    impl LogTransport for RecordingTransport {
        async fn log(&self, entries: Vec<LogEntry>) -> Result<ResultCode, TransportError> {
            self.calls.lock().unwrap().push(entries);
            (self.reply)()
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    /// Shared buffer the fmt subscriber writes formatted events into.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
            tracing_subscriber::fmt()
                .with_writer(self.clone())
                .with_max_level(tracing::Level::DEBUG)
                .with_ansi(false)
                .finish()
        }

        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn scenario_span(duration: Option<i32>) -> Span {
        let mut annotation = Annotation::new(1000, "cs", Endpoint::new(0x0A00_0001, 8080, "svc"));
        annotation.duration = duration;
        Span::new(42, 42, None, "request").with_annotation(annotation)
    }

    #[tokio::test]
    async fn test_scenario_without_duration() {
        let transport = RecordingTransport::new(|| Ok(ResultCode::OK));
        let collector = SpanCollector::new(transport.clone());

        collector.forward(&scenario_span(None)).await.unwrap();

        let spans = transport.spans();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.trace_id, 42);
        assert_eq!(span.id, 42);
        assert_eq!(span.parent_id, None);
        assert_eq!(span.debug, Some(true));
        assert_eq!(span.annotations[0].timestamp, 1_000_000);
        assert_eq!(span.annotations[0].duration, None);
        let host = span.annotations[0].host.as_ref().unwrap();
        assert_eq!((host.ipv4, host.port, host.service_name.as_str()), (0x0A00_0001, 8080, "svc"));
    }

    #[tokio::test]
    async fn test_scenario_with_duration() {
        let transport = RecordingTransport::new(|| Ok(ResultCode::OK));
        let collector = SpanCollector::new(transport.clone());

        collector.forward(&scenario_span(Some(150))).await.unwrap();

        assert_eq!(transport.spans()[0].annotations[0].duration, Some(150));
    }

    #[tokio::test]
    async fn test_one_entry_per_call() {
        let transport = RecordingTransport::new(|| Ok(ResultCode::OK));
        let collector = SpanCollector::new(transport.clone());

        collector.collect(&scenario_span(None)).await;
        collector.collect(&scenario_span(None)).await;

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|entries| entries.len() == 1));
        assert_eq!(calls[0][0].category, "zipkin");
    }

    #[tokio::test]
    async fn test_rejection_is_swallowed_and_counted() {
        let transport = RecordingTransport::new(|| Ok(ResultCode::TRY_LATER));
        let collector = SpanCollector::new(transport);

        collector.collect(&scenario_span(None)).await;

        let metrics = collector.metrics();
        assert_eq!(metrics.spans_received(), 1);
        assert_eq!(metrics.spans_rejected(), 1);
        assert_eq!(metrics.spans_accepted(), 0);
    }

    #[tokio::test]
    async fn test_rejection_is_logged_with_result_code() {
        let transport = RecordingTransport::new(|| Ok(ResultCode::TRY_LATER));
        let collector = SpanCollector::new(transport);
        let logs = CapturedLogs::default();

        collector
            .collect(&scenario_span(None))
            .with_subscriber(logs.subscriber())
            .await;

        let output = logs.contents();
        let failure = output
            .lines()
            .find(|line| line.contains("persisting span failed"))
            .unwrap();
        assert!(failure.contains("ERROR"));
        assert!(failure.contains("ResultCode: TRY_LATER"));
        assert!(failure.contains("result_code=1"));
        assert!(failure.contains("trace_id=42"));

        let latency = output
            .lines()
            .find(|line| line.contains("converting and persisting span"))
            .unwrap();
        assert!(latency.contains("DEBUG"));
        assert!(latency.contains("elapsed_ms="));
    }

    #[tokio::test]
    async fn test_transport_error_is_logged_with_stage() {
        let transport = RecordingTransport::new(|| {
            Err(TransportError::Protocol("connection reset".into()))
        });
        let collector = SpanCollector::new(transport);
        let logs = CapturedLogs::default();

        collector
            .collect(&scenario_span(None))
            .with_subscriber(logs.subscriber())
            .await;

        let output = logs.contents();
        let failure = output
            .lines()
            .find(|line| line.contains("persisting span failed"))
            .unwrap();
        assert!(failure.contains("ERROR"));
        assert!(failure.contains("stage=submitting"));
        assert!(failure.contains("kind="));
        assert!(failure.contains("transport"));
        assert!(failure.contains("connection reset"));
        assert!(!failure.contains("result_code"));
    }

    #[tokio::test]
    async fn test_forward_reports_rejection() {
        let transport = RecordingTransport::new(|| Ok(ResultCode::TRY_LATER));
        let collector = SpanCollector::new(transport);

        let err = collector.forward(&scenario_span(None)).await.unwrap_err();
        assert_eq!(err.result_code(), Some(ResultCode::TRY_LATER));
        assert_eq!(collector.metrics().spans_received(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_is_swallowed_and_counted() {
        let transport = RecordingTransport::new(|| {
            Err(TransportError::Protocol("connection reset".into()))
        });
        let collector = SpanCollector::new(transport);

        collector.collect(&scenario_span(None)).await;

        assert_eq!(collector.metrics().transport_errors(), 1);
        assert_eq!(collector.metrics().spans_failed(), 1);
    }

    #[tokio::test]
    async fn test_endpoints_are_cached_across_spans() {
        let transport = RecordingTransport::new(|| Ok(ResultCode::OK));
        let collector = SpanCollector::new(transport);

        let ep = Endpoint::new(0x0A00_0001, 8080, "svc");
        let span = Span::new(1, 2, Some(1), "op")
            .with_annotation(Annotation::new(1, "sr", ep.clone()))
            .with_annotation(Annotation::new(2, "ss", ep));
        collector.collect(&span).await;
        collector.collect(&span).await;

        assert_eq!(collector.endpoint_cache().len(), 1);
    }

    #[test]
    fn test_connect_validates_config() {
        assert!(matches!(
            SpanCollector::connect(CollectorConfig::new("", 9410)),
            Err(ConfigError::EmptyHost)
        ));
        let collector = SpanCollector::connect(CollectorConfig::new("localhost", 9410)).unwrap();
        assert_eq!(collector.transport_name(), "scribe");
    }
}
