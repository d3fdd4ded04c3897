//! # Zipkin Span Collector Demo
//!
//! Generates small synthetic traces and forwards them to a Zipkin collector's
//! Scribe endpoint.
//!
//! ## Features Demonstrated
//!
//! - `SpanCollector::collect`: synchronous-looking, never-failing forwarding
//! - `AsyncSpanForwarder`: bounded fire-and-forget queue (`--async`)
//! - Endpoint caching across spans of the same service
//! - Collector metrics: accepted, rejected, failed, latency
//!
//! ## Running
//!
//! ```bash
//! # Against a built-in stub collector that prints what it receives
//! cargo run -p zipkin_collector --bin demo -- --local --verbose
//!
//! # Against a real collector
//! cargo run -p zipkin_collector --bin demo -- --host zipkin.local --port 9410 --spans 50
//!
//! # Hand spans to the background forwarder instead of waiting per span
//! cargo run -p zipkin_collector --bin demo -- --local --async
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::Context;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;
use zipkin_collector::client::{read_frame, write_frame};
use zipkin_collector::codec::decode_log_entry;
use zipkin_collector::constants::{CLIENT_RECV, CLIENT_SEND, SERVER_RECV, SERVER_SEND};
use zipkin_collector::logging::init_logging;
use zipkin_collector::thrift;
use zipkin_collector::{
    Annotation, AsyncSpanForwarder, CollectorConfig, CollectorMetrics, Endpoint,
    ForwarderConfig, ProtocolVersion, ResultCode, Span, SpanCollector,
};

const DEFAULT_PORT: u16 = 9410;
const DEFAULT_SPANS: usize = 20;

struct Options {
    host: String,
    port: u16,
    spans: usize,
    local: bool,
    verbose: bool,
    use_async: bool,
}

impl Options {
    fn parse() -> anyhow::Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let port = match arg_value(&args, "--port") {
            Some(port) => port.parse().context("--port must be a number")?,
            None => DEFAULT_PORT,
        };
        let spans = match arg_value(&args, "--spans") {
            Some(spans) => spans.parse().context("--spans must be a number")?,
            None => DEFAULT_SPANS,
        };
        Ok(Self {
            host: arg_value(&args, "--host").unwrap_or("127.0.0.1").to_string(),
            port,
            spans,
            local: args.contains(&"--local".to_string()),
            verbose: args.contains(&"--verbose".to_string()),
            use_async: args.contains(&"--async".to_string()),
        })
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging("info").map_err(|e| anyhow::anyhow!(e))?;
    let options = Options::parse()?;

    let config = if options.local {
        let port = spawn_local_collector(options.verbose).await?;
        CollectorConfig::new("127.0.0.1", port)
    } else {
        CollectorConfig::new(options.host.clone(), options.port)
    };

    println!("Zipkin span collector demo");
    println!("   Collector: {}", config.address());
    println!("   Spans: {}", options.spans);
    println!("   Mode: {}", if options.use_async { "async" } else { "collect" });
    println!();

    let collector = Arc::new(SpanCollector::connect(config).context("invalid collector config")?);
    let metrics = Arc::clone(collector.metrics());
    let started = Instant::now();

    if options.use_async {
        let forwarder = AsyncSpanForwarder::new(Arc::clone(&collector), ForwarderConfig::default())?;
        for span in generate_spans(options.spans) {
            // A full queue drops the span and is reported in the summary
            let _ = forwarder.try_submit(span);
        }
        let queue = Arc::clone(forwarder.metrics());
        forwarder.shutdown().await;
        println!(
            "Forwarder: {} queued, {} dropped",
            queue.spans_queued(),
            queue.spans_dropped()
        );
    } else {
        for span in generate_spans(options.spans) {
            collector.collect(&span).await;
        }
    }

    print_summary(&metrics, started.elapsed().as_secs_f64());
    println!("   Cached endpoints: {}", collector.endpoint_cache().len());
    Ok(())
}

/// Builds traces of one server span with a client call to a backend.
fn generate_spans(count: usize) -> Vec<Span> {
    let frontend = Endpoint::from_addr(Ipv4Addr::new(10, 0, 0, 1), 8080, "frontend");
    let backend = Endpoint::from_addr(Ipv4Addr::new(10, 0, 0, 2), 9000, "backend");
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    let mut spans = Vec::with_capacity(count);
    while spans.len() < count {
        let trace_id: i64 = rand::random();
        let start = now + spans.len() as i64;

        let root = Span::new(trace_id, trace_id, None, "get /checkout")
            .with_annotation(Annotation::new(start, SERVER_RECV, frontend.clone()))
            .with_annotation(Annotation::new(start + 12, SERVER_SEND, frontend.clone()));
        spans.push(root);

        if spans.len() < count {
            let child_id: i64 = rand::random();
            let child = Span::new(trace_id, child_id, Some(trace_id), "get /inventory")
                .with_annotation(Annotation::new(start + 2, CLIENT_SEND, frontend.clone()))
                .with_annotation(Annotation::new(start + 3, SERVER_RECV, backend.clone()))
                .with_annotation(Annotation::new(start + 9, SERVER_SEND, backend.clone()).with_duration(6))
                .with_annotation(Annotation::new(start + 10, CLIENT_RECV, frontend.clone()));
            spans.push(child);
        }
    }
    spans
}

/// Starts a stub Scribe collector on an ephemeral port that accepts every
/// entry and returns the port.
async fn spawn_local_collector(verbose: bool) -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                while let Ok(frame) = read_frame(&mut socket).await {
                    let (seq_id, entries) = match thrift::read_log_call(&frame) {
                        Ok(call) => call,
                        Err(e) => {
                            eprintln!("   [stub] bad call: {}", e);
                            return;
                        }
                    };
                    if verbose {
                        for entry in &entries {
                            if let Ok(Some(span)) = decode_log_entry(entry) {
                                println!(
                                    "   [stub] trace={:x} span={:x} parent={:?} name={} annotations={}",
                                    span.trace_id,
                                    span.id,
                                    span.parent_id,
                                    span.name,
                                    span.annotations.len()
                                );
                            }
                        }
                    }
                    let Ok(reply) = thrift::write_log_reply(seq_id, ResultCode::OK, ProtocolVersion::Binary) else {
                        return;
                    };
                    if write_frame(&mut socket, &reply).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    Ok(port)
}

fn print_summary(metrics: &CollectorMetrics, elapsed_secs: f64) {
    let received = metrics.spans_received();
    println!();
    println!("Summary");
    println!("   Received:  {}", received);
    println!("   Accepted:  {}", metrics.spans_accepted());
    println!("   Rejected:  {}", metrics.spans_rejected());
    println!("   Failed:    {}", metrics.spans_failed());
    if received > 0 {
        let avg = metrics.total_latency().as_micros() as f64 / received as f64;
        println!("   Avg latency: {:.1} µs", avg);
    }
    println!("   Elapsed: {:.3} s", elapsed_secs);
}
