use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::time::Duration;

use syslog_batch_sink::engine::BatchEngine;
use syslog_batch_sink::noop_sink::NoopSink;
use syslog_batch_sink::parser;
use syslog_batch_sink::record::{LogRecord, TimestampZone};

/// Parses raw RFC 3164 lines and batches them with a larger batch size and
/// a short flush interval, the way a busy relay would be configured.
#[tokio::main]
async fn main() {
    let (tx, rx) = mpsc::unbounded_channel();
    let engine = match BatchEngine::new(5_000, Duration::from_millis(200), rx, Arc::new(NoopSink)) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("invalid engine configuration: {e}");
            return;
        }
    };
    let handle = engine.spawn();

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        let raw = format!("<11>Oct 11 22:14:15 loadhost app[{i}]: custom load test message {i}");
        let parts = match parser::parse(raw.as_bytes()) {
            Ok(parts) => parts,
            Err(e) => {
                eprintln!("unparseable message: {e}");
                continue;
            }
        };
        let record = LogRecord::from_parts(parts, "127.0.0.1:514".to_string(), String::new(), &TimestampZone::Preserve);
        if tx.send(record).is_err() {
            break;
        }
    }
    drop(tx);

    let report = match handle.await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("engine task failed: {e}");
            return;
        }
    };
    let elapsed = start.elapsed();
    println!(
        "custom config: {} records in {} batches in {:?} (~{:.0} rec/s)",
        report.flushed_records,
        report.flushed_batches,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );
}
