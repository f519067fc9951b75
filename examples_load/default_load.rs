use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;

use syslog_batch_sink::config::StoreConfig;
use syslog_batch_sink::engine::BatchEngine;
use syslog_batch_sink::noop_sink::NoopSink;
use syslog_batch_sink::record::LogRecord;

#[tokio::main]
async fn main() {
    let store = StoreConfig::default();
    let (tx, rx) = mpsc::unbounded_channel();
    let engine = match BatchEngine::new(store.batch_size, store.flush_interval(), rx, Arc::new(NoopSink)) {
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
        let record = LogRecord {
            tag: "load".to_string(),
            content: format!("default load test message {i}"),
            facility: 1,
            severity: 3,
            client: "127.0.0.1:514".to_string(),
            tls_peer: String::new(),
            hostname: "localhost".to_string(),
            timestamp: Utc::now().fixed_offset(),
        };
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
        "default config: {} records in {} batches in {:?} (~{:.0} rec/s)",
        report.flushed_records,
        report.flushed_batches,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );
}
