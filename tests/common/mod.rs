#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::DateTime;
use syslog_batch_sink::error::SinkError;
use syslog_batch_sink::record::LogRecord;
use syslog_batch_sink::sink::LogSink;
use tokio::time::Instant;

/// Build a record whose content identifies it in assertions.
pub fn record(content: &str) -> LogRecord {
    LogRecord {
        tag: "test".to_string(),
        content: content.to_string(),
        facility: 1,
        severity: 6,
        client: "127.0.0.1:40000".to_string(),
        tls_peer: String::new(),
        hostname: "localhost".to_string(),
        timestamp: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap(),
    }
}

pub fn contents(batch: &[LogRecord]) -> Vec<String> {
    batch.iter().map(|r| r.content.clone()).collect()
}

/// Sink that keeps every write, with the (Tokio) instant it happened.
///
/// Results for successive writes can be scripted with
/// [`RecordingSink::fail_next`]; unscripted writes succeed.
#[derive(Default)]
pub struct RecordingSink {
    writes: Mutex<Vec<(Instant, Vec<LogRecord>)>>,
    scripted_failures: Mutex<VecDeque<bool>>,
    fail_start: AtomicBool,
    starts: AtomicUsize,
    closes: AtomicUsize,
}

impl RecordingSink {
    /// A sink whose `start` fails after being counted.
    pub fn failing_start() -> Self {
        let sink = Self::default();
        sink.fail_start.store(true, Ordering::SeqCst);
        sink
    }

    pub fn fail_next(&self, fail: bool) {
        self.scripted_failures.lock().unwrap().push_back(fail);
    }

    pub fn writes(&self) -> Vec<(Instant, Vec<LogRecord>)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.writes().iter().map(|(_, batch)| contents(batch)).collect()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogSink for RecordingSink {
    async fn start(&self) -> Result<(), SinkError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(SinkError::Transport("connection refused".to_string()));
        }
        Ok(())
    }

    async fn write(&self, batch: &[LogRecord]) -> Result<(), SinkError> {
        self.writes.lock().unwrap().push((Instant::now(), batch.to_vec()));
        let fail = self.scripted_failures.lock().unwrap().pop_front().unwrap_or(false);
        if fail {
            return Err(SinkError::Rejected {
                status: 503,
                body: "store unavailable".to_string(),
            });
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
