//! Batching engine: coalesces records into batches and hands each batch to a
//! [`LogSink`].
//!
//! A single task owns the buffer and the flush deadline. Record arrival and
//! deadline expiry are two branches of one `tokio::select!`, so a size flush
//! and a timer flush can never observe the same buffer contents.

use crate::error::{ConfigurationError, SinkError};
use crate::record::LogRecord;
use crate::sink::LogSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Largest accepted batch size.
pub const MAX_BATCH_SIZE: usize = 50_000;

/// Longest accepted flush interval.
pub const MAX_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// What caused a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Size,
    Timer,
    Shutdown,
}

/// Counters shared between the engine task and any observer.
#[derive(Debug, Default)]
pub struct EngineStats {
    received_records: AtomicU64,
    flushed_batches: AtomicU64,
    flushed_records: AtomicU64,
    failed_batches: AtomicU64,
    failed_records: AtomicU64,
}

impl EngineStats {
    pub fn snapshot(&self) -> EngineReport {
        EngineReport {
            received_records: self.received_records.load(Ordering::Relaxed),
            flushed_batches: self.flushed_batches.load(Ordering::Relaxed),
            flushed_records: self.flushed_records.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            failed_records: self.failed_records.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineReport {
    pub received_records: u64,
    /// Batches the sink accepted.
    pub flushed_batches: u64,
    pub flushed_records: u64,
    /// Batches the sink rejected. Their records are not retried.
    pub failed_batches: u64,
    pub failed_records: u64,
}

pub struct BatchEngine {
    batch_size: usize,
    flush_interval: Duration,
    receiver: mpsc::UnboundedReceiver<LogRecord>,
    sink: Arc<dyn LogSink>,
    stats: Arc<EngineStats>,
}

impl BatchEngine {
    /// Create an engine that reads from `receiver` and writes to `sink`.
    ///
    /// `batch_size` must be in `1..=MAX_BATCH_SIZE` and `flush_interval` in
    /// `(0, MAX_FLUSH_INTERVAL]`; anything else is a [`ConfigurationError`].
    pub fn new(
        batch_size: usize,
        flush_interval: Duration,
        receiver: mpsc::UnboundedReceiver<LogRecord>,
        sink: Arc<dyn LogSink>,
    ) -> Result<Self, ConfigurationError> {
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(ConfigurationError::BatchSize {
                got: batch_size,
                max: MAX_BATCH_SIZE,
            });
        }
        if flush_interval.is_zero() || flush_interval > MAX_FLUSH_INTERVAL {
            return Err(ConfigurationError::FlushInterval {
                got: flush_interval,
                max: MAX_FLUSH_INTERVAL,
            });
        }

        Ok(Self {
            batch_size,
            flush_interval,
            receiver,
            sink,
            stats: Arc::new(EngineStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    /// Run the engine on its own Tokio task.
    pub fn spawn(self) -> JoinHandle<EngineReport> {
        tokio::spawn(self.run())
    }

    /// Consume records until the channel closes, flush what is left, then
    /// close the sink.
    pub async fn run(self) -> EngineReport {
        let BatchEngine {
            batch_size,
            flush_interval,
            mut receiver,
            sink,
            stats,
        } = self;
        info!(batch_size, flush_interval = ?flush_interval, "Batching engine started");

        let flusher = Flusher { sink, stats };
        let mut buffer: Vec<LogRecord> = Vec::new();
        // Armed when the buffer goes from empty to non-empty, cleared by
        // every flush.
        let mut deadline: Option<Instant> = None;

        loop {
            // `sleep_until` is still constructed when the branch is disabled,
            // so it needs some instant; it is never polled in that case.
            let wake_at = deadline.unwrap_or_else(Instant::now);

            tokio::select! {
                received = receiver.recv() => {
                    let Some(record) = received else {
                        break;
                    };
                    flusher.stats.received_records.fetch_add(1, Ordering::Relaxed);
                    if buffer.is_empty() {
                        trace!("Arming flush timer");
                        deadline = Some(Instant::now() + flush_interval);
                    }
                    buffer.push(record);
                    if buffer.len() >= batch_size {
                        trace!("Reached batch size, flushing");
                        flusher.flush(&mut buffer, &mut deadline, FlushTrigger::Size).await;
                    }
                }
                () = sleep_until(wake_at), if deadline.is_some() => {
                    trace!("Flush timer expired");
                    flusher.flush(&mut buffer, &mut deadline, FlushTrigger::Timer).await;
                }
            }
        }

        if !buffer.is_empty() {
            debug!(records = buffer.len(), "Flushing remaining records before shutdown");
            flusher.flush(&mut buffer, &mut deadline, FlushTrigger::Shutdown).await;
        }

        info!("Closing sink");
        if let Err(e) = flusher.sink.close().await {
            warn!(error = %e, "Error closing sink");
        }

        let report = flusher.stats.snapshot();
        info!(
            received = report.received_records,
            flushed = report.flushed_records,
            failed = report.failed_records,
            "Batching engine stopped"
        );
        report
    }
}

/// Everything a flush touches. Owned by the engine task next to the receiver.
struct Flusher {
    sink: Arc<dyn LogSink>,
    stats: Arc<EngineStats>,
}

impl Flusher {
    async fn flush(
        &self,
        buffer: &mut Vec<LogRecord>,
        deadline: &mut Option<Instant>,
        trigger: FlushTrigger,
    ) {
        *deadline = None;
        if buffer.is_empty() {
            return;
        }

        let batch = take_batch(buffer);
        let count = batch.len() as u64;
        debug!(records = count, trigger = ?trigger, "Writing batch");

        match self.sink.write(&batch).await {
            Ok(()) => {
                self.stats.flushed_batches.fetch_add(1, Ordering::Relaxed);
                self.stats.flushed_records.fetch_add(count, Ordering::Relaxed);
            }
            Err(e) => self.report_failure(&e, count, trigger),
        }
    }

    fn report_failure(&self, error: &SinkError, count: u64, trigger: FlushTrigger) {
        self.stats.failed_batches.fetch_add(1, Ordering::Relaxed);
        self.stats.failed_records.fetch_add(count, Ordering::Relaxed);
        warn!(error = %error, records = count, trigger = ?trigger, "Failed to write batch, records dropped");
    }
}

/// Swap the buffer out. The replacement reserves as much as the batch just
/// taken, never a full `batch_size`.
fn take_batch(buffer: &mut Vec<LogRecord>) -> Vec<LogRecord> {
    let next = Vec::with_capacity(buffer.len());
    std::mem::replace(buffer, next)
}
