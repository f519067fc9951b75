use crate::error::SinkError;
use crate::record::LogRecord;
use async_trait::async_trait;

/// Asynchronous durable destination for batches of [`LogRecord`]s.
///
/// Implementations are responsible for transporting records to a concrete
/// store (ClickHouse, stdout, etc). The batching engine is the only caller
/// during normal operation and never issues two calls concurrently.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// One-time preparation (connection checks, schema creation) before the
    /// engine starts writing.
    ///
    /// Default implementation is a no-op.
    async fn start(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Durably write one batch.
    ///
    /// **Parameters**
    /// - `batch`: records in arrival order.
    ///
    /// **Returns**
    /// - `Ok(())` if the whole batch was stored.
    /// - `Err(..)` if nothing was stored. Partial writes are not allowed:
    ///   the caller treats an error as "this batch is lost" and moves on.
    async fn write(&self, batch: &[LogRecord]) -> Result<(), SinkError>;

    /// Release underlying resources. Called once, after the engine has
    /// drained.
    ///
    /// Default implementation is a no-op.
    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
