use crate::error::SinkError;
use crate::record::LogRecord;
use crate::sink::LogSink;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

/// Writes every batch to stdout as JSON lines, one record per line.
///
/// Handy for local runs and for piping into other tools. A batch is
/// serialized completely before anything is written, so a serialization
/// failure never emits half a batch.
#[derive(Clone, Default)]
pub struct ConsoleSink;

pub(crate) fn to_json_lines(batch: &[LogRecord]) -> Result<String, SinkError> {
    let mut body = String::new();
    for record in batch {
        body.push_str(&serde_json::to_string(record)?);
        body.push('\n');
    }
    Ok(body)
}

#[async_trait]
impl LogSink for ConsoleSink {
    async fn write(&self, batch: &[LogRecord]) -> Result<(), SinkError> {
        let body = to_json_lines(batch)?;
        let mut stdout = tokio::io::stdout();
        stdout.write_all(body.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::record::TimestampZone;

    #[test]
    fn test_json_lines_one_per_record() {
        let batch: Vec<LogRecord> = ["<13>Jan  1 00:00:00 h a: one", "<13>Jan  1 00:00:01 h a: two"]
            .iter()
            .map(|raw| {
                let parts = parser::parse(raw.as_bytes()).unwrap();
                LogRecord::from_parts(parts, "127.0.0.1:1", "", &TimestampZone::Preserve)
            })
            .collect();

        let body = to_json_lines(&batch).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["content"], "one");
        assert_eq!(first["tag"], "a");
    }

    #[tokio::test]
    async fn test_write_empty_batch() {
        assert!(ConsoleSink.write(&[]).await.is_ok());
    }
}
