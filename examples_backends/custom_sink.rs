use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use syslog_batch_sink::config::AppConfig;
use syslog_batch_sink::error::SinkError;
use syslog_batch_sink::init::init_logging;
use syslog_batch_sink::record::LogRecord;
use syslog_batch_sink::sink::LogSink;
use syslog_batch_sink::Supervisor;

/// Example of plugging in a store this crate has no built-in sink for, by
/// implementing `LogSink` directly. Imagine this talks to some proprietary
/// database; here each batch is just printed.
struct MyCustomDbSink;

#[async_trait]
impl LogSink for MyCustomDbSink {
    async fn start(&self) -> Result<(), SinkError> {
        println!("[my-custom-db] connected");
        Ok(())
    }

    async fn write(&self, batch: &[LogRecord]) -> Result<(), SinkError> {
        // One round trip per batch.
        println!("[my-custom-db] inserting {} records", batch.len());
        for record in batch {
            println!("[my-custom-db] {} {}: {}", record.hostname, record.tag, record.content);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        println!("[my-custom-db] disconnected");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    init_logging();

    let mut config = AppConfig::default();
    config.server.udp.address = "127.0.0.1".to_string();
    config.server.udp.port = 5514;
    config.server.tcp.enabled = false;

    let mut supervisor = match Supervisor::with_sink(&config, Arc::new(MyCustomDbSink)) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return;
        }
    };
    if let Err(e) = supervisor.start().await {
        error!(error = %e, "Failed to start");
        return;
    }
    info!("Send syslog datagrams to 127.0.0.1:5514, Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
    }
    if let Err(e) = supervisor.stop().await {
        error!(error = %e, "Error during shutdown");
    }
}
