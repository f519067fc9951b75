use std::error::Error;

use syslog_batch_sink::config::AppConfig;
use syslog_batch_sink::init::init_logging;
use syslog_batch_sink::supervisor::Supervisor;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging();

    let config = AppConfig::load()?;
    let mut supervisor = Supervisor::new(&config)?;
    supervisor.start().await?;

    wait_for_shutdown_signal().await?;
    info!("Shutdown signal received");

    if let Err(e) = supervisor.stop().await {
        warn!(error = %e, "Error happened when stopping syslog server");
    }
    if let Some(report) = supervisor.report() {
        info!(
            received = report.received_records,
            stored = report.flushed_records,
            failed = report.failed_records,
            "Syslog server exited"
        );
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut quit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = terminate.recv() => {}
        _ = interrupt.recv() => {}
        _ = quit.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
