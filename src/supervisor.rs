use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::backend::{make_sink_from_config, parse_dsn, BackendBuildError};
use crate::config::AppConfig;
use crate::engine::{BatchEngine, EngineReport, EngineStats};
use crate::error::{ConfigurationError, SupervisorError};
use crate::listener::{Protocol, SyslogListener};
use crate::record::TimestampZone;
use crate::sink::LogSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Created,
    Started,
    Stopping,
    Stopped,
}

/// Owns the sink, batching engine and listener, and brings them up and
/// down in dependency order.
///
/// Start: sink, then engine, then listener. Stop: listener first so no new
/// records are produced, then wait for the engine's final flush, which ends
/// with the sink being closed.
pub struct Supervisor {
    state: SupervisorState,
    sink: Arc<dyn LogSink>,
    engine: Option<BatchEngine>,
    engine_handle: Option<JoinHandle<EngineReport>>,
    stats: Arc<EngineStats>,
    listener: SyslogListener,
    report: Option<EngineReport>,
}

impl Supervisor {
    /// Build every component from configuration, selecting the sink from
    /// `store.dsn`.
    pub fn new(config: &AppConfig) -> Result<Self, SupervisorError> {
        let backend = parse_dsn(&config.store.dsn).map_err(BackendBuildError::from)?;
        let sink = make_sink_from_config(&backend)?;
        Self::with_sink(config, sink)
    }

    /// Build every component from configuration around an existing sink.
    pub fn with_sink(config: &AppConfig, sink: Arc<dyn LogSink>) -> Result<Self, SupervisorError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let engine = BatchEngine::new(
            config.store.batch_size,
            config.store.flush_interval(),
            receiver,
            Arc::clone(&sink),
        )?;
        let zone = TimestampZone::from_config(&config.timestamp);
        let listener = SyslogListener::new(config.server.clone(), zone, sender)?;

        Ok(Self {
            state: SupervisorState::Created,
            sink,
            stats: engine.stats(),
            engine: Some(engine),
            engine_handle: None,
            listener,
            report: None,
        })
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Live engine counters.
    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    /// Final engine counters, available once stopped.
    pub fn report(&self) -> Option<EngineReport> {
        self.report
    }

    pub fn local_addr(&self, protocol: Protocol) -> Option<SocketAddr> {
        self.listener.local_addr(protocol)
    }

    /// Bring up sink, engine and listener in that order.
    ///
    /// The first failure aborts start-up: whatever was already running is
    /// shut down and the supervisor ends up `Stopped`.
    pub async fn start(&mut self) -> Result<(), SupervisorError> {
        if self.state != SupervisorState::Created {
            return Err(SupervisorError::InvalidState(self.state));
        }
        let Some(engine) = self.engine.take() else {
            return Err(SupervisorError::InvalidState(self.state));
        };

        if let Err(e) = self.sink.start().await {
            error!(error = %e, "Sink start-up failed");
            // Release whatever start acquired before failing.
            if let Err(close_err) = self.sink.close().await {
                warn!(error = %close_err, "Error closing sink after failed start-up");
            }
            self.listener.stop().await;
            self.state = SupervisorState::Stopped;
            return Err(e.into());
        }

        self.engine_handle = Some(engine.spawn());

        if let Err(e) = self.listener.start().await {
            error!(error = %e, "Listener start-up failed");
            self.state = SupervisorState::Stopping;
            self.shutdown().await?;
            return Err(e.into());
        }

        self.state = SupervisorState::Started;
        info!("Supervisor started");
        Ok(())
    }

    /// Stop the listener, wait for the engine to drain and release the sink.
    ///
    /// Calling this when already stopped does nothing.
    pub async fn stop(&mut self) -> Result<(), SupervisorError> {
        match self.state {
            SupervisorState::Stopped => Ok(()),
            SupervisorState::Created => {
                self.listener.stop().await;
                self.engine = None;
                self.state = SupervisorState::Stopped;
                Ok(())
            }
            SupervisorState::Started | SupervisorState::Stopping => {
                self.state = SupervisorState::Stopping;
                self.shutdown().await?;
                info!("Supervisor stopped");
                Ok(())
            }
        }
    }

    async fn shutdown(&mut self) -> Result<(), SupervisorError> {
        self.listener.stop().await;
        let result = match self.engine_handle.take() {
            Some(handle) => handle.await.map(|report| {
                self.report = Some(report);
            }),
            None => Ok(()),
        };
        self.state = SupervisorState::Stopped;
        result.map_err(SupervisorError::from)
    }
}

impl From<BackendBuildError> for SupervisorError {
    fn from(err: BackendBuildError) -> Self {
        SupervisorError::Configuration(ConfigurationError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ListenConfig, ServerConfig, StoreConfig};
    use crate::noop_sink::NoopSink;

    fn config(dsn: &str, batch_size: usize) -> AppConfig {
        AppConfig {
            server: ServerConfig {
                udp: ListenConfig {
                    enabled: true,
                    address: "127.0.0.1".to_string(),
                    port: 0,
                },
                tcp: ListenConfig {
                    enabled: false,
                    address: "127.0.0.1".to_string(),
                    port: 0,
                },
            },
            store: StoreConfig {
                dsn: dsn.to_string(),
                batch_size,
                flush_interval_ms: 500,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_new_rejects_invalid_batch_size() {
        let result = Supervisor::new(&config("noop://", 0));
        assert!(matches!(
            result,
            Err(SupervisorError::Configuration(ConfigurationError::BatchSize { .. }))
        ));
    }

    #[test]
    fn test_new_rejects_unknown_backend() {
        let result = Supervisor::new(&config("mongodb://localhost:27017", 10));
        assert!(matches!(
            result,
            Err(SupervisorError::Configuration(ConfigurationError::Backend(_)))
        ));
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let mut supervisor = Supervisor::with_sink(&config("noop://", 10), Arc::new(NoopSink)).unwrap();
        assert_eq!(supervisor.state(), SupervisorState::Created);

        supervisor.stop().await.unwrap();
        assert_eq!(supervisor.state(), SupervisorState::Stopped);
        assert!(matches!(
            supervisor.start().await,
            Err(SupervisorError::InvalidState(SupervisorState::Stopped))
        ));
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let mut supervisor = Supervisor::new(&config("noop://", 10)).unwrap();
        supervisor.start().await.unwrap();
        assert_eq!(supervisor.state(), SupervisorState::Started);
        assert!(supervisor.local_addr(Protocol::Udp).is_some());
        assert!(matches!(
            supervisor.start().await,
            Err(SupervisorError::InvalidState(SupervisorState::Started))
        ));

        supervisor.stop().await.unwrap();
        assert_eq!(supervisor.state(), SupervisorState::Stopped);
        assert_eq!(supervisor.report(), Some(EngineReport::default()));

        supervisor.stop().await.unwrap();
        assert_eq!(supervisor.state(), SupervisorState::Stopped);
    }
}
