use std::time::Duration;

use thiserror::Error;

use crate::backend::BackendBuildError;

/// Invalid settings detected while building a component.
///
/// These are fatal: the process must not start with a configuration that
/// produced one of them.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("batch size must be between 1 and {max}, got {got}")]
    BatchSize { got: usize, max: usize },

    #[error("flush interval must be greater than zero and at most {max:?}, got {got:?}")]
    FlushInterval { got: Duration, max: Duration },

    #[error("neither UDP nor TCP listening is enabled")]
    NoListenerEnabled,

    #[error("invalid {protocol} listening address")]
    ListenAddress { protocol: &'static str },

    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error(transparent)]
    Backend(#[from] BackendBuildError),
}

/// A batch write (or sink setup/teardown) failed.
///
/// Never fatal for the batching engine: the failure is logged and counted,
/// and the next batch is attempted as usual.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("store rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sink is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "clickhouse")]
impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        SinkError::Transport(err.to_string())
    }
}

/// Errors raised by the network listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {protocol} listener to {address}: {source}")]
    Bind {
        protocol: &'static str,
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("syslog listener already started")]
    AlreadyStarted,

    #[error("syslog listener was stopped and cannot be restarted")]
    Stopped,
}

/// Errors surfaced by [`crate::supervisor::Supervisor`].
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("sink start-up failed: {0}")]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("supervisor cannot start from state {0:?}")]
    InvalidState(crate::supervisor::SupervisorState),

    #[error("batching engine task failed: {0}")]
    Engine(#[from] tokio::task::JoinError),
}
