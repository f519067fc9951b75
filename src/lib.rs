pub mod error;
pub mod record;
pub mod parser;
pub mod sink;
pub mod engine;
pub mod listener;
pub mod supervisor;
pub mod backend;
pub mod config;

#[cfg(feature = "clickhouse")]
pub mod clickhouse;

pub mod console;
pub mod env;
pub mod init;
pub mod noop_sink;

pub use engine::{BatchEngine, EngineReport};
pub use error::{ConfigurationError, ListenerError, SinkError, SupervisorError};
pub use record::LogRecord;
pub use sink::LogSink;
pub use supervisor::{Supervisor, SupervisorState};
