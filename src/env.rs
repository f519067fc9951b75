//! Environment variable names read by the server binary.
//!
//! These are purely helpers; the engine, listener and sinks take explicit
//! values and never read the environment themselves.

/// Path of the YAML configuration file.
pub const APP_CONFIG_FILE_ENV: &str = "APP_CONFIG_FILE";

/// Used when [`APP_CONFIG_FILE_ENV`] is not set.
pub const DEFAULT_CONFIG_FILE: &str = "configs/application.yml";

/// Prefix of environment variables overriding configuration keys.
pub const CONFIG_ENV_PREFIX: &str = "SJ_";

/// Log verbosity (`trace`, `debug`, `info`, `warn`, `error`).
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
