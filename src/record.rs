use chrono::{DateTime, FixedOffset, Local, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::parser::SyslogParts;

/// One normalized syslog event, the unit that flows from the listener
/// through the batching engine into a [`crate::sink::LogSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub tag: String,
    pub content: String,
    pub facility: u8,
    pub severity: u8,
    pub client: String,
    pub tls_peer: String,
    pub hostname: String,
    pub timestamp: DateTime<FixedOffset>,
}

impl LogRecord {
    /// Build a record from parsed syslog parts.
    ///
    /// A message without a timestamp is stamped with the current time. The
    /// result is then moved into `zone`; only the offset changes, never the
    /// instant.
    pub fn from_parts(
        parts: SyslogParts,
        client: impl Into<String>,
        tls_peer: impl Into<String>,
        zone: &TimestampZone,
    ) -> Self {
        let timestamp = parts
            .timestamp
            .unwrap_or_else(|| Utc::now().fixed_offset());

        LogRecord {
            tag: parts.tag,
            content: parts.content,
            facility: parts.facility,
            severity: parts.severity,
            client: client.into(),
            tls_peer: tls_peer.into(),
            hostname: parts.hostname,
            timestamp: zone.normalize(timestamp),
        }
    }
}

/// Timestamp conversion settings as they appear in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimestampConfig {
    /// Convert record timestamps at all.
    pub convert: bool,
    /// IANA zone name; empty means the host's local zone.
    pub timezone: String,
}

/// Zone applied to record timestamps at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampZone {
    /// Keep whatever offset the sender used.
    Preserve,
    /// Convert to the host's local zone.
    Local,
    Named(Tz),
}

impl TimestampZone {
    pub fn from_config(config: &TimestampConfig) -> Self {
        if !config.convert {
            info!("Record timestamps keep the sender's offset");
            return TimestampZone::Preserve;
        }

        let zone = if config.timezone.is_empty() {
            TimestampZone::Local
        } else {
            match config.timezone.parse::<Tz>() {
                Ok(tz) => TimestampZone::Named(tz),
                Err(_) => {
                    warn!(timezone = %config.timezone, "Invalid timezone, using local timezone");
                    TimestampZone::Local
                }
            }
        };
        info!(zone = ?zone, "Record timestamps will be converted");
        zone
    }

    pub fn normalize(&self, timestamp: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        match self {
            TimestampZone::Preserve => timestamp,
            TimestampZone::Local => timestamp.with_timezone(&Local).fixed_offset(),
            TimestampZone::Named(tz) => timestamp.with_timezone(tz).fixed_offset(),
        }
    }
}
