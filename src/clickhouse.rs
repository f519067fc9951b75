use crate::backend::DsnError;
use crate::error::SinkError;
use crate::record::LogRecord;
use crate::sink::LogSink;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{Client, Url};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

const DEFAULT_HTTP_PORT: u16 = 8123;
const DEFAULT_HTTPS_PORT: u16 = 8443;
const DEFAULT_DATABASE: &str = "syslog";
const DEFAULT_TABLE: &str = "logmessages";

/// Configuration for [`ClickHouseSink`].
///
/// The sink talks to ClickHouse over HTTP using the `JSONEachRow` format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClickHouseConfig {
    /// Base URL without query, e.g. "http://127.0.0.1:8123"
    pub url: String,
    pub database: String,
    pub table: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl ClickHouseConfig {
    /// Build a config from a DSN of the form
    /// `clickhouse://[user[:password]@]host[:port][/database[/table]]`.
    ///
    /// `clickhouses://` selects HTTPS. Credentials and path segments are
    /// percent-decoded; database and table default to `syslog` and
    /// `logmessages` and may only contain ASCII letters, digits and `_`.
    pub fn from_dsn(dsn: &str) -> Result<Self, DsnError> {
        let parsed = Url::parse(dsn).map_err(|e| DsnError::Invalid(e.to_string()))?;

        let (http_scheme, default_port) = match parsed.scheme() {
            "clickhouse" => ("http", DEFAULT_HTTP_PORT),
            "clickhouses" => ("https", DEFAULT_HTTPS_PORT),
            other => return Err(DsnError::UnknownScheme(other.to_string())),
        };

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DsnError::Invalid("missing host".to_string()))?;
        let port = parsed.port().unwrap_or(default_port);

        let mut segments = parsed
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter();
        let database = identifier(segments.next().unwrap_or(DEFAULT_DATABASE))?;
        let table = identifier(segments.next().unwrap_or(DEFAULT_TABLE))?;

        let user = match parsed.username() {
            "" => None,
            user => Some(decode(user)?),
        };
        let password = parsed.password().map(decode).transpose()?;

        Ok(ClickHouseConfig {
            url: format!("{}://{}:{}", http_scheme, host, port),
            database,
            table,
            user,
            password,
        })
    }
}

fn decode(value: &str) -> Result<String, DsnError> {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .map_err(|e| DsnError::Invalid(e.to_string()))
}

/// Decode a database or table name. It is spliced into SQL unquoted, so
/// anything outside `[A-Za-z0-9_]` is refused.
fn identifier(segment: &str) -> Result<String, DsnError> {
    let name = decode(segment)?;
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DsnError::Invalid(format!("invalid identifier {name:?}")));
    }
    Ok(name)
}

/// ClickHouse implementation of [`LogSink`] using the HTTP interface.
///
/// Every batch goes out as a single `INSERT ... FORMAT JSONEachRow` request,
/// which ClickHouse applies as one insert block.
pub struct ClickHouseSink {
    client: Client,
    config: ClickHouseConfig,
    closed: AtomicBool,
}

impl ClickHouseSink {
    /// Construct a new sink instance using the provided configuration.
    ///
    /// No request is made until [`LogSink::start`] or [`LogSink::write`].
    pub fn new(config: ClickHouseConfig) -> Self {
        let client = Client::new();
        Self {
            client,
            config,
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ClickHouseConfig {
        &self.config
    }

    fn endpoint(&self, query: Option<&str>) -> String {
        let mut params = format!("database={}", urlencoding::encode(&self.config.database));

        if let Some(query) = query {
            params.push_str(&format!("&query={}", urlencoding::encode(query)));
        }
        if let Some(user) = &self.config.user {
            params.push_str(&format!("&user={}", urlencoding::encode(user)));
        }
        if let Some(password) = &self.config.password {
            params.push_str(&format!("&password={}", urlencoding::encode(password)));
        }

        format!("{}/?{}", self.config.url, params)
    }

    fn insert_query(&self) -> String {
        format!("INSERT INTO {} FORMAT JSONEachRow", self.config.table)
    }

    fn create_table_statement(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (\
             timestamp DateTime64(3, 'UTC'), \
             tag String, \
             content String, \
             facility UInt8, \
             severity UInt8, \
             client String, \
             tls_peer String, \
             hostname String, \
             INDEX idx_facility facility TYPE minmax GRANULARITY 4, \
             INDEX idx_severity severity TYPE minmax GRANULARITY 4, \
             INDEX idx_hostname hostname TYPE bloom_filter GRANULARITY 4, \
             INDEX idx_client client TYPE bloom_filter GRANULARITY 4, \
             INDEX idx_tag tag TYPE bloom_filter GRANULARITY 4\
             ) ENGINE = MergeTree ORDER BY timestamp",
            self.config.database, self.config.table
        )
    }

    /// Run one statement passed as the request body.
    async fn execute(&self, statement: String) -> Result<(), SinkError> {
        let resp = self
            .client
            .post(self.endpoint(None))
            .body(statement)
            .send()
            .await?;
        check_status(resp).await
    }

    fn map_record(record: &LogRecord) -> ClickHouseRow<'_> {
        ClickHouseRow {
            timestamp: record
                .timestamp
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            tag: &record.tag,
            content: &record.content,
            facility: record.facility,
            severity: record.severity,
            client: &record.client,
            tls_peer: &record.tls_peer,
            hostname: &record.hostname,
        }
    }
}

async fn check_status(resp: reqwest::Response) -> Result<(), SinkError> {
    if resp.status().is_success() {
        return Ok(());
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
    Err(SinkError::Rejected { status, body })
}

#[derive(Serialize)]
struct ClickHouseRow<'a> {
    timestamp: String,
    tag: &'a str,
    content: &'a str,
    facility: u8,
    severity: u8,
    client: &'a str,
    tls_peer: &'a str,
    hostname: &'a str,
}

#[async_trait]
impl LogSink for ClickHouseSink {
    async fn start(&self) -> Result<(), SinkError> {
        info!(url = %self.config.url, database = %self.config.database, table = %self.config.table, "Preparing ClickHouse schema");
        self.execute(format!("CREATE DATABASE IF NOT EXISTS {}", self.config.database))
            .await?;
        self.execute(self.create_table_statement()).await?;
        debug!("ClickHouse schema ready");
        Ok(())
    }

    async fn write(&self, batch: &[LogRecord]) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }

        let mut body = String::new();
        for record in batch {
            body.push_str(&serde_json::to_string(&Self::map_record(record))?);
            body.push('\n');
        }

        let url = format!(
            "{}&date_time_input_format=best_effort",
            self.endpoint(Some(&self.insert_query()))
        );
        let resp = self.client.post(&url).body(body).send().await?;
        check_status(resp).await
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::Release);
        info!("ClickHouse sink closed");
        Ok(())
    }
}
