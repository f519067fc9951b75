//! Syslog wire-format parsing.
//!
//! Both RFC 5424 (`<PRI>1 TIMESTAMP HOST APP PROCID MSGID SD MSG`) and the
//! older BSD format from RFC 3164 (`<PRI>Mmm dd hh:mm:ss HOST TAG: MSG`) are
//! accepted; the format is detected from the version field that follows the
//! priority.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

/// Highest valid PRI value (facility 23, severity 7).
const MAX_PRIORITY: u16 = 191;

/// Longest tag accepted in a BSD message, per RFC 3164 section 4.1.3.
const MAX_TAG_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyslogFormat {
    Rfc3164,
    Rfc5424,
}

/// Fields extracted from one syslog message, before normalization into a
/// [`crate::record::LogRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyslogParts {
    pub format: SyslogFormat,
    pub facility: u8,
    pub severity: u8,
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub hostname: String,
    pub tag: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty message")]
    Empty,

    #[error("message does not start with a <PRI> header")]
    MissingPriority,

    #[error("invalid priority value: {0}")]
    InvalidPriority(String),

    #[error("invalid RFC 5424 timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("malformed RFC 5424 header")]
    MalformedHeader,

    #[error("malformed structured data")]
    InvalidStructuredData,
}

/// Parse a raw syslog message as received from the network.
pub fn parse(raw: &[u8]) -> Result<SyslogParts, ParseError> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end_matches(['\n', '\r', '\0']);
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let (priority, rest) = parse_priority(text)?;
    let facility = (priority / 8) as u8;
    let severity = (priority % 8) as u8;

    match rest.strip_prefix("1 ") {
        Some(header) => parse_rfc5424(facility, severity, header),
        None => Ok(parse_rfc3164(facility, severity, rest)),
    }
}

fn parse_priority(text: &str) -> Result<(u16, &str), ParseError> {
    let body = text.strip_prefix('<').ok_or(ParseError::MissingPriority)?;
    let end = body
        .char_indices()
        .take(4)
        .find(|(_, c)| *c == '>')
        .map(|(i, _)| i)
        .ok_or(ParseError::MissingPriority)?;

    let digits = &body[..end];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidPriority(digits.to_string()));
    }
    let priority: u16 = digits
        .parse()
        .map_err(|_| ParseError::InvalidPriority(digits.to_string()))?;
    if priority > MAX_PRIORITY {
        return Err(ParseError::InvalidPriority(digits.to_string()));
    }

    Ok((priority, &body[end + 1..]))
}

fn parse_rfc5424(facility: u8, severity: u8, header: &str) -> Result<SyslogParts, ParseError> {
    let mut fields = header.splitn(6, ' ');
    let mut next = || fields.next().ok_or(ParseError::MalformedHeader);

    let timestamp = match next()? {
        "-" => None,
        ts => Some(
            DateTime::parse_from_rfc3339(ts)
                .map_err(|_| ParseError::InvalidTimestamp(ts.to_string()))?,
        ),
    };
    let hostname = nil_to_empty(next()?);
    let tag = nil_to_empty(next()?);
    let _proc_id = next()?;
    let _msg_id = next()?;
    let remainder = fields.next().unwrap_or("");

    let message = skip_structured_data(remainder)?;
    let content = message.strip_prefix('\u{feff}').unwrap_or(message);

    Ok(SyslogParts {
        format: SyslogFormat::Rfc5424,
        facility,
        severity,
        timestamp,
        hostname,
        tag,
        content: content.to_string(),
    })
}

fn nil_to_empty(field: &str) -> String {
    if field == "-" {
        String::new()
    } else {
        field.to_string()
    }
}

/// Returns the MSG part that follows the STRUCTURED-DATA field.
fn skip_structured_data(s: &str) -> Result<&str, ParseError> {
    if let Some(rest) = s.strip_prefix('-') {
        return Ok(rest.strip_prefix(' ').unwrap_or(rest));
    }
    if !s.starts_with('[') {
        return Err(ParseError::InvalidStructuredData);
    }

    let bytes = s.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() && bytes[pos] == b'[' {
        let mut in_quotes = false;
        let mut escaped = false;
        let mut closed = false;
        pos += 1;
        while pos < bytes.len() {
            let b = bytes[pos];
            pos += 1;
            if escaped {
                escaped = false;
                continue;
            }
            match b {
                b'\\' if in_quotes => escaped = true,
                b'"' => in_quotes = !in_quotes,
                b']' if !in_quotes => {
                    closed = true;
                    break;
                }
                _ => {}
            }
        }
        if !closed {
            return Err(ParseError::InvalidStructuredData);
        }
    }

    let rest = &s[pos..];
    Ok(rest.strip_prefix(' ').unwrap_or(rest))
}

fn parse_rfc3164(facility: u8, severity: u8, rest: &str) -> SyslogParts {
    let (timestamp, after_timestamp) = parse_bsd_timestamp(rest);

    let (hostname, body) = if timestamp.is_some() {
        let trimmed = after_timestamp.trim_start();
        match trimmed.split_once(' ') {
            Some((host, body)) => (host.to_string(), body),
            None => (trimmed.to_string(), ""),
        }
    } else {
        (String::new(), rest)
    };

    let (tag, content) = split_tag(body);

    SyslogParts {
        format: SyslogFormat::Rfc3164,
        facility,
        severity,
        timestamp,
        hostname,
        tag: tag.to_string(),
        content: content.to_string(),
    }
}

/// Accepts `Mmm dd hh:mm:ss` (current year, UTC) or a leading RFC 3339
/// timestamp. Returns the unparsed remainder.
fn parse_bsd_timestamp(s: &str) -> (Option<DateTime<FixedOffset>>, &str) {
    if let Some((first, rest)) = s.split_once(' ') {
        if let Ok(ts) = DateTime::parse_from_rfc3339(first) {
            return (Some(ts), rest);
        }
    }

    let mut tokens = s.split_whitespace();
    let (Some(month), Some(day), Some(time)) = (tokens.next(), tokens.next(), tokens.next()) else {
        return (None, s);
    };

    let candidate = format!("{} {} {} {}", Utc::now().year(), month, day, time);
    let Ok(naive) = NaiveDateTime::parse_from_str(&candidate, "%Y %b %d %H:%M:%S") else {
        return (None, s);
    };

    // Skip past the three tokens in the original text.
    let consumed = s.find(time).map(|i| i + time.len()).unwrap_or(s.len());
    let timestamp = Utc.from_utc_datetime(&naive).fixed_offset();
    (Some(timestamp), &s[consumed..])
}

fn split_tag(body: &str) -> (&str, &str) {
    let Some(end) = body.find(['[', ':', ' ']) else {
        return ("", body);
    };
    if end == 0 || end > MAX_TAG_LEN {
        return ("", body);
    }

    let tag = &body[..end];
    let after = &body[end..];
    let rest = if after.starts_with('[') {
        match after.find(']') {
            Some(close) => {
                let rest = &after[close + 1..];
                rest.strip_prefix(':').unwrap_or(rest)
            }
            None => return ("", body),
        }
    } else if let Some(rest) = after.strip_prefix(':') {
        rest
    } else {
        return ("", body);
    };

    (tag, rest.strip_prefix(' ').unwrap_or(rest))
}
