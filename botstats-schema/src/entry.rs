//! LogEntry type and combined-log-format parsing.

use std::net::IpAddr;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

/// Timestamp layout inside the `[...]` field, without the zone offset.
pub const LOG_TIMESTAMP_FORMAT: &str = "%d/%b/%Y:%H:%M:%S";

/// Layout including the zone offset, e.g. `10/Oct/2023:13:55:36 +0200`.
const LOG_TIMESTAMP_FORMAT_TZ: &str = "%d/%b/%Y:%H:%M:%S %z";

/// `host ident user [time] "request" status size ["referer" "user-agent"]`
///
/// Quoted fields may contain backslash escapes such as `\"`; they are kept
/// verbatim.
const COMBINED_PATTERN: &str = r#"^(\S+) \S+ \S+ \[([^\]]+)\] "((?:[^"\\]|\\.)*)" (\d{3}) (\S+)(?: "((?:[^"\\]|\\.)*)" "((?:[^"\\]|\\.)*)")?"#;

/// A single parsed access-log request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub address: IpAddr,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub status: u16,
    /// Response size; `None` when logged as `-`.
    pub bytes: Option<u64>,
    pub user_agent: String,
}

impl LogEntry {
    /// Create an entry with only the fields the analysis needs.
    pub fn new(address: IpAddr, timestamp: DateTime<Utc>) -> Self {
        Self {
            address,
            timestamp,
            method: "GET".to_string(),
            path: "/".to_string(),
            status: 200,
            bytes: None,
            user_agent: String::new(),
        }
    }
}

/// Reasons a line could not become a [`LogEntry`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntryError {
    #[error("line does not match the combined log format")]
    Malformed,

    #[error("invalid client address: {0}")]
    InvalidAddress(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Turns one raw log line into a [`LogEntry`].
pub trait EntryParser {
    fn parse(&self, line: &str) -> Result<LogEntry, EntryError>;
}

/// Parser for the Apache/nginx combined (and common) log format.
#[derive(Debug, Default, Clone, Copy)]
pub struct CombinedLogParser;

impl CombinedLogParser {
    pub fn new() -> Self {
        Self
    }
}

fn combined_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(COMBINED_PATTERN).expect("valid combined log pattern"))
}

impl EntryParser for CombinedLogParser {
    fn parse(&self, line: &str) -> Result<LogEntry, EntryError> {
        let caps = combined_regex()
            .captures(line.trim_end())
            .ok_or(EntryError::Malformed)?;

        let host = &caps[1];
        let address: IpAddr = host
            .parse()
            .map_err(|_| EntryError::InvalidAddress(host.to_string()))?;

        let timestamp = parse_log_timestamp(&caps[2])?;

        let request = &caps[3];
        let (method, path) = split_request(request);

        let status = caps[4].parse().map_err(|_| EntryError::Malformed)?;
        let bytes = caps[5].parse().ok();
        let user_agent = caps.get(7).map(|m| m.as_str()).unwrap_or_default();

        Ok(LogEntry {
            address,
            timestamp,
            method,
            path,
            status,
            bytes,
            user_agent: user_agent.to_string(),
        })
    }
}

/// Parse a log timestamp such as `10/Oct/2023:13:55:36 +0000`.
///
/// A missing or unparseable zone offset is read as UTC.
pub fn parse_log_timestamp(raw: &str) -> Result<DateTime<Utc>, EntryError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_str(raw, LOG_TIMESTAMP_FORMAT_TZ) {
        return Ok(dt.with_timezone(&Utc));
    }

    let local_part = raw.split_whitespace().next().unwrap_or_default();
    NaiveDateTime::parse_from_str(local_part, LOG_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| EntryError::InvalidTimestamp(raw.to_string()))
}

/// Split `GET /path HTTP/1.1` into method and path.
fn split_request(request: &str) -> (String, String) {
    let mut parts = request.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(method), Some(path)) => (method.to_string(), path.to_string()),
        _ => ("-".to_string(), request.to_string()),
    }
}
