//! botstats Access Log Schema
//!
//! Defines the parsed access-log record and the line parser for the
//! Apache/nginx combined log format.

mod entry;

pub use entry::{
    parse_log_timestamp, CombinedLogParser, EntryError, EntryParser, LogEntry, LOG_TIMESTAMP_FORMAT,
};
