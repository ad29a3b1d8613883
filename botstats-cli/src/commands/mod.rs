//! Command orchestration for CLI subcommands.
//!
//! Provides execute functions for:
//! - `analyze` - Scan a log, score threats, optionally block them
//! - `clean-rules` - Remove expired firewall rules

pub mod analyze;
pub mod clean;

pub use analyze::{execute_analyze, AnalyzeResult};
pub use clean::execute_clean_rules;

use botstats_analyzer::{RuleSinkError, ScanError};
use botstats_fs::FsError;
use thiserror::Error;

use crate::cli::CliError;
use crate::io::{OutputWriterError, WhitelistLoadError};

/// Errors from command execution.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] CliError),

    #[error("filesystem error: {0}")]
    Filesystem(#[from] FsError),

    #[error("log scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("whitelist error: {0}")]
    Whitelist(#[from] WhitelistLoadError),

    #[error("output error: {0}")]
    Output(#[from] OutputWriterError),

    #[error("firewall error: {0}")]
    Firewall(#[from] RuleSinkError),
}

/// Result of command execution.
pub type CommandResult<T> = Result<T, CommandError>;
