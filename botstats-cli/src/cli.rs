//! CLI argument parsing for botstats.
//!
//! Two subcommands: `analyze` scans an access log and optionally blocks the
//! worst offenders, `clean-rules` removes firewall rules whose block has
//! expired.

use std::fmt;
use std::path::PathBuf;

use botstats_analyzer::config::{
    DEFAULT_AVERAGE_GROUP_RATE_THRESHOLD, DEFAULT_BLOCK_DURATION_MINUTES,
    DEFAULT_DANGER_THRESHOLD, DEFAULT_MEMBER_COUNT_THRESHOLD, DEFAULT_MIN_ACTIVITY_SPAN_SECS,
    DEFAULT_MIN_TOTAL_REQUESTS, DEFAULT_PEAK_GROUP_RATE_THRESHOLD,
    DEFAULT_PEAK_MEMBER_RATE_THRESHOLD, DEFAULT_RATE_THRESHOLD, DEFAULT_TOP_N,
};
use botstats_analyzer::{AnalyzerConfig, StrategyConfig, StrategyKind, Whitelist};
use botstats_clock::Clock;
use botstats_schema::parse_log_timestamp;
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use thiserror::Error;

/// Errors from CLI argument validation.
#[derive(Debug, Error, PartialEq)]
pub enum CliError {
    #[error("invalid start date '{0}' (expected dd/Mon/yyyy:HH:MM:SS)")]
    InvalidStartDate(String),

    #[error("top must be at least 1, got {0}")]
    InvalidTop(usize),

    #[error("block-duration must be at least 1 minute, got {0}")]
    InvalidBlockDuration(u64),

    #[error("{name} must be a non-negative number, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("block-min-timespan-seconds must not be negative, got {0}")]
    InvalidTimespan(i64),
}

/// Relative analysis windows.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    Hour,
    Day,
    Week,
}

impl TimeWindow {
    /// Length of the window in seconds.
    pub fn duration_secs(self) -> u64 {
        match self {
            TimeWindow::Hour => 3_600,
            TimeWindow::Day => 86_400,
            TimeWindow::Week => 7 * 86_400,
        }
    }
}

/// Format of the `--output` file.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        })
    }
}

/// botstats - find abusive clients in web server access logs and block them with ufw.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "botstats")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Analyze an access log and report (and optionally block) threats.
    Analyze(AnalyzeArgs),
    /// Remove firewall rules whose block duration has expired.
    CleanRules(CleanRulesArgs),
}

/// Arguments for the analyze command.
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct AnalyzeArgs {
    /// Access log to analyze (combined log format).
    #[arg(short, long)]
    pub file: PathBuf,

    /// Only analyze entries at or after this time (dd/Mon/yyyy:HH:MM:SS, UTC).
    #[arg(short, long)]
    pub start_date: Option<String>,

    /// Only analyze the last hour, day or week (overrides --start-date).
    #[arg(long, value_enum)]
    pub time_window: Option<TimeWindow>,

    /// Number of top threats to report and consider for blocking.
    #[arg(short = 'n', long, default_value_t = DEFAULT_TOP_N)]
    pub top: usize,

    /// File of addresses/networks to exclude (one per line, # comments).
    #[arg(short, long)]
    pub whitelist: Option<PathBuf>,

    /// Requests per minute above which an address is suspicious.
    #[arg(long, default_value_t = DEFAULT_RATE_THRESHOLD)]
    pub rate_threshold: f64,

    /// Block selected threats with ufw.
    #[arg(long)]
    pub block: bool,

    /// Strategy used to score threats and decide blocking.
    #[arg(long, default_value_t = StrategyKind::default())]
    pub block_strategy: StrategyKind,

    /// Minimum total requests before any group may be blocked.
    #[arg(long, default_value_t = DEFAULT_MIN_TOTAL_REQUESTS)]
    pub block_threshold: usize,

    /// Minimum aggregate danger score (volume_danger, combined).
    #[arg(long, default_value_t = DEFAULT_DANGER_THRESHOLD)]
    pub block_danger_threshold: f64,

    /// Minimum distinct addresses (volume_coordination, combined, coordinated_sustained).
    #[arg(long, default_value_t = DEFAULT_MEMBER_COUNT_THRESHOLD)]
    pub block_ip_count_threshold: usize,

    /// Minimum peak requests per minute of any address (volume_peak_rpm).
    #[arg(long, default_value_t = DEFAULT_PEAK_MEMBER_RATE_THRESHOLD)]
    pub block_max_rpm_threshold: f64,

    /// Minimum requests in the group's busiest minute (peak_total_rpm).
    #[arg(long, default_value_t = DEFAULT_PEAK_GROUP_RATE_THRESHOLD)]
    pub block_total_max_rpm_threshold: f64,

    /// Minimum average group requests per minute (coordinated_sustained).
    #[arg(long, default_value_t = DEFAULT_AVERAGE_GROUP_RATE_THRESHOLD)]
    pub block_subnet_avg_rpm_threshold: f64,

    /// Minimum first-to-last activity span in seconds (coordinated_sustained).
    #[arg(long, default_value_t = DEFAULT_MIN_ACTIVITY_SPAN_SECS)]
    pub block_min_timespan_seconds: i64,

    /// Block duration in minutes.
    #[arg(long, default_value_t = DEFAULT_BLOCK_DURATION_MINUTES)]
    pub block_duration: u64,

    /// Log firewall commands instead of running them.
    #[arg(long)]
    pub dry_run: bool,

    /// Write results to this file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Format of the results file.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Also append log messages to this file.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Increase verbosity (-v verbose, -vv debug).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl AnalyzeArgs {
    /// Validate the arguments.
    pub fn validate(&self) -> Result<(), CliError> {
        if self.top == 0 {
            return Err(CliError::InvalidTop(self.top));
        }
        if self.block_duration == 0 {
            return Err(CliError::InvalidBlockDuration(self.block_duration));
        }
        for (name, value) in [
            ("rate-threshold", self.rate_threshold),
            ("block-danger-threshold", self.block_danger_threshold),
            ("block-max-rpm-threshold", self.block_max_rpm_threshold),
            (
                "block-total-max-rpm-threshold",
                self.block_total_max_rpm_threshold,
            ),
            (
                "block-subnet-avg-rpm-threshold",
                self.block_subnet_avg_rpm_threshold,
            ),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(CliError::InvalidThreshold { name, value });
            }
        }
        if self.block_min_timespan_seconds < 0 {
            return Err(CliError::InvalidTimespan(self.block_min_timespan_seconds));
        }
        if let Some(ref raw) = self.start_date {
            parse_start_date(raw)?;
        }
        Ok(())
    }

    /// Start of the analysis window, if any.
    ///
    /// `--time-window` wins over `--start-date`.
    pub fn resolve_start<C: Clock + ?Sized>(
        &self,
        clock: &C,
    ) -> Result<Option<DateTime<Utc>>, CliError> {
        if let Some(window) = self.time_window {
            let secs = clock.before_secs(window.duration_secs());
            let start = i64::try_from(secs)
                .ok()
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                .ok_or_else(|| CliError::InvalidStartDate(secs.to_string()))?;
            return Ok(Some(start));
        }
        self.start_date.as_deref().map(parse_start_date).transpose()
    }

    /// Strategy thresholds from the flags.
    pub fn strategy_config(&self) -> StrategyConfig {
        StrategyConfig::default()
            .with_min_total_requests(self.block_threshold)
            .with_danger_threshold(self.block_danger_threshold)
            .with_member_count_threshold(self.block_ip_count_threshold)
            .with_peak_member_rate_threshold(self.block_max_rpm_threshold)
            .with_peak_group_rate_threshold(self.block_total_max_rpm_threshold)
            .with_average_group_rate_threshold(self.block_subnet_avg_rpm_threshold)
            .with_min_activity_span_secs(self.block_min_timespan_seconds)
    }

    /// Analyzer configuration from the flags and a loaded whitelist.
    pub fn analyzer_config(&self, whitelist: Whitelist) -> AnalyzerConfig {
        AnalyzerConfig::new()
            .with_rate_threshold(self.rate_threshold)
            .with_strategy(self.block_strategy)
            .with_thresholds(self.strategy_config())
            .with_top_n(self.top)
            .with_block_duration_minutes(self.block_duration)
            .with_dry_run(self.dry_run)
            .with_whitelist(whitelist)
    }
}

/// Arguments for the clean-rules command.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct CleanRulesArgs {
    /// Log deletions instead of running them.
    #[arg(long)]
    pub dry_run: bool,

    /// Also append log messages to this file.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Increase verbosity (-v verbose, -vv debug).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a `--start-date` value.
pub fn parse_start_date(raw: &str) -> Result<DateTime<Utc>, CliError> {
    parse_log_timestamp(raw).map_err(|_| CliError::InvalidStartDate(raw.to_string()))
}

/// Parse CLI arguments from an iterator of strings.
/// Useful for testing.
pub fn parse_from<I, T>(iter: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(iter)
}
