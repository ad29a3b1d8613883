//! botstats command-line interface.
//!
//! Argument parsing, command orchestration, report output and the ufw
//! firewall integration for the `botstats` binary.

pub mod cli;
pub mod commands;
pub mod exit;
pub mod firewall;
pub mod io;
pub mod logger;

pub use cli::{
    parse_from, parse_start_date, AnalyzeArgs, CleanRulesArgs, Cli, CliError, Command,
    OutputFormat, TimeWindow,
};
pub use commands::{
    execute_analyze, execute_clean_rules, AnalyzeResult, CommandError, CommandResult,
};
pub use firewall::{CommandRunner, SystemCommandRunner, UfwRuleSink};
pub use logger::{Logger, StderrLogger, Verbosity};
