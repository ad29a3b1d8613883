//! Exit codes for the botstats CLI.
//!
//! Following Unix conventions for exit codes.

use crate::commands::CommandError;

/// Exit code constants.
pub mod codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Invalid arguments.
    pub const INVALID_ARGS: i32 = 1;
    /// Log file or filesystem error.
    pub const IO_ERROR: i32 = 2;
    /// Results could not be written.
    pub const OUTPUT_ERROR: i32 = 3;
    /// Whitelist could not be loaded.
    pub const WHITELIST_ERROR: i32 = 4;
    /// Firewall command failed.
    pub const FIREWALL_ERROR: i32 = 5;
}

/// Map a CommandError to an exit code.
pub fn exit_code(error: &CommandError) -> i32 {
    match error {
        CommandError::InvalidArgument(_) => codes::INVALID_ARGS,
        CommandError::Filesystem(_) => codes::IO_ERROR,
        CommandError::Scan(_) => codes::IO_ERROR,
        CommandError::Output(_) => codes::OUTPUT_ERROR,
        CommandError::Whitelist(_) => codes::WHITELIST_ERROR,
        CommandError::Firewall(_) => codes::FIREWALL_ERROR,
    }
}
