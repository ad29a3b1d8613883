//! Whitelist file loader.
//!
//! Format:
//! - One entry per line
//! - Lines starting with # are comments
//! - Empty lines are ignored
//! - Addresses: 10.0.0.1, 2001:db8::1
//! - Networks: 192.168.0.0/24, 2001:db8::/32

use std::path::Path;

use botstats_analyzer::{Whitelist, WhitelistError};
use botstats_fs::{Filesystem, FsError};
use thiserror::Error;

/// Errors from whitelist loading.
#[derive(Debug, Error)]
pub enum WhitelistLoadError {
    #[error("failed to read whitelist file: {0}")]
    Read(#[from] FsError),

    #[error("invalid entry on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: WhitelistError,
    },
}

/// Load a whitelist from a file.
pub fn load_whitelist<F: Filesystem + ?Sized>(
    fs: &F,
    path: &Path,
) -> Result<Whitelist, WhitelistLoadError> {
    let content = fs.read_file(path)?;
    parse_whitelist(&content)
}

/// Parse whitelist content from a string.
pub fn parse_whitelist(content: &str) -> Result<Whitelist, WhitelistLoadError> {
    let mut whitelist = Whitelist::empty();

    for (line_num, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        whitelist
            .add_entry_str(trimmed)
            .map_err(|source| WhitelistLoadError::Parse {
                line: line_num + 1,
                source,
            })?;
    }

    Ok(whitelist)
}
