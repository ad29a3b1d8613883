//! IO helpers for CLI operations.
//!
//! Provides utilities for:
//! - Loading whitelist files
//! - Rendering and writing analysis results (text, json, csv)

pub mod output_writer;
pub mod whitelist_loader;

pub use output_writer::{
    render, render_csv, render_json, render_text_report, report_status, OutputWriter,
    OutputWriterError, ReportContext, ReportStatus,
};
pub use whitelist_loader::{load_whitelist, parse_whitelist, WhitelistLoadError};
