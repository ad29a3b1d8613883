//! Filesystem abstraction for botstats.
//!
//! This crate provides:
//! - Filesystem trait for reading access logs and whitelists and writing reports
//! - RealFilesystem backed by `std::fs`
//! - MockFilesystem for in-memory tests

pub mod filesystem;

pub use filesystem::{Filesystem, FsError, MockFilesystem, ReadSeek, RealFilesystem};
