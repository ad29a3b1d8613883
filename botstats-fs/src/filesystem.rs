//! Filesystem trait and implementations.
//!
//! The analyzer reads access logs through a seekable handle (reverse scans
//! start at the end of the file), so the trait hands out `Read + Seek`
//! readers rather than whole-file strings.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;

/// Errors from filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not valid UTF-8: {}", .0.display())]
    InvalidUtf8(PathBuf),
}

impl FsError {
    fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            FsError::NotFound(path.to_path_buf())
        } else {
            FsError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// A readable, seekable byte source.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Trait for filesystem operations.
/// Abstracted for testing with mock implementations.
pub trait Filesystem: Send + Sync {
    /// Open a file for (possibly backward) scanning.
    fn open_read(&self, path: &Path) -> Result<Box<dyn ReadSeek>, FsError>;

    /// Read file contents as a string.
    fn read_file(&self, path: &Path) -> Result<String, FsError>;

    /// Write data atomically to a path (write to temp, then rename).
    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), FsError>;

    /// Check if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Create directory and parents if needed.
    fn create_dir_all(&self, path: &Path) -> Result<(), FsError>;
}

/// Real filesystem implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFilesystem;

impl Filesystem for RealFilesystem {
    fn open_read(&self, path: &Path) -> Result<Box<dyn ReadSeek>, FsError> {
        let file = fs::File::open(path).map_err(|e| FsError::io(path, e))?;
        Ok(Box::new(file))
    }

    fn read_file(&self, path: &Path) -> Result<String, FsError> {
        fs::read_to_string(path).map_err(|e| FsError::io(path, e))
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        let temp_path = path.with_extension("tmp");

        fs::write(&temp_path, data).map_err(|e| FsError::io(&temp_path, e))?;

        // Rename is atomic on the same filesystem
        fs::rename(&temp_path, path).map_err(|e| FsError::io(path, e))?;

        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        fs::create_dir_all(path).map_err(|e| FsError::io(path, e))
    }
}

/// Mock filesystem for testing.
/// Cloning creates a new handle to the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct MockFilesystem {
    files: Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>,
    dirs: Arc<RwLock<HashSet<PathBuf>>>,
}

impl MockFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file directly (for test setup).
    pub fn add_file(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        self.files.write().unwrap().insert(path.into(), data.into());
    }

    /// Get content of a specific file.
    pub fn get_file(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.read().unwrap().get(path).cloned()
    }

    /// Get content of a specific file as a string.
    pub fn get_file_string(&self, path: &Path) -> Option<String> {
        self.get_file(path)
            .map(|data| String::from_utf8_lossy(&data).into_owned())
    }
}

impl Filesystem for MockFilesystem {
    fn open_read(&self, path: &Path) -> Result<Box<dyn ReadSeek>, FsError> {
        let data = self
            .get_file(path)
            .ok_or_else(|| FsError::NotFound(path.to_path_buf()))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn read_file(&self, path: &Path) -> Result<String, FsError> {
        let data = self
            .get_file(path)
            .ok_or_else(|| FsError::NotFound(path.to_path_buf()))?;
        String::from_utf8(data).map_err(|_| FsError::InvalidUtf8(path.to_path_buf()))
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        self.files
            .write()
            .unwrap()
            .insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.read().unwrap().contains_key(path) || self.dirs.read().unwrap().contains(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        self.dirs.write().unwrap().insert(path.to_path_buf());
        Ok(())
    }
}
