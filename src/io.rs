//! Bounded I/O utilities for safe file reading.
//!
//! All binary reads in the crate go through this module so that a
//! hostile or truncated input can never make an extractor allocate or
//! map more than the configured limits. Large files are memory-mapped;
//! small ones are read into an owned buffer.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use memmap2::Mmap;
use tracing::{debug, warn};

use crate::error::{Result, TelcharError};

/// Maximum size to read for initial format sniffing (16 bytes covers
/// every supported magic, rounded up to a small prefix).
pub const MAX_SNIFF_SIZE: usize = 64;

/// File sizes at or above this threshold are memory-mapped instead of
/// read into a heap buffer.
const MMAP_THRESHOLD: u64 = 4 * 1024 * 1024;

/// Resource limits for I/O operations.
#[derive(Debug, Clone)]
pub struct IOLimits {
    pub max_read_bytes: u64,
    pub max_file_size: u64,
}

impl Default for IOLimits {
    fn default() -> Self {
        Self {
            max_read_bytes: 256 * 1024 * 1024, // 256MB
            max_file_size: 1024 * 1024 * 1024, // 1GB
        }
    }
}

/// The bytes of one binary, either owned or mapped.
///
/// Derefs to `&[u8]` so extractors are agnostic to how the file was
/// loaded. The mapping lives as long as this value.
pub enum FileBytes {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl std::ops::Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FileBytes::Owned(v) => v,
            FileBytes::Mapped(m) => m,
        }
    }
}

/// Read an entire binary within the given limits.
///
/// Returns `FileNotFound` if the path does not exist, and
/// `MalformedBinary` if the file exceeds `max_file_size`: a file too
/// large to inspect is treated the same as one we cannot parse.
pub fn read_binary(path: &Path, limits: &IOLimits) -> Result<FileBytes> {
    if !path.exists() {
        return Err(TelcharError::FileNotFound(path.display().to_string()));
    }
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    if size > limits.max_file_size {
        warn!(path = %path.display(), size, "file exceeds size limit");
        return Err(TelcharError::MalformedBinary(format!(
            "{} exceeds maximum file size",
            path.display()
        )));
    }
    let to_read = size.min(limits.max_read_bytes);
    if to_read >= MMAP_THRESHOLD {
        // Mapping is read-only; the file is never written back.
        let mmap = unsafe { Mmap::map(&file)? };
        debug!(path = %path.display(), size, "mapped binary");
        return Ok(FileBytes::Mapped(mmap));
    }
    let mut buf = Vec::with_capacity(to_read as usize);
    file.take(to_read).read_to_end(&mut buf)?;
    debug!(path = %path.display(), bytes = buf.len(), "read binary");
    Ok(FileBytes::Owned(buf))
}

/// Read at most `len` bytes from the start of the file.
///
/// A short file yields a short buffer, not an error; format detection
/// treats an insufficient prefix as `Unknown`.
pub fn read_prefix(path: &Path, len: usize) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(TelcharError::FileNotFound(path.display().to_string()));
    }
    let file = File::open(path)?;
    let mut buf = Vec::with_capacity(len);
    file.take(len as u64).read_to_end(&mut buf)?;
    Ok(buf)
}
