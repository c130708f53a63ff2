//! Utility functions for fim
//!
//! This module provides the small filesystem helpers the walker, baseline store
//! and report sinks share.
//!
//! ### File Operations
//! - Streaming file content hashing (SHA-256, bounded buffer)
//! - File metadata extraction
//! - Atomic file writing (temporary file + rename)
//!
//! ### Path Manipulation
//! - Converting paths under the root into POSIX-style relative strings
//!
//! ### Time
//! - Checked conversion of filesystem timestamps to UTC
//! - Second-resolution UTC timestamps
//!
//! ### Formatting
//! - Byte formatting (human-readable sizes)

use crate::error::{FimError, Result};
use crate::types::ContentDigest;
use chrono::{DateTime, SubsecRound, Utc};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::borrow::Cow;
use std::ffi::OsStr;
use std::path::{Component, Path};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use tracing::trace;

/// Default read buffer for hashing (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Hash a file's content using SHA-256
///
/// The file is read in chunks of at most `chunk_size` bytes, so memory use
/// stays bounded regardless of file size.
///
/// # Errors
///
/// - [`FimError::Io`] if the file cannot be opened or a read fails
pub fn hash_file_content(path: &Path, chunk_size: usize) -> Result<ContentDigest> {
    let file = File::open(path)?;
    hash_reader(file, chunk_size)
}

/// Hash everything `reader` yields using SHA-256
pub fn hash_reader<R: Read>(mut reader: R, chunk_size: usize) -> Result<ContentDigest> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(ContentDigest::from_bytes(hasher.finalize().into()))
}

/// File metadata container
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,
    /// Last modification timestamp
    pub modified: SystemTime,
}

/// Get metadata of the file `path` resolves to
///
/// Symbolic links are followed, so a link to a regular file reports the
/// target's size and modification time.
pub fn get_file_metadata(path: &Path) -> Result<FileMetadata> {
    let metadata = fs::metadata(path)?;

    Ok(FileMetadata {
        size: metadata.len(),
        modified: metadata.modified()?,
    })
}

/// Convert a filesystem timestamp to UTC
///
/// Times before the Unix epoch are supported. Returns `None` when the time
/// lies outside the range [`DateTime`] can represent; some filesystems store
/// 64-bit second counts that exceed it.
pub fn system_time_to_utc(time: SystemTime) -> Option<DateTime<Utc>> {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => {
            let secs = i64::try_from(after.as_secs()).ok()?;
            DateTime::from_timestamp(secs, after.subsec_nanos())
        }
        Err(e) => {
            let before = e.duration();
            let secs = i64::try_from(before.as_secs()).ok()?;
            match before.subsec_nanos() {
                0 => DateTime::from_timestamp(-secs, 0),
                nanos => DateTime::from_timestamp(-secs - 1, 1_000_000_000 - nanos),
            }
        }
    }
}

/// Convert `path` into a forward-slash path relative to `base`
///
/// The result is identical on every platform, which keeps baselines portable.
/// On Unix, a component that is not valid UTF-8 is escaped: each invalid
/// byte becomes `\xNN` and each backslash becomes `\\`, so two such names
/// never share a key.
///
/// # Errors
///
/// - [`FimError::Internal`] if `path` is not under `base`, or a component is
///   not valid UTF-8 on a platform without byte-level names
pub fn to_posix_relative(path: &Path, base: &Path) -> Result<String> {
    let relative = path.strip_prefix(base).map_err(|_| {
        FimError::internal(format!("Path {:?} is not relative to {:?}", path, base))
    })?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = component_to_str(part).ok_or_else(|| {
                    FimError::internal(format!("Non UTF-8 path component in {:?}", path))
                })?;
                parts.push(part);
            }
            Component::CurDir => {}
            other => {
                return Err(FimError::internal(format!(
                    "Unexpected component {:?} in {:?}",
                    other, path
                )))
            }
        }
    }

    Ok(parts.join("/"))
}

#[cfg(unix)]
fn component_to_str(part: &OsStr) -> Option<Cow<'_, str>> {
    use std::fmt::Write as _;
    use std::os::unix::ffi::OsStrExt;

    if let Some(valid) = part.to_str() {
        return Some(Cow::Borrowed(valid));
    }

    let mut escaped = String::new();
    for chunk in part.as_bytes().utf8_chunks() {
        escaped.push_str(&chunk.valid().replace('\\', "\\\\"));
        for byte in chunk.invalid() {
            let _ = write!(escaped, "\\x{:02x}", byte);
        }
    }
    Some(Cow::Owned(escaped))
}

#[cfg(not(unix))]
fn component_to_str(part: &OsStr) -> Option<Cow<'_, str>> {
    part.to_str().map(Cow::Borrowed)
}

/// Current UTC time truncated to whole seconds
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Format bytes in human-readable form
///
/// ```rust,ignore
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Atomic file write (write to temp file then rename)
///
/// The temporary file is created in the target's directory so the final
/// rename never crosses filesystems. Readers see either the previous file or
/// the complete new one, never a truncated write. If any step fails the
/// temporary file is removed.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| FimError::Io(e.error))?;

    trace!("Atomically wrote {} bytes to {:?}", content.len(), path);
    Ok(())
}
