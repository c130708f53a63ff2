//! Baseline persistence
//!
//! A baseline is a [`Snapshot`] persisted as pretty-printed JSON:
//!
//! ```json
//! {
//!   "schema": 1,
//!   "root": "/srv/www",
//!   "generated_at": "2024-05-01T12:00:00Z",
//!   "files": {
//!     "index.html": {
//!       "digest": "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
//!       "size_bytes": 5,
//!       "modified_time": "2024-04-30T08:15:02.123456789Z"
//!     }
//!   }
//! }
//! ```
//!
//! Saves go through [`utils::atomic_write`], so a crash mid-save leaves either
//! the previous baseline or the new one, never a truncated file. Loads are
//! strict: anything unparseable or missing `root`, `generated_at` or `files`
//! is [`FimError::BaselineCorrupt`], never an empty baseline.

use crate::error::{FimError, Result};
use crate::types::{ContentDigest, FileRecord, Snapshot};
use crate::utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Current on-disk format version
pub const BASELINE_SCHEMA: u32 = 1;

/// Default baseline file name placed at the monitored root
pub const DEFAULT_BASELINE_FILE: &str = ".fim_baseline.json";

/// On-disk form of a baseline
#[derive(Debug, Serialize, Deserialize)]
struct BaselineDocument {
    #[serde(default = "default_schema")]
    schema: u32,
    root: String,
    generated_at: DateTime<Utc>,
    files: BTreeMap<String, BaselineEntry>,
}

/// On-disk form of one file record; the path is the map key
#[derive(Debug, Serialize, Deserialize)]
struct BaselineEntry {
    digest: ContentDigest,
    size_bytes: u64,
    modified_time: DateTime<Utc>,
}

fn default_schema() -> u32 {
    BASELINE_SCHEMA
}

impl From<&Snapshot> for BaselineDocument {
    fn from(snapshot: &Snapshot) -> Self {
        let files = snapshot
            .records()
            .map(|record| {
                (
                    record.relative_path.clone(),
                    BaselineEntry {
                        digest: record.digest,
                        size_bytes: record.size_bytes,
                        modified_time: record.modified_time,
                    },
                )
            })
            .collect();

        Self {
            schema: BASELINE_SCHEMA,
            root: snapshot.root().to_string_lossy().into_owned(),
            generated_at: snapshot.generated_at(),
            files,
        }
    }
}

/// Location of a persisted baseline
#[derive(Debug, Clone)]
pub struct BaselineStore {
    path: PathBuf,
}

impl BaselineStore {
    /// Store backed by the file at `path`
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store at the default location under `root`
    pub fn for_root(root: &Path) -> Self {
        Self::new(root.join(DEFAULT_BASELINE_FILE))
    }

    /// Path of the baseline file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a baseline file exists
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Persist `snapshot`, replacing any previous baseline atomically
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        save(snapshot, &self.path)
    }

    /// Read the baseline back
    pub fn load(&self) -> Result<Snapshot> {
        load(&self.path)
    }
}

/// Persist `snapshot` to `destination`
///
/// Missing parent directories are created.
pub fn save(snapshot: &Snapshot, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let document = BaselineDocument::from(snapshot);
    let mut json = serde_json::to_string_pretty(&document)?;
    json.push('\n');
    utils::atomic_write(destination, json.as_bytes())?;

    info!(
        "Saved baseline with {} files to {:?}",
        snapshot.len(),
        destination
    );
    Ok(())
}

/// Load a baseline from `source`
///
/// # Errors
///
/// - [`FimError::BaselineNotFound`] if `source` does not exist
/// - [`FimError::BaselineCorrupt`] if it is not a valid baseline document
/// - [`FimError::Io`] if it exists but cannot be read
pub fn load(source: &Path) -> Result<Snapshot> {
    let bytes = match fs::read(source) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FimError::BaselineNotFound(source.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let document: BaselineDocument = serde_json::from_slice(&bytes)
        .map_err(|e| FimError::baseline_corrupt(source, e.to_string()))?;

    if document.schema != BASELINE_SCHEMA {
        return Err(FimError::baseline_corrupt(
            source,
            format!("unsupported schema version {}", document.schema),
        ));
    }

    let mut records = Vec::with_capacity(document.files.len());
    for (relative_path, entry) in document.files {
        if !is_valid_relative_path(&relative_path) {
            return Err(FimError::baseline_corrupt(
                source,
                format!("invalid file path {:?}", relative_path),
            ));
        }
        records.push(FileRecord {
            relative_path,
            digest: entry.digest,
            size_bytes: entry.size_bytes,
            modified_time: entry.modified_time,
        });
    }

    let snapshot = Snapshot::new(PathBuf::from(document.root), document.generated_at, records);
    debug!("Loaded baseline with {} files from {:?}", snapshot.len(), source);
    Ok(snapshot)
}

fn is_valid_relative_path(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}
