//! Core data types used throughout the fim library
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **File System State**: [`FileRecord`], [`Snapshot`] - one walk of the monitored tree
//! - **Content Identity**: [`ContentDigest`] - SHA-256 of a file's full contents
//! - **Differences**: [`ChangeSet`], [`ChangeKind`] - four-way classification of two snapshots
//! - **Walk Diagnostics**: [`WalkWarning`], [`WalkResult`] - files skipped during a walk
//!
//! ## Examples
//!
//! ```rust
//! use fim::types::{ContentDigest, FileRecord, Snapshot};
//! use chrono::{TimeZone, Utc};
//! use std::path::PathBuf;
//!
//! let record = FileRecord {
//!     relative_path: "etc/app.conf".to_string(),
//!     digest: ContentDigest::of_bytes(b"listen 8080\n"),
//!     size_bytes: 12,
//!     modified_time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
//! };
//! let snapshot = Snapshot::new(PathBuf::from("/srv"), Utc::now(), vec![record]);
//! assert_eq!(snapshot.len(), 1);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Length of a content digest in bytes (256 bits)
pub const DIGEST_LEN: usize = 32;

/// SHA-256 digest of a file's full contents
///
/// Rendered and persisted as 64 lowercase hexadecimal characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; DIGEST_LEN]);

impl ContentDigest {
    /// Wrap raw digest bytes
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Digest of an in-memory buffer
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hexadecimal form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hexadecimal string
    pub fn from_hex(s: &str) -> std::result::Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", &self.to_hex()[..16])
    }
}

impl FromStr for ContentDigest {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(|e| serde::de::Error::custom(format!("invalid digest {:?}: {}", s, e)))
    }
}

/// One regular file that survived ignore filtering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// POSIX-style path relative to the monitored root; unique within a snapshot
    pub relative_path: String,
    /// SHA-256 of the full contents
    pub digest: ContentDigest,
    /// File size at hash time
    pub size_bytes: u64,
    /// Last modification time from filesystem metadata
    pub modified_time: DateTime<Utc>,
}

impl FileRecord {
    /// Whether size or modification time differ from `other`
    ///
    /// Modification times are compared at whole-second resolution so that a
    /// baseline written on a filesystem with coarse timestamps does not flag
    /// every file after a copy.
    pub fn metadata_differs(&self, other: &FileRecord) -> bool {
        self.size_bytes != other.size_bytes
            || self.modified_time.timestamp() != other.modified_time.timestamp()
    }
}

/// Point-in-time mapping from relative path to [`FileRecord`]
///
/// Produced by the walker and immutable afterwards. Records are keyed and
/// iterated by path, so two snapshots of the same tree compare equal
/// regardless of traversal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    root: PathBuf,
    generated_at: DateTime<Utc>,
    files: BTreeMap<String, FileRecord>,
}

impl Snapshot {
    /// Assemble a snapshot from records
    ///
    /// If two records share a path the later one wins.
    pub fn new(
        root: PathBuf,
        generated_at: DateTime<Utc>,
        records: impl IntoIterator<Item = FileRecord>,
    ) -> Self {
        let files = records
            .into_iter()
            .map(|record| (record.relative_path.clone(), record))
            .collect();
        Self {
            root,
            generated_at,
            files,
        }
    }

    /// Snapshot with no files
    pub fn empty(root: PathBuf, generated_at: DateTime<Utc>) -> Self {
        Self::new(root, generated_at, Vec::new())
    }

    /// Root directory the snapshot was taken of
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// UTC time the walk started
    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// All records keyed by relative path
    pub fn files(&self) -> &BTreeMap<String, FileRecord> {
        &self.files
    }

    /// Look up a single record
    pub fn get(&self, relative_path: &str) -> Option<&FileRecord> {
        self.files.get(relative_path)
    }

    /// Whether the snapshot tracks `relative_path`
    pub fn contains(&self, relative_path: &str) -> bool {
        self.files.contains_key(relative_path)
    }

    /// Iterate over records in path order
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }

    /// Number of tracked files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no files are tracked
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of all tracked file sizes
    pub fn total_size(&self) -> u64 {
        self.files.values().map(|r| r.size_bytes).sum()
    }
}

/// A file that was seen during a walk but could not be recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkWarning {
    /// Relative path of the file (or directory) that was skipped
    pub path: String,
    /// Why it was skipped
    pub message: String,
}

impl fmt::Display for WalkWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Output of one walk: the snapshot plus everything that had to be skipped
#[derive(Debug, Clone)]
pub struct WalkResult {
    /// Files that were hashed successfully
    pub snapshot: Snapshot,
    /// Files that vanished or became unreadable mid-walk
    pub warnings: Vec<WalkWarning>,
}

/// Category a path falls into when two snapshots are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Present only in the current snapshot
    Added,
    /// Present only in the baseline
    Removed,
    /// Content digest differs
    Modified,
    /// Same digest, different size or modification time
    MetadataChanged,
}

impl ChangeKind {
    /// Report key for this category
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Removed => "removed",
            ChangeKind::Modified => "modified",
            ChangeKind::MetadataChanged => "metadata_changed",
        }
    }
}

/// Four disjoint sets of paths describing how a tree drifted from its baseline
///
/// Path sets are `BTreeSet`s, so iteration and rendering are lexicographically
/// sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    /// Root of the current snapshot
    pub root: PathBuf,
    /// Timestamp of the current snapshot
    pub generated_at: DateTime<Utc>,
    /// Paths in current but not in baseline
    pub added: BTreeSet<String>,
    /// Paths in baseline but not in current
    pub removed: BTreeSet<String>,
    /// Paths whose digest differs
    pub modified: BTreeSet<String>,
    /// Paths with identical digest but different size or mtime
    pub metadata_changed: BTreeSet<String>,
    /// Walk warnings attached by the caller; `compare` leaves this empty
    pub warnings: Vec<WalkWarning>,
}

impl ChangeSet {
    /// Empty change set for `root`
    pub fn new(root: PathBuf, generated_at: DateTime<Utc>) -> Self {
        Self {
            root,
            generated_at,
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
            modified: BTreeSet::new(),
            metadata_changed: BTreeSet::new(),
            warnings: Vec::new(),
        }
    }

    /// Attach walk warnings from the scan that produced the current snapshot
    pub fn with_warnings(mut self, warnings: Vec<WalkWarning>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Check if there are any changes
    ///
    /// Warnings alone do not count as changes.
    pub fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }

    /// Number of paths across all four categories
    pub fn total_changes(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len() + self.metadata_changed.len()
    }

    /// Category of `path`, or `None` if it is unchanged or unknown
    pub fn kind_of(&self, path: &str) -> Option<ChangeKind> {
        if self.added.contains(path) {
            Some(ChangeKind::Added)
        } else if self.removed.contains(path) {
            Some(ChangeKind::Removed)
        } else if self.modified.contains(path) {
            Some(ChangeKind::Modified)
        } else if self.metadata_changed.contains(path) {
            Some(ChangeKind::MetadataChanged)
        } else {
            None
        }
    }

    /// Paths of one category in sorted order
    pub fn paths(&self, kind: ChangeKind) -> &BTreeSet<String> {
        match kind {
            ChangeKind::Added => &self.added,
            ChangeKind::Removed => &self.removed,
            ChangeKind::Modified => &self.modified,
            ChangeKind::MetadataChanged => &self.metadata_changed,
        }
    }
}
