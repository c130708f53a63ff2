//! Change reports
//!
//! [`render`] turns a [`ChangeSet`] into report text; it has no side effects.
//! Where that text goes is decided by a [`ReportSink`]: [`ReportWriter`]
//! writes to stdout or a file according to a [`ReportTarget`].
//!
//! ## Report Layout
//!
//! ```json
//! {
//!   "root": "/srv/www",
//!   "generated_at": "2024-05-01T12:00:00Z",
//!   "changes": {
//!     "added": ["b.txt"],
//!     "removed": [],
//!     "modified": ["a.txt"],
//!     "metadata_changed": []
//!   }
//! }
//! ```
//!
//! Path arrays are sorted lexicographically. A `warnings` array of
//! `{path, message}` objects follows `changes` when the walk skipped files.
//!
//! ## Report Files
//!
//! | Format | Overwrite | Append |
//! |---|---|---|
//! | NDJSON | one line | one line per report |
//! | Pretty JSON | one object | a JSON array, one element per report |
//!
//! Appending pretty JSON reads the existing file and pushes onto its array;
//! a file holding a single object becomes a two-element array. A file that is
//! not JSON is replaced by a new array. Missing parent directories are
//! created.

use crate::error::Result;
use crate::types::{ChangeSet, WalkWarning};
use crate::utils;
use chrono::SecondsFormat;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Serialization format of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// One indented JSON object
    #[default]
    JsonPretty,
    /// One JSON object per line
    Ndjson,
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    root: String,
    generated_at: String,
    changes: ChangesDocument<'a>,
    #[serde(skip_serializing_if = "<[WalkWarning]>::is_empty")]
    warnings: &'a [WalkWarning],
}

#[derive(Serialize)]
struct ChangesDocument<'a> {
    added: &'a BTreeSet<String>,
    removed: &'a BTreeSet<String>,
    modified: &'a BTreeSet<String>,
    metadata_changed: &'a BTreeSet<String>,
}

impl<'a> From<&'a ChangeSet> for ReportDocument<'a> {
    fn from(changes: &'a ChangeSet) -> Self {
        Self {
            root: changes.root.to_string_lossy().into_owned(),
            generated_at: changes
                .generated_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            changes: ChangesDocument {
                added: &changes.added,
                removed: &changes.removed,
                modified: &changes.modified,
                metadata_changed: &changes.metadata_changed,
            },
            warnings: &changes.warnings,
        }
    }
}

/// Render `changes` as report text
///
/// The result has no trailing newline. NDJSON output is guaranteed to be a
/// single line.
pub fn render(changes: &ChangeSet, format: ReportFormat) -> Result<String> {
    let document = ReportDocument::from(changes);
    let text = match format {
        ReportFormat::JsonPretty => serde_json::to_string_pretty(&document)?,
        ReportFormat::Ndjson => serde_json::to_string(&document)?,
    };
    Ok(text)
}

/// Where reports are written
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReportDestination {
    /// Standard output
    #[default]
    Stdout,
    /// A file, created if missing
    File(PathBuf),
}

/// Destination, format and write mode for reports
#[derive(Debug, Clone, Default)]
pub struct ReportTarget {
    /// Where to write
    pub destination: ReportDestination,
    /// How to serialize
    pub format: ReportFormat,
    /// Append to a file instead of replacing it
    pub append: bool,
}

impl ReportTarget {
    /// Pretty JSON on stdout
    pub fn stdout() -> Self {
        Self::default()
    }

    /// Report file at `path`, replaced on every write
    pub fn file(path: PathBuf) -> Self {
        Self {
            destination: ReportDestination::File(path),
            ..Self::default()
        }
    }

    /// Set the serialization format
    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.format = format;
        self
    }

    /// Append to the report file instead of replacing it
    pub fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    /// Report file path, if any
    pub fn file_path(&self) -> Option<&Path> {
        match &self.destination {
            ReportDestination::File(path) => Some(path),
            ReportDestination::Stdout => None,
        }
    }
}

/// Consumer of rendered change sets
pub trait ReportSink: Send {
    /// Deliver one report
    fn emit(&mut self, changes: &ChangeSet) -> Result<()>;
}

/// Collects change sets in memory
impl ReportSink for Vec<ChangeSet> {
    fn emit(&mut self, changes: &ChangeSet) -> Result<()> {
        self.push(changes.clone());
        Ok(())
    }
}

/// Writes rendered reports to a [`ReportTarget`]
///
/// Every call to [`emit`](ReportSink::emit) opens, writes, flushes and closes
/// its handle, so a stop between reports never leaves a half-written record.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    target: ReportTarget,
    written: usize,
}

impl ReportWriter {
    /// Writer for `target`
    pub fn new(target: ReportTarget) -> Self {
        Self { target, written: 0 }
    }

    /// Configured target
    pub fn target(&self) -> &ReportTarget {
        &self.target
    }

    /// Number of reports written so far
    pub fn written(&self) -> usize {
        self.written
    }

    fn write_text(&self, text: &str) -> Result<()> {
        match &self.target.destination {
            ReportDestination::Stdout => {
                let stdout = std::io::stdout();
                let mut handle = stdout.lock();
                handle.write_all(text.as_bytes())?;
                handle.write_all(b"\n")?;
                handle.flush()?;
            }
            ReportDestination::File(path) if self.target.append => {
                create_parent_dirs(path)?;
                let mut file = OpenOptions::new().create(true).append(true).open(path)?;
                let mut line = String::with_capacity(text.len() + 1);
                line.push_str(text);
                line.push('\n');
                file.write_all(line.as_bytes())?;
                file.flush()?;
                file.sync_data()?;
            }
            ReportDestination::File(path) => {
                create_parent_dirs(path)?;
                let mut content = String::with_capacity(text.len() + 1);
                content.push_str(text);
                content.push('\n');
                utils::atomic_write(path, content.as_bytes())?;
            }
        }
        Ok(())
    }
}

/// Push one report onto the JSON array stored at `path`
fn append_to_json_array(path: &Path, changes: &ChangeSet) -> Result<()> {
    let entry = serde_json::to_value(ReportDocument::from(changes))?;

    let mut reports = match fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Vec::new(),
        Ok(text) => match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(serde_json::Value::Array(items)) => items,
            Ok(single) => vec![single],
            Err(e) => {
                warn!("Report file {:?} is not JSON ({}), starting a new array", path, e);
                Vec::new()
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    reports.push(entry);

    let mut content = serde_json::to_string_pretty(&reports)?;
    content.push('\n');
    create_parent_dirs(path)?;
    utils::atomic_write(path, content.as_bytes())
}

fn create_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

impl ReportSink for ReportWriter {
    fn emit(&mut self, changes: &ChangeSet) -> Result<()> {
        match (&self.target.destination, self.target.format) {
            (ReportDestination::File(path), ReportFormat::JsonPretty) if self.target.append => {
                append_to_json_array(path, changes)?;
            }
            _ => {
                let text = render(changes, self.target.format)?;
                self.write_text(&text)?;
            }
        }
        self.written += 1;

        match &self.target.destination {
            ReportDestination::Stdout => trace!("Wrote report to stdout"),
            ReportDestination::File(path) => debug!("Wrote report to {:?}", path),
        }
        Ok(())
    }
}
