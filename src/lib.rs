//! # fim - File integrity monitoring
//!
//! Records a cryptographic baseline of a directory tree and later reports
//! which files were added, removed, modified or only had their metadata
//! touched, once or on a repeating timer.
//!
//! ## Overview
//!
//! - **Walk**: enumerate regular files under a root, skip ignored paths, and
//!   hash each file's full content with SHA-256 in bounded chunks
//! - **Baseline**: persist a walk as JSON, replaced atomically
//! - **Compare**: classify the union of two snapshots into four disjoint sets
//! - **Report**: render a change set as pretty JSON or NDJSON
//! - **Monitor**: re-walk on an interval against the fixed baseline
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fim::{Fim, FimBuilder};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let fim = FimBuilder::new()
//!     .ignore_patterns(vec!["*.log".to_string(), "cache/**".to_string()])
//!     .build(PathBuf::from("/srv/www"))?;
//!
//! // Record the known-good state
//! fim.init()?;
//!
//! // ... later
//! let changes = fim.scan()?;
//! for path in &changes.modified {
//!     println!("modified: {}", path);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Working With Snapshots Directly
//!
//! The building blocks are plain functions over values, so two snapshots can
//! be compared without touching the disk:
//!
//! ```rust
//! use fim::{compare, ContentDigest, FileRecord, Snapshot};
//! use chrono::Utc;
//! use std::path::PathBuf;
//!
//! let record = |content: &[u8]| FileRecord {
//!     relative_path: "a.txt".to_string(),
//!     digest: ContentDigest::of_bytes(content),
//!     size_bytes: content.len() as u64,
//!     modified_time: Utc::now(),
//! };
//! let now = Utc::now();
//! let baseline = Snapshot::new(PathBuf::from("/r"), now, vec![record(b"one")]);
//! let current = Snapshot::new(PathBuf::from("/r"), now, vec![record(b"two")]);
//!
//! let changes = compare(&baseline, &current);
//! assert!(changes.modified.contains("a.txt"));
//! ```
//!
//! ## Change Classification
//!
//! For a path present in both snapshots the content digest is authoritative:
//! it is `modified` if the digests differ, otherwise `metadata_changed` if the
//! size or modification time (whole seconds) differ, otherwise unchanged.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`](error::Result) with a [`FimError`].
//! Per-file read failures during a walk are not errors: the file is left out
//! and a [`WalkWarning`] is recorded instead.
//!
//! ## Module Organization
//!
//! - [`fim`]: [`Fim`] facade and [`FimBuilder`]
//! - [`walker`]: directory traversal and hashing
//! - [`ignore_rules`]: glob-based ignore rules
//! - [`baseline`]: baseline persistence
//! - [`comparator`]: snapshot comparison
//! - [`report`]: report rendering and output
//! - [`monitor`]: interval monitoring loop
//! - [`types`]: common data structures
//! - [`error`]: error types

// Public API modules
pub mod baseline;
pub mod comparator;
pub mod error;
pub mod fim;
pub mod ignore_rules;
pub mod monitor;
pub mod report;
pub mod types;
pub mod utils;
pub mod walker;

// Re-export main types for convenience
pub use baseline::BaselineStore;
pub use comparator::compare;
pub use error::{FimError, Result};
pub use fim::{Fim, FimBuilder, FimConfig};
pub use ignore_rules::IgnoreRuleSet;
pub use monitor::{EmitPolicy, Monitor, MonitorOptions, MonitorState, MonitorStats, StopHandle, StopToken};
pub use report::{render, ReportDestination, ReportFormat, ReportSink, ReportTarget, ReportWriter};
pub use types::*;
pub use walker::Walker;
