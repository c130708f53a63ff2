//! Directory walking and content hashing
//!
//! The [`Walker`] traverses a root directory, filters entries through an
//! [`IgnoreRuleSet`], and hashes every surviving regular file into a
//! [`Snapshot`].
//!
//! ## Traversal
//!
//! - Directories are visited with [`walkdir`], which iterates without
//!   recursion, so arbitrarily deep trees never grow the call stack.
//! - Symbolic links are never followed into directories. A link that resolves
//!   to a regular file is hashed like a regular file.
//! - Directories, sockets, FIFOs and dangling links are not recorded.
//! - Ignore rules are checked on the relative path before the file is
//!   stat-ed or opened.
//! - Non-UTF-8 names are escaped into their relative path as described in
//!   [`utils::to_posix_relative`].
//!
//! ## Failure Model
//!
//! A root that is missing or not a directory fails the walk with
//! [`FimError::IoAccess`]. Anything below the root that vanishes or becomes
//! unreadable mid-walk is excluded from the snapshot and reported as a
//! [`WalkWarning`], as is a file whose modification time cannot be
//! represented; the walk always completes.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fim::ignore_rules::IgnoreRuleSet;
//! use fim::walker::Walker;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rules = IgnoreRuleSet::from_patterns(["*.tmp", "cache/**"]);
//! let result = Walker::new(PathBuf::from("/srv/www"), rules)
//!     .with_parallel_workers(4)
//!     .walk()?;
//!
//! println!("{} files, {} warnings", result.snapshot.len(), result.warnings.len());
//! # Ok(())
//! # }
//! ```

use crate::error::{FimError, Result};
use crate::ignore_rules::IgnoreRuleSet;
use crate::types::{FileRecord, Snapshot, WalkResult, WalkWarning};
use crate::utils;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// Walks a directory tree and produces snapshots
#[derive(Debug, Clone)]
pub struct Walker {
    /// Root directory to walk
    root: PathBuf,
    /// Ignore patterns applied to every file
    rules: IgnoreRuleSet,
    /// Relative paths that are always skipped (baseline and report files)
    excluded: BTreeSet<String>,
    /// Number of threads used for hashing
    parallel_workers: usize,
    /// Read buffer size for hashing
    chunk_size: usize,
}

/// A file that passed ignore filtering and is waiting to be hashed
#[derive(Debug, Clone)]
struct Candidate {
    path: PathBuf,
    relative_path: String,
}

impl Walker {
    /// Create a walker for `root` with sequential hashing
    pub fn new(root: PathBuf, rules: IgnoreRuleSet) -> Self {
        Self {
            root,
            rules,
            excluded: BTreeSet::new(),
            parallel_workers: 1,
            chunk_size: utils::DEFAULT_CHUNK_SIZE,
        }
    }

    /// Always skip these relative paths, regardless of ignore rules
    pub fn with_excluded_paths<I>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.excluded.extend(paths);
        self
    }

    /// Hash files on `workers` threads (minimum 1)
    pub fn with_parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers.max(1);
        self
    }

    /// Read files in chunks of `chunk_size` bytes (minimum 1)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Root directory being walked
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ignore rules in effect
    pub fn rules(&self) -> &IgnoreRuleSet {
        &self.rules
    }

    /// Walk the tree and hash every surviving file
    ///
    /// # Errors
    ///
    /// - [`FimError::IoAccess`] if the root is missing, not a directory, or
    ///   cannot be listed
    /// - [`FimError::ThreadPool`] if the hashing pool cannot be created
    pub fn walk(&self) -> Result<WalkResult> {
        let generated_at = utils::now_utc();
        let start = Instant::now();

        self.check_root()?;

        let mut warnings = Vec::new();
        let candidates = self.collect_candidates(&mut warnings)?;
        debug!(
            "Found {} candidate files under {:?}",
            candidates.len(),
            self.root
        );

        let outcomes = self.hash_candidates(&candidates)?;

        let mut records = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(record) => records.push(record),
                Err(warning) => {
                    warn!("Skipping {}", warning);
                    warnings.push(warning);
                }
            }
        }
        warnings.sort_by(|a, b| a.path.cmp(&b.path));

        let snapshot = Snapshot::new(self.root.clone(), generated_at, records);
        info!(
            "Walked {:?}: {} files ({}), {} warnings in {:?}",
            self.root,
            snapshot.len(),
            utils::format_bytes(snapshot.total_size()),
            warnings.len(),
            start.elapsed()
        );

        Ok(WalkResult { snapshot, warnings })
    }

    fn check_root(&self) -> Result<()> {
        let metadata = fs::metadata(&self.root)
            .map_err(|e| FimError::io_access(&self.root, e.to_string()))?;
        if !metadata.is_dir() {
            return Err(FimError::io_access(&self.root, "not a directory"));
        }
        Ok(())
    }

    /// Enumerate files below the root, applying ignore rules
    fn collect_candidates(&self, warnings: &mut Vec<WalkWarning>) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();

        // Does not follow symlinks below the root
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(FimError::io_access(&self.root, e.to_string()));
                }
                Err(e) => {
                    warnings.push(self.warning_for_walk_error(&e));
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }
            if !file_type.is_file() && !file_type.is_symlink() {
                trace!("Skipping special file {:?}", entry.path());
                continue;
            }

            let relative_path = match utils::to_posix_relative(entry.path(), &self.root) {
                Ok(rel) => rel,
                Err(e) => {
                    warnings.push(self.warning_for(entry.path(), e.to_string()));
                    continue;
                }
            };

            if self.excluded.contains(&relative_path) || self.rules.matches(&relative_path) {
                trace!("Ignoring {}", relative_path);
                continue;
            }

            if file_type.is_symlink() {
                match fs::metadata(entry.path()) {
                    Ok(target) if target.is_file() => {}
                    Ok(_) => {
                        debug!("Not following symlink {} (target is not a regular file)", relative_path);
                        continue;
                    }
                    Err(e) => {
                        debug!("Skipping dangling symlink {}: {}", relative_path, e);
                        continue;
                    }
                }
            }

            candidates.push(Candidate {
                path: entry.into_path(),
                relative_path,
            });
        }

        Ok(candidates)
    }

    /// Hash all candidates, in parallel when more than one worker is configured
    fn hash_candidates(
        &self,
        candidates: &[Candidate],
    ) -> Result<Vec<std::result::Result<FileRecord, WalkWarning>>> {
        if self.parallel_workers <= 1 || candidates.len() < 2 {
            return Ok(candidates.iter().map(|c| self.process_file(c)).collect());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallel_workers)
            .thread_name(|i| format!("fim-hash-{}", i))
            .build()
            .map_err(|e| FimError::ThreadPool(e.to_string()))?;

        Ok(pool.install(|| {
            candidates
                .par_iter()
                .map(|c| self.process_file(c))
                .collect()
        }))
    }

    /// Stat and hash one file
    fn process_file(&self, candidate: &Candidate) -> std::result::Result<FileRecord, WalkWarning> {
        let to_warning = |e: FimError| WalkWarning {
            path: candidate.relative_path.clone(),
            message: match e {
                FimError::Io(io) => io.to_string(),
                other => other.to_string(),
            },
        };

        let metadata = utils::get_file_metadata(&candidate.path).map_err(to_warning)?;
        let modified_time = utils::system_time_to_utc(metadata.modified).ok_or_else(|| WalkWarning {
            path: candidate.relative_path.clone(),
            message: format!("modification time out of range: {:?}", metadata.modified),
        })?;
        let digest = utils::hash_file_content(&candidate.path, self.chunk_size).map_err(to_warning)?;

        Ok(FileRecord {
            relative_path: candidate.relative_path.clone(),
            digest,
            size_bytes: metadata.size,
            modified_time,
        })
    }

    fn warning_for_walk_error(&self, error: &walkdir::Error) -> WalkWarning {
        let message = match error.io_error() {
            Some(io) => format!("cannot list directory: {}", io),
            None => error.to_string(),
        };
        match error.path() {
            Some(path) => self.warning_for(path, message),
            None => WalkWarning {
                path: String::new(),
                message,
            },
        }
    }

    fn warning_for(&self, path: &Path, message: String) -> WalkWarning {
        let display = utils::to_posix_relative(path, &self.root)
            .unwrap_or_else(|_| path.to_string_lossy().into_owned());
        WalkWarning {
            path: display,
            message,
        }
    }
}

/// Walk `root` with `rules` using the default configuration
///
/// Shorthand for `Walker::new(root, rules).walk()`.
pub fn walk(root: &Path, rules: &IgnoreRuleSet) -> Result<WalkResult> {
    Walker::new(root.to_path_buf(), rules.clone()).walk()
}
