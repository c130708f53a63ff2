//! Main `Fim` facade
//!
//! [`Fim`] ties the walker, baseline store, comparator, reporter and monitor
//! to one monitored root. Create it with [`FimBuilder`].
//!
//! ## Ignore Rules
//!
//! The effective rule set is the rules file (by default `.fimignore` at the
//! root; missing means empty) followed by any extra patterns. Independently
//! of the rules, the baseline file and any registered output files are never
//! part of a snapshot when they live under the root.

use crate::baseline::{BaselineStore, DEFAULT_BASELINE_FILE};
use crate::comparator;
use crate::error::{FimError, Result};
use crate::ignore_rules::{IgnoreRuleSet, DEFAULT_IGNORE_FILE};
use crate::monitor::{Monitor, MonitorOptions, MonitorStats, StopToken};
use crate::report::ReportSink;
use crate::types::{ChangeSet, WalkResult};
use crate::utils;
use crate::walker::Walker;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Resolved configuration of a [`Fim`] instance
#[derive(Debug, Clone)]
pub struct FimConfig {
    /// Canonical monitored root
    pub root: PathBuf,
    /// Baseline file location
    pub baseline_path: PathBuf,
    /// Rules file consulted at build time
    pub ignore_file: PathBuf,
    /// Patterns appended after the rules file
    pub extra_ignore_patterns: Vec<String>,
    /// Files never included in a snapshot, besides the baseline
    pub excluded_files: Vec<PathBuf>,
    /// Hashing threads
    pub parallel_workers: usize,
    /// Hashing read buffer size
    pub chunk_size: usize,
}

/// File-integrity monitor for one directory tree
///
/// # Examples
///
/// ```rust,no_run
/// use fim::FimBuilder;
/// use std::path::PathBuf;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let fim = FimBuilder::new()
///     .ignore_patterns(vec!["*.log".to_string()])
///     .build(PathBuf::from("/srv/www"))?;
///
/// fim.init()?;
/// // ... later
/// let changes = fim.scan()?;
/// println!("{} paths changed", changes.total_changes());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Fim {
    config: FimConfig,
    rules: IgnoreRuleSet,
    store: BaselineStore,
    excluded: Vec<String>,
}

impl Fim {
    /// Open `root` with the default configuration
    pub fn open(root: PathBuf) -> Result<Self> {
        FimBuilder::new().build(root)
    }

    /// Resolved configuration
    pub fn config(&self) -> &FimConfig {
        &self.config
    }

    /// Canonical monitored root
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Baseline store in use
    pub fn baseline_store(&self) -> &BaselineStore {
        &self.store
    }

    /// Effective ignore rules
    pub fn rules(&self) -> &IgnoreRuleSet {
        &self.rules
    }

    /// Walker configured for this root
    pub fn walker(&self) -> Walker {
        Walker::new(self.config.root.clone(), self.rules.clone())
            .with_excluded_paths(self.excluded.iter().cloned())
            .with_parallel_workers(self.config.parallel_workers)
            .with_chunk_size(self.config.chunk_size)
    }

    /// Walk the tree without touching the baseline
    pub fn snapshot(&self) -> Result<WalkResult> {
        self.walker().walk()
    }

    /// Record the current state as the baseline
    ///
    /// Overwrites any existing baseline.
    #[instrument(skip(self), fields(root = ?self.config.root))]
    pub fn init(&self) -> Result<WalkResult> {
        info!("Creating baseline at {:?}", self.store.path());
        self.record_baseline()
    }

    /// Replace the baseline with the current state
    #[instrument(skip(self), fields(root = ?self.config.root))]
    pub fn accept(&self) -> Result<WalkResult> {
        if self.store.exists() {
            info!("Replacing baseline at {:?}", self.store.path());
        } else {
            info!("No previous baseline; creating {:?}", self.store.path());
        }
        self.record_baseline()
    }

    /// Compare the current state against the baseline
    ///
    /// # Errors
    ///
    /// - [`FimError::BaselineNotFound`] if no baseline has been recorded
    /// - [`FimError::BaselineCorrupt`] if the stored baseline is invalid
    /// - [`FimError::IoAccess`] if the root cannot be walked
    #[instrument(skip(self), fields(root = ?self.config.root))]
    pub fn scan(&self) -> Result<ChangeSet> {
        let baseline = self.store.load()?;
        let result = self.snapshot()?;
        let changes =
            comparator::compare(&baseline, &result.snapshot).with_warnings(result.warnings);
        info!(
            "Scan found {} changes ({} warnings)",
            changes.total_changes(),
            changes.warnings.len()
        );
        Ok(changes)
    }

    /// Scan, emit one report, and optionally promote the scanned state
    ///
    /// With `accept_baseline` the snapshot just compared becomes the new
    /// baseline once the report has been written.
    pub fn scan_and_report(
        &self,
        sink: &mut dyn ReportSink,
        accept_baseline: bool,
    ) -> Result<ChangeSet> {
        let baseline = self.store.load()?;
        let result = self.snapshot()?;
        let changes =
            comparator::compare(&baseline, &result.snapshot).with_warnings(result.warnings);

        sink.emit(&changes)?;

        if accept_baseline {
            self.store.save(&result.snapshot)?;
            info!("Baseline updated at {:?}", self.store.path());
        }
        Ok(changes)
    }

    /// Run the monitor loop until stopped
    ///
    /// The baseline is loaded once before the first cycle; a missing or
    /// corrupt baseline fails immediately.
    pub async fn monitor(
        &self,
        options: MonitorOptions,
        sink: &mut dyn ReportSink,
        stop: StopToken,
    ) -> Result<MonitorStats> {
        let mut monitor = Monitor::from_store(self.walker(), &self.store, options)?;
        monitor.run(sink, stop).await
    }

    fn record_baseline(&self) -> Result<WalkResult> {
        let result = self.snapshot()?;
        self.store.save(&result.snapshot)?;
        info!(
            "Baseline holds {} files ({})",
            result.snapshot.len(),
            utils::format_bytes(result.snapshot.total_size())
        );
        Ok(result)
    }
}

/// Builder for [`Fim`] instances
///
/// # Default Values
///
/// - `baseline_path`: `<root>/.fim_baseline.json`
/// - `ignore_file`: `<root>/.fimignore`
/// - `ignore_patterns`: empty
/// - `parallel_workers`: number of CPU cores
/// - `chunk_size`: 1 MiB
#[derive(Debug)]
pub struct FimBuilder {
    baseline_path: Option<PathBuf>,
    ignore_file: Option<PathBuf>,
    ignore_patterns: Vec<String>,
    excluded_files: Vec<PathBuf>,
    parallel_workers: usize,
    chunk_size: usize,
}

impl FimBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            baseline_path: None,
            ignore_file: None,
            ignore_patterns: Vec::new(),
            excluded_files: Vec::new(),
            parallel_workers: num_cpus::get(),
            chunk_size: utils::DEFAULT_CHUNK_SIZE,
        }
    }

    /// Store the baseline at `path` instead of under the root
    pub fn baseline_path(mut self, path: PathBuf) -> Self {
        self.baseline_path = Some(path);
        self
    }

    /// Read ignore rules from `path` instead of `<root>/.fimignore`
    pub fn ignore_file(mut self, path: PathBuf) -> Self {
        self.ignore_file = Some(path);
        self
    }

    /// Extra patterns appended after the rules file
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Never include `path` in a snapshot, e.g. a report file under the root
    pub fn exclude_file(mut self, path: PathBuf) -> Self {
        self.excluded_files.push(path);
        self
    }

    /// Number of hashing threads (minimum 1)
    pub fn parallel_workers(mut self, count: usize) -> Self {
        self.parallel_workers = count.max(1);
        self
    }

    /// Hashing read buffer size in bytes
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Build a [`Fim`] for `root`
    ///
    /// # Errors
    ///
    /// - [`FimError::IoAccess`] if `root` does not exist or is not a directory
    /// - [`FimError::InvalidConfiguration`] for a zero chunk size
    /// - [`FimError::Io`] if an explicit rules file cannot be read
    pub fn build(self, root: PathBuf) -> Result<Fim> {
        if self.chunk_size == 0 {
            return Err(FimError::InvalidConfiguration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }

        let root = fs::canonicalize(&root)
            .map_err(|e| FimError::io_access(&root, e.to_string()))?;
        if !root.is_dir() {
            return Err(FimError::io_access(&root, "not a directory"));
        }

        let baseline_path = self
            .baseline_path
            .unwrap_or_else(|| root.join(DEFAULT_BASELINE_FILE));
        let ignore_file = self
            .ignore_file
            .unwrap_or_else(|| root.join(DEFAULT_IGNORE_FILE));

        let rules = IgnoreRuleSet::load(Some(&ignore_file))?.with_patterns(&self.ignore_patterns);

        let excluded: Vec<String> = std::iter::once(&baseline_path)
            .chain(self.excluded_files.iter())
            .filter_map(|path| relative_to_root(&root, path))
            .collect();
        debug!("Always excluded: {:?}", excluded);

        let store = BaselineStore::new(baseline_path.clone());
        let config = FimConfig {
            root,
            baseline_path,
            ignore_file,
            extra_ignore_patterns: self.ignore_patterns,
            excluded_files: self.excluded_files,
            parallel_workers: self.parallel_workers,
            chunk_size: self.chunk_size,
        };

        Ok(Fim {
            config,
            rules,
            store,
            excluded,
        })
    }
}

impl Default for FimBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Relative path of `path` under `root`, if it lies there
///
/// `path` need not exist yet; its deepest existing ancestor is resolved and
/// the missing components are appended.
fn relative_to_root(root: &Path, path: &Path) -> Option<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    let resolved = loop {
        match fs::canonicalize(existing) {
            Ok(resolved) => break missing.iter().rev().fold(resolved, |acc, part| acc.join(part)),
            Err(_) => {
                missing.push(existing.file_name()?);
                existing = existing.parent()?;
            }
        }
    };

    utils::to_posix_relative(&resolved, root).ok()
}
