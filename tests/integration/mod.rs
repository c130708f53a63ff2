//! Integration tests for fim
//!
//! Drives a real directory through randomized mutations and checks every
//! scan against an in-memory model of what should have changed.

use ::fim::*;
use filetime::FileTime;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

/// Fixed mtime given to every file the harness writes, so that only the
/// mutations themselves move timestamps
const BASE_MTIME: i64 = 1_700_000_000;

/// Test harness pairing a monitored tree with a model of its expected state
pub struct FimTestHarness {
    pub temp_dir: TempDir,
    pub fim: Fim,
    pub rng: StdRng,
    /// Expected contents at the last `init`/`accept`
    pub baseline: BTreeMap<String, Vec<u8>>,
    /// Expected contents on disk now
    pub current: BTreeMap<String, Vec<u8>>,
    /// Paths touched without a content change since the baseline
    pub touched: BTreeSet<String>,
}

impl FimTestHarness {
    pub fn new(seed: u64) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let fim = FimBuilder::new()
            .parallel_workers(4)
            .build(temp_dir.path().to_path_buf())
            .unwrap();

        Self {
            temp_dir,
            fim,
            rng: StdRng::seed_from_u64(seed),
            baseline: BTreeMap::new(),
            current: BTreeMap::new(),
            touched: BTreeSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    fn absolute(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    pub fn write(&mut self, relative: &str, content: Vec<u8>) {
        let path = self.absolute(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, &content).unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(BASE_MTIME, 0)).unwrap();
        self.current.insert(relative.to_string(), content);
        self.touched.remove(relative);
    }

    pub fn populate(&mut self, count: usize) {
        for i in 0..count {
            let depth = self.rng.random_range(0..3);
            let mut relative = String::new();
            for d in 0..depth {
                relative.push_str(&format!("dir{}_{}/", d, self.rng.random_range(0..3)));
            }
            relative.push_str(&format!("file{}.dat", i));
            let content = self.random_content();
            self.write(&relative, content);
        }
    }

    fn random_content(&mut self) -> Vec<u8> {
        let len = self.rng.random_range(0..4096);
        (0..len).map(|_| self.rng.random::<u8>()).collect()
    }

    fn pick_existing(&mut self) -> Option<String> {
        if self.current.is_empty() {
            return None;
        }
        let idx = self.rng.random_range(0..self.current.len());
        self.current.keys().nth(idx).cloned()
    }

    pub fn accept(&mut self) {
        self.fim.accept().unwrap();
        self.baseline = self.current.clone();
        self.touched.clear();
    }

    /// Apply `count` random create/modify/delete/touch operations
    pub fn mutate(&mut self, count: usize) {
        for i in 0..count {
            match self.rng.random_range(0..4) {
                0 => {
                    let relative = format!("new/created{}.bin", i);
                    let content = self.random_content();
                    self.write(&relative, content);
                }
                1 => {
                    if let Some(relative) = self.pick_existing() {
                        let mut content = self.current[&relative].clone();
                        content.push(0xAB);
                        self.write(&relative, content);
                    }
                }
                2 => {
                    if let Some(relative) = self.pick_existing() {
                        fs::remove_file(self.absolute(&relative)).unwrap();
                        self.current.remove(&relative);
                        self.touched.remove(&relative);
                    }
                }
                _ => {
                    if let Some(relative) = self.pick_existing() {
                        let mtime = FileTime::from_unix_time(BASE_MTIME + 3600, 0);
                        filetime::set_file_mtime(self.absolute(&relative), mtime).unwrap();
                        self.touched.insert(relative);
                    }
                }
            }
        }
    }

    /// Change set the model predicts for a scan right now
    pub fn expected(&self) -> (BTreeSet<String>, BTreeSet<String>, BTreeSet<String>, BTreeSet<String>) {
        let mut added = BTreeSet::new();
        let mut removed = BTreeSet::new();
        let mut modified = BTreeSet::new();
        let mut metadata_changed = BTreeSet::new();

        for (path, content) in &self.current {
            match self.baseline.get(path) {
                None => {
                    added.insert(path.clone());
                }
                Some(old) if old != content => {
                    modified.insert(path.clone());
                }
                Some(old) if old.len() != content.len() || self.touched.contains(path) => {
                    metadata_changed.insert(path.clone());
                }
                Some(_) => {}
            }
        }
        for path in self.baseline.keys() {
            if !self.current.contains_key(path) {
                removed.insert(path.clone());
            }
        }

        (added, removed, modified, metadata_changed)
    }

    pub fn check_scan(&self) -> ChangeSet {
        let changes = self.fim.scan().unwrap();
        let (added, removed, modified, metadata_changed) = self.expected();
        assert_eq!(changes.added, added);
        assert_eq!(changes.removed, removed);
        assert_eq!(changes.modified, modified);
        assert_eq!(changes.metadata_changed, metadata_changed);
        assert!(changes.warnings.is_empty());
        changes
    }
}

#[test]
fn test_random_mutation_rounds() {
    for seed in [1u64, 7, 42] {
        let mut harness = FimTestHarness::new(seed);
        harness.populate(40);
        harness.fim.init().unwrap();
        harness.baseline = harness.current.clone();

        for round in 0..4 {
            harness.mutate(12);
            let changes = harness.check_scan();
            info!(
                "seed {} round {}: {} changes",
                seed,
                round,
                changes.total_changes()
            );

            if round % 2 == 1 {
                harness.accept();
                assert!(!harness.fim.scan().unwrap().has_changes());
            }
        }
    }
}

#[test]
fn test_snapshot_matches_walkdir_oracle() {
    let mut harness = FimTestHarness::new(99);
    harness.populate(60);
    fs::write(harness.root().join("skip.log"), "noise").unwrap();

    let rules = IgnoreRuleSet::from_patterns(["*.log"]);
    let result = Walker::new(harness.root().to_path_buf(), rules)
        .with_parallel_workers(3)
        .walk()
        .unwrap();

    let expected: BTreeSet<String> = walkdir::WalkDir::new(harness.root())
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            entry
                .path()
                .strip_prefix(harness.root())
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .filter(|relative| !relative.ends_with(".log"))
        .collect();

    let actual: BTreeSet<String> = result.snapshot.files().keys().cloned().collect();
    assert_eq!(actual, expected);

    for (relative, content) in &harness.current {
        let record = result.snapshot.get(relative).unwrap();
        assert_eq!(record.digest, ContentDigest::of_bytes(content));
        assert_eq!(record.size_bytes, content.len() as u64);
    }
}

#[test]
fn test_repeated_walks_are_identical() {
    let mut harness = FimTestHarness::new(5);
    harness.populate(30);

    let sequential = Walker::new(harness.root().to_path_buf(), IgnoreRuleSet::empty())
        .walk()
        .unwrap()
        .snapshot;
    let parallel = Walker::new(harness.root().to_path_buf(), IgnoreRuleSet::empty())
        .with_parallel_workers(8)
        .with_chunk_size(64)
        .walk()
        .unwrap()
        .snapshot;

    assert_eq!(sequential.files(), parallel.files());
    assert!(!compare(&sequential, &parallel).has_changes());
}

#[test]
fn test_ndjson_report_stream() {
    let mut harness = FimTestHarness::new(11);
    harness.populate(10);
    harness.fim.init().unwrap();
    harness.baseline = harness.current.clone();

    let out_dir = TempDir::new().unwrap();
    let report_path = out_dir.path().join("fim.ndjson");
    let target = ReportTarget::file(report_path.clone())
        .with_format(ReportFormat::Ndjson)
        .with_append(true);
    let mut writer = ReportWriter::new(target);

    for _ in 0..3 {
        harness.mutate(3);
        harness.fim.scan_and_report(&mut writer, false).unwrap();
    }

    let content = fs::read_to_string(&report_path).unwrap();
    let records: Vec<serde_json::Value> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 3);

    let (added, removed, modified, metadata_changed) = harness.expected();
    let last = &records[2]["changes"];
    let as_set = |value: &serde_json::Value| -> BTreeSet<String> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect()
    };
    assert_eq!(as_set(&last["added"]), added);
    assert_eq!(as_set(&last["removed"]), removed);
    assert_eq!(as_set(&last["modified"]), modified);
    assert_eq!(as_set(&last["metadata_changed"]), metadata_changed);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_through_facade() {
    let mut harness = FimTestHarness::new(3);
    harness.populate(8);
    harness.fim.init().unwrap();
    harness.write("late.txt", b"arrived".to_vec());

    let options = MonitorOptions::default()
        .with_interval(std::time::Duration::from_secs(5))
        .with_max_cycles(2)
        .with_emit(EmitPolicy::OnChange);
    let mut sink: Vec<ChangeSet> = Vec::new();

    let stats = harness
        .fim
        .monitor(options, &mut sink, StopToken::never())
        .await
        .unwrap();

    assert_eq!(stats.cycles, 2);
    assert_eq!(stats.reports_emitted, 2);
    assert!(sink.iter().all(|c| c.added.contains("late.txt")));
}
