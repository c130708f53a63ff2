//! Property-based testing for fim
//!
//! Uses proptest to check the comparison, persistence and ignore invariants
//! over randomly generated snapshots and paths.

use ::fim::*;
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Generate short relative paths from a small alphabet so that independently
/// generated snapshots overlap
fn path_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-d]{1,2}\\.txt",
        "[a-c]{1,2}/[a-d]{1,2}\\.txt",
        "[a-b]/[a-b]/[a-c]\\.bin",
    ]
}

/// Generate small file contents, drawn from few values to provoke equal digests
fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        Just(Vec::new()),
        prop::collection::vec(0u8..4, 1..4),
        prop::collection::vec(any::<u8>(), 1..64),
    ]
}

fn time_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..3, 0u32..1_000_000_000)
        .prop_map(|(secs, nanos)| Utc.timestamp_opt(1_700_000_000 + secs, nanos).unwrap())
}

fn record_strategy() -> impl Strategy<Value = FileRecord> {
    (path_strategy(), content_strategy(), time_strategy()).prop_map(|(path, content, mtime)| {
        FileRecord {
            relative_path: path,
            digest: ContentDigest::of_bytes(&content),
            size_bytes: content.len() as u64,
            modified_time: mtime,
        }
    })
}

fn snapshot_strategy() -> impl Strategy<Value = Snapshot> {
    (prop::collection::vec(record_strategy(), 0..24), time_strategy()).prop_map(
        |(records, generated_at)| Snapshot::new(PathBuf::from("/watched"), generated_at, records),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_compare_with_self_is_empty(snapshot in snapshot_strategy()) {
        let changes = compare(&snapshot, &snapshot);
        prop_assert!(!changes.has_changes());
        prop_assert_eq!(changes.generated_at, snapshot.generated_at());
    }

    #[test]
    fn prop_categories_partition_the_union(
        baseline in snapshot_strategy(),
        current in snapshot_strategy(),
    ) {
        let changes = compare(&baseline, &current);

        let union: BTreeSet<&String> = baseline.files().keys().chain(current.files().keys()).collect();
        let mut seen = BTreeSet::new();

        for path in union {
            let kind = changes.kind_of(path);
            let in_categories = [
                &changes.added,
                &changes.removed,
                &changes.modified,
                &changes.metadata_changed,
            ]
            .iter()
            .filter(|set| set.contains(path))
            .count();
            prop_assert!(in_categories <= 1, "{} is in {} categories", path, in_categories);

            let expected = match (baseline.get(path), current.get(path)) {
                (None, Some(_)) => Some(ChangeKind::Added),
                (Some(_), None) => Some(ChangeKind::Removed),
                (Some(old), Some(new)) if old.digest != new.digest => Some(ChangeKind::Modified),
                (Some(old), Some(new)) if old.metadata_differs(new) => Some(ChangeKind::MetadataChanged),
                (Some(_), Some(_)) => None,
                (None, None) => unreachable!(),
            };
            prop_assert_eq!(kind, expected);
            seen.insert(path.clone());
        }

        // Nothing outside the union is reported
        for kind in [ChangeKind::Added, ChangeKind::Removed, ChangeKind::Modified, ChangeKind::MetadataChanged] {
            for path in changes.paths(kind) {
                prop_assert!(seen.contains(path));
            }
        }
    }

    #[test]
    fn prop_rendered_arrays_are_sorted(
        baseline in snapshot_strategy(),
        current in snapshot_strategy(),
    ) {
        let changes = compare(&baseline, &current);
        let text = render(&changes, ReportFormat::Ndjson).unwrap();
        prop_assert!(!text.contains('\n'));

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        for key in ["added", "removed", "modified", "metadata_changed"] {
            let items: Vec<String> = value["changes"][key]
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_str().unwrap().to_string())
                .collect();
            let mut sorted = items.clone();
            sorted.sort();
            prop_assert_eq!(items, sorted);
        }
    }

    #[test]
    fn prop_extension_pattern_matches_by_name(
        dirs in prop::collection::vec("[a-z]{1,6}", 0..4),
        stem in "[a-z][a-z0-9_]{0,8}",
    ) {
        let rules = IgnoreRuleSet::from_patterns(["*.log"]);
        let mut prefix = dirs.join("/");
        if !prefix.is_empty() {
            prefix.push('/');
        }

        let matching = format!("{}{}.log", prefix, stem);
        let wrong_ext = format!("{}{}.logx", prefix, stem);
        let under_dir = format!("{}.log/{}", prefix, stem);
        prop_assert!(rules.matches(&matching));
        prop_assert!(!rules.matches(&wrong_ext));
        prop_assert!(!rules.matches(&under_dir));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_baseline_roundtrip(snapshot in snapshot_strategy()) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("baseline.json");

        baseline::save(&snapshot, &path).unwrap();
        let loaded = baseline::load(&path).unwrap();
        prop_assert_eq!(loaded, snapshot);
    }

    #[test]
    fn prop_hash_is_independent_of_chunk_size(
        content in prop::collection::vec(any::<u8>(), 0..20_000),
        chunk in 1usize..5000,
    ) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("blob");
        fs::write(&path, &content).unwrap();

        let small = utils::hash_file_content(&path, chunk).unwrap();
        let large = utils::hash_file_content(&path, utils::DEFAULT_CHUNK_SIZE).unwrap();
        prop_assert_eq!(small, large);
        prop_assert_eq!(small, ContentDigest::of_bytes(&content));
    }
}
