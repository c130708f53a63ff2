//! Chaos tests for fim
//!
//! Damaged baselines, files that cannot be read, and trees that change
//! shape between scans. None of these may panic or be silently treated as
//! "no changes".

use ::fim::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tracing_test::traced_test;

fn tracked_tree() -> (TempDir, Fim) {
    let temp_dir = TempDir::new().unwrap();
    for i in 0..10 {
        let dir = temp_dir.path().join(format!("d{}", i % 3));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("f{}.txt", i)), format!("content {}", i)).unwrap();
    }
    let fim = Fim::open(temp_dir.path().to_path_buf()).unwrap();
    fim.init().unwrap();
    (temp_dir, fim)
}

/// Whether permission bits are enforced for this process (not root)
#[cfg(unix)]
fn permissions_enforced(path: &Path) -> bool {
    fs::read(path).is_err()
}

#[test]
fn test_truncated_baseline_is_corrupt() {
    let (_temp_dir, fim) = tracked_tree();
    let path = fim.baseline_store().path().to_path_buf();
    let original = fs::read(&path).unwrap();
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..25 {
        let cut = rng.random_range(0..original.len() - 2);
        fs::write(&path, &original[..cut]).unwrap();

        let err = fim.scan().unwrap_err();
        assert!(
            matches!(err, FimError::BaselineCorrupt { .. }),
            "truncation at {} gave {:?}",
            cut,
            err
        );
        assert!(err.is_fatal_for_monitor());
    }
}

#[test]
fn test_garbage_baseline_never_panics() {
    let (_temp_dir, fim) = tracked_tree();
    let path = fim.baseline_store().path().to_path_buf();
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..25 {
        let len = rng.random_range(0..512);
        let garbage: Vec<u8> = (0..len).map(|_| rng.random::<u8>()).collect();
        fs::write(&path, &garbage).unwrap();

        match fim.scan() {
            Err(FimError::BaselineCorrupt { .. }) => {}
            other => panic!("expected corrupt baseline, got {:?}", other.map(|c| c.total_changes())),
        }
    }
}

#[test]
fn test_tampered_digest_is_corrupt() {
    let (_temp_dir, fim) = tracked_tree();
    let path = fim.baseline_store().path().to_path_buf();
    let text = fs::read_to_string(&path).unwrap();

    // Shorten the first digest by one hex character
    let marker = "\"digest\": \"";
    let start = text.find(marker).unwrap() + marker.len();
    let mut damaged = text.clone();
    damaged.remove(start);
    fs::write(&path, damaged).unwrap();

    assert!(matches!(
        fim.scan().unwrap_err(),
        FimError::BaselineCorrupt { .. }
    ));
}

#[test]
fn test_deleted_baseline_fails_monitor_start() {
    let (_temp_dir, fim) = tracked_tree();
    fs::remove_file(fim.baseline_store().path()).unwrap();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let mut sink: Vec<ChangeSet> = Vec::new();
    let err = runtime
        .block_on(fim.monitor(MonitorOptions::default(), &mut sink, StopToken::never()))
        .unwrap_err();

    assert!(matches!(err, FimError::BaselineNotFound(_)));
    assert!(sink.is_empty());
}

#[test]
fn test_root_removed_after_init() {
    let (temp_dir, fim) = tracked_tree();
    let outside = TempDir::new().unwrap();
    let baseline_copy = outside.path().join("baseline.json");
    fs::copy(fim.baseline_store().path(), &baseline_copy).unwrap();

    let relocated = FimBuilder::new()
        .baseline_path(baseline_copy)
        .build(temp_dir.path().to_path_buf())
        .unwrap();
    fs::remove_dir_all(temp_dir.path()).unwrap();

    assert!(matches!(
        relocated.scan().unwrap_err(),
        FimError::IoAccess { .. }
    ));
}

#[test]
fn test_mass_deletion_and_recreation() {
    let (temp_dir, fim) = tracked_tree();

    for i in 0..3 {
        fs::remove_dir_all(temp_dir.path().join(format!("d{}", i))).unwrap();
    }
    let changes = fim.scan().unwrap();
    assert_eq!(changes.removed.len(), 10);
    assert!(changes.added.is_empty());

    // Same names, same bytes: everything comes back as unchanged or
    // metadata-only
    for i in 0..10 {
        let dir = temp_dir.path().join(format!("d{}", i % 3));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("f{}.txt", i)), format!("content {}", i)).unwrap();
    }
    let changes = fim.scan().unwrap();
    assert!(changes.removed.is_empty());
    assert!(changes.added.is_empty());
    assert!(changes.modified.is_empty());
}

#[cfg(unix)]
#[test]
#[traced_test]
fn test_unreadable_file_becomes_warning() {
    use std::os::unix::fs::PermissionsExt;

    let (temp_dir, fim) = tracked_tree();
    let locked = temp_dir.path().join("d0/f0.txt");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    if !permissions_enforced(&locked) {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
        return;
    }

    let changes = fim.scan().unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

    // Excluded from the snapshot, so it shows up as removed with a warning
    assert_eq!(changes.warnings.len(), 1);
    assert_eq!(changes.warnings[0].path, "d0/f0.txt");
    assert!(changes.removed.contains("d0/f0.txt"));
    assert!(logs_contain("Skipping d0/f0.txt"));

    let report: serde_json::Value =
        serde_json::from_str(&render(&changes, ReportFormat::JsonPretty).unwrap()).unwrap();
    assert_eq!(report["warnings"][0]["path"], "d0/f0.txt");
}

#[cfg(unix)]
#[test]
fn test_unreadable_subdirectory_does_not_abort_walk() {
    use std::os::unix::fs::PermissionsExt;

    let (temp_dir, fim) = tracked_tree();
    let locked = temp_dir.path().join("d1");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    if fs::read_dir(&locked).is_ok() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let result = fim.snapshot();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    let result = result.unwrap();
    assert!(result.warnings.iter().any(|w| w.path == "d1"));
    assert!(result.snapshot.contains("d0/f0.txt"));
    assert!(!result.snapshot.files().keys().any(|p| p.starts_with("d1/")));
}

#[cfg(unix)]
#[test]
fn test_symlink_churn() {
    use std::os::unix::fs::symlink;

    let (temp_dir, fim) = tracked_tree();
    let root = temp_dir.path();

    symlink(root.join("d0/f0.txt"), root.join("link_to_file")).unwrap();
    symlink(root.join("d1"), root.join("link_to_dir")).unwrap();
    symlink(root.join("missing"), root.join("dangling")).unwrap();
    symlink(root, root.join("d2/loop")).unwrap();

    let changes = fim.scan().unwrap();
    assert_eq!(changes.added.iter().collect::<Vec<_>>(), vec!["link_to_file"]);
    assert!(changes.warnings.is_empty());
}

#[cfg(target_os = "linux")]
#[test]
fn test_non_utf8_names_are_tracked() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let (temp_dir, fim) = tracked_tree();
    let path = temp_dir.path().join("d0").join(OsStr::from_bytes(b"\xff\xfe.bin"));
    fs::write(&path, "payload").unwrap();

    let changes = fim.scan().unwrap();
    assert_eq!(changes.added.iter().collect::<Vec<_>>(), vec!["d0/\\xff\\xfe.bin"]);
    assert!(changes.warnings.is_empty());

    // Survives a baseline round-trip and is compared like any other file
    fim.accept().unwrap();
    fs::write(&path, "tampered").unwrap();
    let changes = fim.scan().unwrap();
    assert_eq!(changes.modified.iter().collect::<Vec<_>>(), vec!["d0/\\xff\\xfe.bin"]);
}
