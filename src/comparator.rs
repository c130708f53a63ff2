//! Snapshot comparison
//!
//! [`compare`] classifies every path in the union of two snapshots:
//!
//! 1. **Added**: present in the current snapshot only
//! 2. **Removed**: present in the baseline only
//! 3. **Modified**: present in both, content digests differ
//! 4. **Metadata changed**: present in both, same digest, but size or
//!    modification time differ
//!
//! Paths present in both with identical digest, size and mtime are unchanged
//! and do not appear in the [`ChangeSet`]. The content digest is
//! authoritative: a file whose bytes changed is `modified` even if its size
//! and mtime were restored.

use crate::types::{ChangeSet, Snapshot};
use tracing::debug;

/// Compute the four-way change set between `baseline` and `current`
///
/// Pure and total. The resulting `root` and `generated_at` are taken from
/// `current`; whether the two snapshots describe the same root is the
/// caller's concern.
pub fn compare(baseline: &Snapshot, current: &Snapshot) -> ChangeSet {
    let mut changes = ChangeSet::new(current.root().to_path_buf(), current.generated_at());

    for (path, current_record) in current.files() {
        match baseline.get(path) {
            None => {
                changes.added.insert(path.clone());
            }
            Some(old) if old.digest != current_record.digest => {
                changes.modified.insert(path.clone());
            }
            Some(old) if old.metadata_differs(current_record) => {
                changes.metadata_changed.insert(path.clone());
            }
            Some(_) => {}
        }
    }

    for path in baseline.files().keys() {
        if !current.contains(path) {
            changes.removed.insert(path.clone());
        }
    }

    debug!(
        "Compared {} baseline files with {} current files: +{} -{} *{} ~{}",
        baseline.len(),
        current.len(),
        changes.added.len(),
        changes.removed.len(),
        changes.modified.len(),
        changes.metadata_changed.len()
    );

    changes
}
