//! Classified diff between two completed report snapshots.
//!
//! Classification rules:
//! - a path present in both snapshots with differing digests is `Modified`
//!   (unchanged paths produce no entry);
//! - a path only in the new snapshot whose digest exists in the old snapshot
//!   under a path that is itself gone from the new snapshot is `Moved`,
//!   pairing with the first such old record in old-side insertion order when
//!   several share the digest (deterministic, otherwise arbitrary); a digest
//!   still present under its old path pairs with nothing, so copies of
//!   surviving files classify as `Added`;
//! - remaining new-only paths are `Added`;
//! - old-only paths whose digest appears nowhere in the new snapshot are
//!   `Removed`.
//!
//! Output is grouped `Modified`, `Moved`, `Added`, `Removed`, path-sorted
//! within each group, so snapshots of the diff are reproducible.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Serialize;

use super::ReportRecord;

/// What happened to a path between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiffKind {
    Modified,
    Moved,
    Added,
    Removed,
}

impl DiffKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Modified => "modified",
            Self::Moved => "moved",
            Self::Added => "added",
            Self::Removed => "removed",
        }
    }
}

/// One classified difference. `Moved` entries carry both records; `Added`
/// only the new one; `Removed` only the old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    pub kind: DiffKind,
    pub old: Option<ReportRecord>,
    pub new: Option<ReportRecord>,
}

/// Compute the classified diff of two record sequences.
pub fn compare(old: &[ReportRecord], new: &[ReportRecord]) -> Vec<DiffEntry> {
    let old_by_path: HashMap<&Path, &ReportRecord> =
        old.iter().map(|record| (record.path.as_path(), record)).collect();
    let new_by_path: HashMap<&Path, &ReportRecord> =
        new.iter().map(|record| (record.path.as_path(), record)).collect();
    let new_digests: HashSet<&str> = new.iter().map(|record| record.digest.as_str()).collect();

    // Old-side indices per digest, in insertion order, for the Moved
    // tie-break rule.
    let mut old_by_digest: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, record) in old.iter().enumerate() {
        old_by_digest
            .entry(record.digest.as_str())
            .or_default()
            .push(idx);
    }

    let mut modified = Vec::new();
    for record in new {
        if let Some(old_record) = old_by_path.get(record.path.as_path())
            && old_record.digest != record.digest
        {
            modified.push(DiffEntry {
                kind: DiffKind::Modified,
                old: Some((*old_record).clone()),
                new: Some(record.clone()),
            });
        }
    }

    // New-only paths, processed in sorted order so candidate consumption is
    // deterministic.
    let mut new_only: Vec<&ReportRecord> = new
        .iter()
        .filter(|record| !old_by_path.contains_key(record.path.as_path()))
        .collect();
    new_only.sort_by(|a, b| a.path.cmp(&b.path));

    let mut consumed: HashSet<usize> = HashSet::new();
    let mut moved = Vec::new();
    let mut added = Vec::new();
    for record in new_only {
        let candidate = old_by_digest
            .get(record.digest.as_str())
            .and_then(|indices| {
                indices.iter().copied().find(|idx| {
                    !consumed.contains(idx)
                        && !new_by_path.contains_key(old[*idx].path.as_path())
                })
            });
        match candidate {
            Some(idx) => {
                consumed.insert(idx);
                moved.push(DiffEntry {
                    kind: DiffKind::Moved,
                    old: Some(old[idx].clone()),
                    new: Some(record.clone()),
                });
            }
            None => added.push(DiffEntry {
                kind: DiffKind::Added,
                old: None,
                new: Some(record.clone()),
            }),
        }
    }

    let mut removed = Vec::new();
    for record in old {
        if new_by_path.contains_key(record.path.as_path()) {
            continue;
        }
        if new_digests.contains(record.digest.as_str()) {
            // Either consumed by a Moved entry or still present elsewhere.
            continue;
        }
        removed.push(DiffEntry {
            kind: DiffKind::Removed,
            old: Some(record.clone()),
            new: None,
        });
    }

    modified.sort_by(|a, b| entry_path(a).cmp(entry_path(b)));
    moved.sort_by(|a, b| entry_path(a).cmp(entry_path(b)));
    added.sort_by(|a, b| entry_path(a).cmp(entry_path(b)));
    removed.sort_by(|a, b| entry_path(a).cmp(entry_path(b)));

    let mut entries = modified;
    entries.extend(moved);
    entries.extend(added);
    entries.extend(removed);
    entries
}

/// Sort key: the new path where one exists, the old path for removals.
fn entry_path(entry: &DiffEntry) -> &Path {
    entry
        .new
        .as_ref()
        .or(entry.old.as_ref())
        .map(|record| record.path.as_path())
        .unwrap_or_else(|| Path::new(""))
}
