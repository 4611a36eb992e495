//! Snapshot storage and diffing

use super::report::write_report_file;
use super::source::{MarkSource, ObjectDescription};
use super::walker::HeapWalker;
use crate::config::{ReportFormat, WalkOptions};
use crate::inspect::HeapInspector;
use crate::value::{HeapId, ObjectKind};
use crate::{Result, SnapshotError};
use rustc_hash::FxHashMap;
use std::path::Path;

/// Objects recorded by one walk, keyed by identity
///
/// Iteration follows discovery order. A snapshot is never modified once the
/// walk that produced it returns.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Recorded objects in discovery order
    objects: Vec<(HeapId, ObjectDescription)>,

    /// Identity -> position in `objects`
    index: FxHashMap<HeapId, usize>,
}

impl Snapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk `inspector`'s heap from `root`
    pub fn take<I: HeapInspector>(
        inspector: &I,
        root: &I::Value,
        options: &WalkOptions,
    ) -> Self {
        HeapWalker::new(inspector, options).walk(root)
    }

    /// Objects in `newer` whose identity is absent from `older`
    ///
    /// Only identities are compared. Both snapshots must come from the same
    /// runtime instance; identities from unrelated runtimes produce a
    /// meaningless (but well-formed) result.
    pub fn diff(older: &Snapshot, newer: &Snapshot) -> Snapshot {
        let mut diff = Snapshot::new();
        for (id, description) in newer.iter() {
            if !older.contains(id) {
                diff.insert(id, description.clone());
            }
        }
        diff
    }

    /// Number of recorded objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Check whether an identity was recorded
    pub fn contains(&self, id: HeapId) -> bool {
        self.index.contains_key(&id)
    }

    /// Look up an object
    pub fn get(&self, id: HeapId) -> Option<&ObjectDescription> {
        self.index.get(&id).map(|&i| &self.objects[i].1)
    }

    /// Iterate over objects in discovery order
    pub fn iter(&self) -> impl Iterator<Item = (HeapId, &ObjectDescription)> + '_ {
        self.objects.iter().map(|(id, desc)| (*id, desc))
    }

    /// Iterate over identities in discovery order
    pub fn ids(&self) -> impl Iterator<Item = HeapId> + '_ {
        self.objects.iter().map(|(id, _)| *id)
    }

    /// Number of objects per kind, in [`ObjectKind::ALL`] order
    pub fn kind_counts(&self) -> Vec<(ObjectKind, usize)> {
        ObjectKind::ALL
            .iter()
            .map(|&kind| {
                let count = self.objects.iter().filter(|(_, d)| d.kind == kind).count();
                (kind, count)
            })
            .collect()
    }

    /// Record a newly discovered object
    pub(crate) fn insert(&mut self, id: HeapId, description: ObjectDescription) {
        debug_assert!(!self.index.contains_key(&id));
        self.index.insert(id, self.objects.len());
        self.objects.push((id, description));
    }

    /// Append an edge to an already recorded object
    ///
    /// Returns `false` if the identity has not been recorded.
    pub(crate) fn add_source(&mut self, id: HeapId, source: MarkSource) -> bool {
        match self.index.get(&id) {
            Some(&i) => {
                self.objects[i].1.sources.push(source);
                true
            }
            None => false,
        }
    }
}

/// Handle to a snapshot held by a [`SnapshotStore`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotHandle(usize);

/// Owner of completed snapshots
///
/// Snapshots are taken sequentially; the store only ever holds finished,
/// immutable results.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    /// Slots indexed by handle (`None` once released)
    snapshots: Vec<Option<Snapshot>>,

    /// Options used for every walk
    options: WalkOptions,
}

impl SnapshotStore {
    /// Create a store using the given walk options
    pub fn new(options: WalkOptions) -> Self {
        Self {
            snapshots: Vec::new(),
            options,
        }
    }

    /// Take a snapshot and keep it
    pub fn take<I: HeapInspector>(&mut self, inspector: &I, root: &I::Value) -> SnapshotHandle {
        let snapshot = Snapshot::take(inspector, root, &self.options);
        self.insert(snapshot)
    }

    /// Keep an externally produced snapshot
    pub fn insert(&mut self, snapshot: Snapshot) -> SnapshotHandle {
        self.snapshots.push(Some(snapshot));
        SnapshotHandle(self.snapshots.len() - 1)
    }

    /// Look up a snapshot
    pub fn get(&self, handle: SnapshotHandle) -> Option<&Snapshot> {
        self.snapshots.get(handle.0).and_then(Option::as_ref)
    }

    /// Drop a snapshot, returning it
    pub fn release(&mut self, handle: SnapshotHandle) -> Option<Snapshot> {
        self.snapshots.get_mut(handle.0).and_then(Option::take)
    }

    /// Number of live snapshots
    pub fn len(&self) -> usize {
        self.snapshots.iter().filter(|s| s.is_some()).count()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Diff two stored snapshots
    pub fn diff(&self, older: SnapshotHandle, newer: SnapshotHandle) -> Result<Snapshot> {
        let older = self.get(older).ok_or(SnapshotError::UnknownHandle(older.0))?;
        let newer = self.get(newer).ok_or(SnapshotError::UnknownHandle(newer.0))?;
        Ok(Snapshot::diff(older, newer))
    }

    /// Diff two stored snapshots and write the report to `path`
    ///
    /// The diff is returned so a failed write can be retried without walking
    /// the heap again.
    pub fn diff_to_file(
        &self,
        older: SnapshotHandle,
        newer: SnapshotHandle,
        path: impl AsRef<Path>,
        format: ReportFormat,
    ) -> Result<Snapshot> {
        let diff = self.diff(older, newer)?;
        write_report_file(&diff, path, format)?;
        Ok(diff)
    }
}
