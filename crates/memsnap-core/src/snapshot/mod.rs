//! Heap snapshots
//!
//! A snapshot is the result of one walk of a runtime heap: every reachable
//! composite object, keyed by identity, with a rendered value and all the
//! edges through which it was reached. Two snapshots of the same runtime can
//! be diffed to find objects allocated in between and still alive.

mod report;
mod source;
mod store;
mod walker;

pub use report::{write_report, write_report_file};
pub use source::{MarkSource, ObjectDescription, SourceKind, REGISTRY_DESCRIPTION};
pub use store::{Snapshot, SnapshotHandle, SnapshotStore};
pub use walker::HeapWalker;
