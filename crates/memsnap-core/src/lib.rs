//! Memsnap Core
//!
//! This crate walks the reachable object graph of an embedded scripting
//! runtime and records every composite object once, together with the
//! edges that keep it alive:
//! - Heap walker (cycle-safe, weak-table aware)
//! - Snapshot store and differ (`newer \ older` by object identity)
//! - Plain-text and JSON report writers
//! - An arena heap model and a Lua backend (feature `lua`)
//!
//! # Example
//!
//! ```rust,ignore
//! use memsnap_core::{lua, Snapshot, ReportFormat, WalkOptions};
//!
//! let lua = unsafe { mlua::Lua::unsafe_new() };
//! let before = lua::take_snapshot(&lua, &WalkOptions::default())?;
//! lua.load("leak = {}").exec()?;
//! let after = lua::take_snapshot(&lua, &WalkOptions::default())?;
//!
//! let diff = Snapshot::diff(&before, &after);
//! memsnap_core::write_report_file(&diff, "leaks.txt", ReportFormat::Text)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod heap;
pub mod inspect;
pub mod snapshot;
pub mod value;

/// Lua backend (mlua, Lua 5.4)
#[cfg(feature = "lua")]
pub mod lua;

pub use config::{Config, LuaOptions, ReportFormat, ReportOptions, WalkOptions};
pub use inspect::{CallFrame, FunctionSource, HeapInspector};
pub use snapshot::{
    write_report, write_report_file, HeapWalker, MarkSource, ObjectDescription, Snapshot,
    SnapshotHandle, SnapshotStore, SourceKind,
};
pub use value::{HeapId, ObjectKind, ValueClass};

use std::path::PathBuf;

/// Snapshot errors
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// A value could not be converted to display text
    #[error("Unrepresentable {kind} value: {reason}")]
    Unrepresentable {
        /// Kind of the offending value
        kind: &'static str,
        /// Why rendering failed
        reason: String,
    },

    /// The runtime refused an inspection request
    #[error("Heap inspection failed: {0}")]
    Inspect(String),

    /// Unknown or released snapshot handle
    #[error("Unknown snapshot handle: {0}")]
    UnknownHandle(usize),

    /// Failed to write a report file
    #[error("Failed to write report to {}: {source}", path.display())]
    ReportWrite {
        /// Destination path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse configuration
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Failed to encode a JSON report
    #[error("Failed to encode report: {0}")]
    Json(#[from] serde_json::Error),

    /// Error raised by the Lua runtime
    #[cfg(feature = "lua")]
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),
}

/// Snapshot result
pub type Result<T> = std::result::Result<T, SnapshotError>;
