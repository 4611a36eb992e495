//! Scripting-side snapshot library
//!
//! ```lua
//! local before = snapshot.snapshot()
//! run_level()
//! local after = snapshot.snapshot()
//! local leaked = snapshot.diff(before, after, "leaks.txt")
//! print(#leaked, tostring(leaked))
//! ```

use super::take_snapshot;
use crate::config::{Config, ReportFormat};
use crate::snapshot::{write_report_file, Snapshot};
use crate::SnapshotError;
use mlua::{Lua, MetaMethod, UserData, UserDataMethods, UserDataRef};

/// Snapshot handle exposed to scripts
pub struct MemorySnapshot {
    snapshot: Snapshot,
    format: ReportFormat,
}

impl MemorySnapshot {
    /// Wrap a snapshot; `format` is used by `write` when no format is given
    pub fn new(snapshot: Snapshot, format: ReportFormat) -> Self {
        Self { snapshot, format }
    }

    /// The wrapped snapshot
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

impl UserData for MemorySnapshot {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_method("count", |_, this, ()| Ok(this.snapshot.len()));

        methods.add_method("write", |_, this, (path, format): (String, Option<String>)| {
            let format = match format {
                Some(format) => format.parse::<ReportFormat>().map_err(mlua::Error::RuntimeError)?,
                None => this.format,
            };
            write_report_file(&this.snapshot, &path, format).map_err(into_lua_error)
        });

        methods.add_meta_method(MetaMethod::Len, |_, this, ()| Ok(this.snapshot.len()));

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("MemorySnapshot: {} objects", this.snapshot.len()))
        });
    }
}

/// `diff(older, newer, path)` arguments
type DiffArgs<'lua> = (
    UserDataRef<'lua, MemorySnapshot>,
    UserDataRef<'lua, MemorySnapshot>,
    String,
);

fn into_lua_error(e: SnapshotError) -> mlua::Error {
    match e {
        SnapshotError::Lua(inner) => inner,
        other => mlua::Error::RuntimeError(other.to_string()),
    }
}

/// Install the snapshot library as the global `config.lua.library`
///
/// - `snapshot()` walks the state and returns a `MemorySnapshot`
/// - `diff(older, newer, path)` writes `newer \ older` to `path` and returns it
pub fn open(lua: &Lua, config: &Config) -> mlua::Result<()> {
    let library = lua.create_table()?;

    let options = config.walk.clone();
    let format = config.report.format;
    library.set(
        "snapshot",
        lua.create_function(move |lua, ()| {
            let snapshot = take_snapshot(lua, &options).map_err(into_lua_error)?;
            log::debug!("lua snapshot: {} objects", snapshot.len());
            Ok(MemorySnapshot::new(snapshot, format))
        })?,
    )?;

    library.set(
        "diff",
        lua.create_function(move |_, (older, newer, path): DiffArgs<'_>| {
            let diff = Snapshot::diff(&older.snapshot, &newer.snapshot);
            write_report_file(&diff, &path, format).map_err(into_lua_error)?;
            log::debug!("lua diff: {} new objects written to {}", diff.len(), path);
            Ok(MemorySnapshot::new(diff, format))
        })?,
    )?;

    lua.globals().set(config.lua.library.as_str(), library)?;
    Ok(())
}
