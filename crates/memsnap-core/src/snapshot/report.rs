//! Report writers
//!
//! The text format is a debugging artifact, one block per object:
//!
//! ```text
//! =========
//! <rendered value>
//! 	<edge description>
//! 	<edge description>
//! ```

use super::source::{MarkSource, ObjectDescription};
use super::store::Snapshot;
use crate::config::ReportFormat;
use crate::value::{HeapId, ObjectKind};
use crate::{Result, SnapshotError};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Separator written before every object block
const RECORD_SEPARATOR: &str = "=========";

/// JSON shape of one recorded object
#[derive(Serialize)]
struct ReportEntry<'a> {
    id: HeapId,
    kind: ObjectKind,
    value: &'a str,
    sources: &'a [MarkSource],
}

impl<'a> ReportEntry<'a> {
    fn new(id: HeapId, desc: &'a ObjectDescription) -> Self {
        Self {
            id,
            kind: desc.kind,
            value: &desc.value,
            sources: &desc.sources,
        }
    }
}

/// Write a snapshot (or diff) report to `writer`
pub fn write_report<W: Write>(
    snapshot: &Snapshot,
    writer: &mut W,
    format: ReportFormat,
) -> Result<()> {
    match format {
        ReportFormat::Text => write_text(snapshot, writer)?,
        ReportFormat::Json => {
            let entries: Vec<ReportEntry<'_>> = snapshot
                .iter()
                .map(|(id, desc)| ReportEntry::new(id, desc))
                .collect();
            serde_json::to_writer_pretty(&mut *writer, &entries)?;
            writeln!(writer)?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn write_text<W: Write>(snapshot: &Snapshot, writer: &mut W) -> std::io::Result<()> {
    for (_, desc) in snapshot.iter() {
        writeln!(writer, "{}", RECORD_SEPARATOR)?;
        writeln!(writer, "{}", desc.value)?;
        for source in &desc.sources {
            writeln!(writer, "\t{}", source.description)?;
        }
    }
    Ok(())
}

/// Write a snapshot (or diff) report to a file, replacing it
pub fn write_report_file(
    snapshot: &Snapshot,
    path: impl AsRef<Path>,
    format: ReportFormat,
) -> Result<()> {
    let path = path.as_ref();
    let wrap = |source: std::io::Error| SnapshotError::ReportWrite {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(wrap)?;
    let mut writer = BufWriter::new(file);
    match write_report(snapshot, &mut writer, format) {
        Err(SnapshotError::Io(source)) => Err(wrap(source)),
        other => other,
    }
}
