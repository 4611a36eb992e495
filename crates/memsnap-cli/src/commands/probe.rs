//! `memsnap probe` - report the objects a script leaves alive.
//!
//! Takes a snapshot, runs the script, takes a second snapshot and reports
//! `after \ before`. A full collection precedes each snapshot so that only
//! objects that are still reachable show up.

use crate::output::{resolve_color_choice, StyledOutput};
use anyhow::Context;
use memsnap_core::{lua, write_report, write_report_file, ReportFormat, Snapshot};
use mlua::Lua;
use std::path::PathBuf;

/// Arguments for the probe command.
pub struct ProbeArgs {
    pub script: PathBuf,
    pub output: Option<PathBuf>,
    pub format: Option<ReportFormat>,
    pub config: Option<PathBuf>,
    pub color: String,
}

pub fn execute(args: ProbeArgs) -> anyhow::Result<()> {
    let mut out = StyledOutput::new(resolve_color_choice(Some(&args.color)));
    if !args.script.exists() {
        anyhow::bail!("File not found: {}", args.script.display());
    }

    let config = super::load_config(args.config.as_deref())?;
    let format = args.format.unwrap_or(config.report.format);
    let lua = super::new_state(&config)?;

    let before = snapshot(&lua, &config.walk).context("Failed to take the baseline snapshot")?;
    super::exec_script(&lua, &args.script)?;
    let after = snapshot(&lua, &config.walk).context("Failed to take the final snapshot")?;

    let diff = Snapshot::diff(&before, &after);
    log::info!(
        "probe: {} objects before, {} after, {} new",
        before.len(),
        after.len(),
        diff.len()
    );

    match &args.output {
        Some(path) => write_report_file(&diff, path, format)?,
        None => {
            let stdout = std::io::stdout();
            write_report(&diff, &mut stdout.lock(), format)?;
        }
    }

    print_summary(&mut out, &diff);
    if let Some(path) = &args.output {
        out.dim(&format!("Report written to {}", path.display()));
        out.newline();
    }
    Ok(())
}

fn snapshot(lua: &Lua, options: &memsnap_core::WalkOptions) -> anyhow::Result<Snapshot> {
    lua.gc_collect()?;
    Ok(lua::take_snapshot(lua, options)?)
}

fn print_summary(out: &mut StyledOutput, diff: &Snapshot) {
    if diff.is_empty() {
        out.success("No new objects retained");
        out.newline();
        return;
    }

    out.warning(&format!("{} new objects retained", diff.len()));
    let counts: Vec<String> = diff
        .kind_counts()
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(kind, count)| format!("{} {}", count, kind))
        .collect();
    out.dim(&format!(" ({})", counts.join(", ")));
    out.newline();
}
