//! `memsnap run` - execute a script with the snapshot library available.

use crate::output::{resolve_color_choice, StyledOutput};
use std::path::PathBuf;
use std::time::Instant;

/// Arguments for the run command.
pub struct RunArgs {
    pub script: PathBuf,
    pub config: Option<PathBuf>,
    pub color: String,
}

pub fn execute(args: RunArgs) -> anyhow::Result<()> {
    let mut out = StyledOutput::new(resolve_color_choice(Some(&args.color)));
    if !args.script.exists() {
        anyhow::bail!("File not found: {}", args.script.display());
    }

    let config = super::load_config(args.config.as_deref())?;
    let lua = super::new_state(&config)?;

    out.info("Running ");
    out.plain(&args.script.display().to_string());
    out.newline();

    let start = Instant::now();
    super::exec_script(&lua, &args.script)?;

    out.success("Finished");
    out.dim(&format!(" in {:.0}ms", start.elapsed().as_secs_f64() * 1000.0));
    out.newline();
    Ok(())
}
