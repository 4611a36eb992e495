//! memsnap command-line driver
//!
//! Runs Lua scripts with the snapshot library installed, or probes a script
//! for the objects it leaves alive.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use memsnap_core::ReportFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "memsnap")]
#[command(about = "Heap snapshots and leak diffs for embedded Lua", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Lua script with the snapshot library installed
    Run {
        /// Script to execute
        script: PathBuf,
        /// Config file (defaults to ./memsnap.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Color output: auto, always, never
        #[arg(long, default_value = "auto")]
        color: String,
    },

    /// Snapshot before and after a script and report what it left alive
    Probe {
        /// Script to execute
        script: PathBuf,
        /// Report file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Report format: text or json (overrides the config file)
        #[arg(short, long)]
        format: Option<ReportFormat>,
        /// Config file (defaults to ./memsnap.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Color output: auto, always, never
        #[arg(long, default_value = "auto")]
        color: String,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            script,
            config,
            color,
        } => commands::run::execute(commands::run::RunArgs {
            script,
            config,
            color,
        }),

        Commands::Probe {
            script,
            output,
            format,
            config,
            color,
        } => commands::probe::execute(commands::probe::ProbeArgs {
            script,
            output,
            format,
            config,
            color,
        }),
    }
}
