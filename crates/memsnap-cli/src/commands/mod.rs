//! CLI command implementations

pub mod probe;
pub mod run;

use anyhow::Context;
use memsnap_core::{lua, Config};
use mlua::Lua;
use std::path::Path;

/// Load `--config`, or `./memsnap.toml` when present
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => {
            let cwd = std::env::current_dir().context("Cannot determine working directory")?;
            Config::load_or_default(&cwd).context("Failed to load memsnap.toml")
        }
    }
}

/// Create a Lua state with every standard library and the snapshot library
pub fn new_state(config: &Config) -> anyhow::Result<Lua> {
    // The debug library is required for heap inspection
    let lua = unsafe { Lua::unsafe_new() };
    lua::open(&lua, config).context("Failed to install the snapshot library")?;
    log::debug!("snapshot library installed as '{}'", config.lua.library);
    Ok(lua)
}

/// Load and execute a script file
pub fn exec_script(lua: &Lua, script: &Path) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(script)
        .with_context(|| format!("Failed to read {}", script.display()))?;
    lua.load(source.as_str())
        .set_name(format!("@{}", script.display()))
        .exec()
        .with_context(|| format!("Script {} failed", script.display()))
}
