//! Configuration parsing (memsnap.toml)
//!
//! Every section and field is optional; an empty file yields the defaults.
//!
//! ```toml
//! [walk]
//! honor_weak_tables = true
//! function_sources = true
//! thread_frames = true
//! placeholder = "<unrepresentable>"
//!
//! [report]
//! format = "json"
//!
//! [lua]
//! library = "snapshot"
//! ```

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the config file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "memsnap.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Heap walker settings
    #[serde(default)]
    pub walk: WalkOptions,

    /// Report writer settings
    #[serde(default)]
    pub report: ReportOptions,

    /// Lua library settings
    #[serde(default)]
    pub lua: LuaOptions,
}

/// Heap walker settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalkOptions {
    /// Skip key/value edges of tables whose metatable declares `__mode`
    #[serde(default = "default_true")]
    pub honor_weak_tables: bool,

    /// Append definition sites to function descriptions
    #[serde(default = "default_true")]
    pub function_sources: bool,

    /// Append active frame locations to thread descriptions
    #[serde(default = "default_true")]
    pub thread_frames: bool,

    /// Text used when a value cannot be rendered (default: `<unrepresentable KIND>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            honor_weak_tables: true,
            function_sources: true,
            thread_frames: true,
            placeholder: None,
        }
    }
}

/// Report output format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// `=========` separated blocks
    #[default]
    Text,
    /// JSON array of objects
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("unknown report format '{}' (expected text or json)", other)),
        }
    }
}

/// Report writer settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReportOptions {
    /// Output format
    #[serde(default)]
    pub format: ReportFormat,
}

/// Lua library settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LuaOptions {
    /// Global name the snapshot library is installed under
    #[serde(default = "default_library")]
    pub library: String,
}

fn default_library() -> String {
    "snapshot".to_string()
}

impl Default for LuaOptions {
    fn default() -> Self {
        Self {
            library: default_library(),
        }
    }
}

impl Config {
    /// Parse configuration from TOML text
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load `memsnap.toml` from `dir`, falling back to defaults when absent
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }
}
