//! Optional TOML defaults for session options.
//!
//! Values merge lowest-priority first: built-in defaults, then
//! `weft.toml` (or the `--config` path), then command-line flags.
//!
//! ```toml
//! segment_seconds = 6.0
//! start_number = 0
//! template = "segment_%03d.ts"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Defaults a config file may provide; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CliConfig {
    pub segment_seconds: Option<f64>,
    pub start_number: Option<u64>,
    pub template: Option<String>,
}

/// Local config file picked up when `--config` is absent.
const LOCAL_CONFIG: &str = "weft.toml";

/// Load the config file: an explicit path must exist, the implicit
/// local file may be missing.
pub fn load(explicit: Option<&Path>) -> Result<CliConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let local = PathBuf::from(LOCAL_CONFIG);
            if !local.exists() {
                return Ok(CliConfig::default());
            }
            local
        }
    };

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}
