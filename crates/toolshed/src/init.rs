//! `toolshed init` - Generate an Example Config File

use crate::config::{default_config_path, EXAMPLE_CONFIG};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;

/// Write the commented example config. Refuses to overwrite.
pub fn run(output: Option<PathBuf>) -> Result<()> {
    let path = output.unwrap_or_else(default_config_path);

    if path.exists() {
        bail!(
            "Config file already exists: {} (remove it first, or pass --output)",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    std::fs::write(&path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    println!("Wrote example config to {}", path.display());
    println!("Edit it, then check with: toolshed validate --config {}", path.display());
    Ok(())
}
