//! Database configuration via `graphd.toml`
//!
//! On first open, a default `graphd.toml` is created in the data directory.
//! To change settings, edit the file and reopen the database.

use graphd_core::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name placed in the database data directory.
pub const CONFIG_FILE_NAME: &str = "graphd.toml";

/// How hard a commit pushes the snapshot to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// Snapshot is renamed into place; the OS decides when to flush
    Standard,
    /// Snapshot is fsynced before the rename; zero data loss on power failure
    Always,
}

impl DurabilityMode {
    /// Whether commits fsync the snapshot
    pub fn syncs(self) -> bool {
        matches!(self, DurabilityMode::Always)
    }
}

/// Database configuration loaded from `graphd.toml`.
///
/// # Example
///
/// ```toml
/// # Durability mode: "standard" (default) or "always"
/// durability = "standard"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Durability mode: `"standard"` or `"always"`.
    #[serde(default = "default_durability_str")]
    pub durability: String,
}

fn default_durability_str() -> String {
    "standard".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            durability: default_durability_str(),
        }
    }
}

impl EngineConfig {
    /// Config with `durability = "always"`
    pub fn always() -> Self {
        Self {
            durability: "always".to_string(),
        }
    }

    /// Parse the durability string into a `DurabilityMode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"standard"` or `"always"`.
    pub fn durability_mode(&self) -> GraphResult<DurabilityMode> {
        match self.durability.as_str() {
            "standard" => Ok(DurabilityMode::Standard),
            "always" => Ok(DurabilityMode::Always),
            other => Err(GraphError::config(format!(
                "Invalid durability mode '{}' in graphd.toml. Expected \"standard\" or \"always\".",
                other
            ))),
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# graphd database configuration
#
# Durability mode: "standard" (default) or "always"
#   "standard" = snapshot renamed into place on commit, no fsync
#   "always"   = snapshot fsynced on every commit
durability = "standard"
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> GraphResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GraphError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            GraphError::config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.durability_mode()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> GraphResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                GraphError::config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> GraphResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| GraphError::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            GraphError::config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
