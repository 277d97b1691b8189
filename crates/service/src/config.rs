//! Service configuration
//!
//! Loaded from a TOML file or built in code. Every field has a default, so
//! an empty file is a valid configuration.
//!
//! ```toml
//! data_dir = "/var/lib/graphd"
//! export_dir = "/var/lib/graphd/.exports"   # optional
//! reaper_interval_ms = 1000
//! max_session_lifetime_ms = 120000
//! preload_all = false
//! compression_level = 3
//! ```

use graphd_core::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default directory (relative to `data_dir`) for export archives
pub const DEFAULT_EXPORT_DIR_NAME: &str = ".exports";

fn default_data_dir() -> PathBuf {
    PathBuf::from("graphd-data")
}

fn default_reaper_interval_ms() -> u64 {
    1000
}

fn default_max_session_lifetime_ms() -> u64 {
    120_000
}

fn default_compression_level() -> i32 {
    3
}

/// Configuration of a [`GraphService`](crate::GraphService)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Directory holding one subdirectory per database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Where export archives go; `<data_dir>/.exports` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_dir: Option<PathBuf>,

    /// Time between reaper sweeps
    #[serde(default = "default_reaper_interval_ms")]
    pub reaper_interval_ms: u64,

    /// Idle time after which a session is force-terminated
    #[serde(default = "default_max_session_lifetime_ms")]
    pub max_session_lifetime_ms: u64,

    /// Open every database on disk when the service activates
    #[serde(default)]
    pub preload_all: bool,

    /// zstd level for export archives
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            export_dir: None,
            reaper_interval_ms: default_reaper_interval_ms(),
            max_session_lifetime_ms: default_max_session_lifetime_ms(),
            preload_all: false,
            compression_level: default_compression_level(),
        }
    }
}

impl ServiceConfig {
    /// Defaults with the given data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Set the reaper sweep interval
    pub fn reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the maximum session idle time
    pub fn max_session_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_session_lifetime_ms = lifetime.as_millis() as u64;
        self
    }

    /// Set the export directory
    pub fn export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = Some(dir.into());
        self
    }

    /// Open all databases on activation
    pub fn preload_all(mut self, preload: bool) -> Self {
        self.preload_all = preload;
        self
    }

    /// Sweep interval as a duration
    pub fn reaper_interval_duration(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }

    /// Session idle deadline as a duration
    pub fn max_session_lifetime_duration(&self) -> Duration {
        Duration::from_millis(self.max_session_lifetime_ms)
    }

    /// Export directory in effect
    pub fn resolved_export_dir(&self) -> PathBuf {
        self.export_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DEFAULT_EXPORT_DIR_NAME))
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> GraphResult<()> {
        if self.reaper_interval_ms == 0 {
            return Err(GraphError::config("reaper_interval_ms must be greater than 0"));
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(GraphError::config(format!(
                "compression_level {} is outside 1..=22",
                self.compression_level
            )));
        }
        Ok(())
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> GraphResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GraphError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: ServiceConfig = toml::from_str(&content).map_err(|e| {
            GraphError::config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }
}
