//! Configuration for the studio pipeline.
//!
//! Settings load from a `studio.toml` at the project root, with struct
//! defaults filling anything the file omits. The quality threshold bands are
//! deliberately *not* configurable — they are part of the orchestration
//! contract (see [`crate::quality`]).
//!
//! # Configuration File Format
//!
//! ```toml
//! [defaults]
//! max_iterations = 3
//! auto_approve = false
//!
//! [store]
//! dir = ".atelier/workflows"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the config file looked up in the project directory.
pub const CONFIG_FILE: &str = "studio.toml";

fn default_max_iterations() -> u32 {
    3
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".atelier/workflows")
}

/// Per-run defaults applied when a workflow starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDefaults {
    /// Revision budget fixed at run start.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// When false, the run suspends for a human decision instead of looping
    /// back on its own.
    #[serde(default)]
    pub auto_approve: bool,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            auto_approve: false,
        }
    }
}

/// Settings for the file-backed workflow store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

/// Unified configuration for the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudioConfig {
    #[serde(default)]
    pub defaults: RunDefaults,
    #[serde(default)]
    pub store: StoreSettings,
}

impl StudioConfig {
    /// Load configuration from an explicit file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: StudioConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load `studio.toml` from a project directory, falling back to defaults
    /// when the file is absent. A present-but-malformed file is still an
    /// error.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// The options a fresh run starts with.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            auto_approve: self.defaults.auto_approve,
            max_iterations: self.defaults.max_iterations,
        }
    }
}

/// Options fixed at run start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    pub auto_approve: bool,
    pub max_iterations: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            auto_approve: false,
            max_iterations: default_max_iterations(),
        }
    }
}

impl RunOptions {
    pub fn auto(max_iterations: u32) -> Self {
        Self {
            auto_approve: true,
            max_iterations,
        }
    }

    pub fn human_in_loop(max_iterations: u32) -> Self {
        Self {
            auto_approve: false,
            max_iterations,
        }
    }
}
