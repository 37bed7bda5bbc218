//! Host configuration.
//!
//! Read from `modhost.toml`, either at an explicit path or in the platform
//! config directory. Every key is optional.
//!
//! ```toml
//! modules_dir = "~/.local/share/modhost/modules"
//! reserved_prefix = "modhost."
//! file_patterns = ['\.zip$']
//! log_filter = "modhost=info"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::modules::{DEFAULT_FILE_FILTER, RESERVED_PREFIX};

/// Name of the configuration file inside the platform config directory.
pub const CONFIG_FILE: &str = "modhost.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Directory scanned for module archives; `~` and `$VARS` are expanded.
    pub modules_dir: String,
    /// Symbol prefix reserved for the host.
    pub reserved_prefix: String,
    /// File-name patterns accepted by the archive loader.
    pub file_patterns: Vec<String>,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            modules_dir: "modules".into(),
            reserved_prefix: RESERVED_PREFIX.into(),
            file_patterns: vec![DEFAULT_FILE_FILTER.into()],
            log_filter: "modhost=info".into(),
        }
    }
}

impl HostConfig {
    /// Load configuration from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Load configuration from `path`, or the default location when `None`.
    ///
    /// A missing file at the default location yields the defaults; a missing
    /// explicit file is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `modhost.toml` in the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "modhost").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// The modules directory with `~` and environment variables expanded.
    pub fn modules_dir(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.modules_dir)
            .with_context(|| format!("Failed to expand modules_dir {:?}", self.modules_dir))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }

    /// Compiled file-name patterns.
    pub fn file_filters(&self) -> Result<Vec<Regex>> {
        self.file_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).with_context(|| format!("Invalid file pattern {pattern:?}"))
            })
            .collect()
    }
}
