//! User configuration (`config.toml`).
//!
//! ```toml
//! [tools]
//! rsync = "/usr/local/bin/rsync"
//!
//! [ssh]
//! connect_timeout = 5
//! batch_mode = true
//!
//! [defaults]
//! method = "hash"
//! colors = false
//! progress = true
//! ```
//!
//! Every key is optional. A missing file is the same as an empty one.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::command::{self, DEFAULT_CONNECT_TIMEOUT, Tools};
use crate::diff::DiffMethod;
use crate::error::{Result, SyncError};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "LOCSYNC_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub tools: ToolsConfig,
    pub ssh: SshConfig,
    pub defaults: Defaults,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    pub rsync: Option<String>,
    pub scp: Option<String>,
    pub ssh: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SshConfig {
    /// Seconds.
    pub connect_timeout: u64,
    pub batch_mode: bool,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            batch_mode: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Defaults {
    /// Comparison method when none is given; rsync if installed, else hash.
    pub method: Option<DiffMethod>,
    pub colors: bool,
    pub progress: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            method: None,
            colors: true,
            progress: true,
        }
    }
}

impl Config {
    /// `$LOCSYNC_CONFIG`, else `<config dir>/locsync/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }
        directories::ProjectDirs::from("", "", "locsync").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from [`Config::default_path`]; defaults when there is no file.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file");
                return Ok(Self::default());
            }
            Err(e) => return Err(SyncError::io(path, e)),
        };
        let config: Config = toml::from_str(&text).map_err(|e| SyncError::Config {
            path: path.to_path_buf(),
            reason: e.to_string().trim().to_string(),
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn tools(&self) -> Tools {
        let defaults = Tools::default();
        Tools {
            rsync: self.tools.rsync.clone().unwrap_or(defaults.rsync),
            scp: self.tools.scp.clone().unwrap_or(defaults.scp),
            ssh: self.tools.ssh.clone().unwrap_or(defaults.ssh),
            ssh_options: command::ssh_options(self.ssh.connect_timeout, self.ssh.batch_mode),
        }
    }

    /// `requested`, else the configured default, else rsync when installed.
    pub fn method(&self, requested: Option<DiffMethod>, tools: &Tools) -> DiffMethod {
        requested
            .or(self.defaults.method)
            .unwrap_or_else(|| {
                if tools.has(&tools.rsync) {
                    DiffMethod::Rsync
                } else {
                    DiffMethod::Hash
                }
            })
    }
}
