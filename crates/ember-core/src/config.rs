//! Configuration system for Ember.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $EMBER_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/ember/config.toml
//!   3. ~/.config/ember/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::assemble::IntegrityPolicy;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmberConfig {
    pub server: ServerConfig,
    pub transfer: TransferConfig,
    pub module: ModuleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host name or address.
    pub host: String,
    /// Server TCP port.
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Fraction integrity policy. Must match the server deployment;
    /// never auto-detected.
    pub integrity: IntegrityPolicy,
    /// Per-request timeout in seconds. 0 = no timeout.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Name the payload registers under in the kernel. Used only by the
    /// replace-existing policy; empty disables the pre-load check.
    pub name: String,
    /// If true and a module with `name` is already loaded, unload it before
    /// delivering the new payload.
    pub replace_existing: bool,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for EmberConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            transfer: TransferConfig::default(),
            module: ModuleConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            integrity: IntegrityPolicy::Explicit,
            request_timeout_secs: 30,
        }
    }
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            replace_existing: false,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_or_tmp().join(".config"))
        .join("ember")
}

fn home_or_tmp() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl EmberConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            EmberConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("EMBER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&EmberConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply EMBER_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("EMBER_SERVER__HOST") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("EMBER_SERVER__PORT") {
            if let Ok(p) = v.parse() {
                self.server.port = p;
            }
        }
        if let Ok(v) = std::env::var("EMBER_TRANSFER__INTEGRITY") {
            if let Ok(p) = v.parse() {
                self.transfer.integrity = p;
            }
        }
        if let Ok(v) = std::env::var("EMBER_TRANSFER__REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse() {
                self.transfer.request_timeout_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("EMBER_MODULE__NAME") {
            self.module.name = v;
        }
        if let Ok(v) = std::env::var("EMBER_MODULE__REPLACE_EXISTING") {
            self.module.replace_existing = v == "true" || v == "1";
        }
    }
}
