// src/config.rs

//! Engine configuration
//!
//! Loaded from a TOML file (`/etc/goalpost/goalpost.toml` by default). Every
//! key is optional; a missing file yields the defaults.
//!
//! ```toml
//! protected_packages = ["goalpost", "glibc"]
//! best = false
//! allow_erasing = false
//! clean_requirements_on_remove = true
//! excludes = ["kernel*"]
//! log_level = "info"
//! ```

use crate::error::{Error, Result};
use crate::goal::GoalPolicy;
use crate::logger::{Level, LevelSetting};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/goalpost/goalpost.toml";

fn default_protected() -> Vec<String> {
    vec!["goalpost".to_string()]
}

fn default_universe_path() -> PathBuf {
    PathBuf::from("/var/lib/goalpost/universe.toml")
}

fn default_history_path() -> PathBuf {
    PathBuf::from("/var/lib/goalpost/history.db")
}

fn default_lock_path() -> PathBuf {
    PathBuf::from("/var/lib/goalpost/goalpost.lock")
}

fn default_lock_timeout_ms() -> u64 {
    1500
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Packages that may never be removed
    #[serde(default = "default_protected")]
    pub protected_packages: Vec<String>,

    /// Require the newest candidate for every job
    #[serde(default)]
    pub best: bool,

    /// Allow removing installed packages to resolve conflicts
    #[serde(default)]
    pub allow_erasing: bool,

    /// Sweep orphaned dependencies on every removal
    #[serde(default)]
    pub clean_requirements_on_remove: bool,

    #[serde(default = "default_universe_path")]
    pub universe_path: PathBuf,

    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,

    #[serde(default = "default_lock_path")]
    pub lock_path: PathBuf,

    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Level for the optional log file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Globs hiding available packages from resolution
    #[serde(default)]
    pub excludes: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            protected_packages: default_protected(),
            best: false,
            allow_erasing: false,
            clean_requirements_on_remove: false,
            universe_path: default_universe_path(),
            history_path: default_history_path(),
            lock_path: default_lock_path(),
            lock_timeout_ms: default_lock_timeout_ms(),
            log_level: None,
            log_file: None,
            excludes: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load `path`, or [`DEFAULT_CONFIG_PATH`] when `None`
    ///
    /// A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        if !path.exists() {
            debug!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for pattern in &self.excludes {
            glob::Pattern::new(pattern).map_err(|e| {
                Error::Config(format!("invalid exclude pattern '{}': {}", pattern, e))
            })?;
        }
        self.log_level_setting()?;
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Parsed `log_level`; unset when the key is absent
    pub fn log_level_setting(&self) -> Result<LevelSetting> {
        match self.log_level {
            Some(ref level) => Ok(LevelSetting::Set(level.parse::<Level>()?)),
            None => Ok(LevelSetting::Unset),
        }
    }

    pub fn goal_policy(&self) -> GoalPolicy {
        GoalPolicy {
            protected_packages: self.protected_packages.iter().cloned().collect(),
            best: self.best,
            allow_erasing: self.allow_erasing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = EngineConfig::load(Some(&temp_dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.lock_timeout(), Duration::from_millis(1500));
        assert!(config.goal_policy().protected_packages.contains("goalpost"));
    }

    #[test]
    fn test_parse_partial() {
        let config = EngineConfig::parse(
            r#"
            protected_packages = ["glibc"]
            allow_erasing = true
            excludes = ["kernel*"]
            log_level = "debug"
            "#,
        )
        .unwrap();

        assert!(config.allow_erasing);
        assert!(!config.best);
        assert_eq!(config.excludes, vec!["kernel*"]);
        assert_eq!(config.log_level_setting().unwrap(), LevelSetting::Set(Level::Debug));
        let policy = config.goal_policy();
        assert!(policy.protected_packages.contains("glibc"));
        assert!(!policy.protected_packages.contains("goalpost"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(EngineConfig::parse("excludes = [\"[\"]").is_err());
        assert!(EngineConfig::parse("log_level = \"shouty\"").is_err());
        assert!(EngineConfig::parse("unknown_key = 1").is_err());
    }
}
