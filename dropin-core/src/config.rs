//! Launcher configuration.
//!
//! # Storage layout
//!
//! ```text
//! <base>/
//!   conf/dropin.yaml   (optional, every field has a default)
//!   core/              (provisioned once at startup)
//!   runtime/           (polled when `watch_runtime` is set)
//!   application/       (polled when `watch_application` is set)
//! ```
//!
//! Relative directory entries are resolved against `<base>`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

/// Location of the configuration file relative to the base directory.
pub const CONFIG_FILE: &str = "conf/dropin.yaml";

/// Environment variable dilating every stability grace period.
pub const TIME_FACTOR_ENV: &str = "DROPIN_TIME_FACTOR";

/// Filename prefix of modules only deployed in interactive mode.
pub const INTERACTIVE_PREFIX: &str = "interactive-console";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub core_dir: PathBuf,
    pub runtime_dir: PathBuf,
    pub application_dir: PathBuf,
    pub watch_runtime: bool,
    pub watch_application: bool,
    pub poll_interval_ms: u64,
    pub interactive: bool,
    pub use_references: bool,
    pub auto_refresh: bool,
    pub stability: StabilityConfig,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            core_dir: PathBuf::from("core"),
            runtime_dir: PathBuf::from("runtime"),
            application_dir: PathBuf::from("application"),
            watch_runtime: false,
            watch_application: true,
            poll_interval_ms: 2000,
            interactive: false,
            use_references: true,
            auto_refresh: false,
            stability: StabilityConfig::default(),
        }
    }
}

/// Timing of the stability checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    pub grace_ms: u64,
    pub attempts: u32,
    pub time_factor: u32,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            grace_ms: 100,
            attempts: 500,
            time_factor: 1,
        }
    }
}

impl LauncherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Polling period for a directory, `None` when it is provisioned once.
    pub fn polling_for(&self, watched: bool) -> Option<Duration> {
        watched.then(|| self.poll_interval())
    }

    pub fn core_dir_at(&self, base: &Path) -> PathBuf {
        base.join(&self.core_dir)
    }

    pub fn runtime_dir_at(&self, base: &Path) -> PathBuf {
        base.join(&self.runtime_dir)
    }

    pub fn application_dir_at(&self, base: &Path) -> PathBuf {
        base.join(&self.application_dir)
    }

    /// Apply environment overrides on top of the file content.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_time_factor(std::env::var(TIME_FACTOR_ENV).ok())
    }

    fn apply_time_factor(&mut self, value: Option<String>) -> Result<(), ConfigError> {
        let Some(value) = value else {
            return Ok(());
        };
        let factor = value
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|factor| *factor > 0)
            .ok_or_else(|| ConfigError::InvalidOverride {
                var: TIME_FACTOR_ENV,
                value: value.clone(),
            })?;
        self.stability.time_factor = factor;
        Ok(())
    }
}

/// `<base>/conf/dropin.yaml`. Pure, no I/O.
pub fn config_path_at(base: &Path) -> PathBuf {
    base.join(CONFIG_FILE)
}

/// Load the launcher configuration under `base`.
///
/// A missing file yields [`LauncherConfig::default`]; a malformed one returns
/// [`ConfigError::Parse`] with the file path.
pub fn load_at(base: &Path) -> Result<LauncherConfig, ConfigError> {
    let path = config_path_at(base);
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no launcher configuration, using defaults");
        return Ok(LauncherConfig::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(LauncherConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// Write `config` to `<base>/conf/dropin.yaml`, creating `conf/` if needed.
pub fn save_at(base: &Path, config: &LauncherConfig) -> Result<PathBuf, ConfigError> {
    let path = config_path_at(base);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let yaml = serde_yaml::to_string(config).map_err(|e| ConfigError::Serialize {
        path: path.clone(),
        source: e,
    })?;
    std::fs::write(&path, yaml).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let base = TempDir::new().unwrap();
        let config = load_at(base.path()).unwrap();
        assert_eq!(config, LauncherConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let base = TempDir::new().unwrap();
        std::fs::create_dir_all(base.path().join("conf")).unwrap();
        std::fs::write(
            config_path_at(base.path()),
            "watch_runtime: true\npoll_interval_ms: 50\nstability:\n  attempts: 7\n",
        )
        .unwrap();

        let config = load_at(base.path()).unwrap();
        assert!(config.watch_runtime);
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.stability.attempts, 7);
        assert_eq!(config.stability.grace_ms, 100);
        assert!(config.watch_application);
    }

    #[test]
    fn saved_configuration_loads_back() {
        let base = TempDir::new().unwrap();
        let config = LauncherConfig {
            interactive: true,
            poll_interval_ms: 250,
            ..LauncherConfig::default()
        };
        let path = save_at(base.path(), &config).unwrap();
        assert_eq!(path, config_path_at(base.path()));
        assert_eq!(load_at(base.path()).unwrap(), config);
    }

    #[test]
    fn time_factor_override_replaces_file_value() {
        let mut config = LauncherConfig::default();
        config.apply_time_factor(Some("4".to_string())).unwrap();
        assert_eq!(config.stability.time_factor, 4);
    }

    #[test]
    fn zero_time_factor_is_rejected() {
        let mut config = LauncherConfig::default();
        let err = config.apply_time_factor(Some("0".to_string())).unwrap_err();
        assert!(err.to_string().contains(TIME_FACTOR_ENV));
    }

    #[test]
    fn polling_only_for_watched_directories() {
        let config = LauncherConfig::default();
        assert_eq!(config.polling_for(false), None);
        assert_eq!(config.polling_for(true), Some(Duration::from_millis(2000)));
    }
}
