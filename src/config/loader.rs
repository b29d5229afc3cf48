//! Configuration Loader
//!
//! Environment-aware loading of [`FleetConfig`]: serde defaults, then an
//! optional TOML file, then `FLEET__SECTION__FIELD` environment variables.

use super::error::ConfigResult;
use super::FleetConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_CONFIG_PATH: &str = "config/fleet.toml";
const ENV_PREFIX: &str = "FLEET";

/// Loaded configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: FleetConfig,
    environment: String,
    source_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    ///
    /// The file path comes from `FLEET_CONFIG_PATH`, falling back to
    /// `config/fleet.toml`. A missing file is not an error.
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let path = env::var("FLEET_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from_path(Some(&path))
    }

    /// Load configuration from a specific file (or defaults + env only)
    pub fn load_from_path(path: Option<&Path>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();

        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!(
                environment = %environment,
                path = %path.display(),
                "Loading fleet configuration file"
            );
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }
        builder = builder.add_source(Self::environment_source());

        let config: FleetConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        info!(
            environment = %environment,
            source = %path.map(|p| p.display().to_string()).unwrap_or_else(|| "defaults".to_string()),
            strategy = ?config.movement.strategy,
            poll_interval_ms = config.movement.poll_interval_ms,
            "Fleet configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment,
            source_path: path.map(Path::to_path_buf),
        }))
    }

    /// Load configuration from an in-memory TOML document
    pub fn from_toml_str(toml: &str) -> ConfigResult<Arc<ConfigManager>> {
        let config: FleetConfig = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;

        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            source_path: None,
        }))
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Detect the current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("FLEET_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn environment_source() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompletionStrategy;
    use std::io::Write;

    #[test]
    fn test_toml_overrides_defaults() {
        let manager = ConfigManager::from_toml_str(
            r#"
            [movement]
            standard_timeout_secs = 120
            poll_interval_ms = 500
            strategy = "polling_only"

            [broadcast]
            capacity = 16
            "#,
        )
        .unwrap();

        let config = manager.config();
        assert_eq!(config.movement.standard_timeout_secs, 120);
        assert_eq!(config.movement.poll_interval_ms, 500);
        assert_eq!(config.movement.strategy, CompletionStrategy::PollingOnly);
        assert_eq!(config.movement.charge_dock_timeout_secs, 600);
        assert_eq!(config.broadcast.capacity, 16);
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let result = ConfigManager::from_toml_str(
            r#"
            [monitor]
            event_channel_capacity = 0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[cancellation]\nidle_wait_timeout_ms = 1500").unwrap();

        let manager = ConfigManager::load_from_path(Some(file.path())).unwrap();
        assert_eq!(manager.config().cancellation.idle_wait_timeout_ms, 1500);
        assert_eq!(manager.source_path(), Some(file.path()));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            ConfigManager::load_from_path(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(manager.config().movement.standard_timeout_secs, 300);
    }
}
