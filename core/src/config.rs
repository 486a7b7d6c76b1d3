//! Configuration management.
//!
//! Stores configuration in TOML format at `<config_dir>/devdash/config.toml`
//! (`~/.config/devdash/config.toml` on Linux). Every key is optional.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::domain::WatchSet;
use crate::error::{Error, Result};

/// Shortest poll interval accepted from configuration.
const MIN_REFRESH_RATE: f64 = 0.5;

/// Longest poll interval accepted from configuration (one day).
pub const MAX_REFRESH_RATE: f64 = 86_400.0;

/// Dashboard settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between polls.
    pub refresh_rate: f64,

    /// Rows kept in the all-processes table.
    pub process_limit: usize,

    /// Ports that raise a notification when something starts listening.
    pub watched_ports: Vec<u16>,

    /// Percent at which values turn from normal to warning colour.
    pub color_threshold_low: f64,

    /// Percent at which values turn from warning to critical colour.
    pub color_threshold_high: f64,

    /// Case-insensitive substrings selecting the dev-process table.
    pub interest_patterns: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_rate: 3.0,
            process_limit: 80,
            watched_ports: Vec::new(),
            color_threshold_low: 50.0,
            color_threshold_high: 80.0,
            interest_patterns: vec!["node".to_string()],
        }
    }
}

impl Config {
    /// Poll interval, clamped to `[MIN_REFRESH_RATE, MAX_REFRESH_RATE]`.
    pub fn refresh_interval(&self) -> Duration {
        let rate = if self.refresh_rate.is_nan() {
            Config::default().refresh_rate
        } else {
            self.refresh_rate.clamp(MIN_REFRESH_RATE, MAX_REFRESH_RATE)
        };
        Duration::try_from_secs_f64(rate).unwrap_or(Duration::from_secs(MAX_REFRESH_RATE as u64))
    }

    /// Watched ports as a set.
    pub fn watch_set(&self) -> WatchSet {
        self.watched_ports.iter().copied().collect()
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.refresh_rate.is_finite()
            || self.refresh_rate <= 0.0
            || self.refresh_rate > MAX_REFRESH_RATE
        {
            return Err(Error::Config(format!(
                "refresh_rate must be between 0 and {} seconds, got {}",
                MAX_REFRESH_RATE, self.refresh_rate
            )));
        }
        if self.process_limit == 0 {
            return Err(Error::Config("process_limit must be at least 1".to_string()));
        }
        if self.color_threshold_low > self.color_threshold_high {
            return Err(Error::Config(format!(
                "color_threshold_low ({}) exceeds color_threshold_high ({})",
                self.color_threshold_low, self.color_threshold_high
            )));
        }
        if self.interest_patterns.iter().all(|p| p.trim().is_empty()) {
            return Err(Error::Config(
                "interest_patterns must contain at least one pattern".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration store for reading and writing `config.toml`.
pub struct ConfigStore {
    /// Path to the configuration file.
    config_path: PathBuf,
}

impl ConfigStore {
    /// Create a new config store with the default path.
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

        Ok(Self {
            config_path: config_dir.join("devdash").join("config.toml"),
        })
    }

    /// Create a config store with a custom path.
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load configuration from disk.
    ///
    /// Returns default config if the file doesn't exist.
    pub async fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub async fn save(&self, config: &Config) -> Result<()> {
        if let Some(config_dir) = self.config_path.parent() {
            fs::create_dir_all(config_dir)
                .await
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let content = toml::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        // Write atomically by writing to temp file then renaming
        let temp_path = self.config_path.with_extension("toml.tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to create temp config file: {}", e)))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        file.sync_all()
            .await
            .map_err(|e| Error::Config(format!("Failed to sync config: {}", e)))?;

        fs::rename(&temp_path, &self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to rename config file: {}", e)))?;

        Ok(())
    }

    /// Add a watched port. Returns false if it was already watched.
    pub async fn add_watched_port(&self, port: u16) -> Result<bool> {
        let mut config = self.load().await?;
        if config.watched_ports.contains(&port) {
            return Ok(false);
        }
        config.watched_ports.push(port);
        config.watched_ports.sort_unstable();
        self.save(&config).await?;
        Ok(true)
    }

    /// Remove a watched port.
    pub async fn remove_watched_port(&self, port: u16) -> Result<()> {
        let mut config = self.load().await?;
        config.watched_ports.retain(|p| *p != port);
        self.save(&config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store(dir: &tempfile::TempDir) -> ConfigStore {
        ConfigStore::with_path(dir.path().join("devdash").join("config.toml"))
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let dir = tempdir().unwrap();
        let config = test_store(&dir).load().await.unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.refresh_interval(), Duration::from_secs(3));
        assert_eq!(config.interest_patterns, vec!["node"]);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "refresh_rate = 1.5\nwatched_ports = [3000, 5432]\n").unwrap();

        let config = store.load().await.unwrap();
        assert_eq!(config.refresh_rate, 1.5);
        assert_eq!(config.process_limit, 80);
        assert!(config.watch_set().contains(5432));
    }

    #[tokio::test]
    async fn test_invalid_file_is_config_error() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();

        std::fs::write(store.path(), "refresh_rate = \"fast\"").unwrap();
        assert!(matches!(store.load().await, Err(Error::Config(_))));

        std::fs::write(store.path(), "process_limit = 0").unwrap();
        assert!(matches!(store.load().await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        let config = Config {
            refresh_rate: 2.0,
            watched_ports: vec![3000],
            interest_patterns: vec!["node".into(), "deno".into()],
            ..Config::default()
        };
        store.save(&config).await.unwrap();

        assert_eq!(store.load().await.unwrap(), config);
        assert!(!store.path().with_extension("toml.tmp").exists());
    }

    #[tokio::test]
    async fn test_watched_ports() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        assert!(store.add_watched_port(8080).await.unwrap());
        assert!(store.add_watched_port(3000).await.unwrap());
        assert!(!store.add_watched_port(3000).await.unwrap());
        assert_eq!(store.load().await.unwrap().watched_ports, vec![3000, 8080]);

        store.remove_watched_port(8080).await.unwrap();
        assert_eq!(store.load().await.unwrap().watched_ports, vec![3000]);
    }

    #[test]
    fn test_refresh_interval_is_clamped() {
        let config = Config {
            refresh_rate: 0.01,
            ..Config::default()
        };
        assert_eq!(config.refresh_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_huge_refresh_rate_is_rejected_and_clamped() {
        for rate in [1e300, f64::INFINITY, MAX_REFRESH_RATE + 1.0] {
            let config = Config {
                refresh_rate: rate,
                ..Config::default()
            };
            assert!(matches!(config.validate(), Err(Error::Config(_))));
            assert_eq!(config.refresh_interval(), Duration::from_secs(86_400));
        }

        let config = Config {
            refresh_rate: f64::NAN,
            ..Config::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.refresh_interval(), Duration::from_secs(3));
    }
}
