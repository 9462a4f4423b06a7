//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/stoq/config.toml)
//! 3. Environment variables (STOQ_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable prefix
const ENV_PREFIX: &str = "STOQ";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (SQLite db)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base URL of the remote API (optional; offline-only without it)
    #[serde(default)]
    pub api_url: Option<String>,

    /// Static bearer token for replay calls (optional)
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Path of the liveness endpoint, joined to `api_url`
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Seconds between connectivity probes
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// Per-probe timeout in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Timeout for replay requests in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Attempts per entry before it is marked failed
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Milliseconds to wait after reconnecting before syncing
    #[serde(default = "default_reconnect_debounce_ms")]
    pub reconnect_debounce_ms: u64,

    /// Milliseconds between consecutive replays within a pass
    #[serde(default = "default_replay_gap_ms")]
    pub replay_gap_ms: u64,

    /// Seconds between queue-depth housekeeping refreshes
    #[serde(default = "default_housekeeping_interval_secs")]
    pub housekeeping_interval_secs: u64,

    /// Whether to run a sync pass at startup when online
    #[serde(default = "default_sync_on_start")]
    pub sync_on_start: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            api_url: None,
            auth_token: None,
            health_path: default_health_path(),
            probe_interval_secs: default_probe_interval_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            reconnect_debounce_ms: default_reconnect_debounce_ms(),
            replay_gap_ms: default_replay_gap_ms(),
            housekeeping_interval_secs: default_housekeeping_interval_secs(),
            sync_on_start: default_sync_on_start(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (STOQ_DATA_DIR, STOQ_API_URL, STOQ_AUTH_TOKEN)
    /// 2. Config file (~/.config/stoq/config.toml or STOQ_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // STOQ_DATA_DIR
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        // STOQ_API_URL
        if let Ok(val) = std::env::var(format!("{}_API_URL", ENV_PREFIX)) {
            self.api_url = if val.is_empty() { None } else { Some(val) };
        }

        // STOQ_AUTH_TOKEN
        if let Ok(val) = std::env::var(format!("{}_AUTH_TOKEN", ENV_PREFIX)) {
            self.auth_token = if val.is_empty() { None } else { Some(val) };
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with STOQ_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stoq")
            .join("config.toml")
    }

    /// Get the path to the SQLite database
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("stoq.db")
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reconnect_debounce(&self) -> Duration {
        Duration::from_millis(self.reconnect_debounce_ms)
    }

    pub fn replay_gap(&self) -> Duration {
        Duration::from_millis(self.replay_gap_ms)
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.housekeeping_interval_secs)
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stoq")
}

fn default_health_path() -> String {
    "/api/health".to_string()
}

fn default_probe_interval_secs() -> u64 {
    2
}

fn default_probe_timeout_ms() -> u64 {
    1500
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

fn default_reconnect_debounce_ms() -> u64 {
    1000
}

fn default_replay_gap_ms() -> u64 {
    300
}

fn default_housekeeping_interval_secs() -> u64 {
    5
}

fn default_sync_on_start() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap();
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            // Clear all the vars
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &["STOQ_DATA_DIR", "STOQ_API_URL", "STOQ_AUTH_TOKEN"];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.api_url.is_none());
        assert!(config.auth_token.is_none());
        assert_eq!(config.health_path, "/api/health");
        assert_eq!(config.probe_interval_secs, 2);
        assert_eq!(config.probe_timeout_ms, 1500);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.reconnect_debounce_ms, 1000);
        assert!(config.sync_on_start);
        assert!(config.data_dir.ends_with("stoq"));
    }

    #[test]
    fn test_db_path() {
        let config = Config::default();
        assert!(config.db_path().ends_with("stoq.db"));
    }

    #[test]
    fn test_duration_accessors() {
        let config = Config::default();
        assert_eq!(config.probe_interval(), Duration::from_secs(2));
        assert_eq!(config.probe_timeout(), Duration::from_millis(1500));
        assert_eq!(config.reconnect_debounce(), Duration::from_millis(1000));
        assert_eq!(config.replay_gap(), Duration::from_millis(300));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("STOQ_DATA_DIR", "/tmp/stoq-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/stoq-test"));
    }

    #[test]
    fn test_env_override_api_url() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        assert!(config.api_url.is_none());

        env::set_var("STOQ_API_URL", "http://localhost:3000");
        config.apply_env_overrides();
        assert_eq!(config.api_url, Some("http://localhost:3000".to_string()));

        // Empty string clears it
        env::set_var("STOQ_API_URL", "");
        config.apply_env_overrides();
        assert!(config.api_url.is_none());
    }

    #[test]
    fn test_env_override_auth_token() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("STOQ_AUTH_TOKEN", "secret-token");
        config.apply_env_overrides();
        assert_eq!(config.auth_token, Some("secret-token".to_string()));
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            data_dir: PathBuf::from("/data/stoq"),
            api_url: Some("https://api.example.com".to_string()),
            max_retries: 5,
            ..Config::default()
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("api_url"));
        assert!(toml_str.contains("max_retries"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.api_url, config.api_url);
        assert_eq!(parsed.max_retries, 5);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            api_url = "https://api.example.com"
            probe_interval_secs = 10
            sync_on_start = false
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.api_url, Some("https://api.example.com".to_string()));
        assert_eq!(config.probe_interval_secs, 10);
        assert!(!config.sync_on_start);

        // Unspecified fields take defaults
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.health_path, "/api/health");
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let temp = tempfile::TempDir::new().unwrap();
        env::set_var("STOQ_DATA_DIR", temp.path().join("data").to_str().unwrap());

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        // Should return defaults when file doesn't exist
        assert!(config.api_url.is_none());
        assert!(config.sync_on_start);
    }
}
