use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the REST base URL
pub const API_URL_ENV: &str = "WACHAT_API_URL";
/// Environment variable overriding the live-update server URL
pub const SOCKET_URL_ENV: &str = "WACHAT_SOCKET_URL";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL for the REST API, e.g. `http://localhost:5000/api`
    pub api_base_url: String,

    /// Server URL for the live-update socket, e.g. `http://localhost:5000`
    pub socket_url: String,

    /// Per-request timeout for REST calls and for establishing the socket
    pub request_timeout_secs: u64,

    /// Wachat home directory (config and log file live here)
    #[serde(skip)]
    pub wachat_home: PathBuf,

    /// UI preferences
    pub ui: UiConfig,
}

/// UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Terminal width (columns) below which only one panel is shown
    pub narrow_breakpoint: u16,
    /// Display name used in the sidebar header
    pub profile_name: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            // 768 logical pixels at 8px per cell
            narrow_breakpoint: 96,
            profile_name: "My WhatsApp".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));

        Config {
            api_base_url: "http://localhost:5000/api".to_string(),
            socket_url: "http://localhost:5000".to_string(),
            request_timeout_secs: 10,
            wachat_home: home.join(".wachat"),
            ui: UiConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `~/.wachat/config.toml` (if present) and the environment
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        let wachat_home = home.join(".wachat");

        let mut config = Self::load_file(&wachat_home.join("config.toml"))?;
        config.wachat_home = wachat_home;
        config.apply_env(|key| std::env::var(key).ok());

        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Apply environment overrides; `lookup` is `std::env::var` outside tests
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(url) = lookup(SOCKET_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.socket_url = url;
        }
    }

    /// Apply command-line overrides
    pub fn apply_overrides(&mut self, api_url: Option<String>, socket_url: Option<String>) {
        if let Some(url) = api_url {
            self.api_base_url = url;
        }
        if let Some(url) = socket_url {
            self.socket_url = url;
        }
    }

    /// Path of the log file written by the tracing subscriber
    pub fn log_path(&self) -> PathBuf {
        self.wachat_home.join("wachat.log")
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:5000/api");
        assert_eq!(config.socket_url, "http://localhost:5000");
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.ui.narrow_breakpoint, 96);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            api_base_url = "https://chat.example.com/api"

            [ui]
            narrow_breakpoint = 120
            "#,
        )
        .unwrap();
        assert_eq!(config.api_base_url, "https://chat.example.com/api");
        assert_eq!(config.socket_url, "http://localhost:5000");
        assert_eq!(config.ui.narrow_breakpoint, 120);
        assert_eq!(config.ui.profile_name, "My WhatsApp");
    }

    #[test]
    fn test_env_then_cli_overrides() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            API_URL_ENV => Some("http://env/api".to_string()),
            SOCKET_URL_ENV => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.api_base_url, "http://env/api");
        assert_eq!(config.socket_url, "http://localhost:5000");

        config.apply_overrides(None, Some("http://cli:5000".to_string()));
        assert_eq!(config.api_base_url, "http://env/api");
        assert_eq!(config.socket_url, "http://cli:5000");
    }

    #[test]
    fn test_missing_file_gives_default() {
        let config = Config::load_file(Path::new("/nonexistent/wachat/config.toml")).unwrap();
        assert_eq!(config.request_timeout_secs, 10);
    }
}
