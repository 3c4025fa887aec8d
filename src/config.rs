//! Configuration loading and persistence.
//!
//! Settings are read from `config.json` in the config directory, then
//! overridden by `ONEDATA_*` environment variables. The access token is only
//! ever taken from the environment (or the command line) and never written
//! back to disk.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{fs, path::Path, path::PathBuf, time::Duration};

use crate::connection::ClientOptions;
use crate::constants::{
    DEFAULT_PROTOCOL_VERSION, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SERVER_URL, DEFAULT_WS_PATH,
};

/// Client configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Origin of the Onezone server (`https://...`).
    pub server_url: String,
    /// Endpoint path appended to the origin.
    pub ws_path: String,
    /// Per-request timeout in seconds.
    pub request_timeout: u64,
    /// Protocol version offered in the handshake.
    pub protocol_version: u32,
    /// Access token - NOT serialized to disk.
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            token: None,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `ONEDATA_WS_CONFIG_DIR` overrides the platform config directory.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("ONEDATA_WS_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("onedata-ws")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(dir)
    }

    /// Path of the config file.
    pub fn path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing or unreadable file falls back to defaults.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        let mut config = match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                log::debug!("[Config] Using defaults: {:#}", e);
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a specific file, without overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `ONEDATA_*` overrides using `lookup` to read variables.
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(server_url) = lookup("ONEDATA_SERVER_URL") {
            self.server_url = server_url;
        }

        if let Some(ws_path) = lookup("ONEDATA_WS_PATH") {
            self.ws_path = ws_path;
        }

        if let Some(timeout) = lookup("ONEDATA_REQUEST_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(secs) => self.request_timeout = secs,
                Err(_) => log::warn!("[Config] Ignoring ONEDATA_REQUEST_TIMEOUT={}", timeout),
            }
        }

        if let Some(version) = lookup("ONEDATA_PROTOCOL_VERSION") {
            match version.parse::<u32>() {
                Ok(v) => self.protocol_version = v,
                Err(_) => log::warn!("[Config] Ignoring ONEDATA_PROTOCOL_VERSION={}", version),
            }
        }

        if let Some(token) = lookup("ONEDATA_TOKEN") {
            self.token = Some(token).filter(|t| !t.is_empty());
        }
    }

    /// Persists the current configuration to `path`.
    /// Note: the token is never written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("failed to write {}", path.display()))?;

        // Set restrictive permissions (owner read/write only)
        #[cfg(unix)]
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Persists the current configuration to [`Self::path`].
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Full websocket endpoint for the configured server.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        crate::ws::endpoint_url(&self.server_url, &self.ws_path)
    }

    /// Options for [`crate::WebsocketClient::new`].
    #[must_use]
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            url: self.endpoint_url(),
            request_timeout: Duration::from_secs(self.request_timeout),
            protocol_version: self.protocol_version,
            auth_token: self.token.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ws_path, "/graph_sync/gui");
        assert_eq!(config.request_timeout, 10);
        assert_eq!(config.protocol_version, 1);
        assert!(config.token.is_none());
    }

    #[test]
    fn test_config_serialization_excludes_token() {
        let config = Config {
            token: Some("secret_token".to_string()),
            ..Config::default()
        };
        let json = serde_json::to_string(&config).unwrap();

        assert!(!json.contains("secret_token"));
        assert!(!json.contains("token"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "server_url": "https://zone.example" }"#).unwrap();
        assert_eq!(config.server_url, "https://zone.example");
        assert_eq!(config.request_timeout, 10);
    }

    #[test]
    fn test_overrides_apply_and_ignore_garbage() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[
            ("ONEDATA_SERVER_URL", "http://127.0.0.1:8080"),
            ("ONEDATA_REQUEST_TIMEOUT", "soon"),
            ("ONEDATA_PROTOCOL_VERSION", "3"),
            ("ONEDATA_TOKEN", "tok"),
        ]));

        assert_eq!(config.server_url, "http://127.0.0.1:8080");
        assert_eq!(config.request_timeout, 10);
        assert_eq!(config.protocol_version, 3);
        assert_eq!(config.token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_empty_token_override_clears_token() {
        let mut config = Config {
            token: Some("old".into()),
            ..Config::default()
        };
        config.apply_overrides(lookup_from(&[("ONEDATA_TOKEN", "")]));
        assert!(config.token.is_none());
    }

    #[test]
    fn test_save_and_load_round_trip_without_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = Config {
            server_url: "https://zone.example".into(),
            request_timeout: 3,
            token: Some("never-on-disk".into()),
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();

        assert_eq!(loaded.server_url, "https://zone.example");
        assert_eq!(loaded.request_timeout, 3);
        assert!(loaded.token.is_none());
    }

    #[test]
    fn test_save_writes_into_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("ONEDATA_WS_CONFIG_DIR", dir.path());

        let config = Config {
            ws_path: "/custom".into(),
            ..Config::default()
        };
        let path = config.save().unwrap();
        std::env::remove_var("ONEDATA_WS_CONFIG_DIR");

        assert_eq!(path, dir.path().join("config.json"));
        assert_eq!(Config::load_from(&path).unwrap().ws_path, "/custom");
        #[cfg(unix)]
        assert_eq!(
            fs::metadata(&path).unwrap().permissions().mode() & 0o777,
            0o600
        );
    }

    #[test]
    fn test_client_options_from_config() {
        let config = Config {
            server_url: "https://zone.example/".into(),
            request_timeout: 4,
            token: Some("t".into()),
            ..Config::default()
        };
        let options = config.client_options();

        assert_eq!(options.url, "wss://zone.example/graph_sync/gui");
        assert_eq!(options.request_timeout, Duration::from_secs(4));
        assert_eq!(options.protocol_version, 1);
        assert_eq!(options.auth_token.as_deref(), Some("t"));
    }
}
