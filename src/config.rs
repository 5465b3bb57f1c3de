//! Client configuration.
//!
//! Optional `mingle.toml` in the platform config directory, overridable
//! per-run: command-line flag beats the `MINGLE_SERVER` environment
//! variable, which beats the file, which beats the built-in default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ClientError;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_GATEWAY_PORT: u16 = 8877;

/// Environment override for the matching server's base URL.
pub const SERVER_ENV_VAR: &str = "MINGLE_SERVER";

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_gateway_port() -> u16 {
    DEFAULT_GATEWAY_PORT
}

fn default_open_browser() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_gateway_port")]
    pub gateway_port: u16,
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
    /// Recorder command override for the voice pipeline: the full program
    /// plus arguments, e.g. `"arecord -q -t wav -"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_program: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server_url: default_server_url(),
            gateway_port: default_gateway_port(),
            open_browser: default_open_browser(),
            capture_program: None,
        }
    }
}

/// `<config dir>/mingle/mingle.toml` where the platform has a config dir.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mingle").join("mingle.toml"))
}

/// Parse a config file; a missing file yields the defaults, an unreadable
/// or unparsable one is an error the caller reports.
pub fn load_from(path: &Path) -> Result<ClientConfig, ClientError> {
    if !path.exists() {
        return Ok(ClientConfig::default());
    }
    let raw = std::fs::read_to_string(path)?;
    toml::from_str(&raw).map_err(|e| ClientError::Config(e.to_string()))
}

/// Load the user's config, falling back to defaults on any failure.
pub fn load() -> ClientConfig {
    let Some(path) = config_path() else {
        return ClientConfig::default();
    };
    match load_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
            ClientConfig::default()
        }
    }
}

/// Resolve the server base URL: flag > `MINGLE_SERVER` > config file.
pub fn resolve_server_url(flag: Option<&str>, config: &ClientConfig) -> String {
    if let Some(url) = flag {
        return url.to_string();
    }
    if let Ok(url) = std::env::var(SERVER_ENV_VAR) {
        if !url.trim().is_empty() {
            return url;
        }
    }
    config.server_url.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.server_url, "http://127.0.0.1:8000");
        assert_eq!(config.gateway_port, 8877);
        assert!(config.open_browser);
        assert!(config.capture_program.is_none());
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_from(&dir.path().join("nope.toml")).expect("defaults");
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mingle.toml");
        std::fs::write(&path, "server_url = \"http://example.test:9000\"\n").expect("write");
        let config = load_from(&path).expect("load");
        assert_eq!(config.server_url, "http://example.test:9000");
        assert_eq!(config.gateway_port, DEFAULT_GATEWAY_PORT);
    }

    #[test]
    fn test_load_full_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mingle.toml");
        std::fs::write(
            &path,
            "server_url = \"http://h:1\"\ngateway_port = 9100\nopen_browser = false\ncapture_program = \"rec\"\n",
        )
        .expect("write");
        let config = load_from(&path).expect("load");
        assert_eq!(config.gateway_port, 9100);
        assert!(!config.open_browser);
        assert_eq!(config.capture_program.as_deref(), Some("rec"));
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mingle.toml");
        std::fs::write(&path, "server_url = [broken").expect("write");
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn test_flag_beats_everything() {
        let config = ClientConfig {
            server_url: "http://from-file:1".into(),
            ..ClientConfig::default()
        };
        let url = resolve_server_url(Some("http://from-flag:2"), &config);
        assert_eq!(url, "http://from-flag:2");
    }

    #[test]
    fn test_config_file_used_without_flag_or_env() {
        std::env::remove_var(SERVER_ENV_VAR);
        let config = ClientConfig {
            server_url: "http://from-file:1".into(),
            ..ClientConfig::default()
        };
        assert_eq!(resolve_server_url(None, &config), "http://from-file:1");
    }
}
