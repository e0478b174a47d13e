//! Process configuration
//!
//! Persistent settings for the coordinator: the OAuth client identity, the
//! loopback callback port, and where the external engine listens. Tokens
//! and selections are deliberately NOT here; they live only for the process
//! lifetime.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Shared OAuth client identifier, process-wide configuration rather than a
/// runtime value threaded through state objects.
pub const DEFAULT_CLIENT_ID: &str =
    "1002733101410-bjudg86hd9smfnefsn04mots6tbrfl4t.apps.googleusercontent.com";

const DEFAULT_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/drive";
const DEFAULT_ENGINE_URL: &str = "http://127.0.0.1:5572";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// OAuth client identifier presented to the provider
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Provider authorization endpoint
    #[serde(default = "default_auth_endpoint")]
    pub auth_endpoint: String,
    /// Scope string requested for both drive sessions
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Loopback port for the redirect listener (0 = ephemeral). Implicit
    /// grants require the redirect URI to be registered, so a fixed port is
    /// the usual choice.
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,
    /// Base URL of the rclone remote-control daemon
    #[serde(default = "default_engine_url")]
    pub engine_url: String,
    /// Destination root every transfer lands under
    #[serde(default = "default_dest_root")]
    pub dest_root: String,
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_auth_endpoint() -> String {
    DEFAULT_AUTH_ENDPOINT.to_string()
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_callback_port() -> u16 {
    8185
}

fn default_engine_url() -> String {
    DEFAULT_ENGINE_URL.to_string()
}

fn default_dest_root() -> String {
    "/".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            auth_endpoint: default_auth_endpoint(),
            scope: default_scope(),
            callback_port: default_callback_port(),
            engine_url: default_engine_url(),
            dest_root: default_dest_root(),
        }
    }
}

/// Get the path to the config file
fn get_config_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")));
    config_dir.join("driveferry").join("config.json")
}

/// Load configuration from disk, falling back to defaults on any problem.
pub fn load_config() -> AppConfig {
    load_config_from(&get_config_path())
}

pub fn load_config_from(path: &Path) -> AppConfig {
    if path.exists() {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config: {}", e);
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config: {}", e);
            }
        }
    }

    AppConfig::default()
}

/// Save configuration to disk
pub fn save_config(config: &AppConfig) -> Result<(), String> {
    save_config_to(config, &get_config_path())
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))?;

    tracing::info!("Config saved to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(config.dest_root, "/");
        assert_eq!(config.callback_port, 8185);
        assert!(config.engine_url.starts_with("http://127.0.0.1"));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        // Older config files may miss newer fields.
        let json = r#"{"engine_url":"http://127.0.0.1:5573"}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.engine_url, "http://127.0.0.1:5573");
        assert_eq!(config.scope, DEFAULT_SCOPE);
        assert_eq!(config.client_id, DEFAULT_CLIENT_ID);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("driveferry").join("config.json");

        let mut config = AppConfig::default();
        config.callback_port = 9000;
        config.dest_root = "/inbox/".to_string();
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path);
        assert_eq!(loaded.callback_port, 9000);
        assert_eq!(loaded.dest_root, "/inbox/");
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("nope.json"));
        assert_eq!(config.client_id, DEFAULT_CLIENT_ID);
    }
}
