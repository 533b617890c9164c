//! Gateway configuration: TOML file + CLI overrides.
//!
//! The identity triple (access token, refresh token, user id) must be
//! available from one of the two sources before the gateway can start; a
//! connection session cannot be constructed without it.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub identity: IdentitySection,
}

/// `[gateway]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySection {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// `[backend]` section: base URLs of the remote service.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSection {
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_gameplay_url")]
    pub gameplay_url: String,
    #[serde(default = "default_users_url")]
    pub users_url: String,
    #[serde(default = "default_pusher_url")]
    pub pusher_url: String,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            gameplay_url: default_gameplay_url(),
            users_url: default_users_url(),
            pusher_url: default_pusher_url(),
        }
    }
}

/// `[identity]` section: tokens and user id sourced from the launcher.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentitySection {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user_id: Option<String>,
}

fn default_port() -> u16 {
    9977
}
fn default_auth_url() -> String {
    "https://auth.stellar.games".to_string()
}
fn default_gameplay_url() -> String {
    "https://gameplay.stellar.games".to_string()
}
fn default_users_url() -> String {
    "https://embed.stellar.games".to_string()
}
fn default_pusher_url() -> String {
    "wss://notifications-pusher.stellar.games".to_string()
}

/// Resolved configuration (file merged with CLI overrides, identity
/// present and parsed).
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub auth_url: String,
    pub gameplay_url: String,
    pub users_url: String,
    pub pusher_url: String,
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: u64,
}

impl GatewayConfig {
    /// Load config from the TOML file, then apply CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_port: Option<u16>,
        cli_access_token: Option<&str>,
        cli_refresh_token: Option<&str>,
        cli_user_id: Option<&str>,
    ) -> Result<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)
                        .with_context(|| format!("cannot read {}", expanded.display()))?;
                    toml::from_str::<ConfigFile>(&content).context("config parse error")?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        let access_token = cli_access_token
            .map(str::to_string)
            .or(file_config.identity.access_token)
            .context("access token is required (--access-token or [identity] in the config)")?;
        let refresh_token = cli_refresh_token
            .map(str::to_string)
            .or(file_config.identity.refresh_token)
            .context("refresh token is required (--refresh-token or [identity] in the config)")?;
        let user_id = cli_user_id
            .map(str::to_string)
            .or(file_config.identity.user_id)
            .context("user id is required (--user-id or [identity] in the config)")?
            .parse()
            .context("user id must be numeric")?;

        Ok(Self {
            port: cli_port.unwrap_or(file_config.gateway.port),
            auth_url: file_config.backend.auth_url,
            gameplay_url: file_config.backend.gameplay_url,
            users_url: file_config.backend.users_url,
            pusher_url: file_config.backend.pusher_url,
            access_token,
            refresh_token,
            user_id,
        })
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_values_satisfy_identity() {
        let config =
            GatewayConfig::load(None, Some(7000), Some("a"), Some("r"), Some("42")).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.access_token, "a");
        assert_eq!(config.user_id, 42);
        assert_eq!(config.auth_url, default_auth_url());
    }

    #[test]
    fn missing_identity_is_an_error() {
        assert!(GatewayConfig::load(None, None, Some("a"), Some("r"), None).is_err());
        assert!(GatewayConfig::load(None, None, None, Some("r"), Some("42")).is_err());
    }

    #[test]
    fn non_numeric_user_id_is_an_error() {
        assert!(GatewayConfig::load(None, None, Some("a"), Some("r"), Some("bob")).is_err());
    }
}
