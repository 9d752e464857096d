//! Application settings loaded from `config.toml` and the environment.
//!
//! The TOML file is optional. Environment variables always win over file values,
//! which lets a container deployment run with nothing but a `.env` file.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// Label used for the node built from `LAVALINK_*` variables.
pub const ENV_NODE_LABEL: &str = "MAIN";

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// SeaORM connection string
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub lavalink: LavalinkConfig,
    #[serde(default)]
    pub spotify: Option<SpotifyConfig>,
}

/// Audio relay pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LavalinkConfig {
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    /// How many times a node connection is attempted before giving up
    #[serde(default = "default_connection_attempts")]
    pub connection_attempts: u32,
    /// Seconds to wait between connection attempts
    #[serde(default = "default_connection_interval")]
    pub connection_interval_secs: u64,
}

impl Default for LavalinkConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            connection_attempts: default_connection_attempts(),
            connection_interval_secs: default_connection_interval(),
        }
    }
}

/// A single Lavalink-compatible node
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeConfig {
    pub label: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub password: String,
    /// Use `https`/`wss` instead of `http`/`ws`
    #[serde(default)]
    pub secure: bool,
}

/// Spotify client-credentials pair
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
}

const fn default_connection_attempts() -> u32 {
    5
}

const fn default_connection_interval() -> u64 {
    5
}

const fn default_port() -> u16 {
    2333
}

impl AppConfig {
    /// Database URL with the built-in fallback applied.
    #[must_use]
    pub fn database_url(&self) -> String {
        self.database_url
            .clone()
            .unwrap_or_else(|| super::database::DEFAULT_DATABASE_URL.to_string())
    }

    /// Applies environment overrides using `lookup` to read variables.
    ///
    /// `LAVALINK_HOST` produces (or replaces) the node labelled [`ENV_NODE_LABEL`].
    /// Spotify is enabled only when both credentials are present.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL") {
            self.database_url = Some(url);
        }

        if let Some(host) = get("LAVALINK_HOST") {
            let port = match get("LAVALINK_PORT") {
                Some(raw) => parse_var("LAVALINK_PORT", &raw)?,
                None => default_port(),
            };
            let secure = get("LAVALINK_SECURE")
                .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));
            let node = NodeConfig {
                label: ENV_NODE_LABEL.to_string(),
                host,
                port,
                password: get("LAVALINK_PASSWORD").unwrap_or_default(),
                secure,
            };
            self.lavalink.nodes.retain(|n| n.label != ENV_NODE_LABEL);
            self.lavalink.nodes.insert(0, node);
        }

        if let Some(raw) = get("LAVALINK_CONNECTION_ATTEMPTS") {
            self.lavalink.connection_attempts = parse_var("LAVALINK_CONNECTION_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = get("LAVALINK_CONNECTION_INTERVAL") {
            self.lavalink.connection_interval_secs =
                parse_var("LAVALINK_CONNECTION_INTERVAL", &raw)?;
        }

        if let (Some(client_id), Some(client_secret)) =
            (get("SPOTIFY_CLIENT_ID"), get("SPOTIFY_CLIENT_SECRET"))
        {
            self.spotify = Some(SpotifyConfig {
                client_id,
                client_secret,
            });
        }

        Ok(())
    }

    /// Checks the invariants the rest of the bot relies on.
    pub fn validate(&self) -> Result<()> {
        if self.lavalink.nodes.is_empty() {
            return Err(Error::Config {
                message: "No Lavalink node configured (set LAVALINK_HOST or [[lavalink.nodes]])"
                    .to_string(),
            });
        }
        if self.lavalink.connection_attempts == 0 {
            return Err(Error::Config {
                message: "lavalink.connection_attempts must be at least 1".to_string(),
            });
        }
        for node in &self.lavalink.nodes {
            if node.host.trim().is_empty() {
                return Err(Error::Config {
                    message: format!("Lavalink node '{}' has an empty host", node.label),
                });
            }
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| Error::Config {
        message: format!("{key} has an invalid value: '{raw}'"),
    })
}

/// Parses a TOML configuration file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config file: {e}"),
    })
}

/// Loads the full application configuration.
///
/// Reads the file named by `GUILDTUNES_CONFIG` (default `config.toml`) if it
/// exists, then applies environment overrides and validates the result.
pub fn load_app_configuration() -> Result<AppConfig> {
    let path = std::env::var("GUILDTUNES_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

    let mut config = if Path::new(&path).exists() {
        info!("Loading configuration from {path}");
        load_config(&path)?
    } else {
        debug!("No configuration file at {path}, using environment only");
        AppConfig::default()
    };

    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;

    info!(
        nodes = config.lavalink.nodes.len(),
        spotify = config.spotify.is_some(),
        "Configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_node_config() {
        let toml_str = r#"
            database_url = "sqlite::memory:"

            [lavalink]
            connection_attempts = 3

            [[lavalink.nodes]]
            label = "europe"
            host = "lava.example.org"
            password = "hunter2"
            secure = true
        "#;

        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.lavalink.connection_attempts, 3);
        assert_eq!(config.lavalink.connection_interval_secs, 5);
        assert_eq!(config.lavalink.nodes.len(), 1);
        assert_eq!(config.lavalink.nodes[0].port, 2333);
        assert!(config.lavalink.nodes[0].secure);
        assert!(config.spotify.is_none());
    }

    #[test]
    fn test_env_builds_main_node() -> Result<()> {
        let mut config = AppConfig::default();
        config.apply_env(env(&[
            ("LAVALINK_HOST", "localhost"),
            ("LAVALINK_PORT", "2444"),
            ("LAVALINK_PASSWORD", "youshallnotpass"),
            ("LAVALINK_CONNECTION_ATTEMPTS", "2"),
        ]))?;
        config.validate()?;

        let node = &config.lavalink.nodes[0];
        assert_eq!(node.label, ENV_NODE_LABEL);
        assert_eq!(node.port, 2444);
        assert!(!node.secure);
        assert_eq!(config.lavalink.connection_attempts, 2);
        Ok(())
    }

    #[test]
    fn test_spotify_requires_both_credentials() -> Result<()> {
        let mut config = AppConfig::default();
        config.apply_env(env(&[("SPOTIFY_CLIENT_ID", "abc")]))?;
        assert!(config.spotify.is_none());

        config.apply_env(env(&[
            ("SPOTIFY_CLIENT_ID", "abc"),
            ("SPOTIFY_CLIENT_SECRET", "def"),
        ]))?;
        assert_eq!(config.spotify.unwrap().client_secret, "def");
        Ok(())
    }

    #[test]
    fn test_invalid_port_is_config_error() {
        let mut config = AppConfig::default();
        let result = config.apply_env(env(&[
            ("LAVALINK_HOST", "localhost"),
            ("LAVALINK_PORT", "not-a-port"),
        ]));
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_validate_rejects_missing_nodes() {
        let config = AppConfig::default();
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }
}
