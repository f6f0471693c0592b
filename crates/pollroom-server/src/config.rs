use anyhow::{Context, Result};
use pollroom_core::coordinator::SessionConfig;
use pollroom_core::votes::VotePolicy;
use pollroom_core::AppConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub session: SessionSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            allowed_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Empty means no durable store; polls live in memory only.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub validate_options: bool,
    pub one_vote_per_participant: bool,
    pub remove_on_disconnect: bool,
    pub disconnect_grace_ms: u64,
    pub event_capacity: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            validate_options: session.votes.validate_options,
            one_vote_per_participant: session.votes.one_vote_per_participant,
            remove_on_disconnect: session.remove_on_disconnect,
            disconnect_grace_ms: session.disconnect_grace.as_millis() as u64,
            event_capacity: AppConfig::default().event_capacity,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {path}"))?;
            toml::from_str(&contents).with_context(|| format!("invalid config file {path}"))?
        } else {
            tracing::info!("Config file {path} not found, using defaults");
            Config::default()
        };
        config.apply_env_overrides(
            std::env::var("PORT").ok(),
            std::env::var("DATABASE_URL").ok(),
        );
        Ok(config)
    }

    /// `PORT` replaces only the port of the bind address.
    fn apply_env_overrides(&mut self, port: Option<String>, database_url: Option<String>) {
        if let Some(port) = port.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            match port.parse::<u16>() {
                Ok(port) => {
                    let host = self
                        .server
                        .bind_address
                        .rsplit_once(':')
                        .map(|(host, _)| host)
                        .unwrap_or("0.0.0.0");
                    self.server.bind_address = format!("{host}:{port}");
                }
                Err(e) => tracing::warn!("Ignoring invalid PORT value {port:?}: {e}"),
            }
        }
        if let Some(url) = database_url {
            self.database.url = url.trim().to_string();
        }
    }

    pub fn app_config(&self) -> AppConfig {
        AppConfig {
            allowed_origins: self.server.allowed_origins.clone(),
            event_capacity: self.session.event_capacity.max(1),
            session: SessionConfig {
                votes: VotePolicy {
                    validate_options: self.session.validate_options,
                    one_vote_per_participant: self.session.one_vote_per_participant,
                },
                remove_on_disconnect: self.session.remove_on_disconnect,
                disconnect_grace: Duration::from_millis(self.session.disconnect_grace_ms),
            },
        }
    }
}
