use std::time::Duration;

use anyhow::Context;
use dice_chess_relay::rate_limit::RateLimit;
use dice_chess_relay::server::ServerOptions;
use serde::{Deserialize, Serialize};


pub const DEFAULT_PORT: u16 = 3000;

// Overrides `port` from the config file. Set by the hosting environment.
pub const PORT_ENV_VAR: &str = "PORT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_window", with = "humantime_serde")]
    pub window: Duration,
    #[serde(default = "default_max_messages")]
    pub max_messages: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    // Metrics endpoint is disabled if not set.
    #[serde(default)]
    pub metrics_port: Option<u16>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
}

fn default_port() -> u16 { DEFAULT_PORT }
fn default_rate_window() -> Duration { RateLimit::default().window }
fn default_max_messages() -> u32 { RateLimit::default().max_messages }

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: DEFAULT_PORT,
            metrics_port: None,
            rate_limit: None,
        }
    }
}

impl ServerConfig {
    // Reads the config file, if any, and applies environment overrides.
    pub fn load(config_file: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match config_file {
            Some(filename) => {
                let contents = std::fs::read_to_string(filename)
                    .context(format!("Failed to read config file '{filename}'."))?;
                Self::parse(&contents)
                    .context(format!("Failed to parse config file '{filename}'."))?
            }
            None => ServerConfig::default(),
        };
        if let Ok(port) = std::env::var(PORT_ENV_VAR) {
            config.port = port
                .parse()
                .context(format!("Invalid {PORT_ENV_VAR} environment variable: '{port}'."))?;
        }
        Ok(config)
    }

    pub fn parse(yaml: &str) -> anyhow::Result<Self> { Ok(serde_yaml::from_str(yaml)?) }

    pub fn server_options(&self) -> ServerOptions {
        let rate_limit = match &self.rate_limit {
            Some(RateLimitConfig { window, max_messages }) => {
                RateLimit { window: *window, max_messages: *max_messages }
            }
            None => RateLimit::default(),
        };
        ServerOptions { rate_limit }
    }
}
