//! Configuration for the gateway: listener, downstream service table,
//! queue backend, health probing, and the metrics exporter.
//!
//! Configuration is environment-first — every knob has a default that can
//! be overridden with env vars (`COURSES_SERVICE_URL`, `REDIS_HOST`, ...) —
//! with an optional TOML file on top that supports `${VAR:-default}`
//! expansion. The service and alias tables are immutable once loaded.

pub mod health;
pub mod monitoring;
pub mod queue;
pub mod server;
pub mod services;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use tracing::{info, warn};

pub use health::HealthConfig;
pub use monitoring::MonitoringConfig;
pub use queue::QueueConfig;
pub use server::ServerConfig;
pub use services::ServicesConfig;

/// Top-level gateway configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Config {
    /// Build a configuration from environment variables and defaults only
    pub fn from_env() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file with environment variable expansion
    pub async fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let expanded = expand_env_vars(&content);

        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;

        info!("Configuration loaded from {:?}", path.as_ref());
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        self.services.validate()?;
        self.queue.validate()?;
        self.health.validate()?;
        self.monitoring.validate()?;
        Ok(())
    }
}

/// Expand environment variables in configuration content.
/// Supports ${VAR} and ${VAR:-default} syntax.
fn expand_env_vars(content: &str) -> String {
    let mut result = content.to_string();

    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_expr = &result[start + 2..start + end];
            let replacement = if let Some(default_pos) = var_expr.find(":-") {
                let var_name = &var_expr[..default_pos];
                let default_value = &var_expr[default_pos + 2..];
                env::var(var_name).unwrap_or_else(|_| default_value.to_string())
            } else {
                env::var(var_expr).unwrap_or_else(|_| {
                    warn!(
                        "Environment variable '{}' not found, using empty string",
                        var_expr
                    );
                    String::new()
                })
            };

            result.replace_range(start..start + end + 1, &replacement);
        } else {
            break; // malformed ${VAR expression
        }
    }

    result
}
