use serde::{Deserialize, Serialize};

/// Upstream health probe configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Cached result lifetime, seconds
    pub ttl_secs: u64,
    /// Probe timeout, seconds
    pub probe_timeout_secs: u64,
    /// Probe path appended to the service base URL
    pub probe_path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            probe_timeout_secs: 5,
            probe_path: "/api/health".to_string(),
        }
    }
}

impl HealthConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.probe_timeout_secs == 0 {
            return Err(anyhow::anyhow!(
                "Health probe timeout must be greater than 0"
            ));
        }
        if !self.probe_path.starts_with('/') {
            return Err(anyhow::anyhow!(
                "Health probe path must start with '/': {}",
                self.probe_path
            ));
        }
        Ok(())
    }
}
