use serde::{Deserialize, Serialize};

/// Prometheus exporter configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub metrics_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            metrics_port: 9090,
        }
    }
}

impl MonitoringConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        // Port 0 means auto-assign, used in tests
        Ok(())
    }
}
