use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Gateway listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Per-request upstream timeout, seconds
    pub forward_timeout: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".parse().expect("static bind address"),
            forward_timeout: Some(30),
        }
    }
}

impl ServerConfig {
    pub fn forward_timeout_secs(&self) -> u64 {
        self.forward_timeout.unwrap_or(30)
    }
}
