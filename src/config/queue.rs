use serde::{Deserialize, Serialize};
use std::env;

/// Queue backend and worker configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    pub redis_host: String,
    pub redis_port: u16,
    /// Hosts tried in order when `redis_host` is not reachable
    pub redis_fallback_hosts: Vec<String>,
    /// Messages drained from the main queue per cycle
    pub main_batch_size: usize,
    /// Messages drained from the dead-letter queue per cycle
    pub dead_letter_batch_size: usize,
    /// Default retry budget for queued messages
    pub max_retries: u32,
    /// Backoff ceiling, seconds
    pub max_backoff_secs: u64,
    /// Continuous worker interval, seconds
    pub worker_interval_secs: u64,
    /// TTL for queue-down fallback cache entries, seconds
    pub fallback_cache_ttl_secs: u64,
    /// TTL for dead-letter forensics cache entries, seconds
    pub forensics_cache_ttl_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_host: env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            redis_port: env::var("REDIS_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(6379),
            redis_fallback_hosts: vec!["127.0.0.1".to_string(), "localhost".to_string()],
            main_batch_size: 100,
            dead_letter_batch_size: 50,
            max_retries: 3,
            max_backoff_secs: 60,
            worker_interval_secs: 60,
            fallback_cache_ttl_secs: 3600,
            forensics_cache_ttl_secs: 86_400,
        }
    }
}

impl QueueConfig {
    /// Candidate redis URLs in connection order
    pub fn redis_urls(&self) -> Vec<String> {
        let mut hosts = vec![self.redis_host.clone()];
        for fallback in &self.redis_fallback_hosts {
            if !hosts.contains(fallback) {
                hosts.push(fallback.clone());
            }
        }
        hosts
            .into_iter()
            .map(|h| format!("redis://{}:{}", h, self.redis_port))
            .collect()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.main_batch_size == 0 || self.dead_letter_batch_size == 0 {
            return Err(anyhow::anyhow!("Queue batch sizes must be greater than 0"));
        }
        if self.max_retries == 0 {
            return Err(anyhow::anyhow!("max_retries must be greater than 0"));
        }
        if self.worker_interval_secs == 0 {
            return Err(anyhow::anyhow!(
                "worker_interval_secs must be greater than 0"
            ));
        }
        Ok(())
    }
}
