//! Upstream health tracking.
//!
//! Availability is answered from a per-service cache entry with a TTL
//! (default 30 s); a stale entry triggers a probe — GET `<base>/api/health`
//! with a 5 s timeout, 2xx means healthy, anything else (including timeouts
//! and connect errors) means unhealthy. Probes for the same service are
//! single-flighted; after acquiring the probe lock the entry is re-checked
//! so herd followers reuse the winner's result.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::{HealthConfig, ServicesConfig};

/// Cached probe result for one service
#[derive(Debug, Clone, Serialize)]
pub struct HealthEntry {
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl HealthEntry {
    fn fresh(&self, ttl: ChronoDuration) -> bool {
        Utc::now() - self.checked_at < ttl
    }
}

/// Probe seam; the HTTP implementation is replaced in tests
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `Ok(())` when the upstream answered 2xx, `Err(reason)` otherwise
    async fn probe(&self, service: &str, base_url: &str) -> Result<(), String>;
}

/// Probes `<base><probe_path>` over HTTP
pub struct HttpHealthProbe {
    client: reqwest::Client,
    probe_path: String,
}

impl HttpHealthProbe {
    pub fn new(config: &HealthConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            probe_path: config.probe_path.clone(),
        }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, service: &str, base_url: &str) -> Result<(), String> {
        let url = format!("{}{}", base_url, self.probe_path);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                debug!("Health probe for {} returned {}", service, response.status());
                Err(format!("status {}", response.status()))
            }
            Err(e) => {
                debug!("Health probe for {} failed: {}", service, e);
                Err(e.to_string())
            }
        }
    }
}

/// TTL-cached availability of every configured upstream
pub struct HealthRegistry {
    services: Arc<ServicesConfig>,
    probe: Arc<dyn HealthProbe>,
    ttl: ChronoDuration,
    cache: RwLock<HashMap<String, HealthEntry>>,
    probe_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl HealthRegistry {
    pub fn new(services: Arc<ServicesConfig>, probe: Arc<dyn HealthProbe>, ttl_secs: u64) -> Self {
        Self {
            services,
            probe,
            ttl: ChronoDuration::seconds(ttl_secs as i64),
            cache: RwLock::new(HashMap::new()),
            probe_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Base URL of a configured service
    pub fn url_of(&self, service: &str) -> Option<String> {
        self.services.base_url(service).map(|s| s.to_string())
    }

    /// Whether the service is believed healthy; probes when the cached
    /// entry is missing or stale. Unknown services are never available.
    pub async fn is_available(&self, service: &str) -> bool {
        match self.ensure_fresh(service).await {
            Some(entry) => entry.healthy,
            None => false,
        }
    }

    /// Snapshot of every configured service, probing stale entries
    pub async fn check_all(&self) -> HashMap<String, HealthEntry> {
        let mut snapshot = HashMap::new();
        for name in self.services.service_names() {
            if let Some(entry) = self.ensure_fresh(&name).await {
                snapshot.insert(name, entry);
            }
        }
        snapshot
    }

    /// Cached entry without probing, if one exists
    pub async fn cached_entry(&self, service: &str) -> Option<HealthEntry> {
        self.cache.read().await.get(service).cloned()
    }

    /// Drop the cached entry and re-probe immediately
    pub async fn force_refresh(&self, service: &str) -> Option<HealthEntry> {
        self.cache.write().await.remove(service);
        self.ensure_fresh(service).await
    }

    async fn ensure_fresh(&self, service: &str) -> Option<HealthEntry> {
        let base_url = self.services.base_url(service)?.to_string();

        if let Some(entry) = self.cache.read().await.get(service) {
            if entry.fresh(self.ttl) {
                return Some(entry.clone());
            }
        }

        let lock = self.probe_lock(service).await;
        let _guard = lock.lock().await;

        // Another task may have probed while we waited for the lock
        if let Some(entry) = self.cache.read().await.get(service) {
            if entry.fresh(self.ttl) {
                return Some(entry.clone());
            }
        }

        let result = self.probe.probe(service, &base_url).await;
        let entry = HealthEntry {
            healthy: result.is_ok(),
            checked_at: Utc::now(),
            last_error: result.err(),
        };

        if !entry.healthy {
            warn!(
                service = service,
                error = entry.last_error.as_deref().unwrap_or("unknown"),
                "Upstream unhealthy"
            );
        }
        metrics::gauge!("portico_upstream_healthy", "service" => service.to_string())
            .set(if entry.healthy { 1.0 } else { 0.0 });

        self.cache
            .write()
            .await
            .insert(service.to_string(), entry.clone());
        Some(entry)
    }

    async fn probe_lock(&self, service: &str) -> Arc<Mutex<()>> {
        let mut locks = self.probe_locks.lock().await;
        locks
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
