//! The forwarding decision.
//!
//! Healthy upstream: relay the call. Unhealthy upstream: queue mutating
//! requests for later delivery, fail non-mutating requests fast. A direct
//! call that dies in transit is treated the same as an unhealthy upstream,
//! so a crash mid-window still lands mutations in the queue.

use hyper::body::Bytes;
use hyper::{Body, HeaderMap, Method, Response};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::FallbackCache;
use crate::config::QueueConfig;
use crate::correlation::Correlation;
use crate::health::HealthRegistry;
use crate::queue::{is_mutating, QueueName, QueueStore, QueuedMessage};
use crate::routing::RouteMatch;

use super::http_client::{filter_forward_headers, headers_to_map, upstream_url, UpstreamClient};

/// What happened to a routed request
pub enum ForwardOutcome {
    /// Upstream answered; response to relay verbatim
    Relayed(Response<Body>),
    /// Upstream down, message queued for the worker
    Queued {
        message_id: String,
        request_id: String,
        retry_after_secs: u64,
    },
    /// Upstream down and the queue backend too; parked in the fallback
    /// cache (observable only, never drained)
    CachedFallback { request_id: String },
    /// Upstream down, request not queueable (non-mutating)
    Unavailable { request_id: String },
}

pub struct GatewayForwarder {
    health: Arc<HealthRegistry>,
    store: Arc<dyn QueueStore>,
    fallback: FallbackCache,
    client: UpstreamClient,
    queue_config: QueueConfig,
}

impl GatewayForwarder {
    pub fn new(
        health: Arc<HealthRegistry>,
        store: Arc<dyn QueueStore>,
        fallback: FallbackCache,
        client: UpstreamClient,
        queue_config: QueueConfig,
    ) -> Self {
        Self {
            health,
            store,
            fallback,
            client,
            queue_config,
        }
    }

    pub async fn forward(
        &self,
        method: &Method,
        route: &RouteMatch,
        headers: &HeaderMap,
        query: Option<&str>,
        body: Bytes,
        remote_ip: Option<&str>,
    ) -> ForwardOutcome {
        if self.health.is_available(&route.service).await {
            match self.direct_call(method, route, headers, query, body.clone()).await {
                Ok(response) => return ForwardOutcome::Relayed(response),
                Err(e) => {
                    // Same handling as a known-down upstream
                    warn!(
                        service = %route.service,
                        endpoint = %route.endpoint,
                        error = %e,
                        "Direct upstream call failed"
                    );
                }
            }
        }

        self.handle_unavailable(method, route, headers, body, remote_ip)
            .await
    }

    async fn direct_call(
        &self,
        method: &Method,
        route: &RouteMatch,
        headers: &HeaderMap,
        query: Option<&str>,
        body: Bytes,
    ) -> crate::error::PorticoResult<Response<Body>> {
        let base_url = self
            .health
            .url_of(&route.service)
            .ok_or_else(|| crate::error::PorticoError::service_unavailable(&route.service))?;

        let url = upstream_url(&base_url, &route.endpoint, query);
        debug!(method = %method, url = %url, "Forwarding upstream");

        self.client
            .send(method.clone(), &url, filter_forward_headers(headers), body)
            .await
    }

    async fn handle_unavailable(
        &self,
        method: &Method,
        route: &RouteMatch,
        headers: &HeaderMap,
        body: Bytes,
        remote_ip: Option<&str>,
    ) -> ForwardOutcome {
        let correlation = Correlation::from_request(headers, remote_ip);
        let request_id = correlation.request_id.clone();

        if !is_mutating(method.as_str()) {
            return ForwardOutcome::Unavailable { request_id };
        }

        let msg = QueuedMessage::new(
            route.service.clone(),
            route.endpoint.clone(),
            method.as_str(),
            parse_payload(&body),
            headers_to_map(headers),
            correlation,
            self.queue_config.max_retries,
        );

        match self.store.push(QueueName::Main, &msg).await {
            Ok(()) => {
                info!(
                    message_id = %msg.id,
                    service = %route.service,
                    method = %msg.method,
                    "Queued request for unavailable upstream"
                );
                metrics::counter!("portico_queue_enqueued_total").increment(1);
                ForwardOutcome::Queued {
                    message_id: msg.id,
                    request_id,
                    retry_after_secs: self.queue_config.worker_interval_secs,
                }
            }
            Err(e) => {
                warn!(
                    message_id = %msg.id,
                    error = %e,
                    "Queue backend down, caching request for forensics"
                );
                let key = format!("queued_request_{}", msg.id);
                let value = serde_json::to_value(&msg).unwrap_or(Value::Null);
                self.fallback
                    .put(key, value, self.queue_config.fallback_cache_ttl_secs)
                    .await;
                ForwardOutcome::CachedFallback { request_id }
            }
        }
    }
}

/// Body bytes as the stored payload: JSON when it parses, the raw text
/// otherwise, null when empty
fn parse_payload(body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => Value::String(String::from_utf8_lossy(body).into_owned()),
    }
}
