//! Operations surface.
//!
//! Read/control endpoints layered over the queue store, the worker, and
//! the health registry, served on the main listener under `/api`. All
//! responses are JSON; internal failures come back as 500 with the error
//! message in-body (operator-facing, no request payloads).

use hyper::body::Bytes;
use hyper::{Body, Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::error::PorticoResult;
use crate::health::HealthRegistry;
use crate::metrics::QueueMetrics;
use crate::queue::{QueueName, QueueStore};
use crate::worker::{RetryOutcome, Worker};

/// Main-queue depth beyond which the queue health summary degrades
const DEPTH_DEGRADED_THRESHOLD: usize = 1000;

/// Default number of messages returned by the list endpoints
const DEFAULT_LIST_LIMIT: usize = 100;

pub struct AdminContext {
    pub store: Arc<dyn QueueStore>,
    pub worker: Arc<Worker>,
    pub metrics: Arc<QueueMetrics>,
    pub health: Arc<HealthRegistry>,
}

#[derive(Debug, Deserialize)]
struct RetryRequest {
    message_id: String,
    queue_type: String,
}

#[derive(Debug, Deserialize)]
struct PurgeRequest {
    queue_type: String,
}

/// Dispatch an admin endpoint; `None` when the path is not ours
pub async fn handle(
    ctx: &AdminContext,
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &Bytes,
) -> Option<Response<Body>> {
    let response = match (method, path) {
        (&Method::GET, "/api/health") => gateway_health(),
        (&Method::GET, "/api/services/health") => services_health(ctx).await,
        (&Method::GET, "/api/queue/status") => queue_status(ctx).await,
        (&Method::GET, "/api/queue/requests") => {
            list_queue(ctx, QueueName::Main, parse_limit(query)).await
        }
        (&Method::GET, "/api/queue/dead-letter-requests") => {
            list_queue(ctx, QueueName::DeadLetter, parse_limit(query)).await
        }
        (&Method::POST, "/api/queue/process") => process_queues(ctx).await,
        (&Method::POST, "/api/queue/retry") => retry_message(ctx, body).await,
        (&Method::POST, "/api/queue/purge") => purge_queue(ctx, body).await,
        (&Method::GET, "/api/queue/metrics") => metrics_snapshot(ctx),
        (&Method::POST, "/api/queue/metrics/reset") => metrics_reset(ctx),
        (&Method::GET, "/api/queue/health") => queue_health(ctx).await,
        (&Method::GET, _) => {
            let service = path
                .strip_prefix("/api/services/")?
                .strip_suffix("/health")?;
            if service.is_empty() || service.contains('/') {
                return None;
            }
            service_health(ctx, service).await
        }
        _ => return None,
    };

    Some(response.unwrap_or_else(|e| {
        warn!("Admin endpoint failed: {}", e);
        json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({
                "error": "Internal server error",
                "message": e.to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        )
    }))
}

fn gateway_health() -> PorticoResult<Response<Body>> {
    Ok(json_response(
        StatusCode::OK,
        json!({
            "status": "healthy",
            "service": "portico-gateway",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    ))
}

async fn services_health(ctx: &AdminContext) -> PorticoResult<Response<Body>> {
    let snapshot = ctx.health.check_all().await;

    let mut services = serde_json::Map::new();
    for (name, entry) in &snapshot {
        services.insert(
            name.clone(),
            json!({
                "status": if entry.healthy { "healthy" } else { "unhealthy" },
                "checked_at": entry.checked_at.to_rfc3339(),
                "last_error": entry.last_error,
            }),
        );
    }

    Ok(json_response(
        StatusCode::OK,
        json!({
            "services": services,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    ))
}

async fn service_health(ctx: &AdminContext, service: &str) -> PorticoResult<Response<Body>> {
    if ctx.health.url_of(service).is_none() {
        return Ok(json_response(
            StatusCode::NOT_FOUND,
            json!({
                "error": "Unknown service",
                "service": service,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        ));
    }

    let available = ctx.health.is_available(service).await;
    let entry = ctx.health.cached_entry(service).await;
    let pending = ctx.store.length(QueueName::Main).await?;

    Ok(json_response(
        StatusCode::OK,
        json!({
            "service": service,
            "status": if available { "healthy" } else { "unhealthy" },
            "checked_at": entry.as_ref().map(|e| e.checked_at.to_rfc3339()),
            "last_error": entry.and_then(|e| e.last_error),
            "queue": {
                "pending_requests": pending,
                "connected": ctx.store.ping().await,
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    ))
}

async fn queue_status(ctx: &AdminContext) -> PorticoResult<Response<Body>> {
    let connected = ctx.store.ping().await;

    let (main_depth, dead_letter_depth) = if connected {
        (
            Some(ctx.store.length(QueueName::Main).await?),
            Some(ctx.store.length(QueueName::DeadLetter).await?),
        )
    } else {
        (None, None)
    };

    Ok(json_response(
        StatusCode::OK,
        json!({
            "queues": {
                "request_queue": main_depth,
                // Never written; reported for compatibility
                "response_queue": 0,
                "dead_letter_queue": dead_letter_depth,
            },
            "connected": connected,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    ))
}

async fn list_queue(
    ctx: &AdminContext,
    queue: QueueName,
    limit: usize,
) -> PorticoResult<Response<Body>> {
    let messages = ctx.store.peek(queue, limit).await?;

    Ok(json_response(
        StatusCode::OK,
        json!({
            "queue": queue.to_string(),
            "count": messages.len(),
            "limit": limit,
            "messages": messages,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    ))
}

async fn process_queues(ctx: &AdminContext) -> PorticoResult<Response<Body>> {
    let main = ctx.worker.drain_cycle(QueueName::Main).await;
    let dead_letter = ctx.worker.drain_cycle(QueueName::DeadLetter).await;

    Ok(json_response(
        StatusCode::OK,
        json!({
            "main": main,
            "dead_letter": dead_letter,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    ))
}

async fn retry_message(ctx: &AdminContext, body: &Bytes) -> PorticoResult<Response<Body>> {
    let request: RetryRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => return Ok(bad_request(&format!("invalid retry request: {}", e))),
    };

    let Some(queue) = QueueName::parse(&request.queue_type) else {
        return Ok(bad_request(&format!(
            "unknown queue_type '{}', expected 'main' or 'dead_letter'",
            request.queue_type
        )));
    };

    let outcome = ctx.worker.retry_one(&request.message_id, queue).await?;
    let (status, result) = match outcome {
        RetryOutcome::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        RetryOutcome::Succeeded => (StatusCode::OK, "succeeded"),
        RetryOutcome::Failed => (StatusCode::OK, "failed"),
    };

    Ok(json_response(
        status,
        json!({
            "success": outcome == RetryOutcome::Succeeded,
            "result": result,
            "message_id": request.message_id,
            "queue_type": request.queue_type,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    ))
}

async fn purge_queue(ctx: &AdminContext, body: &Bytes) -> PorticoResult<Response<Body>> {
    let request: PurgeRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => return Ok(bad_request(&format!("invalid purge request: {}", e))),
    };

    let Some(queue) = QueueName::parse(&request.queue_type) else {
        return Ok(bad_request(&format!(
            "unknown queue_type '{}', expected 'main' or 'dead_letter'",
            request.queue_type
        )));
    };

    ctx.store.purge(queue).await?;

    Ok(json_response(
        StatusCode::OK,
        json!({
            "purged": request.queue_type,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    ))
}

fn metrics_snapshot(ctx: &AdminContext) -> PorticoResult<Response<Body>> {
    Ok(json_response(
        StatusCode::OK,
        json!({
            "metrics": ctx.metrics.snapshot(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    ))
}

fn metrics_reset(ctx: &AdminContext) -> PorticoResult<Response<Body>> {
    ctx.metrics.reset();
    Ok(json_response(
        StatusCode::OK,
        json!({
            "metrics": ctx.metrics.snapshot(),
            "reset": true,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    ))
}

async fn queue_health(ctx: &AdminContext) -> PorticoResult<Response<Body>> {
    let connected = ctx.store.ping().await;
    let depth = if connected {
        ctx.store.length(QueueName::Main).await.unwrap_or(0)
    } else {
        0
    };

    let snapshot = ctx.health.check_all().await;
    let unhealthy: Vec<&str> = snapshot
        .iter()
        .filter(|(_, entry)| !entry.healthy)
        .map(|(name, _)| name.as_str())
        .collect();
    let all_down = !snapshot.is_empty() && unhealthy.len() == snapshot.len();

    let mut reasons = Vec::new();
    if !connected {
        reasons.push("queue backend unreachable".to_string());
    }
    if depth > DEPTH_DEGRADED_THRESHOLD {
        reasons.push(format!("main queue depth {} above threshold", depth));
    }
    for name in &unhealthy {
        reasons.push(format!("upstream {} unhealthy", name));
    }

    let status = if (all_down && depth > DEPTH_DEGRADED_THRESHOLD) || !connected {
        "unhealthy"
    } else if depth > DEPTH_DEGRADED_THRESHOLD || !unhealthy.is_empty() {
        "degraded"
    } else {
        "healthy"
    };

    Ok(json_response(
        StatusCode::OK,
        json!({
            "status": status,
            "main_queue_depth": depth,
            "connected": connected,
            "unhealthy_services": unhealthy,
            "reasons": reasons,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    ))
}

fn parse_limit(query: Option<&str>) -> usize {
    query
        .and_then(|q| {
            q.split('&')
                .find_map(|pair| pair.strip_prefix("limit="))
                .and_then(|v| v.parse().ok())
        })
        .unwrap_or(DEFAULT_LIST_LIMIT)
}

fn bad_request(message: &str) -> Response<Body> {
    json_response(
        StatusCode::BAD_REQUEST,
        json!({
            "error": "Bad request",
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    )
}

pub(crate) fn json_response(status: StatusCode, value: serde_json::Value) -> Response<Body> {
    let body = serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None), 100);
        assert_eq!(parse_limit(Some("limit=5")), 5);
        assert_eq!(parse_limit(Some("foo=1&limit=25")), 25);
        assert_eq!(parse_limit(Some("limit=abc")), 100);
    }
}
