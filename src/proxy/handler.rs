//! Top-level request handling.
//!
//! Order of dispatch: admin endpoints, then the service router. A path
//! under `/api` whose first segment is not a recognized selector gets a
//! 400 naming the selectors; anything outside `/api` that does not route
//! gets a 404 with the same hint. Processing errors never escape as raw
//! messages; every gateway-originated response is a JSON envelope.

use hyper::{Body, Method, Request, Response, StatusCode};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::admin::{self, json_response, AdminContext};
use crate::error::PorticoResult;
use crate::routing::{RouteMatch, Router};

use super::forwarder::{ForwardOutcome, GatewayForwarder};

#[derive(Clone)]
pub struct GatewayHandler {
    router: Router,
    forwarder: Arc<GatewayForwarder>,
    admin: Arc<AdminContext>,
}

impl GatewayHandler {
    pub fn new(router: Router, forwarder: Arc<GatewayForwarder>, admin: Arc<AdminContext>) -> Self {
        Self {
            router,
            forwarder,
            admin,
        }
    }

    pub async fn handle_request(&self, req: Request<Body>) -> Result<Response<Body>, Infallible> {
        match self.process_request(req).await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!("Request processing error: {}", e);
                Ok(json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "Internal server error",
                        "message": e.to_string(),
                        "timestamp": chrono::Utc::now().to_rfc3339(),
                    }),
                ))
            }
        }
    }

    async fn process_request(&self, req: Request<Body>) -> PorticoResult<Response<Body>> {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path().to_string();
        let query = parts.uri.query().map(|q| q.to_string());
        let remote_ip = parts
            .extensions
            .get::<SocketAddr>()
            .map(|addr| addr.ip().to_string());

        let body_bytes = hyper::body::to_bytes(body).await?;

        metrics::counter!("portico_requests_total").increment(1);
        debug!(method = %parts.method, path = %path, "Handling request");

        if let Some(response) = admin::handle(
            &self.admin,
            &parts.method,
            &path,
            query.as_deref(),
            &body_bytes,
        )
        .await
        {
            return Ok(response);
        }

        match self.router.resolve(&path) {
            Some(route) => {
                let outcome = self
                    .forwarder
                    .forward(
                        &parts.method,
                        &route,
                        &parts.headers,
                        query.as_deref(),
                        body_bytes,
                        remote_ip.as_deref(),
                    )
                    .await;
                Ok(self.render_outcome(outcome, &route, &parts.method))
            }
            None if path == "/api" || path.starts_with("/api/") => {
                Ok(self.unknown_selector(&path))
            }
            None => Ok(self.not_found(&path)),
        }
    }

    fn render_outcome(
        &self,
        outcome: ForwardOutcome,
        route: &RouteMatch,
        method: &Method,
    ) -> Response<Body> {
        match outcome {
            ForwardOutcome::Relayed(response) => response,
            ForwardOutcome::Queued {
                message_id,
                request_id,
                retry_after_secs,
            } => json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "error": "Service unavailable",
                    "message": "Request queued for delivery when the service recovers",
                    "service": route.service,
                    "endpoint": route.endpoint,
                    "method": method.as_str(),
                    "queued": true,
                    "message_id": message_id,
                    "request_id": request_id,
                    "estimated_retry_time": format!("{}s", retry_after_secs),
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                }),
            ),
            ForwardOutcome::CachedFallback { request_id } => json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "error": "Service unavailable",
                    "message": "Queue backend unreachable; request cached for operator review",
                    "service": route.service,
                    "endpoint": route.endpoint,
                    "method": method.as_str(),
                    "queued": false,
                    "cached": true,
                    "request_id": request_id,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                }),
            ),
            ForwardOutcome::Unavailable { request_id } => json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "error": "Service unavailable",
                    "message": "Service is down and the request is not queueable",
                    "service": route.service,
                    "endpoint": route.endpoint,
                    "method": method.as_str(),
                    "queued": false,
                    "request_id": request_id,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                }),
            ),
        }
    }

    fn unknown_selector(&self, path: &str) -> Response<Body> {
        json_response(
            StatusCode::BAD_REQUEST,
            json!({
                "error": "Unknown service",
                "message": format!("No service matches '{}'", path),
                "recognized_selectors": self.router.known_selectors(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        )
    }

    fn not_found(&self, path: &str) -> Response<Body> {
        json_response(
            StatusCode::NOT_FOUND,
            json!({
                "error": "Not found",
                "message": format!("'{}' does not match any gateway route", path),
                "hint": format!(
                    "Forwarded paths look like /api/{{selector}}/..., selectors: {}",
                    self.router.known_selectors().join(", ")
                ),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        )
    }
}
