//! Shared upstream HTTP client.
//!
//! One pooled hyper client (http and https via rustls) reused for every
//! forwarded request and for worker re-executions. Every call carries an
//! explicit request-level timeout; upstream responses are relayed without
//! rewriting beyond hop-by-hop header removal.

use hyper::body::Bytes;
use hyper::client::HttpConnector;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{Body, Client, HeaderMap, Method, Request, Response, StatusCode, Uri};
use hyper_rustls::HttpsConnectorBuilder;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{PorticoError, PorticoResult};
use crate::queue::QueuedMessage;

static SHARED_CLIENT: Lazy<Arc<Client<hyper_rustls::HttpsConnector<HttpConnector>, Body>>> =
    Lazy::new(|| Arc::new(build_client()));

fn build_client() -> Client<hyper_rustls::HttpsConnector<HttpConnector>, Body> {
    let https = HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();

    Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(32)
        .build::<_, Body>(https)
}

/// Compose the upstream URL: `<base>/api<endpoint>` plus the original query
pub fn upstream_url(base_url: &str, endpoint: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{}/api{}?{}", base_url, endpoint, q),
        _ => format!("{}/api{}", base_url, endpoint),
    }
}

/// Headers a request carries upstream: `host` and `content-length` are
/// recomputed by the client, hop-by-hop headers never cross the gateway,
/// and `content-type` defaults to JSON.
pub fn filter_forward_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();
    for (name, value) in headers {
        if is_stripped_header(name.as_str()) {
            continue;
        }
        filtered.append(name, value.clone());
    }
    filtered
        .entry(CONTENT_TYPE)
        .or_insert(HeaderValue::from_static("application/json"));
    filtered
}

/// Same filtering, flattened into the map stored on queued messages
pub fn headers_to_map(headers: &HeaderMap) -> HashMap<String, String> {
    filter_forward_headers(headers)
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn is_stripped_header(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "host"
            | "content-length"
            | "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Upstream call executor with a fixed per-request timeout
#[derive(Clone)]
pub struct UpstreamClient {
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Send a request upstream and return the response verbatim
    /// (hop-by-hop headers removed)
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> PorticoResult<Response<Body>> {
        let uri: Uri = url.parse()?;

        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(header_map) = builder.headers_mut() {
            *header_map = headers;
        }
        let request = builder.body(Body::from(body))?;

        let client = Arc::clone(&SHARED_CLIENT);
        let response = tokio::time::timeout(self.timeout, client.request(request))
            .await
            .map_err(|_| PorticoError::timeout(self.timeout, "upstream request"))?
            .map_err(PorticoError::from)?;

        Ok(strip_response_headers(response))
    }

    /// Re-execute a queued message against its upstream; returns the
    /// status code (transport failures are errors)
    pub async fn execute_message(
        &self,
        base_url: &str,
        msg: &QueuedMessage,
    ) -> PorticoResult<StatusCode> {
        let method: Method = msg
            .method
            .parse()
            .map_err(|_| PorticoError::internal(format!("invalid queued method {}", msg.method)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &msg.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }
        headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/json"));

        let body = if msg.data.is_null() {
            Bytes::new()
        } else {
            Bytes::from(serde_json::to_vec(&msg.data)?)
        };

        let url = upstream_url(base_url, &msg.endpoint, None);
        let response = self.send(method, &url, headers, body).await?;
        Ok(response.status())
    }
}

fn strip_response_headers(upstream: Response<Body>) -> Response<Body> {
    let (mut parts, body) = upstream.into_parts();
    let hop_by_hop = [
        "connection",
        "keep-alive",
        "proxy-authenticate",
        "proxy-authorization",
        "te",
        "trailers",
        "transfer-encoding",
        "upgrade",
    ];
    for name in hop_by_hop {
        parts.headers.remove(name);
    }
    Response::from_parts(parts, body)
}
