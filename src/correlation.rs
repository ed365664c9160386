//! Request correlation identifiers.
//!
//! The session id is derived, not a framework session: a SHA-256 over the
//! client ip, user agent, `X-Requested-With`, and the current unix second.
//! Two requests from the same client within one second therefore share a
//! session id; accepted, the field is observability-only.

use hyper::HeaderMap;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Correlation fields attached to queued messages
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: String,
}

impl Correlation {
    /// Derive correlation fields from a live request
    pub fn from_request(headers: &HeaderMap, remote_ip: Option<&str>) -> Self {
        let ip_address = remote_ip.map(|s| s.to_string());
        let user_agent = header_str(headers, "user-agent");
        let requested_with = header_str(headers, "x-requested-with");

        let session_id = Some(derive_session_id(
            ip_address.as_deref().unwrap_or(""),
            user_agent.as_deref().unwrap_or(""),
            requested_with.as_deref().unwrap_or(""),
            chrono::Utc::now().timestamp(),
        ));

        let user_id = header_str(headers, "x-user-id").or_else(|| {
            header_str(headers, "authorization")
                .filter(|v| v.to_ascii_lowercase().starts_with("bearer "))
                .map(|v| sha256_hex(v.as_bytes()))
        });

        Self {
            user_id,
            session_id,
            ip_address,
            user_agent,
            request_id: Uuid::new_v4().to_string(),
        }
    }
}

/// `SHA-256(ip || user_agent || x-requested-with || unix_seconds)`, hex encoded
pub fn derive_session_id(ip: &str, user_agent: &str, requested_with: &str, unix_secs: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(user_agent.as_bytes());
    hasher.update(requested_with.as_bytes());
    hasher.update(unix_secs.to_string().as_bytes());
    hex_encode(&hasher.finalize())
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
