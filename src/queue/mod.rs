//! Durable request queue: the message schema shared by the proxy, the
//! worker, and the admin surface, plus the store contract with its Redis
//! and in-memory backends.

pub mod memory_store;
pub mod redis_store;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::correlation::Correlation;
use crate::error::PorticoResult;

pub use memory_store::MemoryQueueStore;
pub use redis_store::RedisQueueStore;

/// The two active queues. The status report additionally names a
/// `response_queue` that is never written; it is vestigial and reported
/// with depth 0 for compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    Main,
    DeadLetter,
}

impl QueueName {
    /// Key of the backing list in the store
    pub fn storage_key(&self) -> &'static str {
        match self {
            QueueName::Main => "request_queue",
            QueueName::DeadLetter => "dead_letter_queue",
        }
    }

    /// Parse the client-facing queue type (`main` / `dead_letter`)
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "main" => Some(QueueName::Main),
            "dead_letter" => Some(QueueName::DeadLetter),
            _ => None,
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueName::Main => write!(f, "main"),
            QueueName::DeadLetter => write!(f, "dead_letter"),
        }
    }
}

/// Methods the gateway is willing to queue
pub fn is_mutating(method: &str) -> bool {
    matches!(method, "POST" | "PUT" | "DELETE")
}

/// Observability priority derived from the method; does not reorder
pub fn priority_for_method(method: &str) -> u8 {
    match method {
        "GET" => 1,
        "PUT" => 2,
        "POST" => 3,
        "DELETE" => 4,
        _ => 1,
    }
}

/// The canonical unit in both the main and dead-letter queues
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedMessage {
    /// Unique opaque id, assigned at enqueue
    pub id: String,
    /// Enqueue time
    pub timestamp: DateTime<Utc>,
    /// Target service name
    pub service: String,
    /// Upstream path, starting with `/`
    pub endpoint: String,
    /// Uppercased HTTP verb; `POST|PUT|DELETE` in the main queue
    pub method: String,
    /// Body payload, opaque to the gateway
    pub data: Value,
    /// Headers to forward, already filtered
    pub headers: HashMap<String, String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub priority: u8,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_id: Option<String>,
    /// Set only when the message has been moved to the dead-letter queue
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dead_letter_timestamp: Option<DateTime<Utc>>,
    /// Earliest time the worker may re-attempt this message
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub not_before: Option<DateTime<Utc>>,
}

impl QueuedMessage {
    pub fn new(
        service: impl Into<String>,
        endpoint: impl Into<String>,
        method: impl Into<String>,
        data: Value,
        headers: HashMap<String, String>,
        correlation: Correlation,
        max_retries: u32,
    ) -> Self {
        let method = method.into().to_ascii_uppercase();
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            service: service.into(),
            endpoint: endpoint.into(),
            priority: priority_for_method(&method),
            method,
            data,
            headers,
            retry_count: 0,
            max_retries,
            user_id: correlation.user_id,
            session_id: correlation.session_id,
            ip_address: correlation.ip_address,
            user_agent: correlation.user_agent,
            request_id: Some(correlation.request_id),
            dead_letter_timestamp: None,
            not_before: None,
        }
    }

    /// Whether the retry budget is exhausted
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Stamp the backoff window for the next attempt
    pub fn defer_for(&mut self, delay_secs: f64) {
        let millis = (delay_secs * 1000.0) as i64;
        self.not_before = Some(Utc::now() + ChronoDuration::milliseconds(millis));
    }

    /// Whether the message is still inside its backoff window
    pub fn is_deferred(&self) -> bool {
        self.not_before.is_some_and(|t| t > Utc::now())
    }

    /// Mark the message as quarantined
    pub fn mark_dead_lettered(&mut self) {
        self.dead_letter_timestamp = Some(Utc::now());
        self.not_before = None;
    }

    /// Clear retry bookkeeping for a targeted retry
    pub fn reset_for_retry(&mut self) {
        self.retry_count = 0;
        self.dead_letter_timestamp = None;
        self.not_before = None;
    }
}

/// Contract of the queue backend. Push inserts at the head, pop removes
/// from the tail; each operation is atomic so multiple workers can share a
/// store.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn push(&self, queue: QueueName, msg: &QueuedMessage) -> PorticoResult<()>;

    async fn pop(&self, queue: QueueName) -> PorticoResult<Option<QueuedMessage>>;

    /// Non-destructive read of up to `limit` messages, in pop order
    async fn peek(&self, queue: QueueName, limit: usize) -> PorticoResult<Vec<QueuedMessage>>;

    /// Remove the first message with the given id, returning it
    async fn remove(&self, queue: QueueName, id: &str) -> PorticoResult<Option<QueuedMessage>>;

    async fn length(&self, queue: QueueName) -> PorticoResult<usize>;

    async fn purge(&self, queue: QueueName) -> PorticoResult<()>;

    /// Backend liveness; `false` surfaces as `connected=false` in status
    async fn ping(&self) -> bool;
}
