//! Redis-backed queue store.
//!
//! Each queue is a Redis list keyed `request_queue` / `dead_letter_queue`;
//! elements are JSON-serialized messages. Push is LPUSH (head), pop is
//! RPOP (tail). The connection manager reconnects transparently; while the
//! backend is unreachable, operations fail with a queue error and `ping`
//! reports false so the status surface shows `connected=false`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{QueueName, QueueStore, QueuedMessage};
use crate::error::{PorticoError, PorticoResult};

pub struct RedisQueueStore {
    /// Candidate URLs in connection order (primary, then fallbacks)
    urls: Vec<String>,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
}

impl RedisQueueStore {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            manager: Arc::new(RwLock::new(None)),
        }
    }

    /// Connect eagerly; useful at startup so a dead backend is logged once
    pub async fn connect(urls: Vec<String>) -> PorticoResult<Self> {
        let store = Self::new(urls);
        store.connection().await?;
        Ok(store)
    }

    async fn connection(&self) -> PorticoResult<ConnectionManager> {
        if let Some(mgr) = self.manager.read().await.clone() {
            return Ok(mgr);
        }

        let mut guard = self.manager.write().await;
        if let Some(mgr) = guard.clone() {
            return Ok(mgr);
        }

        let mut last_error: Option<PorticoError> = None;
        for url in &self.urls {
            let client = match Client::open(url.as_str()) {
                Ok(client) => client,
                Err(e) => {
                    warn!("Invalid redis URL {}: {}", url, e);
                    last_error = Some(e.into());
                    continue;
                }
            };
            match ConnectionManager::new(client).await {
                Ok(mgr) => {
                    info!("Connected to queue backend at {}", url);
                    *guard = Some(mgr.clone());
                    return Ok(mgr);
                }
                Err(e) => {
                    warn!("Queue backend unreachable at {}: {}", url, e);
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| PorticoError::queue("no redis URLs configured")))
    }

    fn decode(raw: &str) -> PorticoResult<QueuedMessage> {
        serde_json::from_str(raw).map_err(|e| {
            PorticoError::serialization(format!("undecodable queue element: {}", e))
        })
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn push(&self, queue: QueueName, msg: &QueuedMessage) -> PorticoResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(msg)?;
        let _: i64 = conn.lpush(queue.storage_key(), payload).await?;
        Ok(())
    }

    async fn pop(&self, queue: QueueName) -> PorticoResult<Option<QueuedMessage>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.rpop(queue.storage_key(), None).await?;
        match raw {
            // The element is already off the list; a decode failure drops it
            Some(raw) => Self::decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn peek(&self, queue: QueueName, limit: usize) -> PorticoResult<Vec<QueuedMessage>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let raw: Vec<String> = conn
            .lrange(queue.storage_key(), -(limit as isize), -1)
            .await?;

        // Tail-end of the list, reversed into pop order; undecodable
        // elements are skipped rather than failing the whole read
        Ok(raw
            .iter()
            .rev()
            .filter_map(|r| match Self::decode(r) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    warn!("Skipping undecodable element in {}: {}", queue, e);
                    None
                }
            })
            .collect())
    }

    async fn remove(&self, queue: QueueName, id: &str) -> PorticoResult<Option<QueuedMessage>> {
        let mut conn = self.connection().await?;
        let raw: Vec<String> = conn.lrange(queue.storage_key(), 0, -1).await?;

        for element in raw {
            let msg = match Self::decode(&element) {
                Ok(msg) => msg,
                Err(_) => continue,
            };
            if msg.id == id {
                let removed: i64 = conn.lrem(queue.storage_key(), 1, &element).await?;
                if removed > 0 {
                    debug!("Removed message {} from {}", id, queue);
                    return Ok(Some(msg));
                }
                // Another worker raced us to it
                return Ok(None);
            }
        }

        Ok(None)
    }

    async fn length(&self, queue: QueueName) -> PorticoResult<usize> {
        let mut conn = self.connection().await?;
        let len: i64 = conn.llen(queue.storage_key()).await?;
        Ok(len.max(0) as usize)
    }

    async fn purge(&self, queue: QueueName) -> PorticoResult<()> {
        let mut conn = self.connection().await?;
        let _: i64 = conn.del(queue.storage_key()).await?;
        Ok(())
    }

    async fn ping(&self) -> bool {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(_) => return false,
        };
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .is_ok()
    }
}
