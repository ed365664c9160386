//! In-memory queue backend. Used by tests and store-less deployments;
//! semantics match the Redis backend (head push, tail pop, FIFO).

use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

use super::{QueueName, QueueStore, QueuedMessage};
use crate::error::PorticoResult;

#[derive(Default)]
pub struct MemoryQueueStore {
    main: Mutex<VecDeque<QueuedMessage>>,
    dead_letter: Mutex<VecDeque<QueuedMessage>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&self, queue: QueueName) -> &Mutex<VecDeque<QueuedMessage>> {
        match queue {
            QueueName::Main => &self.main,
            QueueName::DeadLetter => &self.dead_letter,
        }
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn push(&self, queue: QueueName, msg: &QueuedMessage) -> PorticoResult<()> {
        self.list(queue).lock().await.push_front(msg.clone());
        Ok(())
    }

    async fn pop(&self, queue: QueueName) -> PorticoResult<Option<QueuedMessage>> {
        Ok(self.list(queue).lock().await.pop_back())
    }

    async fn peek(&self, queue: QueueName, limit: usize) -> PorticoResult<Vec<QueuedMessage>> {
        let guard = self.list(queue).lock().await;
        Ok(guard.iter().rev().take(limit).cloned().collect())
    }

    async fn remove(&self, queue: QueueName, id: &str) -> PorticoResult<Option<QueuedMessage>> {
        let mut guard = self.list(queue).lock().await;
        if let Some(pos) = guard.iter().position(|m| m.id == id) {
            Ok(guard.remove(pos))
        } else {
            Ok(None)
        }
    }

    async fn length(&self, queue: QueueName) -> PorticoResult<usize> {
        Ok(self.list(queue).lock().await.len())
    }

    async fn purge(&self, queue: QueueName) -> PorticoResult<()> {
        self.list(queue).lock().await.clear();
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }
}
