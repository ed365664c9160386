//! Queue drainer.
//!
//! A drain cycle pops up to a bounded number of messages, re-checks
//! upstream health, re-executes the call, and applies the retry policy:
//! exponential backoff with jitter, capped at 60 s, realized as a
//! `not_before` stamp so the loop never sleeps on one message. A message
//! that has spent its retry budget is stamped and moved to the dead-letter
//! queue, with a forensics cache entry for the operator. Dead-letter
//! cycles re-attempt quarantined messages but never consume them on
//! failure.

use rand::Rng;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cache::FallbackCache;
use crate::config::QueueConfig;
use crate::error::{PorticoError, PorticoResult};
use crate::health::HealthRegistry;
use crate::metrics::QueueMetrics;
use crate::proxy::http_client::UpstreamClient;
use crate::queue::{is_mutating, QueueName, QueueStore, QueuedMessage};

/// Outcome of one drain cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CycleStats {
    /// Messages popped this cycle (including rotations)
    pub drained: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub requeued: usize,
    pub dead_lettered: usize,
    /// Messages still inside their backoff window, rotated back
    pub deferred: usize,
}

/// Result of a targeted retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    NotFound,
    Succeeded,
    Failed,
}

pub struct Worker {
    store: Arc<dyn QueueStore>,
    health: Arc<HealthRegistry>,
    client: UpstreamClient,
    metrics: Arc<QueueMetrics>,
    fallback: FallbackCache,
    config: QueueConfig,
}

impl Worker {
    pub fn new(
        store: Arc<dyn QueueStore>,
        health: Arc<HealthRegistry>,
        client: UpstreamClient,
        metrics: Arc<QueueMetrics>,
        fallback: FallbackCache,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            health,
            client,
            metrics,
            fallback,
            config,
        }
    }

    /// One bounded pass over a queue
    pub async fn drain_cycle(&self, queue: QueueName) -> CycleStats {
        let limit = match queue {
            QueueName::Main => self.config.main_batch_size,
            QueueName::DeadLetter => self.config.dead_letter_batch_size,
        };

        let mut stats = CycleStats::default();
        let mut seen: HashSet<String> = HashSet::new();

        for _ in 0..limit {
            let msg = match self.store.pop(queue).await {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(PorticoError::Serialization { message }) => {
                    // The broken element is already off the list; skip it
                    warn!(queue = %queue, "Dropping undecodable message: {}", message);
                    continue;
                }
                Err(e) => {
                    error!(queue = %queue, error = %e, "Queue backend error, aborting cycle");
                    break;
                }
            };

            // Wrapped around to a message this cycle already touched
            if seen.contains(&msg.id) {
                self.push_back(queue, &msg).await;
                break;
            }
            seen.insert(msg.id.clone());
            stats.drained += 1;

            if msg.is_deferred() {
                stats.deferred += 1;
                self.push_back(queue, &msg).await;
                continue;
            }

            self.process_message(queue, msg, &mut stats).await;
        }

        self.update_depth_gauges().await;

        if stats.drained > 0 {
            info!(
                queue = %queue,
                drained = stats.drained,
                succeeded = stats.succeeded,
                requeued = stats.requeued,
                dead_lettered = stats.dead_lettered,
                deferred = stats.deferred,
                "Drain cycle complete"
            );
        }
        stats
    }

    async fn process_message(&self, queue: QueueName, msg: QueuedMessage, stats: &mut CycleStats) {
        // Main-queue invariant: only mutating methods are ever queued.
        // A violating message is quarantined for forensics, not executed.
        if queue == QueueName::Main && !is_mutating(&msg.method) {
            error!(
                message_id = %msg.id,
                method = %msg.method,
                "Non-mutating message in main queue, quarantining"
            );
            self.dead_letter(msg, stats).await;
            return;
        }

        if !self.health.is_available(&msg.service).await {
            debug!(
                message_id = %msg.id,
                service = %msg.service,
                "Upstream still down"
            );
            match queue {
                QueueName::Main => self.handle_main_failure(msg, stats).await,
                // Quarantined messages are kept, not consumed
                QueueName::DeadLetter => {
                    self.push_back(queue, &msg).await;
                    stats.requeued += 1;
                }
            }
            return;
        }

        match self.execute(&msg).await {
            Ok(()) => {
                self.metrics.record_processed();
                stats.succeeded += 1;
                debug!(message_id = %msg.id, service = %msg.service, "Delivered queued request");
            }
            Err(e) => {
                self.metrics.record_failed();
                stats.failed += 1;
                warn!(
                    message_id = %msg.id,
                    service = %msg.service,
                    error = %e,
                    "Queued request failed upstream"
                );
                match queue {
                    QueueName::Main => self.handle_main_failure(msg, stats).await,
                    QueueName::DeadLetter => {
                        self.push_back(queue, &msg).await;
                        stats.requeued += 1;
                    }
                }
            }
        }
    }

    /// Upstream re-execution; any non-2xx or transport failure is an error
    async fn execute(&self, msg: &QueuedMessage) -> PorticoResult<()> {
        let base_url = self
            .health
            .url_of(&msg.service)
            .ok_or_else(|| PorticoError::service_unavailable(&msg.service))?;

        let status = self.client.execute_message(&base_url, msg).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(PorticoError::network(format!("upstream status {}", status)))
        }
    }

    /// Main-queue failure policy: backoff-requeue while the retry budget
    /// lasts, dead-letter once it is spent
    async fn handle_main_failure(&self, mut msg: QueuedMessage, stats: &mut CycleStats) {
        if msg.retries_exhausted() {
            self.dead_letter(msg, stats).await;
            return;
        }

        msg.retry_count += 1;
        let delay = self.backoff_delay_secs(msg.retry_count);
        msg.defer_for(delay);

        debug!(
            message_id = %msg.id,
            retry_count = msg.retry_count,
            delay_secs = delay,
            "Requeueing with backoff"
        );

        self.push_back(QueueName::Main, &msg).await;
        self.metrics.record_retried();
        stats.requeued += 1;
    }

    async fn dead_letter(&self, mut msg: QueuedMessage, stats: &mut CycleStats) {
        msg.mark_dead_lettered();

        warn!(
            message_id = %msg.id,
            service = %msg.service,
            retry_count = msg.retry_count,
            "Retries exhausted, dead-lettering"
        );

        self.push_back(QueueName::DeadLetter, &msg).await;
        self.metrics.record_dead_lettered();
        stats.dead_lettered += 1;

        // Forensics entry so the operator can inspect the lost request
        let key = format!("failed_request_{}", msg.id);
        let value = serde_json::to_value(&msg).unwrap_or(Value::Null);
        self.fallback
            .put(key, value, self.config.forensics_cache_ttl_secs)
            .await;
    }

    /// `min(2^retry_count, max) + uniform[0,1)` seconds
    fn backoff_delay_secs(&self, retry_count: u32) -> f64 {
        let exp = 2f64.powi(retry_count.min(30) as i32);
        let capped = exp.min(self.config.max_backoff_secs as f64);
        capped + rand::thread_rng().gen::<f64>()
    }

    /// Operator-initiated single-message retry. The message is pulled out
    /// of its queue, its retry bookkeeping cleared, and executed once
    /// through the same pipeline as a cycle iteration; a failure re-enters
    /// the main-queue policy so the message is never stranded.
    pub async fn retry_one(&self, id: &str, queue: QueueName) -> PorticoResult<RetryOutcome> {
        let Some(mut msg) = self.store.remove(queue, id).await? else {
            return Ok(RetryOutcome::NotFound);
        };

        msg.reset_for_retry();
        info!(message_id = %id, queue = %queue, "Targeted retry");

        let mut stats = CycleStats::default();

        if !self.health.is_available(&msg.service).await {
            self.metrics.record_failed();
            self.handle_main_failure(msg, &mut stats).await;
            return Ok(RetryOutcome::Failed);
        }

        match self.execute(&msg).await {
            Ok(()) => {
                self.metrics.record_processed();
                Ok(RetryOutcome::Succeeded)
            }
            Err(e) => {
                warn!(message_id = %id, error = %e, "Targeted retry failed");
                self.metrics.record_failed();
                self.handle_main_failure(msg, &mut stats).await;
                Ok(RetryOutcome::Failed)
            }
        }
    }

    /// Continuous drain loop; cancellable between cycles
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut tick = interval(Duration::from_secs(self.config.worker_interval_secs));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.config.worker_interval_secs,
            "Queue worker started"
        );

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.drain_cycle(QueueName::Main).await;
                    self.drain_cycle(QueueName::DeadLetter).await;
                }
                _ = shutdown.recv() => {
                    info!("Queue worker shutting down");
                    break;
                }
            }
        }
    }

    async fn push_back(&self, queue: QueueName, msg: &QueuedMessage) {
        if let Err(e) = self.store.push(queue, msg).await {
            // The message is lost to the queue; keep it visible somewhere
            error!(
                message_id = %msg.id,
                error = %e,
                "Failed to requeue message, caching for forensics"
            );
            let key = format!("failed_request_{}", msg.id);
            let value = serde_json::to_value(msg).unwrap_or(Value::Null);
            self.fallback
                .put(key, value, self.config.forensics_cache_ttl_secs)
                .await;
        }
    }

    async fn update_depth_gauges(&self) {
        if let Ok(depth) = self.store.length(QueueName::Main).await {
            metrics::gauge!("portico_queue_depth", "queue" => "main").set(depth as f64);
        }
        if let Ok(depth) = self.store.length(QueueName::DeadLetter).await {
            metrics::gauge!("portico_queue_depth", "queue" => "dead_letter").set(depth as f64);
        }
    }
}
