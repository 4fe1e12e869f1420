//! Durable work queue on top of the `queue_items` table.
//!
//! At-least-once delivery with one outstanding item per consumer slot. A
//! handler that returns an error or panics gets the item redelivered until
//! its delivery budget runs out, after which it is dead-lettered. The lease
//! is renewed while a handler runs, so only a consumer that stops making
//! progress loses its claim.

pub mod item;

pub use item::{MalformedItem, UserContext, WorkItem};

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::store::{Database, FailOutcome, QueueEntry, QueueStats};

/// Consumer-side handler. Returning `Err` (or panicking) means "not handled".
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, payload: &serde_json::Value) -> anyhow::Result<()>;

    /// Called once when an item runs out of deliveries.
    async fn abandoned(&self, _payload: &serde_json::Value) {}
}

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Acked,
    Redelivering,
    DeadLettered,
    /// The lease lapsed mid-handling and another consumer owns the item now.
    ClaimLost,
}

/// Floor for the renewal cadence so a tiny lease cannot spin the database.
const MIN_RENEW_INTERVAL: Duration = Duration::from_millis(10);

/// Named durable channel.
pub struct DurableQueue {
    db: Arc<dyn Database>,
    config: QueueConfig,
}

impl DurableQueue {
    pub fn new(db: Arc<dyn Database>, config: QueueConfig) -> Self {
        Self { db, config }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Persist an item. Returns only after the row is committed; on error the
    /// item must be treated as not queued.
    pub async fn enqueue(&self, item: &WorkItem) -> Result<i64, QueueError> {
        let payload = serde_json::to_string(item)?;
        let id = self
            .db
            .enqueue(&self.config.name, &payload, self.config.max_attempts)
            .await?;
        info!(request_id = %item.request_id, queue_id = id, "Published request to queue");
        Ok(id)
    }

    /// Return crashed consumers' items to the queue.
    pub async fn reclaim_expired(&self) -> Result<usize, QueueError> {
        Ok(self.db.reclaim_expired(&self.config.name).await?)
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        Ok(self.db.queue_stats(&self.config.name).await?)
    }

    /// Claim and handle at most one item. `Ok(None)` means the queue was empty.
    pub async fn poll_once(
        &self,
        handler: &dyn DeliveryHandler,
    ) -> Result<Option<Delivery>, QueueError> {
        self.db.reclaim_expired(&self.config.name).await?;
        let Some(entry) = self.db.claim_next(&self.config.name, self.config.lease).await? else {
            return Ok(None);
        };

        let payload: serde_json::Value = match serde_json::from_str(&entry.payload) {
            Ok(v) => v,
            Err(e) => {
                warn!(queue_id = entry.id, error = %e, "Dead-lettering undecodable payload");
                self.db
                    .dead_letter(entry.id, &format!("invalid JSON: {e}"))
                    .await?;
                return Ok(Some(Delivery::DeadLettered));
            }
        };

        debug!(queue_id = entry.id, delivery = entry.deliveries, "Processing queue item");
        let handling = AssertUnwindSafe(handler.handle(&payload)).catch_unwind();
        tokio::pin!(handling);
        let mut renew = tokio::time::interval_at(
            tokio::time::Instant::now() + self.renew_interval(),
            self.renew_interval(),
        );
        let outcome = loop {
            tokio::select! {
                outcome = &mut handling => break outcome,
                _ = renew.tick() => self.renew(&entry).await,
            }
        };

        let failure = match outcome {
            Ok(Ok(())) => {
                if self.db.ack(entry.id, entry.deliveries).await? {
                    return Ok(Some(Delivery::Acked));
                }
                warn!(queue_id = entry.id, "Claim lost before ack; leaving item to its new owner");
                return Ok(Some(Delivery::ClaimLost));
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(panic) => format!("handler panicked: {}", panic_message(panic.as_ref())),
        };

        error!(queue_id = entry.id, error = %failure, "Queue handler failed");
        match self.db.fail(entry.id, entry.deliveries, &failure).await? {
            FailOutcome::Retry => Ok(Some(Delivery::Redelivering)),
            FailOutcome::ClaimLost => {
                warn!(queue_id = entry.id, "Claim lost before fail; leaving item to its new owner");
                Ok(Some(Delivery::ClaimLost))
            }
            FailOutcome::DeadLettered => {
                warn!(
                    queue_id = entry.id,
                    deliveries = entry.deliveries,
                    "Queue item exhausted its deliveries; dead-lettered"
                );
                if AssertUnwindSafe(handler.abandoned(&payload))
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    error!(queue_id = entry.id, "Abandon hook panicked");
                }
                Ok(Some(Delivery::DeadLettered))
            }
        }
    }

    fn renew_interval(&self) -> Duration {
        (self.config.lease / 3).max(MIN_RENEW_INTERVAL)
    }

    /// Heartbeat for a claim in progress. Failures are logged; the handler
    /// keeps running and the final ack/fail reports whether the claim held.
    async fn renew(&self, entry: &QueueEntry) {
        match self
            .db
            .renew_lease(entry.id, entry.deliveries, self.config.lease)
            .await
        {
            Ok(true) => debug!(queue_id = entry.id, "Renewed queue lease"),
            Ok(false) => warn!(queue_id = entry.id, "Queue lease lost while handling"),
            Err(e) => warn!(queue_id = entry.id, error = %e, "Failed to renew queue lease"),
        }
    }

    /// Run one consumer slot until cancelled. Items are handled strictly one
    /// at a time within the slot.
    pub async fn consume(
        &self,
        slot: usize,
        handler: Arc<dyn DeliveryHandler>,
        cancel: CancellationToken,
    ) {
        info!(queue = %self.config.name, slot, "Starting queue consumer");
        while !cancel.is_cancelled() {
            let idle = match self.poll_once(handler.as_ref()).await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(e) => {
                    error!(slot, error = %e, "Queue transport error");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }
        info!(queue = %self.config.name, slot, "Queue consumer stopped");
    }

    /// Spawn `consumer_slots` independent consumers.
    pub fn spawn_consumers(
        self: &Arc<Self>,
        handler: Arc<dyn DeliveryHandler>,
        cancel: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        (0..self.config.consumer_slots)
            .map(|slot| {
                let queue = Arc::clone(self);
                let handler = Arc::clone(&handler);
                let cancel = cancel.clone();
                tokio::spawn(async move { queue.consume(slot, handler, cancel).await })
            })
            .collect()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
