//! Per-request worker: turns one queued question into a delivered reply.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::Instrument;

use crate::channels::Channel;
use crate::gateways::{strip_deliberation, GenerationGateway, MemoryGateway};
use crate::history::ChatHistory;
use crate::presence::PresenceSignaler;
use crate::queue::{DeliveryHandler, WorkItem};

/// Sent when a reply could not be delivered or the turn was abandoned.
pub const DELIVERY_APOLOGY: &str =
    "Sorry, I had trouble reading the stars for you. Please try again! 🌿";

/// Shared dependencies for request processing.
#[derive(Clone)]
pub struct WorkerDeps {
    pub channel: Arc<dyn Channel>,
    pub memory: Arc<dyn MemoryGateway>,
    pub generation: Arc<GenerationGateway>,
    pub history: Arc<ChatHistory>,
    /// Interval between typing indicators.
    pub presence_cadence: Duration,
}

/// How a single delivery ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Payload failed validation; dropped without side effects.
    Malformed,
    /// Synthetic traffic; dropped without side effects.
    Synthetic,
    /// Reply delivered and recorded.
    Replied,
    /// Reply could not be delivered; an apology was attempted.
    Undelivered,
}

/// Consumes work items from the durable queue.
pub struct RequestWorker {
    deps: WorkerDeps,
}

impl RequestWorker {
    pub fn new(deps: WorkerDeps) -> Self {
        Self { deps }
    }

    /// Handle one raw queue payload.
    ///
    /// Gateway failures degrade inside the gateways, so this returns normally
    /// for every outcome. A panic unwinds to the queue, which redelivers the
    /// item and calls [`DeliveryHandler::abandoned`] once the item is
    /// dead-lettered; the presence loop is aborted on the way out.
    pub async fn process(&self, payload: &serde_json::Value) -> ProcessOutcome {
        let item = match WorkItem::from_value(payload) {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed work item");
                return ProcessOutcome::Malformed;
            }
        };
        if item.is_synthetic() {
            tracing::info!(request_id = %item.request_id, "Skipping synthetic work item");
            return ProcessOutcome::Synthetic;
        }

        let span = tracing::info_span!(
            "request",
            request_id = %item.request_id,
            user_id = item.user_id
        );
        self.answer(item).instrument(span).await
    }

    async fn answer(&self, item: WorkItem) -> ProcessOutcome {
        tracing::info!(chars = item.message.chars().count(), "Processing request");
        let deps = &self.deps;
        let mut presence =
            PresenceSignaler::start(Arc::clone(&deps.channel), item.chat_id, deps.presence_cadence);

        let digest = deps.memory.fetch(item.user_id, &item.message).await;
        let mut context = item.user_context.clone();
        if !digest.trim().is_empty() {
            context.memories = Some(digest);
        }
        let history = deps.history.recent(item.user_id).await;

        let reply = deps.generation.generate(&context, &history, &item.message).await;
        let reply = strip_deliberation(&reply);

        presence.stop().await;

        if let Err(e) = deps.channel.send_message(item.chat_id, &reply).await {
            tracing::error!(error = %e, "Failed to deliver reply");
            if let Err(e) = deps.channel.send_message(item.chat_id, DELIVERY_APOLOGY).await {
                tracing::error!(error = %e, "Failed to deliver apology");
            }
            return ProcessOutcome::Undelivered;
        }

        if let Err(e) = deps
            .history
            .record_turn(item.user_id, &item.message, &reply)
            .await
        {
            tracing::error!(error = %e, "Failed to persist chat turn");
        }

        let memory = Arc::clone(&deps.memory);
        let user_id = item.user_id;
        let message = item.message.clone();
        let stored_reply = reply.clone();
        tokio::spawn(async move {
            memory.store(user_id, &message, &stored_reply).await;
        });

        tracing::info!(chars = reply.chars().count(), "Reply delivered");
        ProcessOutcome::Replied
    }
}

#[async_trait]
impl DeliveryHandler for RequestWorker {
    async fn handle(&self, payload: &serde_json::Value) -> anyhow::Result<()> {
        let outcome = self.process(payload).await;
        tracing::debug!(?outcome, "Delivery handled");
        Ok(())
    }

    async fn abandoned(&self, payload: &serde_json::Value) {
        let Ok(item) = WorkItem::from_value(payload) else {
            return;
        };
        tracing::warn!(request_id = %item.request_id, user_id = item.user_id, "Turn abandoned");
        if let Err(e) = self
            .deps
            .channel
            .send_message(item.chat_id, DELIVERY_APOLOGY)
            .await
        {
            tracing::error!(error = %e, "Failed to deliver apology");
        }
    }
}
