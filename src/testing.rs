//! In-process stand-ins for the channel, LLM and gateway seams.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;

use crate::channels::{Channel, MessageStream, StatusUpdate};
use crate::error::{ChannelError, GatewayError, LlmError};
use crate::gateways::{MemoryGateway, PredictionGateway, PredictionQuery};
use crate::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use crate::onboarding::BirthDetails;

/// Records every outgoing message and typing signal.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(i64, String)>>,
    typing: AtomicUsize,
    fail_sends: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `send_message` fails.
    pub fn failing() -> Self {
        let channel = Self::default();
        channel.fail_sends.store(true, Ordering::SeqCst);
        channel
    }

    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, t)| t).collect()
    }

    pub fn typing_count(&self) -> usize {
        self.typing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        Ok(Box::pin(stream::empty()))
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed {
                name: "recording".into(),
                reason: "send disabled".into(),
            });
        }
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn send_status(&self, _chat_id: i64, status: StatusUpdate) -> Result<(), ChannelError> {
        match status {
            StatusUpdate::Typing => self.typing.fetch_add(1, Ordering::SeqCst),
        };
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Replays scripted completions in order, then empty replies.
pub struct ScriptedLlm {
    replies: Mutex<Vec<Result<String, LlmError>>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
    panic_on_call: bool,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
            panic_on_call: false,
        })
    }

    /// Always replies with `text`.
    pub fn always(text: &str) -> Arc<Self> {
        Self::new((0..8).map(|_| Ok(text.to_string())).collect())
    }

    /// Panics inside `complete`, like an uncaught fault in generation.
    pub fn panicking() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            panic_on_call: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        if self.panic_on_call {
            panic!("generation backend crashed");
        }
        let next = {
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Ok(String::new())
            } else {
                replies.remove(0)
            }
        };
        next.map(|content| CompletionResponse {
            content,
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }
}

/// Memory service double. `digest: None` makes every call fail.
pub struct StubMemory {
    digest: Option<String>,
    pub fetches: AtomicUsize,
    pub stores: Mutex<Vec<(i64, String, String)>>,
    pub clears: Mutex<Vec<i64>>,
}

impl StubMemory {
    pub fn with_digest(digest: &str) -> Arc<Self> {
        Arc::new(Self {
            digest: Some(digest.to_string()),
            fetches: AtomicUsize::new(0),
            stores: Mutex::new(Vec::new()),
            clears: Mutex::new(Vec::new()),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            digest: None,
            fetches: AtomicUsize::new(0),
            stores: Mutex::new(Vec::new()),
            clears: Mutex::new(Vec::new()),
        })
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn down() -> GatewayError {
        GatewayError::Transport {
            service: "memory",
            reason: "connection refused".into(),
        }
    }
}

#[async_trait]
impl MemoryGateway for StubMemory {
    async fn try_fetch(&self, _user_id: i64, _query: &str) -> Result<String, GatewayError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.digest.clone().ok_or_else(Self::down)
    }

    async fn try_store(
        &self,
        user_id: i64,
        user_text: &str,
        reply_text: &str,
    ) -> Result<(), GatewayError> {
        self.stores
            .lock()
            .unwrap()
            .push((user_id, user_text.to_string(), reply_text.to_string()));
        if self.digest.is_none() {
            return Err(Self::down());
        }
        Ok(())
    }

    async fn clear(&self, user_id: i64) -> Result<(), GatewayError> {
        self.clears.lock().unwrap().push(user_id);
        if self.digest.is_none() {
            return Err(Self::down());
        }
        Ok(())
    }
}

/// Prediction API double returning a fixed payload.
pub struct StubPrediction {
    payload: serde_json::Value,
    pub calls: Mutex<Vec<PredictionQuery>>,
}

impl StubPrediction {
    pub fn returning(payload: serde_json::Value) -> Arc<Self> {
        Arc::new(Self {
            payload,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PredictionGateway for StubPrediction {
    async fn try_lookup(
        &self,
        _birth: &BirthDetails,
        query: &PredictionQuery,
    ) -> Result<serde_json::Value, GatewayError> {
        self.calls.lock().unwrap().push(query.clone());
        Ok(self.payload.clone())
    }
}
