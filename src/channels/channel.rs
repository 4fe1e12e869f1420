//! Channel trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::error::ChannelError;

/// An inbound chat event.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Channel name, e.g. "telegram".
    pub channel: String,
    /// Stable identity key of the sender.
    pub user_id: i64,
    /// Conversation to reply into.
    pub chat_id: i64,
    /// Display name (first name on Telegram).
    pub user_name: String,
    pub username: Option<String>,
    pub content: String,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(channel: &str, user_id: i64, chat_id: i64, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            user_id,
            chat_id,
            user_name: String::new(),
            username: None,
            content: content.to_string(),
            received_at: Utc::now(),
        }
    }

    pub fn with_user_name(mut self, name: &str) -> Self {
        self.user_name = name.to_string();
        self
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }
}

/// Transient status shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// "typing…" indicator; expires on its own after a few seconds.
    Typing,
}

/// Stream of inbound messages.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A chat platform.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Begin receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Deliver a text reply to a conversation.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChannelError>;

    /// Emit a transient status to a conversation.
    async fn send_status(&self, chat_id: i64, status: StatusUpdate) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError>;
}
