//! Unified `Database` trait: single async interface for all persistence.
//!
//! Covers user profiles, the durable chat log and the durable work queue.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;
use crate::onboarding::{BirthDetails, UserProfile};

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "assistant" => Self::Assistant,
            _ => Self::User,
        }
    }
}

/// One side of an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle of a queue row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    /// Dead-lettered: exhausted its deliveries or can never succeed.
    Dead,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "dead" => Self::Dead,
            _ => Self::Pending,
        }
    }
}

/// A persisted queue row.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: i64,
    pub queue_name: String,
    pub payload: String,
    pub status: QueueStatus,
    /// Times this item has been handed to a consumer.
    pub deliveries: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What `fail` did with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Back to pending for redelivery.
    Retry,
    /// Moved to the dead-letter state.
    DeadLettered,
    /// The claim was no longer held (lease expired and the item moved on);
    /// nothing was changed.
    ClaimLost,
}

/// Per-status counts for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub dead: u64,
}

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Cheap round trip used by the health check.
    async fn ping(&self) -> Result<(), DatabaseError>;

    // ── Profiles ────────────────────────────────────────────────────

    async fn get_profile(&self, user_id: i64) -> Result<Option<UserProfile>, DatabaseError>;

    /// Create the profile on first contact; refresh name/username otherwise.
    async fn ensure_profile(
        &self,
        user_id: i64,
        display_name: &str,
        username: Option<&str>,
    ) -> Result<UserProfile, DatabaseError>;

    /// Write all three birth fields in one statement.
    async fn save_birth_details(
        &self,
        user_id: i64,
        details: &BirthDetails,
    ) -> Result<(), DatabaseError>;

    /// All profiles ordered by priority, then id.
    async fn list_profiles(&self) -> Result<Vec<UserProfile>, DatabaseError>;

    /// Returns false if the profile does not exist.
    async fn set_active(&self, user_id: i64, active: bool) -> Result<bool, DatabaseError>;

    /// Returns false if the profile does not exist.
    async fn set_priority(&self, user_id: i64, priority: u8) -> Result<bool, DatabaseError>;

    /// Returns false if the profile does not exist.
    async fn reset_strikes(&self, user_id: i64) -> Result<bool, DatabaseError>;

    // ── Chat log ────────────────────────────────────────────────────

    async fn append_chat_turn(&self, user_id: i64, turn: &ChatTurn) -> Result<(), DatabaseError>;

    /// The most recent `limit` turns, oldest first.
    async fn recent_chat_turns(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatTurn>, DatabaseError>;

    /// Delete the user's log. Returns the number of turns removed.
    async fn clear_chat_turns(&self, user_id: i64) -> Result<usize, DatabaseError>;

    // ── Work queue ──────────────────────────────────────────────────

    /// Persist a new pending item. Returns its id.
    async fn enqueue(
        &self,
        queue: &str,
        payload: &str,
        max_attempts: u32,
    ) -> Result<i64, DatabaseError>;

    /// Atomically lease the oldest pending item and count the delivery.
    async fn claim_next(
        &self,
        queue: &str,
        lease: Duration,
    ) -> Result<Option<QueueEntry>, DatabaseError>;

    /// Push a held claim's lease forward. `deliveries` identifies the claim;
    /// returns false when it is no longer held.
    async fn renew_lease(
        &self,
        id: i64,
        deliveries: u32,
        lease: Duration,
    ) -> Result<bool, DatabaseError>;

    /// Mark a claimed item completed. Returns false (and changes nothing)
    /// when the claim identified by `deliveries` is no longer held.
    async fn ack(&self, id: i64, deliveries: u32) -> Result<bool, DatabaseError>;

    /// Release a claimed item after a handler failure.
    async fn fail(
        &self,
        id: i64,
        deliveries: u32,
        error: &str,
    ) -> Result<FailOutcome, DatabaseError>;

    /// Move an item straight to the dead-letter state.
    async fn dead_letter(&self, id: i64, reason: &str) -> Result<(), DatabaseError>;

    /// Return items whose lease expired to pending (or dead if out of
    /// deliveries). Returns the number of rows touched.
    async fn reclaim_expired(&self, queue: &str) -> Result<usize, DatabaseError>;

    async fn queue_stats(&self, queue: &str) -> Result<QueueStats, DatabaseError>;

    /// Dead-lettered items, newest first.
    async fn list_dead(&self, queue: &str, limit: usize) -> Result<Vec<QueueEntry>, DatabaseError>;

    /// Reset a dead item to pending with a fresh delivery budget.
    async fn requeue(&self, id: i64) -> Result<bool, DatabaseError>;
}
