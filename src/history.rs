//! Chat history: the durable turn log plus a bounded per-user window kept
//! in memory.
//!
//! The window is warmed from the log on first access after a restart and
//! evicts oldest turns first.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::DatabaseError;
use crate::store::{ChatTurn, Database};

pub struct ChatHistory {
    db: Arc<dyn Database>,
    window: usize,
    cache: RwLock<HashMap<i64, VecDeque<ChatTurn>>>,
}

impl ChatHistory {
    pub fn new(db: Arc<dyn Database>, window: usize) -> Self {
        Self {
            db,
            window,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Append one exchange (user, then assistant) to the log and the window.
    ///
    /// The window is updated even if the log write fails; the log error is
    /// returned for the caller to report.
    pub async fn record_turn(
        &self,
        user_id: i64,
        user_text: &str,
        reply_text: &str,
    ) -> Result<(), DatabaseError> {
        let turns = [ChatTurn::user(user_text), ChatTurn::assistant(reply_text)];

        let mut logged = Ok(());
        for turn in &turns {
            if let Err(e) = self.db.append_chat_turn(user_id, turn).await {
                logged = Err(e);
                break;
            }
        }

        let warm = self.cache.read().await.contains_key(&user_id);
        if warm || logged.is_err() {
            let mut cache = self.cache.write().await;
            let window = cache.entry(user_id).or_default();
            for turn in turns {
                window.push_back(turn);
            }
            while window.len() > self.window {
                window.pop_front();
            }
        } else {
            // Cold user: the next read warms from the log, which now holds
            // these turns.
            tracing::trace!(user_id, "History window cold; left for lazy warm-up");
        }
        logged
    }

    /// The most recent turns for a user, oldest first.
    pub async fn recent(&self, user_id: i64) -> Vec<ChatTurn> {
        if let Some(window) = self.cache.read().await.get(&user_id) {
            return window.iter().cloned().collect();
        }

        let loaded = match self.db.recent_chat_turns(user_id, self.window).await {
            Ok(turns) => turns,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Failed to warm chat history");
                return Vec::new();
            }
        };

        let mut cache = self.cache.write().await;
        let window = cache
            .entry(user_id)
            .or_insert_with(|| loaded.into_iter().collect());
        window.iter().cloned().collect()
    }

    /// Drop the window and the durable log for a user.
    pub async fn clear(&self, user_id: i64) -> Result<usize, DatabaseError> {
        self.cache.write().await.remove(&user_id);
        self.db.clear_chat_turns(user_id).await
    }
}
