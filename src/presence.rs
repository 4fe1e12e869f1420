//! Presence signaler: keeps the "typing…" indicator alive while a request
//! is being worked on.
//!
//! The indicator runs as a sibling task. It is stopped through a one-shot
//! channel and joined; dropping the guard without stopping aborts the task,
//! so the indicator cannot outlive the request on any exit path.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::channels::{Channel, StatusUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Active,
    Stopped,
}

/// Starts presence loops.
pub struct PresenceSignaler;

impl PresenceSignaler {
    /// Emit a typing signal now and then every `cadence` until stopped.
    pub fn start(channel: Arc<dyn Channel>, chat_id: i64, cadence: Duration) -> PresenceGuard {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    res = channel.send_status(chat_id, StatusUpdate::Typing) => {
                        if let Err(e) = res {
                            tracing::debug!(chat_id, error = %e, "Typing signal failed");
                        }
                    }
                }
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = tokio::time::sleep(cadence) => {}
                }
            }
        });

        PresenceGuard {
            chat_id,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }
}

/// Handle to a running presence loop.
pub struct PresenceGuard {
    chat_id: i64,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PresenceGuard {
    pub fn state(&self) -> PresenceState {
        if self.handle.is_some() {
            PresenceState::Active
        } else {
            PresenceState::Stopped
        }
    }

    /// Stop the loop and wait for it to exit. Returns false if it was
    /// already stopped.
    pub async fn stop(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return false;
        };
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = handle.await {
            tracing::warn!(chat_id = self.chat_id, error = %e, "Presence task ended abnormally");
        }
        true
    }
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingChannel;

    #[tokio::test]
    async fn emits_until_stopped() {
        let channel = Arc::new(RecordingChannel::new());
        let mut guard = PresenceSignaler::start(channel.clone(), 9, Duration::from_millis(20));
        assert_eq!(guard.state(), PresenceState::Active);

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(guard.stop().await);
        assert_eq!(guard.state(), PresenceState::Stopped);

        let emitted = channel.typing_count();
        assert!(emitted >= 2, "only {emitted} signals");
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(channel.typing_count(), emitted);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let channel = Arc::new(RecordingChannel::new());
        let mut guard = PresenceSignaler::start(channel, 9, Duration::from_millis(20));
        assert!(guard.stop().await);
        assert!(!guard.stop().await);
    }

    #[tokio::test]
    async fn stop_observed_within_one_cadence() {
        let channel = Arc::new(RecordingChannel::new());
        let mut guard = PresenceSignaler::start(channel, 9, Duration::from_secs(4));
        tokio::time::sleep(Duration::from_millis(10)).await;
        let started = std::time::Instant::now();
        guard.stop().await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn drop_aborts_loop() {
        let channel = Arc::new(RecordingChannel::new());
        let guard = PresenceSignaler::start(channel.clone(), 9, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(guard);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_drop = channel.typing_count();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(channel.typing_count(), after_drop);
    }
}
