//! OnboardingManager: owns the per-user wizard sessions and persists the
//! collected birth details.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::store::Database;

use super::extract::extract_birth_details;
use super::model::BirthDetails;
use super::prompts;
use super::state::{OnboardingSession, StepOutcome, WizardStage};

/// What the dispatcher should send back after a wizard interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardReply {
    pub text: String,
    /// Stage the session is in after this input. `Done` means the profile
    /// is now complete.
    pub stage: WizardStage,
}

impl WizardReply {
    fn new(text: impl Into<String>, stage: WizardStage) -> Self {
        Self {
            text: text.into(),
            stage,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.stage == WizardStage::Done
    }
}

/// Coordinates wizard sessions and the direct-extraction shortcut.
///
/// Sessions live only in process memory. Each input is handled under the
/// session lock, including the final save, so inputs for one user apply in
/// order.
pub struct OnboardingManager {
    db: Arc<dyn Database>,
    sessions: RwLock<HashMap<i64, OnboardingSession>>,
}

impl OnboardingManager {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Whether the user is in the middle of the wizard.
    pub async fn has_session(&self, user_id: i64) -> bool {
        self.sessions.read().await.contains_key(&user_id)
    }

    /// Current stage for a user, if a session exists.
    pub async fn stage(&self, user_id: i64) -> Option<WizardStage> {
        self.sessions.read().await.get(&user_id).map(|s| s.stage)
    }

    /// Start (or restart) the wizard and return the first prompt.
    pub async fn start(&self, user_id: i64, is_update: bool) -> WizardReply {
        self.sessions
            .write()
            .await
            .insert(user_id, OnboardingSession::new(is_update));
        tracing::info!(user_id, is_update, "Onboarding wizard started");
        WizardReply::new(prompts::ask_date(is_update), WizardStage::CollectDate)
    }

    /// Feed one message to the user's wizard. Returns `None` when there is
    /// no active session.
    pub async fn handle_input(&self, user_id: i64, input: &str) -> Option<WizardReply> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&user_id)?;

        let reply = match session.step(input) {
            StepOutcome::Rejected(stage) => {
                tracing::debug!(user_id, %stage, "Wizard input rejected");
                let text = match stage {
                    WizardStage::CollectTime => prompts::INVALID_TIME,
                    WizardStage::CollectPlace => prompts::INVALID_PLACE,
                    _ => prompts::INVALID_DATE,
                };
                WizardReply::new(text, stage)
            }
            StepOutcome::Advanced(stage) => {
                let text = match stage {
                    WizardStage::CollectTime => {
                        prompts::ask_time(session.date_of_birth.as_deref().unwrap_or_default())
                    }
                    _ => prompts::ask_place(session.time_of_birth.as_deref().unwrap_or_default()),
                };
                WizardReply::new(text, stage)
            }
            StepOutcome::Completed(details) => {
                let is_update = session.is_update;
                self.finish(&mut sessions, user_id, details, is_update).await
            }
            StepOutcome::Finished => {
                sessions.remove(&user_id);
                return None;
            }
        };
        Some(reply)
    }

    /// Persist a completed session. Runs with the session map locked so no
    /// other input for the user can observe the transient `Done` stage.
    async fn finish(
        &self,
        sessions: &mut HashMap<i64, OnboardingSession>,
        user_id: i64,
        details: BirthDetails,
        is_update: bool,
    ) -> WizardReply {
        match self.db.save_birth_details(user_id, &details).await {
            Ok(()) => {
                sessions.remove(&user_id);
                tracing::info!(user_id, "Birth details saved via wizard");
                WizardReply::new(prompts::completed(&details, is_update), WizardStage::Done)
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to save birth details");
                // Keep the collected date and time so the user can resend the place.
                if let Some(session) = sessions.get_mut(&user_id) {
                    session.stage = WizardStage::CollectPlace;
                }
                WizardReply::new(prompts::SAVE_FAILED, WizardStage::CollectPlace)
            }
        }
    }

    /// Cancel the user's wizard without touching the profile.
    pub async fn cancel(&self, user_id: i64) -> bool {
        let mut sessions = self.sessions.write().await;
        let cancelled = sessions
            .get_mut(&user_id)
            .map(OnboardingSession::cancel)
            .unwrap_or(false);
        sessions.remove(&user_id);
        if cancelled {
            tracing::info!(user_id, "Onboarding wizard cancelled");
        }
        cancelled
    }

    /// Complete the profile in one step if `text` carries all three details.
    /// Returns `None` when nothing usable was found.
    pub async fn try_direct_extraction(&self, user_id: i64, text: &str) -> Option<WizardReply> {
        let details = extract_birth_details(text)?;
        match self.db.save_birth_details(user_id, &details).await {
            Ok(()) => {
                self.sessions.write().await.remove(&user_id);
                tracing::info!(user_id, "Birth details saved via direct extraction");
                Some(WizardReply::new(prompts::EXTRACTED, WizardStage::Done))
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to save extracted birth details");
                Some(WizardReply::new(prompts::SAVE_FAILED, WizardStage::CollectDate))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    async fn setup() -> (Arc<dyn Database>, OnboardingManager) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        db.ensure_profile(7, "Asha", None).await.unwrap();
        let mgr = OnboardingManager::new(Arc::clone(&db));
        (db, mgr)
    }

    #[tokio::test]
    async fn wizard_completes_and_persists() {
        let (db, mgr) = setup().await;
        let r = mgr.start(7, false).await;
        assert_eq!(r.stage, WizardStage::CollectDate);

        let r = mgr.handle_input(7, "1990-01-15").await.unwrap();
        assert_eq!(r.stage, WizardStage::CollectTime);
        assert!(r.text.contains("1990-01-15"));

        let r = mgr.handle_input(7, "10:30").await.unwrap();
        assert_eq!(r.stage, WizardStage::CollectPlace);

        let r = mgr.handle_input(7, "Sydney, Australia").await.unwrap();
        assert!(r.is_complete());
        assert!(r.text.contains("All Set"));
        assert!(!mgr.has_session(7).await);

        let p = db.get_profile(7).await.unwrap().unwrap();
        assert!(p.is_complete());
        assert_eq!(p.place_of_birth.as_deref(), Some("Sydney, Australia"));
    }

    #[tokio::test]
    async fn bad_date_reprompts_without_mutation() {
        let (db, mgr) = setup().await;
        mgr.start(7, false).await;
        let r = mgr.handle_input(7, "15-01-1990").await.unwrap();
        assert_eq!(r.stage, WizardStage::CollectDate);
        assert_eq!(r.text, prompts::INVALID_DATE);
        assert_eq!(mgr.stage(7).await, Some(WizardStage::CollectDate));

        let p = db.get_profile(7).await.unwrap().unwrap();
        assert!(p.date_of_birth.is_none());
    }

    #[tokio::test]
    async fn cancel_discards_session() {
        let (db, mgr) = setup().await;
        mgr.start(7, false).await;
        mgr.handle_input(7, "1990-01-15").await;
        assert!(mgr.cancel(7).await);
        assert!(!mgr.has_session(7).await);
        assert!(!mgr.cancel(7).await);
        assert!(mgr.handle_input(7, "10:30").await.is_none());

        let p = db.get_profile(7).await.unwrap().unwrap();
        assert!(p.date_of_birth.is_none());
    }

    #[tokio::test]
    async fn extraction_matches_wizard_result() {
        let (db, mgr) = setup().await;
        db.ensure_profile(8, "Ravi", None).await.unwrap();

        mgr.start(7, false).await;
        mgr.handle_input(7, "1990-01-15").await;
        mgr.handle_input(7, "10:30").await;
        mgr.handle_input(7, "Sydney, Australia").await;

        let r = mgr
            .try_direct_extraction(
                8,
                "Date of Birth: 1990-01-15\nTime of Birth: 10:30\nPlace of Birth: Sydney,Australia",
            )
            .await
            .unwrap();
        assert!(r.is_complete());

        let a = db.get_profile(7).await.unwrap().unwrap();
        let b = db.get_profile(8).await.unwrap().unwrap();
        assert_eq!(a.birth_details(), b.birth_details());
        assert!(b.is_complete());
    }

    #[tokio::test]
    async fn extraction_ignores_plain_questions() {
        let (_db, mgr) = setup().await;
        assert!(mgr.try_direct_extraction(7, "How is today for me?").await.is_none());
    }

    #[tokio::test]
    async fn update_flag_changes_confirmation() {
        let (_db, mgr) = setup().await;
        let r = mgr.start(7, true).await;
        assert!(r.text.contains("update"));
        mgr.handle_input(7, "1991-02-03").await;
        mgr.handle_input(7, "04:05").await;
        let r = mgr.handle_input(7, "Pune, India").await.unwrap();
        assert!(r.text.contains("Updated"));
    }

    #[tokio::test]
    async fn failed_save_keeps_session_under_concurrent_input() {
        let (db, mgr) = setup().await;
        // No profile row for user 9, so the save fails.
        mgr.start(9, false).await;
        mgr.handle_input(9, "1990-01-15").await;
        mgr.handle_input(9, "10:30").await;

        let (first, second) = tokio::join!(
            mgr.handle_input(9, "Sydney, Australia"),
            mgr.handle_input(9, "Melbourne, Australia"),
        );
        for reply in [first, second] {
            let reply = reply.unwrap();
            assert_eq!(reply.text, prompts::SAVE_FAILED);
            assert_eq!(reply.stage, WizardStage::CollectPlace);
        }
        assert_eq!(mgr.stage(9).await, Some(WizardStage::CollectPlace));

        // Once the profile exists, resending the place completes the wizard
        // with the date and time collected earlier.
        db.ensure_profile(9, "Mira", None).await.unwrap();
        let r = mgr.handle_input(9, "Sydney, Australia").await.unwrap();
        assert!(r.is_complete());
        let p = db.get_profile(9).await.unwrap().unwrap();
        assert_eq!(p.date_of_birth.as_deref(), Some("1990-01-15"));
        assert_eq!(p.time_of_birth.as_deref(), Some("10:30"));
    }
}
