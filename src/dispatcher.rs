//! Dispatcher: routes every inbound message.
//!
//! Commands are answered inline, wizard input drives the onboarding state
//! machine, and questions from complete, active profiles are enqueued. The
//! dispatcher never waits on generation.

use std::sync::Arc;

use crate::channels::{Channel, IncomingMessage};
use crate::gateways::MemoryGateway;
use crate::history::ChatHistory;
use crate::onboarding::{prompts, OnboardingManager, UserProfile};
use crate::queue::{DurableQueue, WorkItem};
use crate::store::Database;

/// Display name used when the platform does not provide one.
const FALLBACK_NAME: &str = "friend";

/// Slash commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Info,
    Change,
    Cancel,
    Clear,
    Unknown(String),
}

impl Command {
    /// Parse a `/command`, tolerating a `@botname` suffix and arguments.
    pub fn parse(text: &str) -> Option<Self> {
        let head = text.trim().split_whitespace().next()?;
        let name = head.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name).to_lowercase();
        Some(match name.as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "info" => Self::Info,
            "change" => Self::Change,
            "cancel" => Self::Cancel,
            "clear" => Self::Clear,
            _ => Self::Unknown(name),
        })
    }
}

/// What kind of message arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Command(Command),
    WizardInput,
    Query,
}

/// Result of dispatching one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Answered inline.
    Replied,
    /// Queued for the worker under the given item id.
    Enqueued(i64),
    /// Could not be handled; an apology was sent.
    Failed,
}

pub struct Dispatcher {
    db: Arc<dyn Database>,
    channel: Arc<dyn Channel>,
    onboarding: Arc<OnboardingManager>,
    queue: Arc<DurableQueue>,
    history: Arc<ChatHistory>,
    memory: Arc<dyn MemoryGateway>,
}

impl Dispatcher {
    pub fn new(
        db: Arc<dyn Database>,
        channel: Arc<dyn Channel>,
        onboarding: Arc<OnboardingManager>,
        queue: Arc<DurableQueue>,
        history: Arc<ChatHistory>,
        memory: Arc<dyn MemoryGateway>,
    ) -> Self {
        Self {
            db,
            channel,
            onboarding,
            queue,
            history,
            memory,
        }
    }

    /// Commands first, then an active wizard, then everything else.
    pub async fn classify(&self, msg: &IncomingMessage) -> Inbound {
        if let Some(cmd) = Command::parse(&msg.content) {
            return Inbound::Command(cmd);
        }
        if self.onboarding.has_session(msg.user_id).await {
            return Inbound::WizardInput;
        }
        Inbound::Query
    }

    pub async fn dispatch(&self, msg: &IncomingMessage) -> DispatchOutcome {
        let name = if msg.user_name.trim().is_empty() {
            FALLBACK_NAME
        } else {
            msg.user_name.trim()
        };
        let profile = match self
            .db
            .ensure_profile(msg.user_id, name, msg.username.as_deref())
            .await
        {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(user_id = msg.user_id, error = %e, "Failed to load profile");
                self.reply(msg.chat_id, prompts::ENQUEUE_FAILED).await;
                return DispatchOutcome::Failed;
            }
        };

        match self.classify(msg).await {
            Inbound::Command(cmd) => {
                tracing::info!(user_id = msg.user_id, ?cmd, "Command received");
                self.handle_command(cmd, &profile, msg.chat_id).await
            }
            Inbound::WizardInput => {
                match self.onboarding.handle_input(msg.user_id, &msg.content).await {
                    Some(reply) => self.reply(msg.chat_id, &reply.text).await,
                    // Session ended between classify and handle.
                    None => self.reply(msg.chat_id, &prompts::request_details()).await,
                }
                DispatchOutcome::Replied
            }
            Inbound::Query => self.handle_query(&profile, msg).await,
        }
    }

    async fn handle_query(&self, profile: &UserProfile, msg: &IncomingMessage) -> DispatchOutcome {
        if !profile.is_active {
            tracing::info!(user_id = profile.user_id, "Ignoring query from inactive profile");
            self.reply(msg.chat_id, prompts::PAUSED).await;
            return DispatchOutcome::Replied;
        }

        let Some(item) = WorkItem::for_profile(profile, msg.chat_id, &msg.content) else {
            let text = match self
                .onboarding
                .try_direct_extraction(profile.user_id, &msg.content)
                .await
            {
                Some(reply) => reply.text,
                None => prompts::request_details(),
            };
            self.reply(msg.chat_id, &text).await;
            return DispatchOutcome::Replied;
        };

        match self.queue.enqueue(&item).await {
            Ok(id) => {
                tracing::info!(
                    user_id = profile.user_id,
                    request_id = %item.request_id,
                    item_id = id,
                    "Query enqueued"
                );
                DispatchOutcome::Enqueued(id)
            }
            Err(e) => {
                tracing::error!(user_id = profile.user_id, error = %e, "Failed to enqueue query");
                self.reply(msg.chat_id, prompts::ENQUEUE_FAILED).await;
                DispatchOutcome::Failed
            }
        }
    }

    async fn handle_command(
        &self,
        cmd: Command,
        profile: &UserProfile,
        chat_id: i64,
    ) -> DispatchOutcome {
        let user_id = profile.user_id;
        let text = match cmd {
            Command::Start => prompts::welcome(profile),
            Command::Help | Command::Unknown(_) => prompts::HELP.to_string(),
            Command::Info => prompts::info(profile),
            Command::Change => self.onboarding.start(user_id, profile.is_complete()).await.text,
            Command::Cancel => {
                if self.onboarding.cancel(user_id).await {
                    prompts::CANCELLED.to_string()
                } else {
                    prompts::NOTHING_TO_CANCEL.to_string()
                }
            }
            Command::Clear => {
                let history = self.history.clear(user_id).await;
                let memory = self.memory.clear(user_id).await;
                match (history, memory) {
                    (Ok(turns), Ok(())) => {
                        tracing::info!(user_id, turns, "Cleared user data");
                        prompts::CLEARED.to_string()
                    }
                    (history, memory) => {
                        if let Err(e) = history {
                            tracing::error!(user_id, error = %e, "Failed to clear chat log");
                        }
                        if let Err(e) = memory {
                            tracing::error!(user_id, error = %e, "Failed to clear memories");
                        }
                        self.reply(chat_id, prompts::CLEAR_FAILED).await;
                        return DispatchOutcome::Failed;
                    }
                }
            }
        };
        self.reply(chat_id, &text).await;
        DispatchOutcome::Replied
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.channel.send_message(chat_id, text).await {
            tracing::error!(chat_id, error = %e, "Failed to send reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::onboarding::{BirthDetails, WizardStage};
    use crate::store::{ChatTurn, LibSqlBackend};
    use crate::testing::{RecordingChannel, StubMemory};

    struct Harness {
        dispatcher: Dispatcher,
        db: Arc<dyn Database>,
        channel: Arc<RecordingChannel>,
        queue: Arc<DurableQueue>,
        onboarding: Arc<OnboardingManager>,
        memory: Arc<StubMemory>,
    }

    async fn harness(memory: Arc<StubMemory>) -> Harness {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let channel = Arc::new(RecordingChannel::new());
        let onboarding = Arc::new(OnboardingManager::new(Arc::clone(&db)));
        let queue = Arc::new(DurableQueue::new(Arc::clone(&db), QueueConfig::default()));
        let history = Arc::new(ChatHistory::new(Arc::clone(&db), 10));
        let dispatcher = Dispatcher::new(
            Arc::clone(&db),
            channel.clone(),
            onboarding.clone(),
            queue.clone(),
            history,
            memory.clone(),
        );
        Harness {
            dispatcher,
            db,
            channel,
            queue,
            onboarding,
            memory,
        }
    }

    fn msg(text: &str) -> IncomingMessage {
        IncomingMessage::new("test", 5, 50, text).with_user_name("Asha")
    }

    async fn complete_profile(db: &Arc<dyn Database>) {
        db.ensure_profile(5, "Asha", None).await.unwrap();
        let details = BirthDetails::parse("1990-01-15", "10:30", "Sydney, Australia").unwrap();
        db.save_birth_details(5, &details).await.unwrap();
    }

    async fn pending(h: &Harness) -> u64 {
        h.queue.stats().await.unwrap().pending
    }

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/START@AstroBot"), Some(Command::Start));
        assert_eq!(Command::parse("  /change now"), Some(Command::Change));
        assert_eq!(Command::parse("/foo"), Some(Command::Unknown("foo".into())));
        assert_eq!(Command::parse("hello /start"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[tokio::test]
    async fn first_contact_creates_profile_and_asks_for_details() {
        let h = harness(StubMemory::with_digest("")).await;
        let outcome = h.dispatcher.dispatch(&msg("How is today for me?")).await;
        assert_eq!(outcome, DispatchOutcome::Replied);

        let profile = h.db.get_profile(5).await.unwrap().unwrap();
        assert_eq!(profile.display_name, "Asha");
        assert!(!profile.is_complete());
        assert!(h.channel.texts()[0].contains("Date of Birth:"));
        assert_eq!(pending(&h).await, 0);
    }

    #[tokio::test]
    async fn direct_extraction_completes_profile() {
        let h = harness(StubMemory::with_digest("")).await;
        let text = "Date of Birth: 1990-01-15\nTime of Birth: 10:30\nPlace of Birth: Sydney, Australia";
        h.dispatcher.dispatch(&msg(text)).await;

        assert!(h.db.get_profile(5).await.unwrap().unwrap().is_complete());
        assert_eq!(h.channel.texts(), vec![prompts::EXTRACTED.to_string()]);
        assert_eq!(pending(&h).await, 0);
    }

    #[tokio::test]
    async fn wizard_flow_through_dispatcher() {
        let h = harness(StubMemory::with_digest("")).await;
        h.dispatcher.dispatch(&msg("/change")).await;
        assert_eq!(h.onboarding.stage(5).await, Some(WizardStage::CollectDate));

        h.dispatcher.dispatch(&msg("15-01-1990")).await;
        assert_eq!(h.onboarding.stage(5).await, Some(WizardStage::CollectDate));
        assert_eq!(h.channel.texts().last().unwrap(), prompts::INVALID_DATE);

        h.dispatcher.dispatch(&msg("1990-01-15")).await;
        h.dispatcher.dispatch(&msg("10:30")).await;
        h.dispatcher.dispatch(&msg("Sydney, Australia")).await;
        assert!(!h.onboarding.has_session(5).await);
        assert!(h.db.get_profile(5).await.unwrap().unwrap().is_complete());
        assert_eq!(pending(&h).await, 0);
    }

    #[tokio::test]
    async fn cancel_leaves_profile_untouched() {
        let h = harness(StubMemory::with_digest("")).await;
        h.dispatcher.dispatch(&msg("/change")).await;
        h.dispatcher.dispatch(&msg("1990-01-15")).await;
        h.dispatcher.dispatch(&msg("/cancel")).await;
        assert_eq!(h.channel.texts().last().unwrap(), prompts::CANCELLED);
        assert!(h.db.get_profile(5).await.unwrap().unwrap().date_of_birth.is_none());

        h.dispatcher.dispatch(&msg("/cancel")).await;
        assert_eq!(h.channel.texts().last().unwrap(), prompts::NOTHING_TO_CANCEL);
    }

    #[tokio::test]
    async fn complete_profile_query_is_enqueued_without_reply() {
        let h = harness(StubMemory::with_digest("")).await;
        complete_profile(&h.db).await;

        let outcome = h.dispatcher.dispatch(&msg("How is today for me?")).await;
        assert!(matches!(outcome, DispatchOutcome::Enqueued(_)));
        assert!(h.channel.sent().is_empty());
        assert_eq!(pending(&h).await, 1);
    }

    #[tokio::test]
    async fn inactive_profile_is_paused() {
        let h = harness(StubMemory::with_digest("")).await;
        complete_profile(&h.db).await;
        h.db.set_active(5, false).await.unwrap();

        h.dispatcher.dispatch(&msg("How is today for me?")).await;
        assert_eq!(h.channel.texts(), vec![prompts::PAUSED.to_string()]);
        assert_eq!(pending(&h).await, 0);
    }

    #[tokio::test]
    async fn clear_wipes_history_and_memory() {
        let h = harness(StubMemory::with_digest("")).await;
        complete_profile(&h.db).await;
        h.db.append_chat_turn(5, &ChatTurn::user("q")).await.unwrap();

        h.dispatcher.dispatch(&msg("/clear")).await;
        assert_eq!(h.channel.texts(), vec![prompts::CLEARED.to_string()]);
        assert!(h.db.recent_chat_turns(5, 10).await.unwrap().is_empty());
        assert_eq!(h.memory.clears.lock().unwrap().as_slice(), &[5]);
    }

    #[tokio::test]
    async fn clear_reports_memory_failure() {
        let h = harness(StubMemory::unreachable()).await;
        h.dispatcher.dispatch(&msg("/clear")).await;
        assert_eq!(h.channel.texts(), vec![prompts::CLEAR_FAILED.to_string()]);
    }

    #[tokio::test]
    async fn info_and_unknown_commands() {
        let h = harness(StubMemory::with_digest("")).await;
        complete_profile(&h.db).await;
        h.dispatcher.dispatch(&msg("/info")).await;
        h.dispatcher.dispatch(&msg("/bogus")).await;
        let texts = h.channel.texts();
        assert!(texts[0].contains("Sydney, Australia"));
        assert_eq!(texts[1], prompts::HELP);
    }
}
