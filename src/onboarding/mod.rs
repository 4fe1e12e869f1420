//! Onboarding: collects the three birth details before any question can be
//! answered, either through a three-step wizard or from a single message.

pub mod extract;
pub mod manager;
pub mod model;
pub mod prompts;
pub mod state;
pub mod validate;

pub use extract::extract_birth_details;
pub use manager::{OnboardingManager, WizardReply};
pub use model::{BirthDetails, UserProfile, DEFAULT_PRIORITY};
pub use state::{OnboardingSession, StepOutcome, WizardStage};
