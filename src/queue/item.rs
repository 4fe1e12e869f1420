//! Queue payload for a single inbound query.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::onboarding::{BirthDetails, UserProfile};

/// Marker the load-test tooling puts in synthetic messages.
pub const BATCH_TEST_MARKER: &str = "batch_test";

/// Snapshot of the profile fields a worker needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub name: String,
    pub date_of_birth: String,
    pub time_of_birth: String,
    pub place_of_birth: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memories: Option<String>,
}

impl UserContext {
    /// The snapshotted birth fields, as captured at enqueue time.
    pub fn birth_details(&self) -> BirthDetails {
        BirthDetails {
            date_of_birth: self.date_of_birth.clone(),
            time_of_birth: self.time_of_birth.clone(),
            place_of_birth: self.place_of_birth.clone(),
        }
    }
}

/// One unit of durable queued work. Never mutated after enqueue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub request_id: String,
    pub user_id: i64,
    pub chat_id: i64,
    pub message: String,
    pub user_context: UserContext,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
}

/// Why a payload was rejected on arrival.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedItem {
    #[error("payload does not match the work item shape: {0}")]
    Shape(String),
    #[error("required field `{0}` is empty")]
    EmptyField(&'static str),
}

impl WorkItem {
    /// Build a work item from a completed profile. Returns `None` if the
    /// profile is missing birth details.
    pub fn for_profile(profile: &UserProfile, chat_id: i64, message: &str) -> Option<Self> {
        let details = profile.birth_details()?;
        Some(Self {
            request_id: Uuid::new_v4().to_string(),
            user_id: profile.user_id,
            chat_id,
            message: message.to_string(),
            user_context: UserContext {
                name: profile.display_name.clone(),
                date_of_birth: details.date_of_birth,
                time_of_birth: details.time_of_birth,
                place_of_birth: details.place_of_birth,
                memories: None,
            },
            synthetic: false,
        })
    }

    /// Decode and check a raw queue payload.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, MalformedItem> {
        let item: Self = serde_json::from_value(value.clone())
            .map_err(|e| MalformedItem::Shape(e.to_string()))?;
        item.validate()?;
        Ok(item)
    }

    fn validate(&self) -> Result<(), MalformedItem> {
        let required = [
            ("request_id", &self.request_id),
            ("message", &self.message),
            ("user_context.date_of_birth", &self.user_context.date_of_birth),
            ("user_context.time_of_birth", &self.user_context.time_of_birth),
            ("user_context.place_of_birth", &self.user_context.place_of_birth),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(MalformedItem::EmptyField(name));
            }
        }
        Ok(())
    }

    /// Synthetic or load-test traffic that must not reach any upstream.
    pub fn is_synthetic(&self) -> bool {
        self.synthetic || self.message.to_lowercase().contains(BATCH_TEST_MARKER)
    }
}
