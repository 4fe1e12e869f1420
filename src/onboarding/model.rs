//! User profile and birth-detail models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validate::{validate_date, validate_place, validate_time};

/// Default priority for new profiles (1 = highest, 10 = lowest).
pub const DEFAULT_PRIORITY: u8 = 5;

/// The three validated onboarding fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthDetails {
    pub date_of_birth: String,
    pub time_of_birth: String,
    pub place_of_birth: String,
}

impl BirthDetails {
    /// Validate and normalize raw field values. Returns `None` if any fails.
    pub fn parse(date: &str, time: &str, place: &str) -> Option<Self> {
        Some(Self {
            date_of_birth: validate_date(date)?,
            time_of_birth: validate_time(time)?,
            place_of_birth: validate_place(place)?,
        })
    }
}

/// Persisted per-user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub date_of_birth: Option<String>,
    pub time_of_birth: Option<String>,
    pub place_of_birth: Option<String>,
    pub is_active: bool,
    pub priority: u8,
    pub strike_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// A fresh, active profile with no birth details.
    pub fn new(user_id: i64, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            display_name: display_name.into(),
            username: None,
            date_of_birth: None,
            time_of_birth: None,
            place_of_birth: None,
            is_active: true,
            priority: DEFAULT_PRIORITY,
            strike_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Birth details, if all three are present and pass validation.
    pub fn birth_details(&self) -> Option<BirthDetails> {
        BirthDetails::parse(
            self.date_of_birth.as_deref()?,
            self.time_of_birth.as_deref()?,
            self.place_of_birth.as_deref()?,
        )
    }

    /// Whether the profile can be used to answer queries.
    pub fn is_complete(&self) -> bool {
        self.birth_details().is_some()
    }

    /// Render stored details for the `/info` command.
    pub fn summary(&self) -> String {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "not set".to_string());
        format!(
            "Name: {}\nDate of Birth: {}\nTime of Birth: {}\nPlace of Birth: {}",
            self.display_name,
            show(&self.date_of_birth),
            show(&self.time_of_birth),
            show(&self.place_of_birth),
        )
    }
}
