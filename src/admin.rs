//! Offline profile and queue administration used by the `manage-user` binary.
//!
//! Every operation returns the text to print so it can be tested without a
//! terminal.

use crate::error::DatabaseError;
use crate::onboarding::UserProfile;
use crate::store::Database;

/// Priorities at or above this level (numerically at or below) get a marker.
const HIGH_PRIORITY: u8 = 2;

fn status_icon(p: &UserProfile) -> &'static str {
    if p.is_active { "✅" } else { "❌" }
}

fn priority_icon(p: &UserProfile) -> &'static str {
    if p.priority <= HIGH_PRIORITY { " ⚡" } else { "" }
}

fn not_found(user_id: i64) -> String {
    format!("❌ User {user_id} not found")
}

pub async fn list_users(db: &dyn Database) -> Result<String, DatabaseError> {
    let profiles = db.list_profiles().await?;
    let mut out = format!("📋 Total Users: {}\n", profiles.len());
    for p in &profiles {
        out.push_str(&format!(
            "\n{} {} (ID: {}) - Priority: {}{}",
            status_icon(p),
            p.display_name,
            p.user_id,
            p.priority,
            priority_icon(p)
        ));
    }
    Ok(out)
}

pub async fn get_user(db: &dyn Database, user_id: i64) -> Result<String, DatabaseError> {
    let Some(p) = db.get_profile(user_id).await? else {
        return Ok(not_found(user_id));
    };
    Ok(format!(
        "📊 User: {} (ID: {})\n   Status: {}\n   Priority: {}{}\n   Strikes: {}\n   Username: @{}\n   Onboarded: {}",
        p.display_name,
        p.user_id,
        if p.is_active { "✅ Active" } else { "❌ Inactive" },
        p.priority,
        priority_icon(&p),
        p.strike_count,
        p.username.as_deref().unwrap_or("N/A"),
        if p.is_complete() { "yes" } else { "no" },
    ))
}

pub async fn set_active(
    db: &dyn Database,
    user_id: i64,
    active: bool,
) -> Result<String, DatabaseError> {
    if !db.set_active(user_id, active).await? {
        return Ok(not_found(user_id));
    }
    let verb = if active { "activated" } else { "deactivated" };
    tracing::info!(user_id, active, "Profile status changed");
    Ok(format!("✅ User {user_id} has been {verb}"))
}

/// Priority runs 1 (highest) to 10 (lowest).
pub async fn set_priority(
    db: &dyn Database,
    user_id: i64,
    priority: u8,
) -> Result<String, DatabaseError> {
    if !(1..=10).contains(&priority) {
        return Ok("❌ Priority must be between 1 and 10".to_string());
    }
    if !db.set_priority(user_id, priority).await? {
        return Ok(not_found(user_id));
    }
    Ok(format!("✅ User {user_id} priority set to {priority}"))
}

pub async fn reset_strikes(db: &dyn Database, user_id: i64) -> Result<String, DatabaseError> {
    if !db.reset_strikes(user_id).await? {
        return Ok(not_found(user_id));
    }
    Ok(format!("✅ User {user_id} strikes reset"))
}

pub async fn dead_letters(
    db: &dyn Database,
    queue: &str,
    limit: usize,
) -> Result<String, DatabaseError> {
    let dead = db.list_dead(queue, limit).await?;
    if dead.is_empty() {
        return Ok(format!("No dead-lettered items in {queue}"));
    }
    let mut out = format!("☠️ Dead-lettered items in {queue}: {}\n", dead.len());
    for entry in &dead {
        out.push_str(&format!(
            "\n#{} ({} deliveries, {}) {}",
            entry.id,
            entry.deliveries,
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.last_error.as_deref().unwrap_or("no error recorded"),
        ));
    }
    Ok(out)
}

pub async fn requeue(db: &dyn Database, item_id: i64) -> Result<String, DatabaseError> {
    if db.requeue(item_id).await? {
        tracing::info!(item_id, "Dead-lettered item requeued");
        Ok(format!("✅ Item #{item_id} returned to the queue"))
    } else {
        Ok(format!("❌ Item #{item_id} is not dead-lettered"))
    }
}
