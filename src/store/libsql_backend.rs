//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Queue timestamps are written
//! by SQLite itself (`strftime` ISO-8601 with millis) so lease comparisons
//! stay inside one clock and sort lexically.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::onboarding::{BirthDetails, UserProfile};
use crate::store::migrations;
use crate::store::traits::{
    ChatTurn, Database, FailOutcome, QueueEntry, QueueStats, QueueStatus, TurnRole,
};

const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

const USER_COLUMNS: &str = "user_id, display_name, username, date_of_birth, time_of_birth, \
     place_of_birth, is_active, priority, strike_count, created_at, updated_at";

const QUEUE_COLUMNS: &str =
    "id, queue_name, payload, status, deliveries, max_attempts, last_error, created_at";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_db(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_db(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_db(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn query_profiles(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
        op: &str,
    ) -> Result<Vec<UserProfile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut profiles = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            profiles.push(
                row_to_profile(&row).map_err(|e| DatabaseError::Query(format!("{op} row: {e}")))?,
            );
        }
        Ok(profiles)
    }

    async fn query_entries(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
        op: &str,
    ) -> Result<Vec<QueueEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            entries.push(
                row_to_entry(&row).map_err(|e| DatabaseError::Query(format!("{op} row: {e}")))?,
            );
        }
        Ok(entries)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn row_to_profile(row: &libsql::Row) -> Result<UserProfile, libsql::Error> {
    Ok(UserProfile {
        user_id: row.get(0)?,
        display_name: row.get(1)?,
        username: row.get(2)?,
        date_of_birth: row.get(3)?,
        time_of_birth: row.get(4)?,
        place_of_birth: row.get(5)?,
        is_active: row.get::<i64>(6)? != 0,
        priority: row.get::<i64>(7)?.clamp(1, 10) as u8,
        strike_count: row.get::<i64>(8)?.max(0) as u32,
        created_at: parse_datetime(&row.get::<String>(9)?),
        updated_at: parse_datetime(&row.get::<String>(10)?),
    })
}

fn row_to_entry(row: &libsql::Row) -> Result<QueueEntry, libsql::Error> {
    Ok(QueueEntry {
        id: row.get(0)?,
        queue_name: row.get(1)?,
        payload: row.get(2)?,
        status: QueueStatus::parse(&row.get::<String>(3)?),
        deliveries: row.get::<i64>(4)?.max(0) as u32,
        max_attempts: row.get::<i64>(5)?.max(0) as u32,
        last_error: row.get(6)?,
        created_at: parse_datetime(&row.get::<String>(7)?),
    })
}

/// A claim is still held while the row is processing under the same
/// delivery count. Binds `?2` to the claimed delivery count.
const HELD_CLAIM: &str = "status = 'processing' AND deliveries = ?2";

fn lease_modifier(lease: Duration) -> String {
    format!("+{:.3} seconds", lease.as_secs_f64())
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT 1", ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("ping: {e}")))?;
        rows.next()
            .await
            .map_err(|e| DatabaseError::Pool(format!("ping: {e}")))?;
        Ok(())
    }

    // ── Profiles ────────────────────────────────────────────────────

    async fn get_profile(&self, user_id: i64) -> Result<Option<UserProfile>, DatabaseError> {
        let mut profiles = self
            .query_profiles(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
                params![user_id],
                "get_profile",
            )
            .await?;
        Ok(profiles.pop())
    }

    async fn ensure_profile(
        &self,
        user_id: i64,
        display_name: &str,
        username: Option<&str>,
    ) -> Result<UserProfile, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO users (user_id, display_name, username, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT (user_id) DO UPDATE SET
                    display_name = CASE WHEN excluded.display_name = ''
                        THEN users.display_name ELSE excluded.display_name END,
                    username = COALESCE(excluded.username, users.username)",
                params![user_id, display_name, opt_text(username), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("ensure_profile: {e}")))?;

        self.get_profile(user_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "user".into(),
                id: user_id.to_string(),
            })
    }

    async fn save_birth_details(
        &self,
        user_id: i64,
        details: &BirthDetails,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let updated = self
            .conn()
            .execute(
                "UPDATE users SET date_of_birth = ?2, time_of_birth = ?3, place_of_birth = ?4,
                 updated_at = ?5 WHERE user_id = ?1",
                params![
                    user_id,
                    details.date_of_birth.as_str(),
                    details.time_of_birth.as_str(),
                    details.place_of_birth.as_str(),
                    now
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_birth_details: {e}")))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "user".into(),
                id: user_id.to_string(),
            });
        }
        debug!(user_id, "Birth details saved");
        Ok(())
    }

    async fn list_profiles(&self) -> Result<Vec<UserProfile>, DatabaseError> {
        self.query_profiles(
            &format!("SELECT {USER_COLUMNS} FROM users ORDER BY priority ASC, user_id ASC"),
            (),
            "list_profiles",
        )
        .await
    }

    async fn set_active(&self, user_id: i64, active: bool) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let updated = self
            .conn()
            .execute(
                "UPDATE users SET is_active = ?2, updated_at = ?3 WHERE user_id = ?1",
                params![user_id, active as i64, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_active: {e}")))?;
        Ok(updated > 0)
    }

    async fn set_priority(&self, user_id: i64, priority: u8) -> Result<bool, DatabaseError> {
        if !(1..=10).contains(&priority) {
            return Err(DatabaseError::Constraint(format!(
                "priority must be between 1 and 10, got {priority}"
            )));
        }
        let now = Utc::now().to_rfc3339();
        let updated = self
            .conn()
            .execute(
                "UPDATE users SET priority = ?2, updated_at = ?3 WHERE user_id = ?1",
                params![user_id, priority as i64, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_priority: {e}")))?;
        Ok(updated > 0)
    }

    async fn reset_strikes(&self, user_id: i64) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let updated = self
            .conn()
            .execute(
                "UPDATE users SET strike_count = 0, updated_at = ?2 WHERE user_id = ?1",
                params![user_id, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("reset_strikes: {e}")))?;
        Ok(updated > 0)
    }

    // ── Chat log ────────────────────────────────────────────────────

    async fn append_chat_turn(&self, user_id: i64, turn: &ChatTurn) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO chat_turns (user_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    user_id,
                    turn.role.as_str(),
                    turn.content.as_str(),
                    turn.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_chat_turn: {e}")))?;
        Ok(())
    }

    async fn recent_chat_turns(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatTurn>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT role, content, created_at FROM chat_turns
                 WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
                params![user_id, limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_chat_turns: {e}")))?;

        let mut turns = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_chat_turns: {e}")))?
        {
            let role: String = row.get(0).unwrap_or_default();
            let content: String = row.get(1).unwrap_or_default();
            let created: String = row.get(2).unwrap_or_default();
            turns.push(ChatTurn {
                role: TurnRole::parse(&role),
                content,
                created_at: parse_datetime(&created),
            });
        }
        turns.reverse();
        Ok(turns)
    }

    async fn clear_chat_turns(&self, user_id: i64) -> Result<usize, DatabaseError> {
        let deleted = self
            .conn()
            .execute("DELETE FROM chat_turns WHERE user_id = ?1", params![user_id])
            .await
            .map_err(|e| DatabaseError::Query(format!("clear_chat_turns: {e}")))?;
        Ok(deleted as usize)
    }

    // ── Work queue ──────────────────────────────────────────────────

    async fn enqueue(
        &self,
        queue: &str,
        payload: &str,
        max_attempts: u32,
    ) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "INSERT INTO queue_items (queue_name, payload, max_attempts) VALUES (?1, ?2, ?3)
                 RETURNING id",
                params![queue, payload, max_attempts as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("enqueue: {e}")))?;
        let id: i64 = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("enqueue: {e}")))?
            .ok_or_else(|| DatabaseError::Query("enqueue: no id returned".into()))?
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("enqueue row: {e}")))?;
        debug!(queue, id, "Queue item persisted");
        Ok(id)
    }

    async fn claim_next(
        &self,
        queue: &str,
        lease: Duration,
    ) -> Result<Option<QueueEntry>, DatabaseError> {
        let mut entries = self
            .query_entries(
                &format!(
                    "UPDATE queue_items SET status = 'processing',
                        deliveries = deliveries + 1,
                        locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?2),
                        updated_at = {NOW}
                     WHERE id = (
                        SELECT id FROM queue_items
                        WHERE queue_name = ?1 AND status = 'pending'
                        ORDER BY id ASC LIMIT 1
                     )
                     RETURNING {QUEUE_COLUMNS}"
                ),
                params![queue, lease_modifier(lease)],
                "claim_next",
            )
            .await?;
        Ok(entries.pop())
    }

    async fn renew_lease(
        &self,
        id: i64,
        deliveries: u32,
        lease: Duration,
    ) -> Result<bool, DatabaseError> {
        let touched = self
            .conn()
            .execute(
                &format!(
                    "UPDATE queue_items SET
                        locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?3),
                        updated_at = {NOW}
                     WHERE id = ?1 AND {HELD_CLAIM}"
                ),
                params![id, deliveries as i64, lease_modifier(lease)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("renew_lease: {e}")))?;
        Ok(touched > 0)
    }

    async fn ack(&self, id: i64, deliveries: u32) -> Result<bool, DatabaseError> {
        let touched = self
            .conn()
            .execute(
                &format!(
                    "UPDATE queue_items SET status = 'completed', locked_until = NULL,
                     updated_at = {NOW} WHERE id = ?1 AND {HELD_CLAIM}"
                ),
                params![id, deliveries as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("ack: {e}")))?;
        Ok(touched > 0)
    }

    async fn fail(
        &self,
        id: i64,
        deliveries: u32,
        error: &str,
    ) -> Result<FailOutcome, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "UPDATE queue_items SET
                        status = CASE WHEN deliveries >= max_attempts THEN 'dead' ELSE 'pending' END,
                        last_error = ?3, locked_until = NULL, updated_at = {NOW}
                     WHERE id = ?1 AND {HELD_CLAIM}
                     RETURNING status"
                ),
                params![id, deliveries as i64, error],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("fail: {e}")))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("fail: {e}")))?
        else {
            return Ok(FailOutcome::ClaimLost);
        };
        let status: String = row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("fail row: {e}")))?;

        Ok(match QueueStatus::parse(&status) {
            QueueStatus::Dead => FailOutcome::DeadLettered,
            _ => FailOutcome::Retry,
        })
    }

    async fn dead_letter(&self, id: i64, reason: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "UPDATE queue_items SET status = 'dead', last_error = ?2,
                     locked_until = NULL, updated_at = {NOW} WHERE id = ?1"
                ),
                params![id, reason],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("dead_letter: {e}")))?;
        Ok(())
    }

    async fn reclaim_expired(&self, queue: &str) -> Result<usize, DatabaseError> {
        let touched = self
            .conn()
            .execute(
                &format!(
                    "UPDATE queue_items SET
                        status = CASE WHEN deliveries >= max_attempts THEN 'dead' ELSE 'pending' END,
                        last_error = CASE WHEN deliveries >= max_attempts
                            THEN 'lease expired' ELSE last_error END,
                        locked_until = NULL, updated_at = {NOW}
                     WHERE queue_name = ?1 AND status = 'processing'
                        AND locked_until IS NOT NULL AND locked_until < {NOW}"
                ),
                params![queue],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("reclaim_expired: {e}")))?;
        if touched > 0 {
            warn!(queue, count = touched, "Reclaimed queue items with expired leases");
        }
        Ok(touched as usize)
    }

    async fn queue_stats(&self, queue: &str) -> Result<QueueStats, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT status, COUNT(*) FROM queue_items WHERE queue_name = ?1 GROUP BY status",
                params![queue],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("queue_stats: {e}")))?;

        let mut stats = QueueStats::default();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("queue_stats: {e}")))?
        {
            let status: String = row.get(0).unwrap_or_default();
            let count = row.get::<i64>(1).unwrap_or(0).max(0) as u64;
            match QueueStatus::parse(&status) {
                QueueStatus::Pending => stats.pending = count,
                QueueStatus::Processing => stats.processing = count,
                QueueStatus::Completed => stats.completed = count,
                QueueStatus::Dead => stats.dead = count,
            }
        }
        Ok(stats)
    }

    async fn list_dead(&self, queue: &str, limit: usize) -> Result<Vec<QueueEntry>, DatabaseError> {
        self.query_entries(
            &format!(
                "SELECT {QUEUE_COLUMNS} FROM queue_items
                 WHERE queue_name = ?1 AND status = 'dead'
                 ORDER BY id DESC LIMIT ?2"
            ),
            params![queue, limit as i64],
            "list_dead",
        )
        .await
    }

    async fn requeue(&self, id: i64) -> Result<bool, DatabaseError> {
        let updated = self
            .conn()
            .execute(
                &format!(
                    "UPDATE queue_items SET status = 'pending', deliveries = 0,
                     last_error = NULL, locked_until = NULL, updated_at = {NOW}
                     WHERE id = ?1 AND status = 'dead'"
                ),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("requeue: {e}")))?;
        Ok(updated > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn details() -> BirthDetails {
        BirthDetails::parse("1990-01-15", "10:30", "Sydney, Australia").unwrap()
    }

    // ── Profile tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn ensure_profile_creates_then_refreshes() {
        let db = test_db().await;
        let created = db.ensure_profile(7, "Asha", Some("asha")).await.unwrap();
        assert_eq!(created.display_name, "Asha");
        assert!(created.is_active);
        assert_eq!(created.priority, 5);
        assert!(!created.is_complete());

        let again = db.ensure_profile(7, "Asha R", None).await.unwrap();
        assert_eq!(again.display_name, "Asha R");
        assert_eq!(again.username.as_deref(), Some("asha"));
        assert_eq!(db.list_profiles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn save_birth_details_completes_profile() {
        let db = test_db().await;
        db.ensure_profile(1, "Asha", None).await.unwrap();
        db.save_birth_details(1, &details()).await.unwrap();

        let p = db.get_profile(1).await.unwrap().unwrap();
        assert!(p.is_complete());
        assert_eq!(p.birth_details(), Some(details()));
    }

    #[tokio::test]
    async fn save_birth_details_unknown_user() {
        let db = test_db().await;
        let err = db.save_birth_details(99, &details()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn admin_mutations() {
        let db = test_db().await;
        db.ensure_profile(1, "A", None).await.unwrap();
        db.ensure_profile(2, "B", None).await.unwrap();

        assert!(db.set_active(1, false).await.unwrap());
        assert!(db.set_priority(2, 1).await.unwrap());
        assert!(!db.set_active(404, true).await.unwrap());
        assert!(db.set_priority(1, 11).await.is_err());

        let listed = db.list_profiles().await.unwrap();
        assert_eq!(listed[0].user_id, 2);
        assert!(!listed[1].is_active);

        db.conn()
            .execute("UPDATE users SET strike_count = 3 WHERE user_id = 1", ())
            .await
            .unwrap();
        assert!(db.reset_strikes(1).await.unwrap());
        assert_eq!(db.get_profile(1).await.unwrap().unwrap().strike_count, 0);
    }

    // ── Chat log tests ──────────────────────────────────────────────

    #[tokio::test]
    async fn chat_turns_roundtrip_in_order() {
        let db = test_db().await;
        for i in 0..5 {
            db.append_chat_turn(1, &ChatTurn::user(format!("q{i}")))
                .await
                .unwrap();
            db.append_chat_turn(1, &ChatTurn::assistant(format!("a{i}")))
                .await
                .unwrap();
        }
        db.append_chat_turn(2, &ChatTurn::user("other")).await.unwrap();

        let recent = db.recent_chat_turns(1, 4).await.unwrap();
        let texts: Vec<&str> = recent.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(texts, vec!["q3", "a3", "q4", "a4"]);
        assert_eq!(recent[0].role, TurnRole::User);

        assert_eq!(db.clear_chat_turns(1).await.unwrap(), 10);
        assert!(db.recent_chat_turns(1, 4).await.unwrap().is_empty());
        assert_eq!(db.recent_chat_turns(2, 4).await.unwrap().len(), 1);
    }

    // ── Queue tests ─────────────────────────────────────────────────

    #[tokio::test]
    async fn claim_is_fifo_and_leased() {
        let db = test_db().await;
        let a = db.enqueue("q", "{\"n\":1}", 3).await.unwrap();
        let b = db.enqueue("q", "{\"n\":2}", 3).await.unwrap();
        db.enqueue("other", "{}", 3).await.unwrap();

        let first = db.claim_next("q", Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(first.id, a);
        assert_eq!(first.status, QueueStatus::Processing);
        assert_eq!(first.deliveries, 1);

        let second = db.claim_next("q", Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(second.id, b);
        assert!(db.claim_next("q", Duration::from_secs(60)).await.unwrap().is_none());

        assert!(db.ack(a, first.deliveries).await.unwrap());
        let stats = db.queue_stats("q").await.unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn fail_retries_then_dead_letters() {
        let db = test_db().await;
        let id = db.enqueue("q", "{}", 2).await.unwrap();

        let first = db.claim_next("q", Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(db.fail(id, first.deliveries, "boom").await.unwrap(), FailOutcome::Retry);

        let again = db.claim_next("q", Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(again.deliveries, 2);
        assert_eq!(again.last_error.as_deref(), Some("boom"));
        assert_eq!(
            db.fail(id, again.deliveries, "boom again").await.unwrap(),
            FailOutcome::DeadLettered
        );

        assert!(db.claim_next("q", Duration::from_secs(60)).await.unwrap().is_none());
        let dead = db.list_dead("q", 10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].last_error.as_deref(), Some("boom again"));

        assert!(db.requeue(id).await.unwrap());
        let revived = db.claim_next("q", Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(revived.deliveries, 1);
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimed() {
        let db = test_db().await;
        let id = db.enqueue("q", "{}", 3).await.unwrap();
        db.claim_next("q", Duration::ZERO).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(db.reclaim_expired("q").await.unwrap(), 1);
        let entry = db.claim_next("q", Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.deliveries, 2);

        // A live lease is left alone.
        assert_eq!(db.reclaim_expired("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stale_claim_cannot_settle_reclaimed_item() {
        let db = test_db().await;
        let id = db.enqueue("q", "{}", 3).await.unwrap();
        let stale = db.claim_next("q", Duration::ZERO).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        db.reclaim_expired("q").await.unwrap();
        let current = db.claim_next("q", Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(current.deliveries, stale.deliveries + 1);

        assert!(!db.ack(id, stale.deliveries).await.unwrap());
        assert_eq!(
            db.fail(id, stale.deliveries, "late").await.unwrap(),
            FailOutcome::ClaimLost
        );
        assert!(!db
            .renew_lease(id, stale.deliveries, Duration::from_secs(60))
            .await
            .unwrap());
        let stats = db.queue_stats("q").await.unwrap();
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.completed, 0);

        assert!(db.ack(id, current.deliveries).await.unwrap());
        assert_eq!(db.queue_stats("q").await.unwrap().completed, 1);
    }

    #[tokio::test]
    async fn renewed_lease_survives_reclaim() {
        let db = test_db().await;
        db.enqueue("q", "{}", 3).await.unwrap();
        let entry = db.claim_next("q", Duration::ZERO).await.unwrap().unwrap();
        assert!(db
            .renew_lease(entry.id, entry.deliveries, Duration::from_secs(60))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(db.reclaim_expired("q").await.unwrap(), 0);
        assert!(db.claim_next("q", Duration::from_secs(60)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dead_letter_directly() {
        let db = test_db().await;
        let id = db.enqueue("q", "not json", 3).await.unwrap();
        db.claim_next("q", Duration::from_secs(60)).await.unwrap();
        db.dead_letter(id, "invalid payload").await.unwrap();
        assert_eq!(db.queue_stats("q").await.unwrap().dead, 1);
    }

    #[tokio::test]
    async fn queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("astro.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.enqueue("q", "{\"keep\":true}", 3).await.unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let entry = db.claim_next("q", Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(entry.payload, "{\"keep\":true}");
    }

    #[tokio::test]
    async fn ping_succeeds() {
        test_db().await.ping().await.unwrap();
    }
}
