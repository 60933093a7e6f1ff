use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::{ModerationActionModel, ModerationKind};
use crate::shared::AppError;

/// Durable audit log of moderation actions. `fetch_active` backs the
/// rebuild of a room's in-memory index after eviction, so idle rooms do not
/// grant ban amnesty.
#[async_trait]
pub trait ModerationRepository {
    async fn record_action(&self, action: &ModerationActionModel) -> Result<(), AppError>;
    /// Mute/ban/unmute/unban rows for a room that may still bear on the
    /// effective state, oldest first
    async fn fetch_active(
        &self,
        room_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ModerationActionModel>, AppError>;
    async fn list_by_room(&self, room_id: &str) -> Result<Vec<ModerationActionModel>, AppError>;
}

/// In-memory implementation for development and testing
pub struct InMemoryModerationRepository {
    actions: Mutex<Vec<ModerationActionModel>>,
}

impl Default for InMemoryModerationRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryModerationRepository {
    pub fn new() -> Self {
        Self {
            actions: Mutex::new(Vec::new()),
        }
    }

    pub fn action_count(&self) -> usize {
        self.actions.lock().unwrap().len()
    }
}

fn bears_on_effective_state(action: &ModerationActionModel, now: DateTime<Utc>) -> bool {
    let standing = matches!(
        action.kind,
        ModerationKind::Mute | ModerationKind::Unmute | ModerationKind::Ban | ModerationKind::Unban
    );
    let unexpired = match action.expires_at {
        Some(at) => at > now,
        None => true,
    };
    standing && unexpired
}

#[async_trait]
impl ModerationRepository for InMemoryModerationRepository {
    #[instrument(skip(self, action))]
    async fn record_action(&self, action: &ModerationActionModel) -> Result<(), AppError> {
        debug!(
            action_id = %action.id,
            room_id = %action.room_id,
            kind = %action.kind,
            "Recording moderation action in memory"
        );
        self.actions.lock().unwrap().push(action.clone());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_active(
        &self,
        room_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ModerationActionModel>, AppError> {
        let actions = self.actions.lock().unwrap();
        let mut rows: Vec<ModerationActionModel> = actions
            .iter()
            .filter(|a| a.room_id == room_id && bears_on_effective_state(a, now))
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.created_at);
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn list_by_room(&self, room_id: &str) -> Result<Vec<ModerationActionModel>, AppError> {
        let actions = self.actions.lock().unwrap();
        Ok(actions
            .iter()
            .filter(|a| a.room_id == room_id)
            .cloned()
            .collect())
    }
}

/// PostgreSQL implementation of the moderation audit log
pub struct PostgresModerationRepository {
    pool: PgPool,
}

impl PostgresModerationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_action(row: &sqlx::postgres::PgRow) -> Result<ModerationActionModel, AppError> {
        let kind: String = row.get("kind");
        Ok(ModerationActionModel {
            id: row.get("id"),
            room_id: row.get("room_id"),
            moderator_id: row.get("moderator_id"),
            target_user_id: row.get("target_user_id"),
            kind: ModerationKind::from_str(&kind)
                .map_err(|e| AppError::DatabaseError(e.to_string()))?,
            reason: row.get("reason"),
            duration_minutes: row.get("duration_minutes"),
            expires_at: row.get("expires_at"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl ModerationRepository for PostgresModerationRepository {
    #[instrument(skip(self, action))]
    async fn record_action(&self, action: &ModerationActionModel) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO moderation_actions \
             (id, room_id, moderator_id, target_user_id, kind, reason, duration_minutes, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&action.id)
        .bind(&action.room_id)
        .bind(&action.moderator_id)
        .bind(&action.target_user_id)
        .bind(action.kind.to_string())
        .bind(&action.reason)
        .bind(action.duration_minutes)
        .bind(action.expires_at)
        .bind(action.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, action_id = %action.id, "Failed to record moderation action");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_active(
        &self,
        room_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ModerationActionModel>, AppError> {
        let rows = sqlx::query(
            "SELECT * FROM moderation_actions WHERE room_id = $1 \
             AND kind IN ('mute', 'unmute', 'ban', 'unban') \
             AND (expires_at IS NULL OR expires_at > $2) \
             ORDER BY created_at",
        )
        .bind(room_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        rows.iter().map(Self::row_to_action).collect()
    }

    #[instrument(skip(self))]
    async fn list_by_room(&self, room_id: &str) -> Result<Vec<ModerationActionModel>, AppError> {
        let rows =
            sqlx::query("SELECT * FROM moderation_actions WHERE room_id = $1 ORDER BY created_at")
                .bind(room_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        rows.iter().map(Self::row_to_action).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ban(room: &str, target: &str, minutes: Option<i64>) -> ModerationActionModel {
        ModerationActionModel::new(
            room.to_string(),
            "mod".to_string(),
            Some(target.to_string()),
            ModerationKind::Ban,
            None,
            minutes,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let repo = InMemoryModerationRepository::new();
        repo.record_action(&ban("r1", "u1", None)).await.unwrap();
        repo.record_action(&ban("r2", "u2", None)).await.unwrap();

        let rows = repo.list_by_room("r1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].target_user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_fetch_active_skips_expired_and_unrelated() {
        let repo = InMemoryModerationRepository::new();
        repo.record_action(&ban("r1", "u1", Some(5))).await.unwrap();
        repo.record_action(&ban("r1", "u2", None)).await.unwrap();
        repo.record_action(&ModerationActionModel::new(
            "r1".to_string(),
            "mod".to_string(),
            Some("u3".to_string()),
            ModerationKind::Warn,
            None,
            None,
            Utc::now(),
        ))
        .await
        .unwrap();

        // five-minute ban has elapsed by +10min; warn never has standing effect
        let rows = repo
            .fetch_active("r1", Utc::now() + Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].target_user_id.as_deref(), Some("u2"));
    }
}
