use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::{SessionModel, SessionStatus};
use crate::shared::AppError;

/// Durable store for session rows. Writes from the live path are
/// fire-and-forget; the in-memory session stays authoritative for
/// connected clients regardless of persistence outcome.
#[async_trait]
pub trait SessionRepository {
    async fn create_session(&self, session: &SessionModel) -> Result<(), AppError>;
    async fn update_session(&self, session: &SessionModel) -> Result<(), AppError>;
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionModel>, AppError>;
    async fn list_by_room(&self, room_id: &str) -> Result<Vec<SessionModel>, AppError>;
}

/// In-memory implementation for development and testing
pub struct InMemorySessionRepository {
    sessions: Mutex<HashMap<String, SessionModel>>,
}

impl Default for InMemorySessionRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    #[instrument(skip(self, session))]
    async fn create_session(&self, session: &SessionModel) -> Result<(), AppError> {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains_key(&session.id) {
            warn!(session_id = %session.id, "Session already exists in memory");
            return Err(AppError::DatabaseError(
                "Session already exists".to_string(),
            ));
        }
        sessions.insert(session.id.clone(), session.clone());
        debug!(session_id = %session.id, room_id = %session.room_id, "Session created in memory");
        Ok(())
    }

    #[instrument(skip(self, session))]
    async fn update_session(&self, session: &SessionModel) -> Result<(), AppError> {
        let mut sessions = self.sessions.lock().unwrap();
        if !sessions.contains_key(&session.id) {
            warn!(session_id = %session.id, "Session not found for update in memory");
            return Err(AppError::NotFound("Session not found".to_string()));
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionModel>, AppError> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions.get(session_id).cloned())
    }

    #[instrument(skip(self))]
    async fn list_by_room(&self, room_id: &str) -> Result<Vec<SessionModel>, AppError> {
        let sessions = self.sessions.lock().unwrap();
        let mut rows: Vec<SessionModel> = sessions
            .values()
            .filter(|s| s.room_id == room_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.started_at);
        Ok(rows)
    }
}

/// PostgreSQL implementation of the session repository
pub struct PostgresSessionRepository {
    pool: PgPool,
}

impl PostgresSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_session(row: &sqlx::postgres::PgRow) -> Result<SessionModel, AppError> {
        let status: String = row.get("status");
        Ok(SessionModel {
            id: row.get("id"),
            room_id: row.get("room_id"),
            status: SessionStatus::from_str(&status)
                .map_err(|e| AppError::DatabaseError(e.to_string()))?,
            started_at: row.get("started_at"),
            ended_at: row.get("ended_at"),
            peak_participants: row.get("peak_participants"),
            total_messages: row.get("total_messages"),
            stream_url: row.get("stream_url"),
            recording_url: row.get("recording_url"),
        })
    }
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    #[instrument(skip(self, session))]
    async fn create_session(&self, session: &SessionModel) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO looproom_sessions \
             (id, room_id, status, started_at, ended_at, peak_participants, total_messages, stream_url, recording_url) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&session.id)
        .bind(&session.room_id)
        .bind(session.status.to_string())
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(session.peak_participants)
        .bind(session.total_messages)
        .bind(&session.stream_url)
        .bind(&session.recording_url)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, session_id = %session.id, "Failed to create session in database");
            AppError::DatabaseError(e.to_string())
        })?;

        debug!(session_id = %session.id, "Session created in database");
        Ok(())
    }

    #[instrument(skip(self, session))]
    async fn update_session(&self, session: &SessionModel) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE looproom_sessions SET status = $2, ended_at = $3, peak_participants = $4, \
             total_messages = $5, stream_url = $6, recording_url = $7 WHERE id = $1",
        )
        .bind(&session.id)
        .bind(session.status.to_string())
        .bind(session.ended_at)
        .bind(session.peak_participants)
        .bind(session.total_messages)
        .bind(&session.stream_url)
        .bind(&session.recording_url)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, session_id = %session.id, "Failed to update session in database");
            AppError::DatabaseError(e.to_string())
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Session not found".to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionModel>, AppError> {
        let row = sqlx::query("SELECT * FROM looproom_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    #[instrument(skip(self))]
    async fn list_by_room(&self, room_id: &str) -> Result<Vec<SessionModel>, AppError> {
        let rows = sqlx::query(
            "SELECT * FROM looproom_sessions WHERE room_id = $1 ORDER BY started_at",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        rows.iter().map(Self::row_to_session).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_create_and_get_session() {
        let repo = InMemorySessionRepository::new();
        let session = SessionModel::new("r1".to_string(), None, Utc::now());

        repo.create_session(&session).await.unwrap();

        let fetched = repo.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.room_id, "r1");
        assert_eq!(fetched.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_update_finalizes_session() {
        let repo = InMemorySessionRepository::new();
        let mut session = SessionModel::new("r1".to_string(), None, Utc::now());
        repo.create_session(&session).await.unwrap();

        session.end(Utc::now());
        repo.update_session(&session).await.unwrap();

        let fetched = repo.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, SessionStatus::Ended);
        assert!(fetched.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_update_missing_session() {
        let repo = InMemorySessionRepository::new();
        let session = SessionModel::new("r1".to_string(), None, Utc::now());
        let result = repo.update_session(&session).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_by_room_filters_and_orders() {
        let repo = InMemorySessionRepository::new();
        let s1 = SessionModel::new("r1".to_string(), None, Utc::now());
        let s2 = SessionModel::new("r2".to_string(), None, Utc::now());
        repo.create_session(&s1).await.unwrap();
        repo.create_session(&s2).await.unwrap();

        let rows = repo.list_by_room("r1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, s1.id);
    }
}
