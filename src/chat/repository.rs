use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::{MessageKind, MessageModel};
use crate::shared::AppError;

/// Durable message store. `fetch_recent` is the cold-start history
/// interface (most recent N, oldest first) used to hydrate a fresh room
/// buffer; the live buffer serves joins after that.
#[async_trait]
pub trait MessageRepository {
    async fn save_message(&self, message: &MessageModel) -> Result<(), AppError>;
    async fn mark_deleted(&self, message_id: &str) -> Result<(), AppError>;
    async fn fetch_recent(&self, room_id: &str, limit: u32) -> Result<Vec<MessageModel>, AppError>;
}

/// In-memory implementation for development and testing
pub struct InMemoryMessageRepository {
    messages: Mutex<Vec<MessageModel>>,
}

impl Default for InMemoryMessageRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn with_messages(messages: Vec<MessageModel>) -> Self {
        Self {
            messages: Mutex::new(messages),
        }
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    #[instrument(skip(self, message))]
    async fn save_message(&self, message: &MessageModel) -> Result<(), AppError> {
        debug!(message_id = %message.id, room_id = %message.room_id, "Saving message in memory");
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn mark_deleted(&self, message_id: &str) -> Result<(), AppError> {
        let mut messages = self.messages.lock().unwrap();
        match messages.iter_mut().find(|m| m.id == message_id) {
            Some(message) => {
                message.tombstone();
                Ok(())
            }
            None => Err(AppError::NotFound("Message not found".to_string())),
        }
    }

    #[instrument(skip(self))]
    async fn fetch_recent(&self, room_id: &str, limit: u32) -> Result<Vec<MessageModel>, AppError> {
        let messages = self.messages.lock().unwrap();
        let mut rows: Vec<MessageModel> = messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.created_at);
        let skip = rows.len().saturating_sub(limit as usize);
        Ok(rows.split_off(skip))
    }
}

/// PostgreSQL implementation of the message store. Reactions are kept as a
/// JSONB column.
pub struct PostgresMessageRepository {
    pool: PgPool,
}

impl PostgresMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_message(row: &sqlx::postgres::PgRow) -> Result<MessageModel, AppError> {
        let kind: String = row.get("kind");
        let reactions: serde_json::Value = row.get("reactions");
        Ok(MessageModel {
            id: row.get("id"),
            room_id: row.get("room_id"),
            session_id: row.get("session_id"),
            user_id: row.get("user_id"),
            content: row.get("content"),
            kind: MessageKind::from_str(&kind)
                .map_err(|e| AppError::DatabaseError(e.to_string()))?,
            is_deleted: row.get("is_deleted"),
            is_pinned: row.get("is_pinned"),
            reactions: serde_json::from_value(reactions)
                .map_err(|e| AppError::DatabaseError(e.to_string()))?,
            reply_to: row.get("reply_to"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    #[instrument(skip(self, message))]
    async fn save_message(&self, message: &MessageModel) -> Result<(), AppError> {
        let reactions = serde_json::to_value(&message.reactions)
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        sqlx::query(
            "INSERT INTO looproom_messages \
             (id, room_id, session_id, user_id, content, kind, is_deleted, is_pinned, reactions, reply_to, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(&message.id)
        .bind(&message.room_id)
        .bind(&message.session_id)
        .bind(&message.user_id)
        .bind(&message.content)
        .bind(message.kind.to_string())
        .bind(message.is_deleted)
        .bind(message.is_pinned)
        .bind(reactions)
        .bind(&message.reply_to)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, message_id = %message.id, "Failed to save message in database");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn mark_deleted(&self, message_id: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE looproom_messages SET is_deleted = TRUE, content = '[deleted]' WHERE id = $1",
        )
        .bind(message_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Message not found".to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_recent(&self, room_id: &str, limit: u32) -> Result<Vec<MessageModel>, AppError> {
        let rows = sqlx::query(
            "SELECT * FROM (SELECT * FROM looproom_messages WHERE room_id = $1 \
             ORDER BY created_at DESC LIMIT $2) recent ORDER BY created_at",
        )
        .bind(room_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        rows.iter().map(Self::row_to_message).collect()
    }
}
