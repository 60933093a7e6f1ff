use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::LooproomModel;
use crate::shared::AppError;

/// Trait for looproom record lookups
#[async_trait]
pub trait LooproomRepository {
    async fn create_room(&self, room: &LooproomModel) -> Result<(), AppError>;
    async fn get_room(&self, room_id: &str) -> Result<Option<LooproomModel>, AppError>;
    async fn list_rooms(&self) -> Result<Vec<LooproomModel>, AppError>;
}

/// In-memory implementation for development and testing
pub struct InMemoryLooproomRepository {
    rooms: Mutex<HashMap<String, LooproomModel>>,
}

impl Default for InMemoryLooproomRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLooproomRepository {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a repository with pre-populated rooms
    pub fn with_rooms(rooms: Vec<LooproomModel>) -> Self {
        let mut map = HashMap::new();
        for room in rooms {
            map.insert(room.id.clone(), room);
        }
        Self {
            rooms: Mutex::new(map),
        }
    }
}

#[async_trait]
impl LooproomRepository for InMemoryLooproomRepository {
    #[instrument(skip(self, room))]
    async fn create_room(&self, room: &LooproomModel) -> Result<(), AppError> {
        let mut rooms = self.rooms.lock().unwrap();
        if rooms.contains_key(&room.id) {
            warn!(room_id = %room.id, "Room already exists in memory");
            return Err(AppError::DatabaseError("Room already exists".to_string()));
        }
        rooms.insert(room.id.clone(), room.clone());
        debug!(room_id = %room.id, "Room created in memory");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_room(&self, room_id: &str) -> Result<Option<LooproomModel>, AppError> {
        let rooms = self.rooms.lock().unwrap();
        Ok(rooms.get(room_id).cloned())
    }

    #[instrument(skip(self))]
    async fn list_rooms(&self) -> Result<Vec<LooproomModel>, AppError> {
        let rooms = self.rooms.lock().unwrap();
        Ok(rooms.values().cloned().collect())
    }
}

/// PostgreSQL implementation of the looproom repository
pub struct PostgresLooproomRepository {
    pool: PgPool,
}

impl PostgresLooproomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LooproomRepository for PostgresLooproomRepository {
    #[instrument(skip(self, room))]
    async fn create_room(&self, room: &LooproomModel) -> Result<(), AppError> {
        sqlx::query("INSERT INTO looprooms (id, creator_id, name, capacity) VALUES ($1, $2, $3, $4)")
            .bind(&room.id)
            .bind(&room.creator_id)
            .bind(&room.name)
            .bind(room.capacity)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to create room in database");
                AppError::DatabaseError(e.to_string())
            })?;

        debug!(room_id = %room.id, "Room created in database");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_room(&self, room_id: &str) -> Result<Option<LooproomModel>, AppError> {
        let row = sqlx::query("SELECT id, creator_id, name, capacity FROM looprooms WHERE id = $1")
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, room_id = %room_id, "Failed to fetch room from database");
                AppError::DatabaseError(e.to_string())
            })?;

        Ok(row.map(|row| LooproomModel {
            id: row.get("id"),
            creator_id: row.get("creator_id"),
            name: row.get("name"),
            capacity: row.get("capacity"),
        }))
    }

    #[instrument(skip(self))]
    async fn list_rooms(&self) -> Result<Vec<LooproomModel>, AppError> {
        let rows = sqlx::query("SELECT id, creator_id, name, capacity FROM looprooms ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to list rooms from database");
                AppError::DatabaseError(e.to_string())
            })?;

        Ok(rows
            .into_iter()
            .map(|row| LooproomModel {
                id: row.get("id"),
                creator_id: row.get("creator_id"),
                name: row.get("name"),
                capacity: row.get("capacity"),
            })
            .collect())
    }
}
