use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Persisted looproom record. The durable row is the system of record;
/// the live actor in `registry` is runtime state built on top of it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LooproomModel {
    pub id: String,
    pub creator_id: String,
    pub name: String,
    /// Per-room capacity override; `None` falls back to `RoomConfig`
    pub capacity: Option<i32>,
}

impl LooproomModel {
    pub fn new(id: String, creator_id: String, name: String) -> Self {
        Self {
            id,
            creator_id,
            name,
            capacity: None,
        }
    }
}
