use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::actor::RoomActor;
use super::config::RoomConfig;
use crate::chat::repository::MessageRepository;
use crate::moderation::repository::ModerationRepository;
use crate::room::repository::LooproomRepository;
use crate::session::repository::SessionRepository;
use crate::shared::AppError;
use crate::websockets::ConnectionManager;

/// Owns every live room actor. Rooms are materialized on first join and
/// evicted by the sweep task after sitting empty past the idle window;
/// room records, message history and standing moderation all survive in
/// the repositories, so eviction only discards ephemeral state.
pub struct RoomRegistry {
    config: RoomConfig,
    rooms: RwLock<HashMap<String, Arc<RoomActor>>>,
    looprooms: Arc<dyn LooproomRepository + Send + Sync>,
    sessions: Arc<dyn SessionRepository + Send + Sync>,
    moderation: Arc<dyn ModerationRepository + Send + Sync>,
    messages: Arc<dyn MessageRepository + Send + Sync>,
    connections: Arc<dyn ConnectionManager>,
}

impl RoomRegistry {
    pub fn new(
        config: RoomConfig,
        looprooms: Arc<dyn LooproomRepository + Send + Sync>,
        sessions: Arc<dyn SessionRepository + Send + Sync>,
        moderation: Arc<dyn ModerationRepository + Send + Sync>,
        messages: Arc<dyn MessageRepository + Send + Sync>,
        connections: Arc<dyn ConnectionManager>,
    ) -> Self {
        Self {
            config,
            rooms: RwLock::new(HashMap::new()),
            looprooms,
            sessions,
            moderation,
            messages,
            connections,
        }
    }

    pub async fn get(&self, room_id: &str) -> Option<Arc<RoomActor>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Returns the live actor for a room, materializing it from the
    /// repositories if needed. Joining a room that has no persisted record
    /// is an error; rooms are not created implicitly.
    pub async fn get_or_create(&self, room_id: &str) -> Result<Arc<RoomActor>, AppError> {
        if let Some(actor) = self.rooms.read().await.get(room_id) {
            return Ok(actor.clone());
        }

        let room = self
            .looprooms
            .get_room(room_id)
            .await?
            .ok_or_else(|| AppError::RoomNotFound(room_id.to_string()))?;

        // history hydration is best-effort; an empty buffer is acceptable
        let history = match self
            .messages
            .fetch_recent(room_id, self.config.history_limit)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!(room_id = %room_id, error = %e, "Failed to hydrate message history");
                Vec::new()
            }
        };

        // standing bans and mutes must be rebuilt; failing open would let
        // an eviction grant ban amnesty
        let active_actions = self.moderation.fetch_active(room_id, Utc::now()).await?;

        let actor = Arc::new(RoomActor::new(
            &room,
            self.config.clone(),
            self.connections.clone(),
            self.sessions.clone(),
            self.moderation.clone(),
            self.messages.clone(),
            history,
            active_actions,
        ));

        let mut rooms = self.rooms.write().await;
        // two concurrent first-joins both hydrate; the first insert wins
        let actor = rooms.entry(room_id.to_string()).or_insert(actor).clone();
        info!(room_id = %room_id, live_rooms = rooms.len(), "Room materialized");
        Ok(actor)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Immediate eviction of a room with no active participants, without
    /// waiting for the idle window. True if the room was removed.
    pub async fn release_if_empty(&self, room_id: &str) -> bool {
        let actor = match self.get(room_id).await {
            Some(actor) => actor,
            None => return false,
        };
        if actor.participant_count().await > 0 {
            return false;
        }
        {
            let mut rooms = self.rooms.write().await;
            // a join may have raced the check; verify before removing
            if actor.participant_count().await > 0 {
                return false;
            }
            rooms.remove(room_id);
        }
        // shutdown only after the actor is unreachable, so a raced join
        // cannot land in a room whose session was just finalized
        actor.shutdown().await;
        info!(room_id = %room_id, "Released empty room");
        true
    }

    /// One maintenance pass: evicts rooms idle-empty past the window and
    /// reaps expired moderation entries in the survivors. Returns how many
    /// rooms were evicted.
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let candidates: Vec<(String, Arc<RoomActor>)> = {
            let rooms = self.rooms.read().await;
            rooms
                .iter()
                .map(|(id, actor)| (id.clone(), actor.clone()))
                .collect()
        };

        let mut evicted = 0;
        for (room_id, actor) in candidates {
            if actor.is_evictable(now).await {
                let removed = {
                    let mut rooms = self.rooms.write().await;
                    // a join may have raced the check; verify before removing
                    if actor.is_evictable(now).await {
                        rooms.remove(&room_id).is_some()
                    } else {
                        false
                    }
                };
                if removed {
                    actor.shutdown().await;
                    evicted += 1;
                    info!(room_id = %room_id, "Evicted idle room");
                }
            } else {
                let reaped = actor.reap_expired().await;
                if reaped > 0 {
                    debug!(room_id = %room_id, reaped, "Reaped expired moderation entries");
                }
            }
        }
        evicted
    }

    /// Spawns the periodic sweep loop. Runs for the life of the process.
    pub fn start_sweep_task(self: Arc<Self>) -> JoinHandle<()> {
        let interval = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let evicted = self.sweep().await;
                if evicted > 0 {
                    let live_rooms = self.room_count().await;
                    debug!(evicted, live_rooms, "Sweep complete");
                }
            }
        })
    }
}
