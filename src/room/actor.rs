use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::RoomConfig;
use super::models::LooproomModel;
use super::presence::{Participant, ParticipantRole, PresenceSet};
use crate::chat::buffer::ChatBuffer;
use crate::chat::models::{MessageKind, MessageModel};
use crate::chat::repository::MessageRepository;
use crate::moderation::index::ModerationIndex;
use crate::moderation::models::{ModerationActionModel, ModerationKind};
use crate::moderation::repository::ModerationRepository;
use crate::session::models::{SessionModel, SessionStatus};
use crate::session::repository::SessionRepository;
use crate::shared::AppError;
use crate::signaling::BroadcastState;
use crate::websockets::messages::ServerEvent;
use crate::websockets::ConnectionManager;

/// Everything a freshly joined participant needs to render the room
#[derive(Debug, Clone)]
pub struct JoinSnapshot {
    pub participants: Vec<Participant>,
    pub participant_count: usize,
    pub history: Vec<MessageModel>,
    pub session: Option<SessionModel>,
}

/// Mutable room state. Owned exclusively by the actor's mutex; no other
/// component may touch it directly.
struct RoomState {
    presence: PresenceSet,
    session: Option<SessionModel>,
    moderation: ModerationIndex,
    chat: ChatBuffer,
    broadcast: Option<BroadcastState>,
    empty_since: Option<DateTime<Utc>>,
    grace_timer: Option<JoinHandle<()>>,
}

/// One live room. All state-mutating operations lock the single state
/// mutex, mutate, snapshot their recipients, and emit before unlocking, so
/// every broadcast is consistent with the presence set at emission time
/// and moderation checks are atomic with the sends they gate. Rooms never
/// share a lock.
pub struct RoomActor {
    pub room_id: String,
    pub creator_id: String,
    capacity: usize,
    config: RoomConfig,
    connections: Arc<dyn ConnectionManager>,
    sessions: Arc<dyn SessionRepository + Send + Sync>,
    moderation_log: Arc<dyn ModerationRepository + Send + Sync>,
    messages: Arc<dyn MessageRepository + Send + Sync>,
    state: Mutex<RoomState>,
}

impl RoomActor {
    /// Builds an actor over a persisted room record. `history` seeds the
    /// live buffer; `active_actions` rebuilds the effective moderation
    /// index so eviction never grants ban amnesty.
    pub fn new(
        room: &LooproomModel,
        config: RoomConfig,
        connections: Arc<dyn ConnectionManager>,
        sessions: Arc<dyn SessionRepository + Send + Sync>,
        moderation_log: Arc<dyn ModerationRepository + Send + Sync>,
        messages: Arc<dyn MessageRepository + Send + Sync>,
        history: Vec<MessageModel>,
        active_actions: Vec<ModerationActionModel>,
    ) -> Self {
        let mut chat = ChatBuffer::new(config.buffer_size);
        for message in history {
            chat.push(message);
        }

        let mut moderation = ModerationIndex::new();
        moderation.seed(&active_actions);

        Self {
            room_id: room.id.clone(),
            creator_id: room.creator_id.clone(),
            capacity: room
                .capacity
                .map(|c| c as usize)
                .unwrap_or(config.capacity),
            config,
            connections,
            sessions,
            moderation_log,
            messages,
            state: Mutex::new(RoomState {
                presence: PresenceSet::new(),
                session: None,
                moderation,
                chat,
                broadcast: None,
                empty_since: Some(Utc::now()),
                grace_timer: None,
            }),
        }
    }

    // ---- presence ----------------------------------------------------

    pub async fn join(
        self: &Arc<Self>,
        user_id: &str,
        name: &str,
        mood: Option<String>,
        silent: bool,
    ) -> Result<JoinSnapshot, AppError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        if state.moderation.is_banned(user_id, now) {
            return Err(AppError::Banned);
        }
        if !state.presence.is_active(user_id) && state.presence.active_count() >= self.capacity {
            return Err(AppError::RoomFull);
        }

        // creator came back inside the grace window
        if user_id == self.creator_id {
            if let Some(timer) = state.grace_timer.take() {
                timer.abort();
            }
        }

        let role = if user_id == self.creator_id {
            ParticipantRole::CoHost
        } else {
            ParticipantRole::Participant
        };
        state.presence.join(user_id, name, role, mood, now);
        state.empty_since = None;

        let count = state.presence.active_count();
        if let Some(session) = state.session.as_mut() {
            if session.is_live() {
                session.observe_participants(count);
            }
        }

        let participants = state.presence.snapshot();
        let others = state.presence.active_ids_except(user_id);

        // silent joins skip the human-readable notice, not the list update
        if !silent {
            self.emit_to(
                &others,
                &ServerEvent::UserJoined {
                    user_id: user_id.to_string(),
                    name: name.to_string(),
                    participant_count: count,
                },
            )
            .await;
        }
        self.emit_to(
            &others,
            &ServerEvent::ParticipantsUpdated {
                participants: participants.clone(),
                participant_count: count,
            },
        )
        .await;

        info!(room_id = %self.room_id, user_id = %user_id, count, "Participant joined");

        Ok(JoinSnapshot {
            participants,
            participant_count: count,
            history: state.chat.snapshot(),
            session: state.session.clone(),
        })
    }

    /// Marks a participant gone. Disconnects funnel here too, so an absent
    /// user is a no-op rather than an error.
    pub async fn leave(self: &Arc<Self>, user_id: &str) {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        if !state.presence.leave(user_id, now) {
            return;
        }

        // drop this viewer's signaling route; others are untouched
        if let Some(broadcast) = state.broadcast.as_mut() {
            broadcast.remove_viewer(user_id);
        }

        let name = state
            .presence
            .get(user_id)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        let count = state.presence.active_count();
        let participants = state.presence.snapshot();
        let remaining = state.presence.active_ids();

        self.emit_to(
            &remaining,
            &ServerEvent::UserLeft {
                user_id: user_id.to_string(),
                name,
                participant_count: count,
            },
        )
        .await;
        self.emit_to(
            &remaining,
            &ServerEvent::ParticipantsUpdated {
                participants,
                participant_count: count,
            },
        )
        .await;

        let session_live = state
            .session
            .as_ref()
            .map(|s| s.is_live())
            .unwrap_or(false);
        if user_id == self.creator_id && session_live {
            debug!(room_id = %self.room_id, "Creator left during live session, starting grace timer");
            state.grace_timer = Some(self.spawn_grace_timer());
        }
        if count == 0 {
            state.empty_since = Some(now);
        }
    }

    pub async fn typing(&self, user_id: &str, is_typing: bool) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        if !state.presence.is_active(user_id) {
            return Err(AppError::NotConnected(user_id.to_string()));
        }
        state.presence.touch(user_id, Utc::now());

        let others = state.presence.active_ids_except(user_id);
        self.emit_to(
            &others,
            &ServerEvent::UserTyping {
                user_id: user_id.to_string(),
                is_typing,
            },
        )
        .await;
        Ok(())
    }

    // ---- chat --------------------------------------------------------

    pub async fn send_message(
        &self,
        user_id: &str,
        content: String,
        reply_to: Option<String>,
    ) -> Result<MessageModel, AppError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        let role = state
            .presence
            .role_of(user_id)
            .ok_or_else(|| AppError::NotConnected(user_id.to_string()))?;
        if state.moderation.is_banned(user_id, now) {
            return Err(AppError::Banned);
        }
        if state.moderation.is_muted(user_id, now) {
            return Err(AppError::Muted);
        }

        let privileged = user_id == self.creator_id || role.is_privileged();
        if !privileged {
            state
                .moderation
                .check_slow_mode(user_id, now)
                .map_err(|retry_in_secs| AppError::RateLimited { retry_in_secs })?;
            state.moderation.record_send(user_id, now);
        }

        let session_id = state
            .session
            .as_ref()
            .filter(|s| s.is_live())
            .map(|s| s.id.clone());
        let message = MessageModel::new(
            self.room_id.clone(),
            session_id,
            user_id.to_string(),
            content,
            MessageKind::Message,
            reply_to,
            now,
        );

        if let Some(session) = state.session.as_mut() {
            if session.is_live() {
                session.total_messages += 1;
            }
        }
        state.presence.record_interaction(user_id, now);
        state.chat.push(message.clone());
        self.spawn_message_write(message.clone());

        let targets = state.presence.active_ids();
        self.emit_to(
            &targets,
            &ServerEvent::NewMessage {
                message: message.clone(),
            },
        )
        .await;

        Ok(message)
    }

    /// Moderator-authorized broadcast that bypasses slow mode and mutes
    pub async fn announce(&self, user_id: &str, content: String) -> Result<MessageModel, AppError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        if !state.presence.is_active(user_id) {
            return Err(AppError::NotConnected(user_id.to_string()));
        }
        if !self.can_moderate(&state, user_id) {
            return Err(AppError::Forbidden(
                "Only moderators may send announcements".to_string(),
            ));
        }

        let session_id = state
            .session
            .as_ref()
            .filter(|s| s.is_live())
            .map(|s| s.id.clone());
        let message = MessageModel::new(
            self.room_id.clone(),
            session_id,
            user_id.to_string(),
            content,
            MessageKind::Announcement,
            None,
            now,
        );

        state.chat.push(message.clone());
        self.spawn_message_write(message.clone());

        let targets = state.presence.active_ids();
        self.emit_to(
            &targets,
            &ServerEvent::NewMessage {
                message: message.clone(),
            },
        )
        .await;

        Ok(message)
    }

    pub async fn react(
        &self,
        user_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), AppError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        if !state.presence.is_active(user_id) {
            return Err(AppError::NotConnected(user_id.to_string()));
        }

        let user_ids = state
            .chat
            .get_mut(message_id)
            .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?
            .toggle_reaction(emoji, user_id);
        state.presence.record_interaction(user_id, now);

        let targets = state.presence.active_ids();
        self.emit_to(
            &targets,
            &ServerEvent::MessageReactionUpdated {
                message_id: message_id.to_string(),
                emoji: emoji.to_string(),
                user_ids,
            },
        )
        .await;
        Ok(())
    }

    pub async fn delete_message(
        &self,
        requester_id: &str,
        message_id: &str,
    ) -> Result<(), AppError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        if !state.presence.is_active(requester_id) {
            return Err(AppError::NotConnected(requester_id.to_string()));
        }
        let author_id = state
            .chat
            .get(message_id)
            .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?
            .user_id
            .clone();
        let moderating = requester_id != author_id;
        if moderating && !self.can_moderate(&state, requester_id) {
            return Err(AppError::Forbidden(
                "Only the author or a moderator may delete a message".to_string(),
            ));
        }

        state.chat.delete(message_id);
        self.spawn_message_delete(message_id.to_string());
        if moderating {
            self.spawn_audit_write(ModerationActionModel::new(
                self.room_id.clone(),
                requester_id.to_string(),
                Some(author_id),
                ModerationKind::DeleteMessage,
                None,
                None,
                now,
            ));
        }

        let targets = state.presence.active_ids();
        self.emit_to(
            &targets,
            &ServerEvent::MessageDeleted {
                message_id: message_id.to_string(),
            },
        )
        .await;
        Ok(())
    }

    pub async fn pin_message(&self, requester_id: &str, message_id: &str) -> Result<(), AppError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        if !state.presence.is_active(requester_id) {
            return Err(AppError::NotConnected(requester_id.to_string()));
        }
        if !self.can_moderate(&state, requester_id) {
            return Err(AppError::Forbidden(
                "Only moderators may pin messages".to_string(),
            ));
        }
        if state.chat.get(message_id).is_none() {
            return Err(AppError::NotFound("Message not found".to_string()));
        }

        let unpinned = state.chat.pin(message_id);
        self.spawn_audit_write(ModerationActionModel::new(
            self.room_id.clone(),
            requester_id.to_string(),
            None,
            ModerationKind::PinMessage,
            None,
            None,
            now,
        ));

        let targets = state.presence.active_ids();
        self.emit_to(
            &targets,
            &ServerEvent::MessagePinned {
                message_id: message_id.to_string(),
                unpinned_message_id: unpinned,
            },
        )
        .await;
        Ok(())
    }

    // ---- moderation --------------------------------------------------

    pub async fn moderate(
        &self,
        moderator_id: &str,
        target_user_id: Option<String>,
        kind: ModerationKind,
        reason: Option<String>,
        duration_minutes: Option<i64>,
    ) -> Result<(), AppError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        if !state.presence.is_active(moderator_id) {
            return Err(AppError::NotConnected(moderator_id.to_string()));
        }
        if kind.requires_host() {
            if !self.is_host(&state, moderator_id) {
                return Err(AppError::Forbidden(
                    "Only the creator or a co-host may change roles".to_string(),
                ));
            }
        } else if !self.can_moderate(&state, moderator_id) {
            return Err(AppError::Forbidden(
                "Only moderators may issue moderation actions".to_string(),
            ));
        }

        if matches!(
            kind,
            ModerationKind::DeleteMessage | ModerationKind::PinMessage
        ) {
            return Err(AppError::Forbidden(
                "Message actions use their dedicated events".to_string(),
            ));
        }

        if kind.requires_target() && target_user_id.is_none() {
            return Err(AppError::Forbidden(
                "This action requires a target user".to_string(),
            ));
        }
        if target_user_id.as_deref() == Some(self.creator_id.as_str())
            && matches!(
                kind,
                ModerationKind::Mute
                    | ModerationKind::Kick
                    | ModerationKind::Ban
                    | ModerationKind::DemoteModerator
            )
        {
            return Err(AppError::Forbidden(
                "The room creator cannot be moderated".to_string(),
            ));
        }

        let action = ModerationActionModel::new(
            self.room_id.clone(),
            moderator_id.to_string(),
            target_user_id.clone(),
            kind,
            reason.clone(),
            duration_minutes,
            now,
        );
        state.moderation.apply(&action);
        self.spawn_audit_write(action.clone());

        info!(
            room_id = %self.room_id,
            moderator_id = %moderator_id,
            kind = %kind,
            target = ?target_user_id,
            "Moderation action applied"
        );

        match kind {
            ModerationKind::Kick | ModerationKind::Ban => {
                let target = target_user_id.ok_or_else(|| {
                    AppError::Forbidden("This action requires a target user".to_string())
                })?;
                let terminal = if kind == ModerationKind::Ban {
                    ServerEvent::BannedFromRoom {
                        room_id: self.room_id.clone(),
                        reason,
                        expires_at: action.expires_at,
                    }
                } else {
                    ServerEvent::KickedFromRoom {
                        room_id: self.room_id.clone(),
                        reason,
                    }
                };
                // terminal event first, then the connection drops
                self.emit_to_user(&target, &terminal).await;

                if state.presence.leave(&target, now) {
                    if let Some(broadcast) = state.broadcast.as_mut() {
                        broadcast.remove_viewer(&target);
                    }
                    let count = state.presence.active_count();
                    let participants = state.presence.snapshot();
                    let remaining = state.presence.active_ids();
                    self.emit_to(
                        &remaining,
                        &ServerEvent::UserModerated {
                            target_user_id: Some(target.clone()),
                            action: kind,
                            reason: action.reason.clone(),
                        },
                    )
                    .await;
                    self.emit_to(
                        &remaining,
                        &ServerEvent::ParticipantsUpdated {
                            participants,
                            participant_count: count,
                        },
                    )
                    .await;
                    if count == 0 {
                        state.empty_since = Some(now);
                    }
                }
                self.connections.remove_connection(&target).await;
            }
            ModerationKind::PromoteModerator | ModerationKind::DemoteModerator => {
                let target = target_user_id.ok_or_else(|| {
                    AppError::Forbidden("This action requires a target user".to_string())
                })?;
                let role = if kind == ModerationKind::PromoteModerator {
                    ParticipantRole::Moderator
                } else {
                    ParticipantRole::Participant
                };
                if !state.presence.set_role(&target, role) {
                    return Err(AppError::NotFound("Target not in room".to_string()));
                }
                let count = state.presence.active_count();
                let participants = state.presence.snapshot();
                let targets = state.presence.active_ids();
                self.emit_to(
                    &targets,
                    &ServerEvent::UserModerated {
                        target_user_id: Some(target),
                        action: kind,
                        reason,
                    },
                )
                .await;
                self.emit_to(
                    &targets,
                    &ServerEvent::ParticipantsUpdated {
                        participants,
                        participant_count: count,
                    },
                )
                .await;
            }
            ModerationKind::SlowMode => {
                // the generic duration field carries seconds here; 0 disables
                let seconds = duration_minutes.unwrap_or(0).max(0) as u32;
                state.moderation.set_slow_mode(seconds);
                let targets = state.presence.active_ids();
                self.emit_to(
                    &targets,
                    &ServerEvent::UserModerated {
                        target_user_id: None,
                        action: kind,
                        reason,
                    },
                )
                .await;
            }
            ModerationKind::UnpinMessage => {
                state.chat.unpin();
                let targets = state.presence.active_ids();
                self.emit_to(
                    &targets,
                    &ServerEvent::UserModerated {
                        target_user_id: None,
                        action: kind,
                        reason,
                    },
                )
                .await;
            }
            ModerationKind::ClearChat => {
                let cleared = state.chat.clear();
                debug!(room_id = %self.room_id, cleared, "Chat cleared");
                let targets = state.presence.active_ids();
                // one clear event, not N delete events
                self.emit_to(
                    &targets,
                    &ServerEvent::ChatCleared {
                        room_id: self.room_id.clone(),
                    },
                )
                .await;
            }
            _ => {
                // mute/unmute/ban-index-only/unban/warn: broadcast the record
                let targets = state.presence.active_ids();
                self.emit_to(
                    &targets,
                    &ServerEvent::UserModerated {
                        target_user_id,
                        action: kind,
                        reason,
                    },
                )
                .await;
            }
        }

        Ok(())
    }

    // ---- sessions ----------------------------------------------------

    pub async fn start_session(
        &self,
        user_id: &str,
        stream_url: Option<String>,
    ) -> Result<SessionModel, AppError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        self.require_host(&state, user_id)?;
        if state.session.as_ref().map(|s| s.is_live()).unwrap_or(false) {
            return Err(AppError::AlreadyActive);
        }

        let mut session = SessionModel::new(self.room_id.clone(), stream_url, now);
        session.observe_participants(state.presence.active_count());
        state.session = Some(session.clone());
        self.spawn_session_write(session.clone(), true);

        let targets = state.presence.active_ids();
        self.emit_to(
            &targets,
            &ServerEvent::SessionStarted {
                session: session.clone(),
            },
        )
        .await;

        info!(room_id = %self.room_id, session_id = %session.id, "Session started");
        Ok(session)
    }

    pub async fn pause_session(&self, user_id: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        self.require_host(&state, user_id)?;

        match state.session.as_mut() {
            Some(session) if session.status == SessionStatus::Active => {
                session.status = SessionStatus::Paused;
                self.spawn_session_write(session.clone(), false);
            }
            _ => return Err(AppError::NotActive),
        }

        let targets = state.presence.active_ids();
        self.emit_to(
            &targets,
            &ServerEvent::SessionPaused {
                room_id: self.room_id.clone(),
            },
        )
        .await;
        Ok(())
    }

    pub async fn resume_session(&self, user_id: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        self.require_host(&state, user_id)?;

        match state.session.as_mut() {
            Some(session) if session.status == SessionStatus::Paused => {
                session.status = SessionStatus::Active;
                self.spawn_session_write(session.clone(), false);
            }
            _ => return Err(AppError::NotActive),
        }

        let targets = state.presence.active_ids();
        self.emit_to(
            &targets,
            &ServerEvent::SessionResumed {
                room_id: self.room_id.clone(),
            },
        )
        .await;
        Ok(())
    }

    pub async fn end_session(&self, user_id: &str) -> Result<SessionModel, AppError> {
        let mut state = self.state.lock().await;
        self.require_host(&state, user_id)?;
        self.finalize_session(&mut state, Utc::now())
            .await
            .ok_or(AppError::NotActive)
    }

    pub async fn update_stream(&self, user_id: &str, stream_url: String) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        self.require_host(&state, user_id)?;

        match state.session.as_mut() {
            Some(session) if session.status == SessionStatus::Active => {
                session.stream_url = Some(stream_url.clone());
                self.spawn_session_write(session.clone(), false);
            }
            _ => return Err(AppError::NotActive),
        }

        let targets = state.presence.active_ids();
        self.emit_to(&targets, &ServerEvent::StreamUpdated { stream_url })
            .await;
        Ok(())
    }

    /// Grace-timer path: ends the live session if the creator is still
    /// gone when the timer fires.
    async fn auto_end_session(&self) {
        let mut state = self.state.lock().await;
        if state.presence.is_active(&self.creator_id) {
            return;
        }
        if self.finalize_session(&mut state, Utc::now()).await.is_some() {
            info!(room_id = %self.room_id, "Session auto-ended after creator grace period");
        }
        state.grace_timer = None;
    }

    /// Ends the live session, tears down any broadcast, persists and
    /// notifies. Returns None when no session is live.
    async fn finalize_session(
        &self,
        state: &mut RoomState,
        now: DateTime<Utc>,
    ) -> Option<SessionModel> {
        let session = state.session.as_mut().filter(|s| s.is_live())?;
        let duration_seconds = session.end(now);
        let finalized = session.clone();
        self.spawn_session_write(finalized.clone(), false);

        if let Some(broadcast) = state.broadcast.take() {
            let ended = ServerEvent::BroadcastEnded {
                room_id: self.room_id.clone(),
            };
            self.emit_to(&broadcast.viewer_ids(), &ended).await;
        }

        let targets = state.presence.active_ids();
        self.emit_to(
            &targets,
            &ServerEvent::SessionEnded {
                session: finalized.clone(),
                duration_seconds,
            },
        )
        .await;

        info!(
            room_id = %self.room_id,
            session_id = %finalized.id,
            duration_seconds,
            peak = finalized.peak_participants,
            "Session ended"
        );
        Some(finalized)
    }

    // ---- signaling ---------------------------------------------------

    pub async fn start_broadcast(
        &self,
        user_id: &str,
        media_descriptor: serde_json::Value,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().await;

        if user_id != self.creator_id {
            return Err(AppError::Forbidden(
                "Only the creator may broadcast".to_string(),
            ));
        }
        let session_active = state
            .session
            .as_ref()
            .map(|s| s.status == SessionStatus::Active)
            .unwrap_or(false);
        if !session_active {
            return Err(AppError::NotActive);
        }
        if state.broadcast.is_some() {
            return Err(AppError::AlreadyActive);
        }

        state.broadcast = Some(BroadcastState::new(
            user_id.to_string(),
            media_descriptor,
            Utc::now(),
        ));
        info!(room_id = %self.room_id, "Broadcast started");
        Ok(())
    }

    /// Discards all signaling routes. Chat and session state are separate
    /// concerns and stay untouched.
    pub async fn stop_broadcast(&self, user_id: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().await;

        if user_id != self.creator_id {
            return Err(AppError::Forbidden(
                "Only the creator may stop the broadcast".to_string(),
            ));
        }
        let broadcast = state.broadcast.take().ok_or(AppError::NotActive)?;

        self.emit_to(
            &broadcast.viewer_ids(),
            &ServerEvent::BroadcastEnded {
                room_id: self.room_id.clone(),
            },
        )
        .await;
        info!(room_id = %self.room_id, "Broadcast stopped");
        Ok(())
    }

    pub async fn request_stream(&self, viewer_id: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().await;

        let viewer_name = match state.presence.get(viewer_id) {
            Some(p) if p.is_active => p.name.clone(),
            _ => return Err(AppError::NotConnected(viewer_id.to_string())),
        };
        let broadcast = state
            .broadcast
            .as_mut()
            .ok_or_else(|| AppError::SignalingTargetUnavailable("no active broadcast".to_string()))?;
        broadcast.add_viewer(viewer_id);
        let broadcaster_id = broadcast.broadcaster_id.clone();

        self.emit_to_user(
            &broadcaster_id,
            &ServerEvent::ViewerJoinedStream {
                user_id: viewer_id.to_string(),
                name: viewer_name,
            },
        )
        .await;
        Ok(())
    }

    pub async fn relay_offer(
        &self,
        from_id: &str,
        target_user_id: &str,
        offer: serde_json::Value,
    ) -> Result<(), AppError> {
        let state = self.state.lock().await;
        let broadcast = state
            .broadcast
            .as_ref()
            .ok_or_else(|| AppError::SignalingTargetUnavailable("no active broadcast".to_string()))?;
        let to = broadcast.route_offer(from_id, target_user_id)?;

        self.emit_to_user(
            &to,
            &ServerEvent::WebrtcOffer {
                from_user_id: from_id.to_string(),
                offer,
            },
        )
        .await;
        Ok(())
    }

    pub async fn relay_answer(
        &self,
        from_id: &str,
        answer: serde_json::Value,
    ) -> Result<(), AppError> {
        let state = self.state.lock().await;
        let broadcast = state
            .broadcast
            .as_ref()
            .ok_or_else(|| AppError::SignalingTargetUnavailable("no active broadcast".to_string()))?;
        let to = broadcast.route_answer(from_id)?;

        self.emit_to_user(
            &to,
            &ServerEvent::WebrtcAnswer {
                from_user_id: from_id.to_string(),
                answer,
            },
        )
        .await;
        Ok(())
    }

    pub async fn relay_ice(
        &self,
        from_id: &str,
        to_id: Option<String>,
        candidate: serde_json::Value,
    ) -> Result<(), AppError> {
        let state = self.state.lock().await;
        let broadcast = state
            .broadcast
            .as_ref()
            .ok_or_else(|| AppError::SignalingTargetUnavailable("no active broadcast".to_string()))?;
        let to = broadcast.route_ice(from_id, to_id.as_deref())?;

        self.emit_to_user(
            &to,
            &ServerEvent::IceCandidate {
                from_user_id: from_id.to_string(),
                candidate,
            },
        )
        .await;
        Ok(())
    }

    // ---- maintenance -------------------------------------------------

    /// Optimization pass; lazy checks keep correctness without it
    pub async fn reap_expired(&self) -> usize {
        let mut state = self.state.lock().await;
        state.moderation.reap(Utc::now())
    }

    /// True when the room has sat empty past the idle window
    pub async fn is_evictable(&self, now: DateTime<Utc>) -> bool {
        let state = self.state.lock().await;
        match state.empty_since {
            Some(since) => {
                // signed compare: a `now` before `empty_since` must not
                // wrap into instant evictability
                state.presence.active_count() == 0
                    && (now - since).num_seconds() >= self.config.idle_window.as_secs() as i64
            }
            None => false,
        }
    }

    /// Cancels pending timers and ends any live session; called by the
    /// registry on eviction. Without the finalize, evicting a room whose
    /// creator-grace timer is still pending would strand a non-ended
    /// session row, and the rematerialized room could start a second one.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some(timer) = state.grace_timer.take() {
            timer.abort();
        }
        if self
            .finalize_session(&mut state, Utc::now())
            .await
            .is_some()
        {
            info!(room_id = %self.room_id, "Session ended on room eviction");
        }
    }

    pub async fn participant_count(&self) -> usize {
        self.state.lock().await.presence.active_count()
    }

    pub async fn session_status(&self) -> SessionStatus {
        let state = self.state.lock().await;
        state
            .session
            .as_ref()
            .map(|s| s.status)
            .filter(|s| *s != SessionStatus::Ended)
            .unwrap_or(SessionStatus::Idle)
    }

    pub async fn current_session(&self) -> Option<SessionModel> {
        self.state.lock().await.session.clone()
    }

    // ---- internals ---------------------------------------------------

    fn is_host(&self, state: &RoomState, user_id: &str) -> bool {
        user_id == self.creator_id
            || state.presence.role_of(user_id) == Some(ParticipantRole::CoHost)
    }

    fn require_host(&self, state: &RoomState, user_id: &str) -> Result<(), AppError> {
        if !state.presence.is_active(user_id) {
            return Err(AppError::NotConnected(user_id.to_string()));
        }
        if !self.is_host(state, user_id) {
            return Err(AppError::Forbidden(
                "Only the creator or a co-host may manage sessions".to_string(),
            ));
        }
        Ok(())
    }

    fn can_moderate(&self, state: &RoomState, user_id: &str) -> bool {
        user_id == self.creator_id
            || state
                .presence
                .role_of(user_id)
                .map(|role| role.is_privileged())
                .unwrap_or(false)
    }

    async fn emit_to(&self, targets: &[String], event: &ServerEvent) {
        if targets.is_empty() {
            return;
        }
        self.connections.send_to_users(targets, &event.to_json()).await;
    }

    async fn emit_to_user(&self, target: &str, event: &ServerEvent) {
        self.connections.send_to_user(target, &event.to_json()).await;
    }

    fn spawn_grace_timer(self: &Arc<Self>) -> JoinHandle<()> {
        let actor = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(actor.config.creator_grace).await;
            actor.auto_end_session().await;
        })
    }

    /// Session rows get bounded retries: finalization loss is the one
    /// persistence failure worth fighting for. In-memory state stays
    /// authoritative either way.
    fn spawn_session_write(&self, session: SessionModel, create: bool) {
        let repo = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            for attempt in 1u32..=3 {
                let result = if create {
                    repo.create_session(&session).await
                } else {
                    repo.update_session(&session).await
                };
                match result {
                    Ok(()) => return,
                    Err(e) => warn!(
                        session_id = %session.id,
                        attempt,
                        error = %e,
                        "Session write failed"
                    ),
                }
                tokio::time::sleep(std::time::Duration::from_millis(250 * attempt as u64)).await;
            }
            error!(session_id = %session.id, "Giving up on session write");
        });
    }

    fn spawn_message_write(&self, message: MessageModel) {
        let repo = Arc::clone(&self.messages);
        tokio::spawn(async move {
            if let Err(e) = repo.save_message(&message).await {
                warn!(message_id = %message.id, error = %e, "Message write failed");
            }
        });
    }

    fn spawn_message_delete(&self, message_id: String) {
        let repo = Arc::clone(&self.messages);
        tokio::spawn(async move {
            if let Err(e) = repo.mark_deleted(&message_id).await {
                warn!(message_id = %message_id, error = %e, "Message delete failed");
            }
        });
    }

    fn spawn_audit_write(&self, action: ModerationActionModel) {
        let repo = Arc::clone(&self.moderation_log);
        tokio::spawn(async move {
            if let Err(e) = repo.record_action(&action).await {
                warn!(action_id = %action.id, error = %e, "Moderation audit write failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::repository::InMemoryMessageRepository;
    use crate::moderation::repository::InMemoryModerationRepository;
    use crate::session::repository::InMemorySessionRepository;
    use crate::websockets::InMemoryConnectionManager;
    use std::time::Duration;

    fn test_actor(config: RoomConfig) -> Arc<RoomActor> {
        let room = LooproomModel {
            id: "calm-corner".to_string(),
            creator_id: "alice".to_string(),
            name: "Calm Corner".to_string(),
            capacity: None,
        };
        Arc::new(RoomActor::new(
            &room,
            config,
            Arc::new(InMemoryConnectionManager::new()),
            Arc::new(InMemorySessionRepository::new()),
            Arc::new(InMemoryModerationRepository::new()),
            Arc::new(InMemoryMessageRepository::new()),
            Vec::new(),
            Vec::new(),
        ))
    }

    #[tokio::test]
    async fn test_join_snapshot_reflects_room_state() {
        let actor = test_actor(RoomConfig::default());

        actor.join("alice", "alice", None, false).await.unwrap();
        actor
            .send_message("alice", "hello".to_string(), None)
            .await
            .unwrap();

        let snapshot = actor.join("bob", "bob", None, false).await.unwrap();
        assert_eq!(snapshot.participant_count, 2);
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.history[0].content, "hello");
        assert!(snapshot.session.is_none());
    }

    #[tokio::test]
    async fn test_creator_disconnect_auto_ends_session_after_grace() {
        let config = RoomConfig {
            creator_grace: Duration::from_millis(20),
            ..RoomConfig::default()
        };
        let actor = test_actor(config);

        actor.join("alice", "alice", None, false).await.unwrap();
        actor.join("bob", "bob", None, false).await.unwrap();
        actor.start_session("alice", None).await.unwrap();

        actor.leave("alice").await;
        assert_eq!(actor.session_status().await, SessionStatus::Active);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(actor.session_status().await, SessionStatus::Idle);

        let session = actor.current_session().await.unwrap();
        assert_eq!(session.status, SessionStatus::Ended);
        assert!(session.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_creator_rejoin_cancels_grace_timer() {
        let config = RoomConfig {
            creator_grace: Duration::from_millis(20),
            ..RoomConfig::default()
        };
        let actor = test_actor(config);

        actor.join("alice", "alice", None, false).await.unwrap();
        actor.join("bob", "bob", None, false).await.unwrap();
        actor.start_session("alice", None).await.unwrap();

        actor.leave("alice").await;
        actor.join("alice", "alice", None, false).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(actor.session_status().await, SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_session_tracks_peak_and_message_totals() {
        let actor = test_actor(RoomConfig::default());

        actor.join("alice", "alice", None, false).await.unwrap();
        actor.start_session("alice", None).await.unwrap();

        actor.join("bob", "bob", None, false).await.unwrap();
        actor.join("carol", "carol", None, false).await.unwrap();
        actor.leave("carol").await;

        actor
            .send_message("bob", "one".to_string(), None)
            .await
            .unwrap();
        actor
            .send_message("bob", "two".to_string(), None)
            .await
            .unwrap();

        let session = actor.end_session("alice").await.unwrap();
        // high-water mark, not the count at the end
        assert_eq!(session.peak_participants, 3);
        assert_eq!(session.total_messages, 2);
    }

    #[tokio::test]
    async fn test_empty_room_becomes_evictable_after_idle_window() {
        let config = RoomConfig {
            idle_window: Duration::from_secs(0),
            ..RoomConfig::default()
        };
        let actor = test_actor(config);

        // fresh and never occupied counts as empty
        assert!(actor.is_evictable(Utc::now()).await);

        actor.join("alice", "alice", None, false).await.unwrap();
        assert!(!actor.is_evictable(Utc::now()).await);

        actor.leave("alice").await;
        assert!(actor.is_evictable(Utc::now()).await);
    }

    #[tokio::test]
    async fn test_backwards_clock_is_not_evictable() {
        let config = RoomConfig {
            idle_window: Duration::from_secs(60),
            ..RoomConfig::default()
        };
        let actor = test_actor(config);

        actor.join("alice", "alice", None, false).await.unwrap();
        actor.leave("alice").await;

        // a skewed now earlier than empty_since must not evict
        let skewed = Utc::now() - chrono::Duration::seconds(30);
        assert!(!actor.is_evictable(skewed).await);
    }
}
