use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::models::MessageModel;
use crate::moderation::models::ModerationKind;
use crate::room::presence::Participant;
use crate::session::models::SessionModel;
use crate::shared::AppError;

/// Client-to-server events. One tagged variant per operation; unknown tags
/// fail deserialization and are answered with an inline `error` event
/// rather than being silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinLooproom {
        room_id: String,
        #[serde(default)]
        mood: Option<String>,
        #[serde(default)]
        silent: bool,
    },
    #[serde(rename_all = "camelCase")]
    LeaveLooproom { room_id: String },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        room_id: String,
        content: String,
        #[serde(default)]
        reply_to: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Typing { room_id: String, is_typing: bool },
    #[serde(rename_all = "camelCase")]
    ReactToMessage { message_id: String, emoji: String },
    #[serde(rename_all = "camelCase")]
    StartSession {
        room_id: String,
        #[serde(default)]
        stream_url: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    EndSession { room_id: String },
    #[serde(rename_all = "camelCase")]
    PauseSession { room_id: String },
    #[serde(rename_all = "camelCase")]
    ResumeSession { room_id: String },
    #[serde(rename_all = "camelCase")]
    UpdateStream { room_id: String, stream_url: String },
    #[serde(rename_all = "camelCase")]
    ModerateUser {
        room_id: String,
        #[serde(default)]
        target_user_id: Option<String>,
        action: ModerationKind,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        duration_minutes: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    DeleteMessage { message_id: String, room_id: String },
    #[serde(rename_all = "camelCase")]
    PinMessage { message_id: String, room_id: String },
    #[serde(rename_all = "camelCase")]
    SendAnnouncement { room_id: String, content: String },
    #[serde(rename_all = "camelCase")]
    StartBroadcast {
        room_id: String,
        media_descriptor: Value,
    },
    #[serde(rename_all = "camelCase")]
    StopBroadcast { room_id: String },
    #[serde(rename_all = "camelCase")]
    RequestStream { room_id: String },
    #[serde(rename_all = "camelCase")]
    WebrtcOffer {
        room_id: String,
        target_user_id: String,
        offer: Value,
    },
    #[serde(rename_all = "camelCase")]
    WebrtcAnswer { room_id: String, answer: Value },
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        room_id: String,
        candidate: Value,
        #[serde(default)]
        user_id: Option<String>,
    },
}

impl ClientEvent {
    /// Room the event addresses; reactions are routed through the
    /// connection's bound room.
    pub fn room_id(&self) -> Option<&str> {
        match self {
            ClientEvent::JoinLooproom { room_id, .. }
            | ClientEvent::LeaveLooproom { room_id }
            | ClientEvent::SendMessage { room_id, .. }
            | ClientEvent::Typing { room_id, .. }
            | ClientEvent::StartSession { room_id, .. }
            | ClientEvent::EndSession { room_id }
            | ClientEvent::PauseSession { room_id }
            | ClientEvent::ResumeSession { room_id }
            | ClientEvent::UpdateStream { room_id, .. }
            | ClientEvent::ModerateUser { room_id, .. }
            | ClientEvent::DeleteMessage { room_id, .. }
            | ClientEvent::PinMessage { room_id, .. }
            | ClientEvent::SendAnnouncement { room_id, .. }
            | ClientEvent::StartBroadcast { room_id, .. }
            | ClientEvent::StopBroadcast { room_id }
            | ClientEvent::RequestStream { room_id }
            | ClientEvent::WebrtcOffer { room_id, .. }
            | ClientEvent::WebrtcAnswer { room_id, .. }
            | ClientEvent::IceCandidate { room_id, .. } => Some(room_id),
            ClientEvent::ReactToMessage { .. } => None,
        }
    }
}

/// Server-pushed events. Errors are delivered only to the originating
/// connection, never broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    NewMessage { message: MessageModel },
    #[serde(rename_all = "camelCase")]
    UserJoined {
        user_id: String,
        name: String,
        participant_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    UserLeft {
        user_id: String,
        name: String,
        participant_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    ParticipantsUpdated {
        participants: Vec<Participant>,
        participant_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    UserTyping { user_id: String, is_typing: bool },
    #[serde(rename_all = "camelCase")]
    MessageDeleted { message_id: String },
    #[serde(rename_all = "camelCase")]
    MessagePinned {
        message_id: String,
        unpinned_message_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    MessageReactionUpdated {
        message_id: String,
        emoji: String,
        user_ids: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    MessageHistory { messages: Vec<MessageModel> },
    #[serde(rename_all = "camelCase")]
    ChatCleared { room_id: String },
    #[serde(rename_all = "camelCase")]
    SessionStarted { session: SessionModel },
    #[serde(rename_all = "camelCase")]
    SessionPaused { room_id: String },
    #[serde(rename_all = "camelCase")]
    SessionResumed { room_id: String },
    #[serde(rename_all = "camelCase")]
    SessionEnded {
        session: SessionModel,
        duration_seconds: i64,
    },
    #[serde(rename_all = "camelCase")]
    StreamUpdated { stream_url: String },
    #[serde(rename_all = "camelCase")]
    UserModerated {
        target_user_id: Option<String>,
        action: ModerationKind,
        reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    KickedFromRoom {
        room_id: String,
        reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    BannedFromRoom {
        room_id: String,
        reason: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    },
    #[serde(rename_all = "camelCase")]
    ViewerJoinedStream { user_id: String, name: String },
    #[serde(rename_all = "camelCase")]
    WebrtcOffer { from_user_id: String, offer: Value },
    #[serde(rename_all = "camelCase")]
    WebrtcAnswer { from_user_id: String, answer: Value },
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        from_user_id: String,
        candidate: Value,
    },
    #[serde(rename_all = "camelCase")]
    BroadcastEnded { room_id: String },
    #[serde(rename_all = "camelCase")]
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn error(err: &AppError) -> Self {
        ServerEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    /// Wire form. Serialization of these enums cannot fail; the fallback
    /// keeps the send path infallible anyway.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            "{\"event\":\"error\",\"code\":\"internal\",\"message\":\"serialization failed\"}"
                .to_string()
        })
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            ServerEvent::NewMessage { .. } => "new-message",
            ServerEvent::UserJoined { .. } => "user-joined",
            ServerEvent::UserLeft { .. } => "user-left",
            ServerEvent::ParticipantsUpdated { .. } => "participants-updated",
            ServerEvent::UserTyping { .. } => "user-typing",
            ServerEvent::MessageDeleted { .. } => "message-deleted",
            ServerEvent::MessagePinned { .. } => "message-pinned",
            ServerEvent::MessageReactionUpdated { .. } => "message-reaction-updated",
            ServerEvent::MessageHistory { .. } => "message-history",
            ServerEvent::ChatCleared { .. } => "chat-cleared",
            ServerEvent::SessionStarted { .. } => "session-started",
            ServerEvent::SessionPaused { .. } => "session-paused",
            ServerEvent::SessionResumed { .. } => "session-resumed",
            ServerEvent::SessionEnded { .. } => "session-ended",
            ServerEvent::StreamUpdated { .. } => "stream-updated",
            ServerEvent::UserModerated { .. } => "user-moderated",
            ServerEvent::KickedFromRoom { .. } => "kicked-from-room",
            ServerEvent::BannedFromRoom { .. } => "banned-from-room",
            ServerEvent::ViewerJoinedStream { .. } => "viewer-joined-stream",
            ServerEvent::WebrtcOffer { .. } => "webrtc-offer",
            ServerEvent::WebrtcAnswer { .. } => "webrtc-answer",
            ServerEvent::IceCandidate { .. } => "ice-candidate",
            ServerEvent::BroadcastEnded { .. } => "broadcast-ended",
            ServerEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_event_tags_are_kebab_case() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "join-looproom",
            "roomId": "calm-corner",
            "mood": "grateful"
        }))
        .unwrap();

        assert_eq!(
            event,
            ClientEvent::JoinLooproom {
                room_id: "calm-corner".to_string(),
                mood: Some("grateful".to_string()),
                silent: false,
            }
        );
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let result: Result<ClientEvent, _> = serde_json::from_value(json!({
            "event": "launch-rocket",
            "roomId": "r1"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_moderate_user_parses_action() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "moderate-user",
            "roomId": "r1",
            "targetUserId": "u2",
            "action": "mute",
            "durationMinutes": 5
        }))
        .unwrap();

        match event {
            ClientEvent::ModerateUser {
                action,
                duration_minutes,
                ..
            } => {
                assert_eq!(action, ModerationKind::Mute);
                assert_eq!(duration_minutes, Some(5));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_react_has_no_room_id() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "react-to-message",
            "messageId": "m1",
            "emoji": "🔥"
        }))
        .unwrap();
        assert_eq!(event.room_id(), None);
    }

    #[test]
    fn test_server_event_wire_shape() {
        let event = ServerEvent::UserJoined {
            user_id: "u1".to_string(),
            name: "alice".to_string(),
            participant_count: 3,
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();

        assert_eq!(value["event"], "user-joined");
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["participantCount"], 3);
    }

    #[test]
    fn test_error_event_carries_code() {
        let event = ServerEvent::error(&AppError::RateLimited { retry_in_secs: 7 });
        let value: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();

        assert_eq!(value["event"], "error");
        assert_eq!(value["code"], "rate_limited");
    }

    #[test]
    fn test_event_name_matches_serialized_tag() {
        let event = ServerEvent::BroadcastEnded {
            room_id: "r1".to_string(),
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(value["event"], event.event_name());
    }
}
