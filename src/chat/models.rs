use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::{Display, EnumString};
use uuid::Uuid;

/// Marker left in place of deleted message content
pub const TOMBSTONE: &str = "[deleted]";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageKind {
    Message,
    System,
    Ai,
    Announcement,
}

/// One chat message. Soft-deleted messages keep their id and stay in the
/// live buffer as tombstones so `reply_to` references remain resolvable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageModel {
    pub id: String,
    pub room_id: String,
    pub session_id: Option<String>,
    pub user_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub is_deleted: bool,
    pub is_pinned: bool,
    /// emoji -> user ids, set semantics maintained by the toggle op
    pub reactions: HashMap<String, Vec<String>>,
    pub reply_to: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MessageModel {
    pub fn new(
        room_id: String,
        session_id: Option<String>,
        user_id: String,
        content: String,
        kind: MessageKind,
        reply_to: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            room_id,
            session_id,
            user_id,
            content,
            kind,
            is_deleted: false,
            is_pinned: false,
            reactions: HashMap::new(),
            reply_to,
            created_at: now,
        }
    }

    /// Replaces content with the tombstone marker, in place
    pub fn tombstone(&mut self) {
        self.is_deleted = true;
        self.content = TOMBSTONE.to_string();
    }

    /// Toggles `user_id`'s membership in `reactions[emoji]`; returns the
    /// resulting user set for that emoji
    pub fn toggle_reaction(&mut self, emoji: &str, user_id: &str) -> Vec<String> {
        let users = self.reactions.entry(emoji.to_string()).or_default();
        if let Some(pos) = users.iter().position(|u| u == user_id) {
            users.remove(pos);
        } else {
            users.push(user_id.to_string());
        }
        let result = users.clone();
        if result.is_empty() {
            self.reactions.remove(emoji);
        }
        result
    }
}
