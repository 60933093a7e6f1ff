use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

/// Every moderation decision a room can record
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModerationKind {
    Mute,
    Unmute,
    Kick,
    Ban,
    Unban,
    DeleteMessage,
    PinMessage,
    UnpinMessage,
    Warn,
    PromoteModerator,
    DemoteModerator,
    SlowMode,
    ClearChat,
}

impl ModerationKind {
    /// Actions that must name a target user
    pub fn requires_target(&self) -> bool {
        !matches!(
            self,
            ModerationKind::SlowMode | ModerationKind::ClearChat | ModerationKind::UnpinMessage
        )
    }

    /// Promotions and demotions are reserved for the creator and co-hosts
    pub fn requires_host(&self) -> bool {
        matches!(
            self,
            ModerationKind::PromoteModerator | ModerationKind::DemoteModerator
        )
    }

    /// Time-bound actions carry an optional duration; absence = indefinite
    pub fn is_time_bound(&self) -> bool {
        matches!(self, ModerationKind::Mute | ModerationKind::Ban)
    }
}

/// Audit + enforcement record. Rows are durably persisted for history; the
/// currently-effective state lives in the per-room `ModerationIndex`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationActionModel {
    pub id: String,
    pub room_id: String,
    pub moderator_id: String,
    pub target_user_id: Option<String>,
    pub kind: ModerationKind,
    pub reason: Option<String>,
    pub duration_minutes: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ModerationActionModel {
    pub fn new(
        room_id: String,
        moderator_id: String,
        target_user_id: Option<String>,
        kind: ModerationKind,
        reason: Option<String>,
        duration_minutes: Option<i64>,
        now: DateTime<Utc>,
    ) -> Self {
        let expires_at = if kind.is_time_bound() {
            duration_minutes.map(|m| now + Duration::minutes(m))
        } else {
            None
        };

        Self {
            id: Uuid::new_v4().to_string(),
            room_id,
            moderator_id,
            target_user_id,
            kind,
            reason,
            duration_minutes,
            expires_at,
            created_at: now,
        }
    }
}
