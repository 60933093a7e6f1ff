use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle of a live session. `Idle` is the room phase before any session
/// row exists; persisted rows are only ever active, paused or ended.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Active,
    Paused,
    Ended,
}

/// One bounded live occurrence of a looproom. Invariant: at most one
/// non-ended session per room at any time, enforced by the room actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionModel {
    pub id: String,
    pub room_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub peak_participants: i32,
    pub total_messages: i64,
    pub stream_url: Option<String>,
    pub recording_url: Option<String>,
}

impl SessionModel {
    pub fn new(room_id: String, stream_url: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            room_id,
            status: SessionStatus::Active,
            started_at: now,
            ended_at: None,
            peak_participants: 0,
            total_messages: 0,
            stream_url,
            recording_url: None,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self.status, SessionStatus::Active | SessionStatus::Paused)
    }

    /// Raises the participant high-water mark
    pub fn observe_participants(&mut self, count: usize) {
        self.peak_participants = self.peak_participants.max(count as i32);
    }

    /// Finalizes the session and returns its duration in seconds
    pub fn end(&mut self, now: DateTime<Utc>) -> i64 {
        self.status = SessionStatus::Ended;
        self.ended_at = Some(now);
        (now - self.started_at).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_session_is_active() {
        let session = SessionModel::new("r1".to_string(), None, Utc::now());
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.is_live());
        assert!(session.ended_at.is_none());
    }

    #[test]
    fn test_end_computes_duration() {
        let started = Utc::now();
        let mut session = SessionModel::new("r1".to_string(), None, started);

        let duration = session.end(started + Duration::seconds(90));
        assert_eq!(duration, 90);
        assert_eq!(session.status, SessionStatus::Ended);
        assert!(!session.is_live());
        assert!(session.ended_at.is_some());
    }

    #[test]
    fn test_peak_participants_high_water_mark() {
        let mut session = SessionModel::new("r1".to_string(), None, Utc::now());
        session.observe_participants(3);
        session.observe_participants(7);
        session.observe_participants(2);
        assert_eq!(session.peak_participants, 7);
    }

    #[test]
    fn test_status_round_trips_as_lowercase() {
        let json = serde_json::to_string(&SessionStatus::Paused).unwrap();
        assert_eq!(json, "\"paused\"");
        assert_eq!(SessionStatus::Paused.to_string(), "paused");
        assert_eq!("ended".parse::<SessionStatus>().unwrap(), SessionStatus::Ended);
    }
}
