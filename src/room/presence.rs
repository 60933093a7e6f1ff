use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::{Display, EnumString};

/// Role a participant holds inside one room. The creator is identified by
/// the room record, not by a role; they join as a co-host.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ParticipantRole {
    Participant,
    Moderator,
    CoHost,
}

impl ParticipantRole {
    /// Moderators and co-hosts bypass slow mode and may moderate others
    pub fn is_privileged(&self) -> bool {
        matches!(self, ParticipantRole::Moderator | ParticipantRole::CoHost)
    }
}

/// One presence entry. Unique per (room, user) while active; a re-join
/// replaces the prior entry rather than duplicating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: String,
    pub name: String,
    pub role: ParticipantRole,
    pub mood: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub interaction_count: u64,
}

/// The set of participants a room has seen. Inactive entries are kept so a
/// leave can be reported with the name that joined.
#[derive(Debug, Default)]
pub struct PresenceSet {
    entries: HashMap<String, Participant>,
}

impl PresenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or refreshes a participant. A moderator promotion survives
    /// re-join; other roles are taken from the caller.
    pub fn join(
        &mut self,
        user_id: &str,
        name: &str,
        role: ParticipantRole,
        mood: Option<String>,
        now: DateTime<Utc>,
    ) {
        let role = match self.entries.get(user_id) {
            Some(prior) if prior.role == ParticipantRole::Moderator => prior.role,
            _ => role,
        };

        self.entries.insert(
            user_id.to_string(),
            Participant {
                user_id: user_id.to_string(),
                name: name.to_string(),
                role,
                mood,
                joined_at: now,
                last_seen_at: now,
                left_at: None,
                is_active: true,
                interaction_count: 0,
            },
        );
    }

    /// Marks a participant inactive. Returns false if the user was not
    /// actively present.
    pub fn leave(&mut self, user_id: &str, now: DateTime<Utc>) -> bool {
        match self.entries.get_mut(user_id) {
            Some(p) if p.is_active => {
                p.is_active = false;
                p.left_at = Some(now);
                p.last_seen_at = now;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, user_id: &str) -> Option<&Participant> {
        self.entries.get(user_id)
    }

    pub fn is_active(&self, user_id: &str) -> bool {
        self.entries.get(user_id).map(|p| p.is_active).unwrap_or(false)
    }

    pub fn role_of(&self, user_id: &str) -> Option<ParticipantRole> {
        self.entries.get(user_id).filter(|p| p.is_active).map(|p| p.role)
    }

    pub fn set_role(&mut self, user_id: &str, role: ParticipantRole) -> bool {
        match self.entries.get_mut(user_id) {
            Some(p) if p.is_active => {
                p.role = role;
                true
            }
            _ => false,
        }
    }

    pub fn touch(&mut self, user_id: &str, now: DateTime<Utc>) {
        if let Some(p) = self.entries.get_mut(user_id) {
            p.last_seen_at = now;
        }
    }

    pub fn record_interaction(&mut self, user_id: &str, now: DateTime<Utc>) {
        if let Some(p) = self.entries.get_mut(user_id) {
            p.interaction_count += 1;
            p.last_seen_at = now;
        }
    }

    pub fn active_count(&self) -> usize {
        self.entries.values().filter(|p| p.is_active).count()
    }

    /// User ids of everyone currently active, for broadcast recipient lists
    pub fn active_ids(&self) -> Vec<String> {
        self.entries
            .values()
            .filter(|p| p.is_active)
            .map(|p| p.user_id.clone())
            .collect()
    }

    pub fn active_ids_except(&self, user_id: &str) -> Vec<String> {
        self.entries
            .values()
            .filter(|p| p.is_active && p.user_id != user_id)
            .map(|p| p.user_id.clone())
            .collect()
    }

    /// Active participants ordered by join time, for participant lists
    pub fn snapshot(&self) -> Vec<Participant> {
        let mut active: Vec<Participant> = self
            .entries
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        active.sort_by_key(|p| p.joined_at);
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_join_and_count() {
        let mut set = PresenceSet::new();
        set.join("u1", "alice", ParticipantRole::Participant, None, now());
        set.join("u2", "bob", ParticipantRole::Participant, None, now());

        assert_eq!(set.active_count(), 2);
        assert!(set.is_active("u1"));
    }

    #[test]
    fn test_rejoin_replaces_entry() {
        let mut set = PresenceSet::new();
        set.join("u1", "alice", ParticipantRole::Participant, None, now());
        set.join("u1", "alice", ParticipantRole::Participant, None, now());

        assert_eq!(set.active_count(), 1);
        assert_eq!(set.snapshot().len(), 1);
    }

    #[test]
    fn test_rejoin_preserves_moderator_promotion() {
        let mut set = PresenceSet::new();
        set.join("u1", "alice", ParticipantRole::Participant, None, now());
        set.set_role("u1", ParticipantRole::Moderator);

        set.leave("u1", now());
        set.join("u1", "alice", ParticipantRole::Participant, None, now());

        assert_eq!(set.role_of("u1"), Some(ParticipantRole::Moderator));
    }

    #[test]
    fn test_leave_marks_inactive() {
        let mut set = PresenceSet::new();
        set.join("u1", "alice", ParticipantRole::Participant, None, now());

        assert!(set.leave("u1", now()));
        assert_eq!(set.active_count(), 0);
        assert!(!set.is_active("u1"));
        assert!(set.get("u1").unwrap().left_at.is_some());

        // A second leave for the same user is a no-op
        assert!(!set.leave("u1", now()));
    }

    #[test]
    fn test_role_of_ignores_inactive() {
        let mut set = PresenceSet::new();
        set.join("u1", "alice", ParticipantRole::CoHost, None, now());
        set.leave("u1", now());
        assert_eq!(set.role_of("u1"), None);
    }

    #[test]
    fn test_active_ids_except() {
        let mut set = PresenceSet::new();
        set.join("u1", "alice", ParticipantRole::Participant, None, now());
        set.join("u2", "bob", ParticipantRole::Participant, None, now());
        set.join("u3", "carol", ParticipantRole::Participant, None, now());
        set.leave("u3", now());

        let mut others = set.active_ids_except("u1");
        others.sort();
        assert_eq!(others, vec!["u2".to_string()]);
    }

    #[test]
    fn test_interaction_count() {
        let mut set = PresenceSet::new();
        set.join("u1", "alice", ParticipantRole::Participant, None, now());
        set.record_interaction("u1", now());
        set.record_interaction("u1", now());
        assert_eq!(set.get("u1").unwrap().interaction_count, 2);
    }
}
