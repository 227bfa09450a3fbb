//! Per-hub set of identities currently present on a file.
//!
//! An identity stays present while at least one of its sessions is attached,
//! so two tabs of the same user produce one join and one leave.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use super::hub::SessionId;
use crate::models::{CursorPosition, Participant};

#[derive(Debug)]
struct PresenceEntry {
    joined_at: DateTime<Utc>,
    cursor: Option<CursorPosition>,
    sessions: HashSet<SessionId>,
}

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: HashMap<String, PresenceEntry>,
}

impl PresenceRegistry {
    /// Attach `session` to `identity`. Returns true when the identity was not present before.
    pub fn add(&mut self, identity: &str, session: SessionId) -> bool {
        match self.entries.get_mut(identity) {
            Some(entry) => {
                entry.sessions.insert(session);
                false
            }
            None => {
                self.entries.insert(
                    identity.to_string(),
                    PresenceEntry {
                        joined_at: Utc::now(),
                        cursor: None,
                        sessions: HashSet::from([session]),
                    },
                );
                true
            }
        }
    }

    /// Detach `session` from `identity`. Returns true when that was the identity's last session.
    pub fn remove(&mut self, identity: &str, session: SessionId) -> bool {
        let Some(entry) = self.entries.get_mut(identity) else {
            return false;
        };
        if !entry.sessions.remove(&session) || !entry.sessions.is_empty() {
            return false;
        }
        self.entries.remove(identity);
        true
    }

    /// Most recent cursor wins. Ignored for identities that are not present.
    pub fn set_cursor(&mut self, identity: &str, position: CursorPosition) {
        if let Some(entry) = self.entries.get_mut(identity) {
            entry.cursor = Some(position);
        }
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Present participants ordered by join time
    pub fn participants(&self) -> Vec<Participant> {
        let mut participants: Vec<Participant> = self
            .entries
            .iter()
            .map(|(identity, entry)| Participant {
                identity: identity.clone(),
                joined_at: entry.joined_at,
                cursor: entry.cursor,
            })
            .collect();
        participants.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.identity.cmp(&b.identity)));
        participants
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_session_of_same_identity_is_not_a_new_join() {
        let mut presence = PresenceRegistry::default();
        assert!(presence.add("alice", 1));
        assert!(!presence.add("alice", 2));
        assert!(!presence.add("alice", 2));
        assert_eq!(presence.len(), 1);
    }

    #[test]
    fn identity_leaves_with_its_last_session() {
        let mut presence = PresenceRegistry::default();
        presence.add("alice", 1);
        presence.add("alice", 2);
        assert!(!presence.remove("alice", 1));
        assert!(presence.contains("alice"));
        assert!(presence.remove("alice", 2));
        assert!(presence.is_empty());
        assert!(!presence.remove("alice", 2));
    }

    #[test]
    fn removing_a_foreign_session_keeps_the_identity() {
        let mut presence = PresenceRegistry::default();
        presence.add("alice", 1);
        assert!(!presence.remove("alice", 7));
        assert!(!presence.remove("bob", 1));
        assert!(presence.contains("alice"));
    }

    #[test]
    fn cursor_is_most_recent_and_only_for_present_identities() {
        let mut presence = PresenceRegistry::default();
        presence.add("alice", 1);
        presence.set_cursor("alice", CursorPosition { line: 1, column: 1 });
        presence.set_cursor("alice", CursorPosition { line: 4, column: 2 });
        presence.set_cursor("ghost", CursorPosition { line: 9, column: 9 });

        let participants = presence.participants();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].identity, "alice");
        assert_eq!(participants[0].cursor, Some(CursorPosition { line: 4, column: 2 }));
    }
}
