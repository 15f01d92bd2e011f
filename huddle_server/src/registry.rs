//! Connection registry
//!
//! The registry is the single source of truth for which participant owns a
//! live connection and which meeting that connection is in. It is an owned
//! object shared behind an `Arc`, so every router (and every test) works on
//! its own instance.

use huddle_protocol::{ConnectionId, MeetingId, ParticipantId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Registry record for one joined connection
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub participant_id: ParticipantId,
    pub alias: Option<serde_json::Value>,
    pub meeting_id: MeetingId,
    /// Advisory only, nothing is gated on it yet
    pub is_creator: bool,
}

/// In-memory map from connection to participant
#[derive(Debug, Default)]
pub struct Registry {
    participants: RwLock<HashMap<ConnectionId, Participant>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the record for `connection`
    ///
    /// Last write wins. Returns the record that was replaced, if any.
    pub fn register(
        &self,
        connection: ConnectionId,
        participant: Participant,
    ) -> Option<Participant> {
        self.participants.write().insert(connection, participant)
    }

    pub fn lookup(&self, connection: &ConnectionId) -> Option<Participant> {
        self.participants.read().get(connection).cloned()
    }

    pub fn contains(&self, connection: &ConnectionId) -> bool {
        self.participants.read().contains_key(connection)
    }

    /// Deletes the record for `connection`, handing back what was stored
    pub fn remove(&self, connection: &ConnectionId) -> Option<Participant> {
        self.participants.write().remove(connection)
    }

    pub fn len(&self) -> usize {
        self.participants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.read().is_empty()
    }

    /// Connections currently registered in `meeting`, sorted
    ///
    /// Derived from the participant map on every call.
    pub fn members(&self, meeting: &MeetingId) -> Vec<ConnectionId> {
        let mut members: Vec<ConnectionId> = self
            .participants
            .read()
            .iter()
            .filter(|(_, participant)| &participant.meeting_id == meeting)
            .map(|(connection, _)| *connection)
            .collect();
        members.sort();
        members
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn participant(id: &str, meeting: &str) -> Participant {
        Participant {
            participant_id: id.into(),
            alias: None,
            meeting_id: meeting.into(),
            is_creator: false,
        }
    }

    #[test_log::test]
    fn lookup_follows_register_and_remove() {
        let registry = Registry::new();
        let connection = ConnectionId::random();

        assert_eq!(registry.lookup(&connection), None);

        registry.register(connection, participant("p1", "room1"));
        assert_eq!(registry.lookup(&connection), Some(participant("p1", "room1")));

        assert_eq!(registry.remove(&connection), Some(participant("p1", "room1")));
        assert_eq!(registry.lookup(&connection), None);
    }

    #[test_log::test]
    fn register_is_idempotent() {
        let registry = Registry::new();
        let connection = ConnectionId::random();

        assert_eq!(registry.register(connection, participant("p1", "room1")), None);
        assert_eq!(
            registry.register(connection, participant("p1", "room1")),
            Some(participant("p1", "room1"))
        );

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(&connection), Some(participant("p1", "room1")));
    }

    #[test_log::test]
    fn register_overwrites_last_write_wins() {
        let registry = Registry::new();
        let connection = ConnectionId::random();

        registry.register(connection, participant("p1", "room1"));
        let previous = registry.register(connection, participant("p1", "room2"));

        assert_eq!(previous.map(|p| p.meeting_id), Some("room1".into()));
        assert!(registry.members(&"room1".into()).is_empty());
        assert_eq!(registry.members(&"room2".into()), vec![connection]);
    }

    #[test_log::test]
    fn removing_absent_connection_is_a_no_op() {
        let registry = Registry::new();
        assert_eq!(registry.remove(&ConnectionId::random()), None);
        assert!(registry.is_empty());
    }

    #[test_log::test]
    fn members_only_lists_the_requested_meeting() {
        let registry = Registry::new();
        let a = ConnectionId::random();
        let b = ConnectionId::random();
        let c = ConnectionId::random();

        registry.register(a, participant("p1", "room1"));
        registry.register(b, participant("p2", "room1"));
        registry.register(c, participant("p3", "room2"));

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(registry.members(&"room1".into()), expected);
        assert_eq!(registry.members(&"room2".into()), vec![c]);
        assert!(registry.members(&"room3".into()).is_empty());
    }
}
