use std::collections::{HashMap, VecDeque};

use tracing::{debug, info};

use super::messages::Payload;
use super::types::{Connection, ConnectionId, SessionId, SignalingError};

/// Maximum number of attached connections per session.
pub const SESSION_CAPACITY: usize = 2;

#[derive(Debug)]
struct PendingEntry {
    sender: ConnectionId,
    payload: Payload,
}

/// Pairing slot for one session identifier
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    members: Vec<Connection>,
    pending: VecDeque<PendingEntry>,
}

impl Session {
    fn new(id: SessionId) -> Self {
        info!("Creating session {}", id);
        Self {
            id,
            members: Vec::with_capacity(SESSION_CAPACITY),
            pending: VecDeque::new(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= SESSION_CAPACITY
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.iter().any(|m| m.id() == id)
    }

    /// Append a member. Rejects a third connection even if admission let it through.
    pub fn attach(&mut self, connection: Connection) -> Result<(), SignalingError> {
        if self.is_full() {
            return Err(SignalingError::SpaceFull(self.id.clone()));
        }
        debug!("Connection {} attached to session {}", connection.id(), self.id);
        self.members.push(connection);
        Ok(())
    }

    /// Remove a member (no-op if absent) and drop everything it queued.
    ///
    /// Queued negotiation data from a party that already left is never delivered.
    pub fn detach(&mut self, id: ConnectionId) {
        self.members.retain(|m| m.id() != id);
        let before = self.pending.len();
        self.pending.retain(|entry| entry.sender != id);
        let dropped = before - self.pending.len();
        if dropped > 0 {
            debug!(
                "Discarded {} queued message(s) from {} in session {}",
                dropped, id, self.id
            );
        }
    }

    /// The member that is not `id`, if any.
    pub fn other_member(&self, id: ConnectionId) -> Option<&Connection> {
        self.members.iter().find(|m| m.id() != id)
    }

    pub fn enqueue(&mut self, sender: ConnectionId, payload: Payload) {
        self.pending.push_back(PendingEntry { sender, payload });
    }

    /// Take every queued payload, oldest first.
    pub fn drain_all(&mut self) -> Vec<Payload> {
        self.pending.drain(..).map(|entry| entry.payload).collect()
    }
}

/// Mapping from session identifier to its live session
#[derive(Debug, Default)]
pub struct Registry {
    sessions: HashMap<SessionId, Session>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    pub fn get_or_create(&mut self, id: &SessionId) -> &mut Session {
        self.sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id.clone()))
    }

    /// Drop the session at `id` if it has no members left. Returns whether it was removed.
    pub fn remove_if_empty(&mut self, id: &SessionId) -> bool {
        match self.sessions.get(id) {
            Some(session) if session.is_empty() => {
                self.sessions.remove(id);
                info!("Deleting session {}", id);
                true
            }
            _ => false,
        }
    }

    pub fn is_full(&self, id: &SessionId) -> bool {
        self.sessions.get(id).is_some_and(Session::is_full)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::types::ConnectionEnds;
    use serde_json::value::RawValue;

    fn connect(session: &str) -> (Connection, ConnectionEnds) {
        Connection::open(SessionId::from(session), "127.0.0.1:9000".parse().unwrap())
    }

    fn payload(text: &str) -> Payload {
        RawValue::from_string(text.to_string()).unwrap()
    }

    #[test]
    fn get_or_create_returns_same_session() {
        let mut registry = Registry::new();
        let id = SessionId::from("42");
        let (a, _a) = connect("42");
        registry.get_or_create(&id).attach(a).unwrap();
        assert_eq!(registry.get_or_create(&id).member_count(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn attach_rejects_third_member() {
        let mut registry = Registry::new();
        let id = SessionId::from("5");
        let (a, _a) = connect("5");
        let (b, _b) = connect("5");
        let (c, _c) = connect("5");
        let session = registry.get_or_create(&id);
        session.attach(a).unwrap();
        session.attach(b).unwrap();
        assert!(matches!(
            session.attach(c),
            Err(SignalingError::SpaceFull(_))
        ));
        assert_eq!(session.member_count(), 2);
        assert!(registry.is_full(&id));
    }

    #[test]
    fn other_member_lookup() {
        let mut session = Session::new(SessionId::from("7"));
        let (a, _a) = connect("7");
        let (b, _b) = connect("7");
        let (a_id, b_id) = (a.id(), b.id());

        session.attach(a).unwrap();
        assert!(session.other_member(a_id).is_none());

        session.attach(b).unwrap();
        assert_eq!(session.other_member(a_id).map(Connection::id), Some(b_id));
        assert_eq!(session.other_member(b_id).map(Connection::id), Some(a_id));
    }

    #[test]
    fn drain_all_is_fifo_and_empties_queue() {
        let mut session = Session::new(SessionId::from("1"));
        let sender = ConnectionId::generate();
        session.enqueue(sender, payload("1"));
        session.enqueue(sender, payload("2"));
        session.enqueue(sender, payload("3"));

        let drained: Vec<String> = session
            .drain_all()
            .iter()
            .map(|p| p.get().to_string())
            .collect();
        assert_eq!(drained, ["1", "2", "3"]);
        assert_eq!(session.pending_count(), 0);
        assert!(session.drain_all().is_empty());
    }

    #[test]
    fn detach_discards_only_senders_entries() {
        let mut session = Session::new(SessionId::from("9"));
        let (a, _a) = connect("9");
        let a_id = a.id();
        let stranger = ConnectionId::generate();
        session.attach(a).unwrap();
        session.enqueue(a_id, payload("\"from a\""));
        session.enqueue(stranger, payload("\"from stranger\""));

        session.detach(a_id);
        assert!(session.is_empty());
        let left: Vec<String> = session
            .drain_all()
            .iter()
            .map(|p| p.get().to_string())
            .collect();
        assert_eq!(left, ["\"from stranger\""]);
    }

    #[test]
    fn detach_absent_member_is_noop() {
        let mut session = Session::new(SessionId::from("1"));
        let (a, _a) = connect("1");
        session.attach(a).unwrap();
        session.detach(ConnectionId::generate());
        assert_eq!(session.member_count(), 1);
    }

    #[test]
    fn remove_if_empty_keeps_populated_session() {
        let mut registry = Registry::new();
        let id = SessionId::from("3");
        let (a, _a) = connect("3");
        let a_id = a.id();
        registry.get_or_create(&id).attach(a).unwrap();

        assert!(!registry.remove_if_empty(&id));
        assert!(registry.get(&id).is_some());

        registry.get_mut(&id).unwrap().detach(a_id);
        assert!(registry.remove_if_empty(&id));
        assert!(registry.get(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_if_empty_is_idempotent() {
        let mut registry = Registry::new();
        let id = SessionId::from("gone");
        assert!(!registry.remove_if_empty(&id));
        registry.get_or_create(&id);
        assert!(registry.remove_if_empty(&id));
        assert!(!registry.remove_if_empty(&id));
    }

    #[test]
    fn sessions_are_case_sensitive() {
        let mut registry = Registry::new();
        registry.get_or_create(&SessionId::from("abc"));
        assert!(registry.get(&SessionId::from("ABC")).is_none());
    }
}
