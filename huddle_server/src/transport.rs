//! Room membership and outbound delivery
//!
//! The router never talks to a socket directly. It hands outbound events to a
//! [`Transport`], which owns room subscriptions and knows how to reach a
//! connection. [`Mailboxes`] is the long-polling implementation: every live
//! connection gets a bounded queue of serialized events that the client drains
//! by polling.

use crate::error::SignalingError;
use huddle_protocol::{ConnectionId, MeetingId, ServerEvent};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Room-scoped and targeted delivery primitives
pub trait Transport: Send + Sync {
    /// Places the connection in `meeting`, leaving any room it was in before
    fn subscribe(
        &self,
        connection: ConnectionId,
        meeting: &MeetingId,
    ) -> Result<(), SignalingError>;

    /// Takes the connection out of its room and stops delivering to it
    ///
    /// A released connection cannot be subscribed again.
    fn release(&self, connection: ConnectionId);

    /// Delivers `event` to one connection
    fn send_to(
        &self,
        connection: ConnectionId,
        event: &ServerEvent,
    ) -> Result<(), SignalingError>;

    /// Delivers `event` to every member of `meeting` except `except`
    ///
    /// Returns the number of recipients.
    fn broadcast(
        &self,
        meeting: &MeetingId,
        event: &ServerEvent,
        except: Option<ConnectionId>,
    ) -> usize;
}

/// One live connection's pending events
#[derive(Debug)]
struct Mailbox {
    room: Option<MeetingId>,
    events: VecDeque<String>,
    last_seen: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    connections: HashMap<ConnectionId, Mailbox>,
    rooms: HashMap<MeetingId, HashSet<ConnectionId>>,
}

impl Inner {
    fn leave_room(&mut self, connection: &ConnectionId) {
        let Some(room) = self
            .connections
            .get_mut(connection)
            .and_then(|mailbox| mailbox.room.take())
        else {
            return;
        };

        if let Some(members) = self.rooms.get_mut(&room) {
            members.remove(connection);
            if members.is_empty() {
                self.rooms.remove(&room);
            }
        }
    }
}

/// In-memory long-polling transport
#[derive(Debug)]
pub struct Mailboxes {
    inner: Mutex<Inner>,
    max_pending_events: usize,
}

impl Mailboxes {
    pub fn new(max_pending_events: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_pending_events: max_pending_events.max(1),
        }
    }

    /// Opens a new connection and assigns it a fresh identity
    pub fn connect(&self) -> ConnectionId {
        self.connect_at(Instant::now())
    }

    pub fn connect_at(&self, now: Instant) -> ConnectionId {
        let connection = ConnectionId::random();
        self.inner.lock().connections.insert(
            connection,
            Mailbox {
                room: None,
                events: VecDeque::new(),
                last_seen: now,
            },
        );
        tracing::debug!(%connection, "connection opened");
        connection
    }

    /// Drains the pending events of a connection
    ///
    /// Returns `None` if the connection is unknown. Polling counts as activity.
    pub fn poll(&self, connection: &ConnectionId) -> Option<Vec<String>> {
        self.poll_at(connection, Instant::now())
    }

    pub fn poll_at(&self, connection: &ConnectionId, now: Instant) -> Option<Vec<String>> {
        let mut inner = self.inner.lock();
        let mailbox = inner.connections.get_mut(connection)?;
        mailbox.last_seen = now;
        Some(mailbox.events.drain(..).collect())
    }

    /// Forgets a connection entirely, dropping anything still queued for it
    pub fn close(&self, connection: &ConnectionId) -> bool {
        let mut inner = self.inner.lock();
        inner.leave_room(connection);
        let closed = inner.connections.remove(connection).is_some();
        if closed {
            tracing::debug!(%connection, "connection closed");
        }
        closed
    }

    pub fn is_connected(&self, connection: &ConnectionId) -> bool {
        self.inner.lock().connections.contains_key(connection)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().connections.is_empty()
    }

    /// Room the connection is subscribed to
    pub fn room_of(&self, connection: &ConnectionId) -> Option<MeetingId> {
        self.inner
            .lock()
            .connections
            .get(connection)
            .and_then(|mailbox| mailbox.room.clone())
    }

    /// Connections subscribed to `meeting`, sorted
    pub fn room_members(&self, meeting: &MeetingId) -> Vec<ConnectionId> {
        let mut members: Vec<ConnectionId> = self
            .inner
            .lock()
            .rooms
            .get(meeting)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Connections that have not polled for longer than `timeout`
    pub fn idle_at(&self, now: Instant, timeout: Duration) -> Vec<ConnectionId> {
        self.inner
            .lock()
            .connections
            .iter()
            .filter(|(_, mailbox)| now.saturating_duration_since(mailbox.last_seen) > timeout)
            .map(|(connection, _)| *connection)
            .collect()
    }

    fn push(&self, mailbox: &mut Mailbox, connection: &ConnectionId, event: String) {
        if mailbox.events.len() >= self.max_pending_events {
            mailbox.events.pop_front();
            tracing::warn!(
                %connection,
                limit = self.max_pending_events,
                "mailbox full, discarding oldest event"
            );
        }
        mailbox.events.push_back(event);
    }
}

impl Default for Mailboxes {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_PENDING_EVENTS)
    }
}

impl Transport for Mailboxes {
    fn subscribe(
        &self,
        connection: ConnectionId,
        meeting: &MeetingId,
    ) -> Result<(), SignalingError> {
        let mut inner = self.inner.lock();
        if !inner.connections.contains_key(&connection) {
            return Err(SignalingError::UnknownConnection(connection));
        }

        inner.leave_room(&connection);
        inner.rooms.entry(meeting.clone()).or_default().insert(connection);
        if let Some(mailbox) = inner.connections.get_mut(&connection) {
            mailbox.room = Some(meeting.clone());
        }
        Ok(())
    }

    fn release(&self, connection: ConnectionId) {
        self.close(&connection);
    }

    fn send_to(
        &self,
        connection: ConnectionId,
        event: &ServerEvent,
    ) -> Result<(), SignalingError> {
        let payload = serde_json::to_string(event)?;
        let mut inner = self.inner.lock();
        let mailbox = inner
            .connections
            .get_mut(&connection)
            .ok_or(SignalingError::UnknownConnection(connection))?;
        self.push(mailbox, &connection, payload);
        Ok(())
    }

    fn broadcast(
        &self,
        meeting: &MeetingId,
        event: &ServerEvent,
        except: Option<ConnectionId>,
    ) -> usize {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(
                    %meeting,
                    event = event.name(),
                    %err,
                    "failed to serialize broadcast"
                );
                return 0;
            }
        };

        let mut inner = self.inner.lock();
        let Inner { connections, rooms } = &mut *inner;
        let Some(members) = rooms.get(meeting) else {
            return 0;
        };

        let mut delivered = 0;
        for connection in members {
            if Some(*connection) == except {
                continue;
            }
            if let Some(mailbox) = connections.get_mut(connection) {
                self.push(mailbox, connection, payload.clone());
                delivered += 1;
            }
        }
        delivered
    }
}
