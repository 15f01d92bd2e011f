//! Server state shared by every request
//!
//! Ties the transport (mailboxes) to the router and drives the connection
//! lifecycle: open, receive events, poll, close, and reaping of connections
//! that stopped polling.

use crate::config::ServerConfig;
use crate::error::{ClientRequestError, RouteError};
use crate::registry::{Participant, Registry};
use crate::router::Router;
use crate::transport::Mailboxes;
use huddle_protocol::{ConnectionId, Envelope};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

/// Handle to the relay, cheap to clone
#[derive(Clone)]
pub struct ServerState {
    config: Arc<ServerConfig>,
    mailboxes: Arc<Mailboxes>,
    router: Arc<Router>,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Result<Self, RouteError> {
        let mailboxes = Arc::new(Mailboxes::new(config.max_pending_events));
        let router = Router::builder()
            .with_default_routes()
            .build(Arc::new(Registry::new()), mailboxes.clone(), config.gate())?;

        Ok(Self {
            config: Arc::new(config),
            mailboxes,
            router: Arc::new(router),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn registry(&self) -> &Registry {
        self.router.registry()
    }

    pub fn mailboxes(&self) -> &Mailboxes {
        &self.mailboxes
    }

    /// Opens a connection; the client uses the returned id from now on
    pub fn connect(&self) -> ConnectionId {
        self.mailboxes.connect()
    }

    /// Drains pending events for a connection
    pub fn poll(&self, connection: &ConnectionId) -> Option<Vec<String>> {
        self.mailboxes.poll(connection)
    }

    /// Handles one raw inbound message from `connection`
    pub fn receive(
        &self,
        connection: ConnectionId,
        body: &str,
        credential: Option<&str>,
    ) -> Result<(), ClientRequestError> {
        if !self.mailboxes.is_connected(&connection) {
            return Err(ClientRequestError::UnknownConnection(connection));
        }

        let envelope = Envelope::from_str(body).inspect_err(|err| {
            tracing::warn!(%connection, %err, "dropping unparsable message");
        })?;
        self.router.dispatch(connection, envelope, credential)?;
        Ok(())
    }

    /// Closes a connection, announcing the departure if it had joined
    ///
    /// Returns `false` if the connection was already gone.
    pub fn disconnect(&self, connection: &ConnectionId) -> bool {
        if !self.mailboxes.is_connected(connection) {
            return false;
        }
        self.close(connection);
        true
    }

    /// Closes every connection that has not polled within the idle timeout
    pub fn reap_idle(&self) -> Vec<ConnectionId> {
        self.reap_idle_at(Instant::now())
    }

    pub fn reap_idle_at(&self, now: Instant) -> Vec<ConnectionId> {
        let idle = self.mailboxes.idle_at(now, self.config.idle_timeout());
        for connection in &idle {
            tracing::info!(%connection, "connection idle, closing");
            self.close(connection);
        }
        idle
    }

    fn close(&self, connection: &ConnectionId) -> Option<Participant> {
        self.router.disconnecting(*connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_protocol::ServerEvent;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn state() -> ServerState {
        ServerState::new(ServerConfig::default()).unwrap()
    }

    fn join_body(participant: &str, meeting: &str) -> String {
        serde_json::json!({
            "event": "join",
            "payload": {"participantId": participant, "meetingId": meeting},
        })
        .to_string()
    }

    #[test_log::test]
    fn receive_requires_an_open_connection() {
        let state = state();
        let result = state.receive(ConnectionId::random(), &join_body("p1", "room1"), None);
        assert!(matches!(result, Err(ClientRequestError::UnknownConnection(_))));
        assert!(state.registry().is_empty());
    }

    #[test_log::test]
    fn receive_rejects_invalid_json() {
        let state = state();
        let a = state.connect();
        let result = state.receive(a, "{not json", None);
        assert!(matches!(result, Err(ClientRequestError::Json(_))));
    }

    #[test_log::test]
    fn disconnect_announces_departure_and_closes_the_mailbox() {
        let state = state();
        let a = state.connect();
        let b = state.connect();
        state.receive(a, &join_body("p1", "room1"), None).unwrap();
        state.receive(b, &join_body("p2", "room1"), None).unwrap();
        state.poll(&a);

        assert!(state.disconnect(&b));
        assert!(!state.disconnect(&b));

        let events: Vec<ServerEvent> = state
            .poll(&a)
            .unwrap()
            .iter()
            .map(|raw| raw.parse().unwrap())
            .collect();
        assert_eq!(
            events,
            vec![ServerEvent::ParticipantDeparted {
                id: "p2".into(),
                sender: b,
            }]
        );
        assert!(state.poll(&b).is_none());
        assert!(state.registry().lookup(&b).is_none());
    }

    #[test_log::test]
    fn idle_connections_are_reaped_and_departed() {
        let state = state();
        let timeout = state.config().idle_timeout();
        let start = Instant::now();
        let a = state.mailboxes().connect_at(start);
        let b = state.mailboxes().connect_at(start);
        state.receive(a, &join_body("p1", "room1"), None).unwrap();
        state.receive(b, &join_body("p2", "room1"), None).unwrap();

        let later = start + timeout + Duration::from_secs(1);
        state.mailboxes().poll_at(&a, later);

        assert_eq!(state.reap_idle_at(later), vec![b]);
        assert!(state.registry().lookup(&b).is_none());
        assert!(!state.mailboxes().is_connected(&b));
        assert_eq!(state.poll(&a).unwrap().len(), 1);
    }
}
