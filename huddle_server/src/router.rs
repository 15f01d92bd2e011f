//! Message routing
//!
//! The router turns one inbound event into zero or more outbound events:
//!
//! - `join` registers the sender and announces it to its whole room,
//!   the sender included
//! - `offer`, `answer` and `ice-candidate` are forwarded to the target
//!   connection only, provided the target is registered
//! - `end-session` is broadcast to the room
//! - `init-receive` and `init-send` let peers agree on who dials whom
//! - a closing connection is removed and its departure announced to the room
//!   it was in
//!
//! Routing failures are never fatal. Anything the router cannot deliver is
//! logged and dropped.
//!
//! Membership changes (join, init-receive, disconnect) and room broadcasts run
//! under one lock, so a broadcast never sees the registry and the transport
//! disagree about who is in a room.

use crate::error::RouteError;
use crate::gate::Gate;
use crate::registry::{Participant, Registry};
use crate::transport::Transport;
use huddle_protocol::{
    ConnectionId, EndSessionPayload, Envelope, HandshakePayload, IceCandidatePayload,
    InitReceivePayload, InitSendPayload, JoinPayload, ServerEvent, events,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Message sent to everyone in a meeting that has been ended
pub const END_SESSION_MESSAGE: &str = "The meeting has ended";

/// Handles one event for one connection
pub type Handler = fn(&Router, ConnectionId, serde_json::Value) -> Result<(), RouteError>;

fn parse<T: DeserializeOwned>(event: &str, payload: serde_json::Value) -> Result<T, RouteError> {
    serde_json::from_value(payload).map_err(|source| RouteError::MalformedPayload {
        event: event.to_string(),
        source,
    })
}

/// Collects the event table, refusing duplicate event names
#[derive(Default)]
pub struct RouterBuilder {
    routes: BTreeMap<&'static str, Handler>,
    duplicate: Option<&'static str>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler for `event`
    ///
    /// Registering the same name twice makes [`RouterBuilder::build`] fail.
    #[must_use]
    pub fn route(mut self, event: &'static str, handler: Handler) -> Self {
        if self.routes.insert(event, handler).is_some() && self.duplicate.is_none() {
            self.duplicate = Some(event);
        }
        self
    }

    /// Adds every client event the relay understands
    #[must_use]
    pub fn with_default_routes(self) -> Self {
        self.route(events::JOIN, |router, connection, payload| {
            router.join(connection, parse(events::JOIN, payload)?)
        })
        .route(events::OFFER, |router, connection, payload| {
            router.offer(connection, parse(events::OFFER, payload)?);
            Ok(())
        })
        .route(events::ANSWER, |router, connection, payload| {
            router.answer(connection, parse(events::ANSWER, payload)?);
            Ok(())
        })
        .route(events::ICE_CANDIDATE, |router, connection, payload| {
            router.ice_candidate(connection, parse(events::ICE_CANDIDATE, payload)?);
            Ok(())
        })
        .route(events::END_SESSION, |router, connection, payload| {
            router.end_session(connection, parse(events::END_SESSION, payload)?);
            Ok(())
        })
        .route(events::INIT_RECEIVE, |router, connection, payload| {
            router.init_receive(connection, parse(events::INIT_RECEIVE, payload)?)
        })
        .route(events::INIT_SEND, |router, connection, payload| {
            router.init_send(connection, parse(events::INIT_SEND, payload)?);
            Ok(())
        })
    }

    pub fn build(
        self,
        registry: Arc<Registry>,
        transport: Arc<dyn Transport>,
        gate: Arc<dyn Gate>,
    ) -> Result<Router, RouteError> {
        if let Some(event) = self.duplicate {
            return Err(RouteError::DuplicateRoute(event));
        }
        if self.routes.contains_key(events::DISCONNECTING) {
            return Err(RouteError::ReservedEvent(events::DISCONNECTING));
        }

        Ok(Router {
            registry,
            transport,
            gate,
            routes: self.routes,
            membership: Mutex::new(()),
        })
    }
}

pub struct Router {
    registry: Arc<Registry>,
    transport: Arc<dyn Transport>,
    gate: Arc<dyn Gate>,
    routes: BTreeMap<&'static str, Handler>,
    membership: Mutex<()>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Names of the client events this router accepts
    pub fn events(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.routes.keys().copied()
    }

    /// Authorizes and routes one inbound envelope
    ///
    /// Errors describe why the event was dropped. None of them leave a
    /// partially applied change behind.
    pub fn dispatch(
        &self,
        connection: ConnectionId,
        envelope: Envelope,
        credential: Option<&str>,
    ) -> Result<(), RouteError> {
        let Envelope { event, payload } = envelope;

        if let Err(source) = self.gate.authorize(connection, &event, credential) {
            tracing::warn!(%connection, %event, %source, "event rejected by gate");
            return Err(RouteError::Unauthorized { event, source });
        }

        let Some(handler) = self.routes.get(event.as_str()) else {
            tracing::warn!(%connection, %event, "dropping unknown event");
            return Err(RouteError::UnknownEvent(event));
        };

        tracing::debug!(%connection, %event, "dispatching");
        handler(self, connection, payload).inspect_err(|err| {
            tracing::warn!(%connection, %event, %err, "dropping event");
        })
    }

    /// Registers the connection and announces it to the room, itself included
    pub fn join(&self, connection: ConnectionId, payload: JoinPayload) -> Result<(), RouteError> {
        let JoinPayload {
            participant_id,
            alias,
            meeting_id,
            is_creator,
        } = payload;

        let _membership = self.membership.lock();
        self.transport.subscribe(connection, &meeting_id)?;
        let previous = self.registry.register(
            connection,
            Participant {
                participant_id: participant_id.clone(),
                alias: alias.clone(),
                meeting_id: meeting_id.clone(),
                is_creator,
            },
        );

        if let Some(previous) = previous.filter(|previous| previous.meeting_id != meeting_id) {
            tracing::info!(
                %connection,
                from = %previous.meeting_id,
                to = %meeting_id,
                "participant switched meetings"
            );
            self.transport.broadcast(
                &previous.meeting_id,
                &ServerEvent::ParticipantDeparted {
                    id: previous.participant_id,
                    sender: connection,
                },
                None,
            );
        }

        tracing::info!(
            %connection,
            participant = %participant_id,
            meeting = %meeting_id,
            "participant joined"
        );
        self.transport.broadcast(
            &meeting_id,
            &ServerEvent::Join {
                id: participant_id,
                alias,
                connection_id: connection,
            },
            None,
        );
        Ok(())
    }

    pub fn offer(&self, connection: ConnectionId, payload: HandshakePayload) {
        self.forward(
            connection,
            payload.target,
            ServerEvent::Offer {
                id: payload.id,
                sender: connection,
                sdp: payload.sdp,
            },
        );
    }

    pub fn answer(&self, connection: ConnectionId, payload: HandshakePayload) {
        self.forward(
            connection,
            payload.target,
            ServerEvent::Answer {
                id: payload.id,
                sender: connection,
                sdp: payload.sdp,
            },
        );
    }

    pub fn ice_candidate(&self, connection: ConnectionId, payload: IceCandidatePayload) {
        self.forward(
            connection,
            payload.target,
            ServerEvent::IceCandidate {
                id: payload.id,
                sender: connection,
                candidate: payload.candidate,
            },
        );
    }

    /// Tells everyone in the meeting that it is over
    ///
    /// Nobody is unsubscribed here; clients leave by disconnecting.
    pub fn end_session(&self, connection: ConnectionId, payload: EndSessionPayload) {
        let _membership = self.membership.lock();
        let recipients = self.transport.broadcast(
            &payload.meeting_id,
            &ServerEvent::EndSession {
                message: END_SESSION_MESSAGE.to_string(),
            },
            None,
        );
        tracing::info!(%connection, meeting = %payload.meeting_id, recipients, "session ended");
    }

    /// Announces to the rest of the room that the sender accepts connections
    ///
    /// A sender that has not joined yet is joined on the spot, without alias.
    pub fn init_receive(
        &self,
        connection: ConnectionId,
        payload: InitReceivePayload,
    ) -> Result<(), RouteError> {
        let InitReceivePayload {
            participant_id,
            meeting_id,
        } = payload;

        let _membership = self.membership.lock();
        // Announce in the room the sender is actually in, not the one it names
        let meeting_id = match self.registry.lookup(&connection) {
            Some(participant) => participant.meeting_id,
            None => {
                self.transport.subscribe(connection, &meeting_id)?;
                self.registry.register(
                    connection,
                    Participant {
                        participant_id: participant_id.clone(),
                        alias: None,
                        meeting_id: meeting_id.clone(),
                        is_creator: false,
                    },
                );
                tracing::info!(
                    %connection,
                    participant = %participant_id,
                    meeting = %meeting_id,
                    "participant joined"
                );
                meeting_id
            }
        };

        self.transport.broadcast(
            &meeting_id,
            &ServerEvent::InitReceive {
                id: participant_id,
                meeting_id: meeting_id.clone(),
                connection_id: connection,
            },
            Some(connection),
        );
        Ok(())
    }

    /// Asks the target to start a connection towards the sender
    pub fn init_send(&self, connection: ConnectionId, payload: InitSendPayload) {
        let Some(sender) = self.registry.lookup(&connection) else {
            tracing::warn!(
                %connection,
                target = %payload.target,
                "init-send from unregistered connection, dropping"
            );
            return;
        };

        self.forward(
            connection,
            payload.target,
            ServerEvent::InitSend {
                id: sender.participant_id,
                sender: connection,
            },
        );
    }

    /// Cleans up after a closing connection
    ///
    /// The connection is released from the transport in the same critical
    /// section that removes its record, so a concurrent `join` either lands
    /// before (and is then departed) or fails against the released
    /// connection. Returns the removed record; a connection that never joined
    /// is released without an announcement.
    pub fn disconnecting(&self, connection: ConnectionId) -> Option<Participant> {
        let _membership = self.membership.lock();
        let removed = self.registry.remove(&connection);
        self.transport.release(connection);
        let Some(participant) = removed else {
            tracing::debug!(%connection, "closing connection never joined");
            return None;
        };

        let recipients = self.transport.broadcast(
            &participant.meeting_id,
            &ServerEvent::ParticipantDeparted {
                id: participant.participant_id.clone(),
                sender: connection,
            },
            None,
        );
        tracing::info!(
            %connection,
            participant = %participant.participant_id,
            meeting = %participant.meeting_id,
            recipients,
            "participant departed"
        );
        Some(participant)
    }

    /// Point-to-point delivery to a registered target
    fn forward(&self, connection: ConnectionId, target: ConnectionId, event: ServerEvent) {
        if !self.registry.contains(&target) {
            tracing::warn!(
                %connection,
                %target,
                event = event.name(),
                "unknown target, dropping"
            );
            return;
        }

        match self.transport.send_to(target, &event) {
            Ok(()) => tracing::debug!(%connection, %target, event = event.name(), "forwarded"),
            Err(err) => tracing::warn!(
                %connection,
                %target,
                event = event.name(),
                %err,
                "delivery failed, dropping"
            ),
        }
    }
}
