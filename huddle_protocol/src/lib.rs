//! Wire types for the huddle signaling relay
//!
//! Every message on the wire is a JSON envelope carrying an event name and a
//! payload object:
//!
//! ```json
//! {"event": "offer", "payload": {"id": "p1", "target": "<uuid>", "sdp": {...}}}
//! ```
//!
//! Inbound payloads (client → relay) are plain structs deserialized by the
//! relay once it has picked a handler for the event name. Outbound events
//! (relay → client) are the [`ServerEvent`] enum, which serializes to the same
//! envelope shape.
//!
//! Session descriptions and ICE candidates are carried as opaque
//! [`serde_json::Value`]s; the relay never looks inside them.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Event names understood by the relay
pub mod events {
    pub const JOIN: &str = "join";
    pub const OFFER: &str = "offer";
    pub const ANSWER: &str = "answer";
    pub const ICE_CANDIDATE: &str = "ice-candidate";
    pub const END_SESSION: &str = "end-session";
    pub const INIT_RECEIVE: &str = "init-receive";
    pub const INIT_SEND: &str = "init-send";
    /// Transport-driven, never accepted from a client
    pub const DISCONNECTING: &str = "disconnecting";
    pub const PARTICIPANT_DEPARTED: &str = "participant-departed";
}

/// Transport-assigned identity of one live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Generates a fresh, never before seen connection id
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Caller-supplied identity of a participant, stable across reconnects
///
/// Not guaranteed to be unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a meeting room
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeetingId(pub String);

impl From<&str> for MeetingId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for MeetingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An inbound message: event name plus a still-untyped payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Wraps a typed payload under the given event name
    pub fn new(event: &str, payload: &impl Serialize) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: event.to_string(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Deserializes the payload into the shape a handler expects
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl FromStr for Envelope {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}

/// Payload of `join`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    pub participant_id: ParticipantId,
    /// Display data chosen by the client, relayed as-is
    #[serde(default)]
    pub alias: Option<serde_json::Value>,
    pub meeting_id: MeetingId,
    #[serde(default)]
    pub is_creator: bool,
}

/// Payload of `offer` and `answer`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakePayload {
    /// Participant id the sender claims, echoed to the target
    pub id: ParticipantId,
    pub target: ConnectionId,
    pub sdp: serde_json::Value,
}

/// Payload of `ice-candidate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCandidatePayload {
    pub id: ParticipantId,
    pub target: ConnectionId,
    pub candidate: serde_json::Value,
}

/// Payload of `end-session`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionPayload {
    pub meeting_id: MeetingId,
}

/// Payload of `init-receive`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitReceivePayload {
    pub participant_id: ParticipantId,
    pub meeting_id: MeetingId,
}

/// Payload of `init-send`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitSendPayload {
    pub target: ConnectionId,
}

/// Events emitted by the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// A participant joined the room (sent to the whole room, newcomer included)
    #[serde(rename_all = "camelCase")]
    Join {
        id: ParticipantId,
        alias: Option<serde_json::Value>,
        connection_id: ConnectionId,
    },
    Offer {
        id: ParticipantId,
        sender: ConnectionId,
        sdp: serde_json::Value,
    },
    Answer {
        id: ParticipantId,
        sender: ConnectionId,
        sdp: serde_json::Value,
    },
    IceCandidate {
        id: ParticipantId,
        sender: ConnectionId,
        candidate: serde_json::Value,
    },
    /// The meeting was ended for everyone
    EndSession { message: String },
    /// A participant left; peers should tear down their link to `sender`
    ParticipantDeparted {
        id: ParticipantId,
        sender: ConnectionId,
    },
    /// A participant is ready to accept connections from the room
    #[serde(rename_all = "camelCase")]
    InitReceive {
        id: ParticipantId,
        meeting_id: MeetingId,
        connection_id: ConnectionId,
    },
    /// A room member asks the target to start a connection towards it
    InitSend {
        id: ParticipantId,
        sender: ConnectionId,
    },
}

impl ServerEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => events::JOIN,
            Self::Offer { .. } => events::OFFER,
            Self::Answer { .. } => events::ANSWER,
            Self::IceCandidate { .. } => events::ICE_CANDIDATE,
            Self::EndSession { .. } => events::END_SESSION,
            Self::ParticipantDeparted { .. } => events::PARTICIPANT_DEPARTED,
            Self::InitReceive { .. } => events::INIT_RECEIVE,
            Self::InitSend { .. } => events::INIT_SEND,
        }
    }
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl FromStr for ServerEvent {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}
