//! Error types for the signaling relay

use huddle_protocol::ConnectionId;
use thiserror::Error;

/// Errors raised by the transport while delivering events
#[derive(Error, Debug)]
pub enum SignalingError {
    /// The connection is not (or no longer) known to the transport
    #[error("Unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reasons an authorization gate turns an event away
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing credential")]
    MissingCredential,

    #[error("Invalid credential")]
    InvalidCredential,

    #[error("Credential expired")]
    Expired,
}

/// Errors from routing an inbound event
#[derive(Error, Debug)]
pub enum RouteError {
    /// Two handlers were registered for the same event name
    #[error("Duplicate route for event `{0}`")]
    DuplicateRoute(&'static str),

    /// The event is driven by the transport and cannot be routed
    #[error("Event `{0}` is reserved for the transport")]
    ReservedEvent(&'static str),

    /// No handler is registered for the event name
    #[error("Unknown event `{0}`")]
    UnknownEvent(String),

    /// The payload does not have the shape the handler expects
    #[error("Malformed `{event}` payload: {source}")]
    MalformedPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    /// The gate rejected the event
    #[error("Unauthorized `{event}`: {source}")]
    Unauthorized {
        event: String,
        #[source]
        source: AuthError,
    },

    /// The transport could not apply a membership change
    #[error(transparent)]
    Transport(#[from] SignalingError),
}

/// Errors from client requests
#[derive(Error, Debug)]
pub enum ClientRequestError {
    /// The request did not name a connection, or named it badly
    #[error("Missing or invalid X-Connection-Id header")]
    MissingConnectionId,

    /// The connection was never opened or has been closed
    #[error("Unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The event was rejected by the router
    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Errors loading the server configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}
