//! Per-event authorization
//!
//! Identity verification happens outside the relay. The router only asks a
//! [`Gate`] whether the credential presented with an event is acceptable,
//! once per inbound event and before any handler runs.

use crate::error::AuthError;
use huddle_protocol::ConnectionId;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// `secs` after the epoch, if the platform clock can represent it
pub(crate) fn unix_time(secs: u64) -> Option<SystemTime> {
    UNIX_EPOCH.checked_add(Duration::from_secs(secs))
}

/// Capability check run before dispatch
pub trait Gate: Send + Sync {
    fn authorize(
        &self,
        connection: ConnectionId,
        event: &str,
        credential: Option<&str>,
    ) -> Result<(), AuthError>;
}

/// Admits every event
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenGate;

impl Gate for OpenGate {
    fn authorize(&self, _: ConnectionId, _: &str, _: Option<&str>) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Admits events carrying one shared access token
#[derive(Debug, Clone)]
pub struct TokenGate {
    token: String,
    expires_at: Option<SystemTime>,
}

impl TokenGate {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    /// Stops accepting the token after `expires_at` (seconds since the epoch)
    ///
    /// An instant the platform clock cannot represent never expires.
    #[must_use]
    pub fn expires_at_unix(mut self, expires_at: u64) -> Self {
        self.expires_at = unix_time(expires_at);
        self
    }

    #[must_use]
    pub fn expires_at(mut self, expires_at: SystemTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

impl Gate for TokenGate {
    fn authorize(
        &self,
        _: ConnectionId,
        _: &str,
        credential: Option<&str>,
    ) -> Result<(), AuthError> {
        let credential = credential.ok_or(AuthError::MissingCredential)?;
        if credential != self.token {
            return Err(AuthError::InvalidCredential);
        }
        match self.expires_at {
            Some(expires_at) if SystemTime::now() >= expires_at => Err(AuthError::Expired),
            _ => Ok(()),
        }
    }
}
