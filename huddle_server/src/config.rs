//! Server configuration
//!
//! Built-in defaults overridden by `HUDDLE_`-prefixed environment variables,
//! e.g. `HUDDLE_IDLE_TIMEOUT_SECS=60`.

use crate::error::ConfigError;
use crate::gate::{Gate, OpenGate, TokenGate, unix_time};
use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_PENDING_EVENTS: usize = 256;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LOG_FILTER: &str = "huddle_server=info";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Events kept per connection before the oldest is dropped
    pub max_pending_events: usize,
    /// A connection that has not polled for this long is treated as gone
    pub idle_timeout_secs: u64,
    /// When set, every client event must present this bearer token
    pub access_token: Option<String>,
    /// Seconds since the epoch after which `access_token` stops working
    pub token_expires_at: Option<u64>,
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_pending_events: DEFAULT_MAX_PENDING_EVENTS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            access_token: None,
            token_expires_at: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default())).merge(Env::prefixed("HUDDLE_"))
    }

    /// Loads and validates the configuration from the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment())
    }

    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pending_events == 0 {
            return Err(ConfigError::Invalid("max_pending_events must be positive"));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid("idle_timeout_secs must be positive"));
        }
        if self.access_token.as_deref() == Some("") {
            return Err(ConfigError::Invalid("access_token must not be empty"));
        }
        if self.token_expires_at.is_some_and(|secs| unix_time(secs).is_none()) {
            return Err(ConfigError::Invalid("token_expires_at is out of range"));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Gate matching the configured credentials
    pub fn gate(&self) -> Arc<dyn Gate> {
        match &self.access_token {
            Some(token) => {
                let gate = TokenGate::new(token.clone());
                match self.token_expires_at {
                    Some(expires_at) => Arc::new(gate.expires_at_unix(expires_at)),
                    None => Arc::new(gate),
                }
            }
            None => Arc::new(OpenGate),
        }
    }
}
