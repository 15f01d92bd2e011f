//! WASI HTTP server entry point for the long-polling signaling relay
//!
//! This module provides the main entry point when running as a WASI HTTP component
//! using `wasmtime serve`.

use huddle_server::{ServerConfig, ServerState, handle_request};
use std::cell::RefCell;
use tracing_subscriber::EnvFilter;
use wstd::http::{Body, Request, Response};

// Thread-local state for the server (WASI is single-threaded)
thread_local! {
    static STATE: RefCell<Option<ServerState>> = const { RefCell::new(None) };
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    // Fails only if a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}

fn bootstrap() -> Option<ServerState> {
    let config = ServerConfig::load();
    init_tracing(
        config
            .as_ref()
            .map_or(huddle_server::config::DEFAULT_LOG_FILTER, |config| {
                config.log_filter.as_str()
            }),
    );

    let config = config.unwrap_or_else(|err| {
        tracing::error!(%err, "invalid configuration, falling back to defaults");
        ServerConfig::default()
    });

    match ServerState::new(config) {
        Ok(state) => {
            tracing::info!("huddle signaling relay v{} ready", env!("CARGO_PKG_VERSION"));
            Some(state)
        }
        Err(err) => {
            tracing::error!(%err, "failed to build router");
            None
        }
    }
}

fn get_or_init_state() -> Option<ServerState> {
    STATE.with(|s| {
        let mut state = s.borrow_mut();
        if state.is_none() {
            *state = bootstrap();
        }
        state.clone()
    })
}

/// The main HTTP handler for WASI
///
/// This function is called by the WASI runtime for each incoming HTTP request.
#[wstd::http_server]
async fn main(request: Request<Body>) -> Result<Response<Body>, wstd::http::Error> {
    let Some(state) = get_or_init_state() else {
        let mut response = Response::new(Body::from("Signaling relay unavailable"));
        *response.status_mut() = http::StatusCode::SERVICE_UNAVAILABLE;
        return Ok(response);
    };
    handle_request(request, &state).await
}
