//! HTTP long-polling handlers for the signaling relay
//!
//! This module maps plain HTTP requests onto connection lifecycle calls, so
//! the relay works without WebSocket upgrades or long-lived connections.

use crate::error::{ClientRequestError, RouteError};
use crate::state::ServerState;
use huddle_protocol::ConnectionId;
use http::{HeaderValue, StatusCode, header};
use wstd::http::{Body, Method, Request, Response};

const CONNECTION_HEADER: &str = "x-connection-id";

/// Get query parameter from URI
fn get_query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?.split('&').find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let k = parts.next()?;
        let v = parts.next()?;
        if k == key { Some(v) } else { None }
    })
}

/// Bearer token from an `Authorization` header value
fn bearer_token(value: &str) -> Option<&str> {
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn connection_from_header(request: &Request<Body>) -> Option<ConnectionId> {
    request
        .headers()
        .get(CONNECTION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Body>,
) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

fn text(status: StatusCode, body: impl Into<String>) -> Response<Body> {
    respond(status, "text/plain", Body::from(body.into()))
}

fn json(status: StatusCode, body: &serde_json::Value) -> Response<Body> {
    respond(status, "application/json", Body::from(body.to_string()))
}

/// Status a rejected client request is answered with
fn error_status(err: &ClientRequestError) -> StatusCode {
    match err {
        ClientRequestError::UnknownConnection(_) => StatusCode::NOT_FOUND,
        ClientRequestError::Route(RouteError::Unauthorized { .. }) => StatusCode::UNAUTHORIZED,
        ClientRequestError::Route(RouteError::Transport(_)) => StatusCode::CONFLICT,
        ClientRequestError::MissingConnectionId
        | ClientRequestError::Json(_)
        | ClientRequestError::Route(_) => StatusCode::BAD_REQUEST,
    }
}

/// Open a connection
fn handle_connect(state: &ServerState) -> Response<Body> {
    let connection = state.connect();
    json(
        StatusCode::OK,
        &serde_json::json!({ "connection_id": connection.to_string() }),
    )
}

/// Drain pending events
fn handle_poll(query: Option<&str>, state: &ServerState) -> Response<Body> {
    let Some(connection) =
        get_query_param(query, "connection_id").and_then(|s| s.parse::<ConnectionId>().ok())
    else {
        return text(StatusCode::BAD_REQUEST, "Missing or invalid connection_id");
    };

    match state.poll(&connection) {
        Some(events) => {
            // Events are already serialized, splice them in as raw JSON
            let body = format!("[{}]", events.join(","));
            respond(StatusCode::OK, "application/json", Body::from(body))
        }
        None => text(StatusCode::NOT_FOUND, "Connection not found"),
    }
}

/// Handle an inbound event POST
async fn handle_event(request: Request<Body>, state: &ServerState) -> Response<Body> {
    let Some(connection) = connection_from_header(&request) else {
        return text(
            StatusCode::BAD_REQUEST,
            ClientRequestError::MissingConnectionId.to_string(),
        );
    };

    let credential = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string);

    // Read the body
    let mut body = request.into_body();
    let body_str = match body.str_contents().await {
        Ok(s) => s.to_string(),
        Err(e) => {
            return text(
                StatusCode::BAD_REQUEST,
                format!("Failed to read body: {e:?}"),
            );
        }
    };

    match state.receive(connection, &body_str, credential.as_deref()) {
        Ok(()) => text(StatusCode::ACCEPTED, "OK"),
        Err(err) => text(error_status(&err), err.to_string()),
    }
}

/// Handle a transport-level close
fn handle_disconnect(request: &Request<Body>, state: &ServerState) -> Response<Body> {
    let Some(connection) = connection_from_header(request) else {
        return text(
            StatusCode::BAD_REQUEST,
            ClientRequestError::MissingConnectionId.to_string(),
        );
    };

    if state.disconnect(&connection) {
        text(StatusCode::OK, "OK")
    } else {
        text(StatusCode::NOT_FOUND, "Connection not found")
    }
}

/// Handle CORS preflight
fn handle_cors_preflight() -> Response<Body> {
    let mut response = text(StatusCode::NO_CONTENT, "");
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type, authorization, x-connection-id"),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    response
}

/// Handle an HTTP request - main router
pub async fn handle_request(
    request: Request<Body>,
    state: &ServerState,
) -> Result<Response<Body>, wstd::http::Error> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let path = uri.path();

    // CORS preflight
    if method == Method::OPTIONS {
        return Ok(handle_cors_preflight());
    }

    // Every request doubles as the idle-connection sweep
    state.reap_idle();

    let response = match (&method, path) {
        (&Method::GET, "/health") => text(
            StatusCode::OK,
            format!("OK\nconnections: {}\n", state.mailboxes().len()),
        ),
        (&Method::POST, "/connect") => handle_connect(state),
        (&Method::DELETE, "/connect") | (&Method::POST, "/disconnect") => {
            handle_disconnect(&request, state)
        }
        (&Method::GET, "/poll") => handle_poll(uri.query(), state),
        (&Method::POST, "/events") => handle_event(request, state).await,
        (&Method::GET, "/") => text(
            StatusCode::OK,
            "huddle signaling relay (long-polling)\n\
             \n\
             Endpoints:\n\
             - GET /health - Health check\n\
             - POST /connect - Open a connection, returns {\"connection_id\": \"<uuid>\"}\n\
             - GET /poll?connection_id={id} - Drain pending events\n\
             - POST /events - Send one event (X-Connection-Id header required)\n\
             - DELETE /connect - Close the connection (X-Connection-Id header required)\n\
             \n\
             Events are JSON envelopes: {\"event\": \"<name>\", \"payload\": {...}}\n\
             Client events: join, offer, answer, ice-candidate, end-session,\n\
             init-receive, init-send\n",
        ),
        _ => text(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn query_param_lookup() {
        let query = Some("a=1&connection_id=abc&b=");
        assert_eq!(get_query_param(query, "connection_id"), Some("abc"));
        assert_eq!(get_query_param(query, "b"), Some(""));
        assert_eq!(get_query_param(query, "missing"), None);
        assert_eq!(get_query_param(None, "a"), None);
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer s3cret"), Some("s3cret"));
        assert_eq!(bearer_token("bearer  s3cret "), Some("s3cret"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic dXNlcg=="), None);
    }

    #[test]
    fn rejected_requests_map_to_statuses() {
        use crate::error::{AuthError, SignalingError};

        assert_eq!(
            error_status(&ClientRequestError::UnknownConnection(ConnectionId::random())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&ClientRequestError::Route(RouteError::Unauthorized {
                event: "join".to_string(),
                source: AuthError::MissingCredential,
            })),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            error_status(&ClientRequestError::Route(RouteError::UnknownEvent(
                "shout".to_string()
            ))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&ClientRequestError::Route(RouteError::Transport(
                SignalingError::UnknownConnection(ConnectionId::random())
            ))),
            StatusCode::CONFLICT
        );
    }
}
