//! WASI-compatible WebRTC signaling relay using wstd
//!
//! Brokers the offer/answer/ICE-candidate exchange between peers of a
//! meeting room. The relay tracks which room each connection is in and routes
//! signaling messages either to the whole room or to one connection; the
//! session descriptions themselves are opaque to it.
//!
//! # Protocol
//!
//! Connections are served over HTTP long-polling:
//!
//! - **POST /connect** - Open a connection, returns `{"connection_id": "<uuid>"}`
//! - **GET /poll?connection_id={id}** - Drain pending events (JSON array)
//! - **POST /events** - Send one event (`X-Connection-Id` header required,
//!   `Authorization: Bearer <token>` when an access token is configured)
//! - **DELETE /connect** - Close the connection (`X-Connection-Id` header)
//! - **GET /health** - Health check
//!
//! A connection that stops polling for longer than the idle timeout is closed
//! as if it had sent `DELETE /connect`.
//!
//! ## Client events (client → relay)
//!
//! - `{"event": "join", "payload": {"participantId": "p1", "alias": "Ada", "meetingId": "room1",
//!   "isCreator": true}}`
//! - `{"event": "offer", "payload": {"id": "p1", "target": "<uuid>", "sdp": ...}}`
//! - `{"event": "answer", "payload": {"id": "p1", "target": "<uuid>", "sdp": ...}}`
//! - `{"event": "ice-candidate", "payload": {"id": "p1", "target": "<uuid>", "candidate": ...}}`
//! - `{"event": "end-session", "payload": {"meetingId": "room1"}}`
//! - `{"event": "init-receive", "payload": {"participantId": "p1", "meetingId": "room1"}}`
//! - `{"event": "init-send", "payload": {"target": "<uuid>"}}`
//!
//! ## Relay events (relay → client)
//!
//! - `join` to the room, sender included: `{"id", "alias", "connectionId"}`
//! - `offer` / `answer` to the target: `{"id", "sender", "sdp"}`
//! - `ice-candidate` to the target: `{"id", "sender", "candidate"}`
//! - `end-session` to the room: `{"message"}`
//! - `participant-departed` to the former room: `{"id", "sender"}`
//! - `init-receive` to the room, sender excluded: `{"id", "meetingId", "connectionId"}`
//! - `init-send` to the target: `{"id", "sender"}`
//!
//! # Example
//!
//! ```bash
//! # Start the server
//! wasmtime serve -S common --addr 127.0.0.1:3536 huddle-signaling.wasm
//!
//! # Open a connection
//! curl -X POST http://127.0.0.1:3536/connect
//!
//! # Join a meeting
//! curl -X POST -H "X-Connection-Id: <your-id>" -H "Content-Type: application/json" \
//!   -d '{"event":"join","payload":{"participantId":"p1","meetingId":"room1"}}' \
//!   http://127.0.0.1:3536/events
//!
//! # Poll for events
//! curl "http://127.0.0.1:3536/poll?connection_id=<your-id>"
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod gate;
pub mod handler;
pub mod registry;
pub mod router;
pub mod state;
pub mod transport;

pub use config::ServerConfig;
pub use error::{AuthError, ClientRequestError, ConfigError, RouteError, SignalingError};
pub use gate::{Gate, OpenGate, TokenGate};
pub use handler::handle_request;
pub use registry::{Participant, Registry};
pub use router::{Router, RouterBuilder};
pub use state::ServerState;
pub use transport::{Mailboxes, Transport};
