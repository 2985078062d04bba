//! HTTP surface of the gateway.
//!
//! JSON endpoints for single and fan-out queries, session history and reset,
//! plus a server-sent-events variant of `/query`.

pub mod stream;
pub mod web;

/// Stream re-framing helpers.
pub use stream::{CHUNK_CHARS, chunk_text, stream_frames};
/// axum server wrapping a `GatewayManager`.
pub use web::GatewayServer;
