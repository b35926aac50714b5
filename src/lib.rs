//! Realtime chat session client.
//!
//! The crate is organized around one websocket connection to a chat broker:
//! - `proto`: sub-protocol frames, wire envelopes, and destination names.
//! - `routing`: conversation modes and destination routing.
//! - `transport`: websocket worker owning the socket and the codec boundary.
//! - `session`: connection state machine, subscriptions, and send paths.

/// Error taxonomy shared across the crate.
pub mod error;
/// Wire frames, envelopes, and destination constants.
pub mod proto;
/// Pure destination routing per conversation mode.
pub mod routing;
/// Session client, connection state, and UI-facing events.
pub mod session;
/// Websocket transport worker and handle.
pub mod transport;
mod typing;
