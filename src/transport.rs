//! Transport abstraction for the lobby synchronization protocol.
//!
//! [`Transport`] is one established bidirectional text-message channel;
//! [`Connector`] knows how to establish a fresh one. The split exists
//! because the connection loop outlives any single transport: whenever a
//! transport drops, the loop asks the connector for a new one after the
//! reconnect delay, for as long as the session view is alive.
//!
//! The protocol uses JSON text messages, so implementations must handle
//! message framing internally (WebSocket frames, length-prefixed TCP,
//! and so on).

use async_trait::async_trait;

use crate::error::LobbyError;

/// A bidirectional text message channel to the server.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because it is polled
/// inside `tokio::select!`. If the future is dropped before completion,
/// calling `recv` again must not lose a message. Channel-backed
/// implementations are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one complete JSON text message.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::TransportSend`] if the message could not be
    /// sent.
    async fn send(&mut self, message: String) -> Result<(), LobbyError>;

    /// Receive the next JSON text message.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete message was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the connection was closed cleanly by the server
    async fn recv(&mut self) -> Option<Result<String, LobbyError>>;

    /// Close the connection gracefully. Implementations should release
    /// resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), LobbyError>;
}

/// Establishes [`Transport`] instances on demand.
///
/// Called once at startup and again after every disconnect. Connection
/// failures are never fatal: the loop logs them, waits the configured
/// delay, and calls [`connect`](Connector::connect) again until the view
/// is torn down.
#[async_trait]
pub trait Connector: Send + 'static {
    /// The transport type this connector produces.
    type Output: Transport;

    /// Attempt to establish a new connection.
    ///
    /// # Errors
    ///
    /// Any [`LobbyError`]; the caller treats all of them as retriable.
    async fn connect(&mut self) -> Result<Self::Output, LobbyError>;
}
