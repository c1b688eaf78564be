//! Error types for the lobby sync client.

use thiserror::Error;

/// Errors that can occur when using the lobby sync client.
///
/// Transport-level failures (`TransportSend`, `TransportReceive`,
/// `TransportClosed`, `Timeout`) are retried by the connection loop and are
/// never fatal to the session view. [`SeedFetch`](LobbyError::SeedFetch) is
/// fatal: without a valid base snapshot there is nothing to reconcile onto.
#[derive(Debug, Error)]
pub enum LobbyError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a wire frame.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection, but the
    /// client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// The one-shot snapshot fetch failed; the session view has no valid
    /// base state and must be abandoned.
    #[error("seed fetch failed: {message}")]
    SeedFetch {
        /// Error body returned by the snapshot endpoint.
        message: String,
    },

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for lobby sync client operations.
pub type Result<T> = std::result::Result<T, LobbyError>;
