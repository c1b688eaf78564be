//! Client-facing events emitted by [`LobbyClient`](crate::client::LobbyClient).
//!
//! Events are delivered at most once per active receiver on the bounded
//! channel returned from `LobbyClient::start`. Terminal notifications
//! (`Disconnected`, `SessionCancelled`, `SessionStarted`, `SeedFailed`)
//! are never dropped under backpressure.

use crate::protocol::GameId;
use crate::session::Session;

/// Observable state of the transport connection.
///
/// Exactly one value at any time; transitions are published on a watch
/// channel, not polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Notifications pushed to session-view observers.
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyEvent {
    /// The transport (re)connected. Emitted before any subscription replay.
    Connected,
    /// The transport dropped; the connection loop keeps retrying, so this
    /// is a staleness indicator, not a failure.
    Disconnected {
        reason: Option<String>,
    },
    /// The session snapshot changed; carries a read-only copy.
    SessionUpdated {
        session: Session,
    },
    /// Terminal: the session was cancelled and the local snapshot cleared.
    SessionCancelled {
        game_id: GameId,
        message: Option<String>,
    },
    /// Terminal: the session started; the id is handed off to the match
    /// component.
    SessionStarted {
        game_id: GameId,
    },
    /// A command was rejected server-side. Transient, never retried
    /// automatically.
    CommandRejected {
        message: String,
    },
    /// The seed snapshot fetch failed. Fatal to this view: the caller
    /// should navigate away. The loop exits after emitting this.
    SeedFailed {
        message: String,
    },
}
