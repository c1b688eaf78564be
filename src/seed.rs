//! Seed fetch collaborator boundary.
//!
//! The initial authoritative snapshot comes from a one-shot request
//! outside this crate (typically `GET game/{id}` over HTTP). The core
//! only sees this trait: the fetch is started when the client starts,
//! runs concurrently with connection establishment, and live events are
//! buffered until it resolves.

use async_trait::async_trait;

use crate::error::LobbyError;
use crate::protocol::{GameId, GameSnapshot};

/// One-shot snapshot fetcher.
///
/// A failure is fatal to the session view (there is no base state to
/// reconcile onto) and is surfaced as
/// [`LobbyEvent::SeedFailed`](crate::event::LobbyEvent::SeedFailed); the
/// fetch is never silently retried.
#[async_trait]
pub trait SeedFetcher: Send + 'static {
    /// Fetch the full snapshot for `game_id`.
    ///
    /// # Errors
    ///
    /// Implementations should map the collaborator's `{message}` error
    /// body to [`LobbyError::SeedFetch`].
    async fn fetch_game(&self, game_id: GameId) -> Result<GameSnapshot, LobbyError>;
}
