//! # lobby-sync-client
//!
//! Transport-agnostic client core for real-time lobby synchronization.
//!
//! The crate keeps a local, read-only copy of one game session (the
//! lobby roster, its colors, its lifecycle phase) continuously
//! reconciled against server-pushed events, so callers render state
//! instead of interpreting a protocol.
//!
//! ## Architecture
//!
//! - [`LobbyClient`] — handle paired with a background connection loop;
//!   commands go in, [`LobbyEvent`]s come out
//! - [`Transport`] / [`Connector`] — the pluggable wire (a WebSocket
//!   implementation ships behind the `transport-websocket` feature)
//! - [`SeedFetcher`] — one-shot authoritative snapshot fetch that seeds
//!   the view; live events arriving earlier are buffered
//! - [`TokenProvider`] — supplies the bearer credential for the
//!   connection handshake
//! - [`Session`] — the reconciled snapshot observers receive
//!
//! The loop reconnects with a fixed delay for as long as the view is
//! alive, replays topic subscriptions on every reconnect, and sends
//! heartbeats to detect half-dead connections.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use lobby_sync_client::{
//!     LobbyClient, LobbyConfig, LobbyEvent, StaticToken, WebSocketConnector,
//! };
//!
//! let tokens = std::sync::Arc::new(StaticToken("jwt".into()));
//! let connector = WebSocketConnector::new("ws://localhost:8080/ws/game", tokens);
//! let (client, mut events) = LobbyClient::start(connector, fetcher, LobbyConfig::new(42));
//!
//! client.join_game()?;
//! while let Some(event) = events.recv().await {
//!     match event {
//!         LobbyEvent::SessionUpdated { session } => println!("{:?}", session.roster()),
//!         LobbyEvent::SessionStarted { game_id } => break, // hand off to the match
//!         _ => {}
//!     }
//! }
//! ```
//!
//! ## Features
//!
//! - `transport-websocket` *(default)* — WebSocket transport via
//!   `tokio-tungstenite`
//! - `tokio-runtime` — runtime and timer features of tokio, implied by
//!   the bundled transport; [`LobbyClient`] requires it (the wire types
//!   and the reconciler build without any runtime)

pub mod auth;
#[cfg(feature = "tokio-runtime")]
pub mod client;
pub mod error;
pub mod event;
pub mod protocol;
pub mod reconcile;
pub mod registry;
pub mod retry;
pub mod seed;
pub mod session;
pub mod transport;
pub mod transports;

pub use auth::{NoToken, StaticToken, TokenProvider};
#[cfg(feature = "tokio-runtime")]
pub use client::{LobbyClient, LobbyConfig};
pub use error::{LobbyError, Result};
pub use event::{ConnectionState, LobbyEvent};
pub use protocol::{
    topics, ClientFrame, Command, GameId, GameSnapshot, InboundEvent, PlayerColor, PlayerEntry,
    ServerFrame, UserId, UserSummary,
};
pub use reconcile::{Effect, Reconciler};
pub use registry::{SubscriptionRegistry, TopicHandler};
pub use retry::ReconnectPolicy;
pub use seed::SeedFetcher;
pub use session::{Participant, Session, SessionPhase, MAX_PLAYERS, MIN_PLAYERS};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::websocket::{WebSocketConnector, WebSocketTransport};
