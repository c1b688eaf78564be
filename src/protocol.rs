//! Wire types for the lobby synchronization protocol.
//!
//! Every type in this module produces JSON identical to what the server
//! emits and expects:
//!
//! - Event kinds and frame types are `SCREAMING_SNAKE_CASE` strings.
//! - Payload fields are camelCase.
//! - Inbound events use the `{ "type": ..., "payload": ... }` envelope,
//!   delivered per-topic.
//!
//! Unrecognized inbound event kinds deserialize to
//! [`InboundEvent::Unknown`] so new server events degrade to no-ops
//! instead of failing the whole frame.

use serde::{Deserialize, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Opaque numeric identifier for a game session.
pub type GameId = i64;

/// Opaque numeric identifier for a user.
pub type UserId = i64;

// ── Topics ──────────────────────────────────────────────────────────

/// Well-known topic names on the publish/subscribe channel.
pub mod topics {
    /// Broadcast roster and session updates.
    pub const GAME_UPDATES: &str = "/topic/game-updates";
    /// Per-user error queue (command rejections).
    pub const ERRORS: &str = "/user/queue/errors";
    /// Per-user personal-result queue (e.g. creation acknowledgment).
    pub const GAME_CREATED: &str = "/user/queue/game-created";

    /// The topics a session view subscribes to.
    pub const ALL: [&str; 3] = [GAME_UPDATES, ERRORS, GAME_CREATED];
}

// ── Enums ───────────────────────────────────────────────────────────

/// Exclusive player color, unique across a session roster.
///
/// Uniqueness is enforced by the server before broadcasting; the client
/// applies color changes blindly and trusts the invariant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerColor {
    Red,
    Blue,
    Green,
    Yellow,
    Black,
    White,
}

// ── REST DTOs ───────────────────────────────────────────────────────

/// Minimal user identity as carried in snapshots and roster events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
}

/// One player's membership record within a game snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEntry {
    pub user: UserSummary,
    /// Exclusive color, if one has been assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<PlayerColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<String>,
}

/// Full session snapshot as returned by the one-shot `GET game/{id}`
/// collaborator and carried in creation acknowledgments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub id: GameId,
    pub name: String,
    pub max_players: u8,
    pub created_by: UserSummary,
    #[serde(default)]
    pub players: Vec<PlayerEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

// ── Inbound events ──────────────────────────────────────────────────

/// Server-produced event, consumed exactly once by the reconciler.
///
/// The closed set of kinds the client understands, plus an
/// [`Unknown`](InboundEvent::Unknown) fallback for kinds introduced by
/// newer servers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundEvent {
    /// A user joined the session roster.
    UserJoined {
        #[serde(rename = "gameId")]
        game_id: GameId,
        player: PlayerEntry,
    },
    /// A user left the session roster.
    UserLeft {
        #[serde(rename = "gameId")]
        game_id: GameId,
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    /// A participant's exclusive color changed.
    PlayerColorChanged {
        #[serde(rename = "gameId")]
        game_id: GameId,
        #[serde(rename = "userId")]
        user_id: UserId,
        color: PlayerColor,
    },
    /// The session was cancelled by its creator. Terminal.
    GameCancelled {
        #[serde(rename = "gameId")]
        game_id: GameId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// The session started and was promoted to a match. Terminal.
    GameStarted {
        #[serde(rename = "gameId")]
        game_id: GameId,
    },
    /// Creation acknowledgment carrying a full snapshot, delivered on the
    /// personal-result queue.
    GameCreated { game: GameSnapshot },
    /// A command was rejected server-side. Does not mutate the session.
    Error { message: String },
    /// Heartbeat reply.
    Pong,
    /// Any event kind this client does not recognize. Logged and dropped.
    #[serde(other)]
    Unknown,
}

impl InboundEvent {
    /// The session this event targets, if it is scoped to one.
    pub fn game_id(&self) -> Option<GameId> {
        match self {
            Self::UserJoined { game_id, .. }
            | Self::UserLeft { game_id, .. }
            | Self::PlayerColorChanged { game_id, .. }
            | Self::GameCancelled { game_id, .. }
            | Self::GameStarted { game_id } => Some(*game_id),
            Self::GameCreated { game } => Some(game.id),
            Self::Error { .. } | Self::Pong | Self::Unknown => None,
        }
    }
}

/// Inbound wire envelope: an event delivered on a topic.
///
/// Heartbeat replies arrive without a topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(flatten)]
    pub event: InboundEvent,
}

// ── Outbound frames ─────────────────────────────────────────────────

/// Client-to-server wire frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientFrame {
    /// Subscribe to a topic. Subscriptions do not survive a disconnect on
    /// the transport and are replayed on every reconnection.
    Subscribe { topic: String },
    /// Unsubscribe from a topic.
    Unsubscribe { topic: String },
    /// Send a command body to a well-known destination.
    Send {
        destination: String,
        body: serde_json::Value,
    },
    /// Heartbeat.
    Ping,
}

// ── Commands ────────────────────────────────────────────────────────

/// An outbound intent, serialized to one [`ClientFrame::Send`] on a fixed
/// logical destination.
///
/// Commands carry no client-generated correlation id: acknowledgment is
/// inferred from the resulting inbound event (a rejection arrives as an
/// `ERROR` event on the per-user error queue, not as a direct reply).
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateGame { name: String, max_players: u8 },
    JoinGame { game_id: GameId },
    LeaveGame { game_id: GameId },
    StartGame { game_id: GameId },
    ChangeColor { game_id: GameId, color: PlayerColor },
}

impl Command {
    /// The logical destination address for this command kind.
    pub fn destination(&self) -> String {
        match self {
            Self::CreateGame { .. } => "/app/create-game".to_string(),
            Self::JoinGame { game_id } => format!("/app/game/{game_id}/join"),
            Self::LeaveGame { game_id } => format!("/app/game/{game_id}/leave"),
            Self::StartGame { game_id } => format!("/app/game/{game_id}/start"),
            Self::ChangeColor { game_id, .. } => format!("/app/game/{game_id}/color"),
        }
    }

    /// The JSON body sent to the destination.
    pub fn body(&self) -> serde_json::Value {
        match self {
            Self::CreateGame { name, max_players } => serde_json::json!({
                "gameName": name,
                "maxPlayers": max_players,
            }),
            Self::JoinGame { .. } | Self::LeaveGame { .. } | Self::StartGame { .. } => {
                serde_json::json!({})
            }
            Self::ChangeColor { color, .. } => serde_json::json!({ "color": color }),
        }
    }

    /// Serialize this command into its outbound wire frame.
    pub fn into_frame(self) -> ClientFrame {
        ClientFrame::Send {
            destination: self.destination(),
            body: self.body(),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn command_destinations() {
        assert_eq!(
            Command::CreateGame {
                name: "g".into(),
                max_players: 4
            }
            .destination(),
            "/app/create-game"
        );
        assert_eq!(
            Command::JoinGame { game_id: 7 }.destination(),
            "/app/game/7/join"
        );
        assert_eq!(
            Command::LeaveGame { game_id: 7 }.destination(),
            "/app/game/7/leave"
        );
        assert_eq!(
            Command::StartGame { game_id: 7 }.destination(),
            "/app/game/7/start"
        );
        assert_eq!(
            Command::ChangeColor {
                game_id: 7,
                color: PlayerColor::Red
            }
            .destination(),
            "/app/game/7/color"
        );
    }

    #[test]
    fn change_color_body_uses_wire_color_name() {
        let body = Command::ChangeColor {
            game_id: 1,
            color: PlayerColor::Blue,
        }
        .body();
        assert_eq!(body, serde_json::json!({ "color": "BLUE" }));
    }

    #[test]
    fn into_frame_wraps_destination_and_body() {
        let frame = Command::JoinGame { game_id: 3 }.into_frame();
        match frame {
            ClientFrame::Send { destination, body } => {
                assert_eq!(destination, "/app/game/3/join");
                assert_eq!(body, serde_json::json!({}));
            }
            other => panic!("expected Send frame, got {other:?}"),
        }
    }

    #[test]
    fn unknown_event_kind_is_tolerated() {
        let json = r#"{"topic":"/topic/game-updates","type":"TOURNAMENT_BRACKET","payload":{"x":1}}"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.event, InboundEvent::Unknown);
    }

    #[test]
    fn user_joined_round_trips_with_camel_case_fields() {
        let json = r#"{
            "topic": "/topic/game-updates",
            "type": "USER_JOINED",
            "payload": {
                "gameId": 1,
                "player": { "user": { "id": 2, "username": "ana" }, "color": "RED" }
            }
        }"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        match frame.event {
            InboundEvent::UserJoined { game_id, player } => {
                assert_eq!(game_id, 1);
                assert_eq!(player.user.username, "ana");
                assert_eq!(player.color, Some(PlayerColor::Red));
            }
            other => panic!("expected UserJoined, got {other:?}"),
        }
    }
}
