//! Shared test doubles: a remote-controlled transport, a scripted
//! connector, a gateable seed fetcher, and wire-frame builders.

#![allow(dead_code)]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};

use lobby_sync_client::{
    ClientFrame, Connector, GameId, GameSnapshot, LobbyError, LobbyEvent, Transport, UserId,
};

// ── Transport ───────────────────────────────────────────────────────

/// Transport driven from the test body through a [`TransportHandle`].
///
/// `recv()` yields pushed items in order and hangs once the script is
/// exhausted, mimicking an open but quiet connection.
pub struct ScriptedTransport {
    incoming: mpsc::UnboundedReceiver<Option<Result<String, LobbyError>>>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

/// Remote control for one [`ScriptedTransport`].
#[derive(Clone)]
pub struct TransportHandle {
    tx: mpsc::UnboundedSender<Option<Result<String, LobbyError>>>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

pub fn transport_pair() -> (ScriptedTransport, TransportHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    let transport = ScriptedTransport {
        incoming: rx,
        sent: Arc::clone(&sent),
        closed: Arc::clone(&closed),
    };
    let handle = TransportHandle { tx, sent, closed };
    (transport, handle)
}

impl TransportHandle {
    /// Deliver one inbound JSON frame.
    pub fn push(&self, value: serde_json::Value) {
        self.tx.send(Some(Ok(value.to_string()))).unwrap();
    }

    /// Deliver raw text (for malformed-frame tests).
    pub fn push_raw(&self, text: &str) {
        self.tx.send(Some(Ok(text.to_string()))).unwrap();
    }

    /// Deliver a transport-level receive error.
    pub fn push_error(&self, message: &str) {
        self.tx
            .send(Some(Err(LobbyError::TransportReceive(message.into()))))
            .unwrap();
    }

    /// Signal a clean server-side close.
    pub fn close(&self) {
        self.tx.send(None).unwrap();
    }

    /// Everything the client sent on this transport, decoded.
    pub fn sent_frames(&self) -> Vec<ClientFrame> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|json| serde_json::from_str(json).ok())
            .collect()
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        self.sent_frames()
            .into_iter()
            .filter_map(|frame| match frame {
                ClientFrame::Subscribe { topic } => Some(topic),
                _ => None,
            })
            .collect()
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&mut self, message: String) -> Result<(), LobbyError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, LobbyError>> {
        match self.incoming.recv().await {
            Some(item) => item,
            // Handle dropped: stay quiet rather than reporting a close.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), LobbyError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// Yields prepared transports (or connect errors) in order, then hangs.
pub struct ScriptedConnector {
    outcomes: VecDeque<Result<ScriptedTransport, LobbyError>>,
}

impl ScriptedConnector {
    pub fn new(outcomes: Vec<Result<ScriptedTransport, LobbyError>>) -> Self {
        Self {
            outcomes: VecDeque::from(outcomes),
        }
    }

    pub fn single(transport: ScriptedTransport) -> Self {
        Self::new(vec![Ok(transport)])
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Output = ScriptedTransport;

    async fn connect(&mut self) -> Result<ScriptedTransport, LobbyError> {
        match self.outcomes.pop_front() {
            Some(outcome) => outcome,
            None => std::future::pending().await,
        }
    }
}

// ── Seed fetcher ────────────────────────────────────────────────────

/// Seed fetcher whose resolution the test controls.
pub struct MockFetcher {
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    result: Mutex<Option<Result<GameSnapshot, LobbyError>>>,
}

impl MockFetcher {
    /// Resolves immediately with `snapshot`.
    pub fn ok(snapshot: GameSnapshot) -> Self {
        Self {
            gate: Mutex::new(None),
            result: Mutex::new(Some(Ok(snapshot))),
        }
    }

    /// Fails immediately.
    pub fn err(message: &str) -> Self {
        Self {
            gate: Mutex::new(None),
            result: Mutex::new(Some(Err(LobbyError::SeedFetch {
                message: message.into(),
            }))),
        }
    }

    /// Resolves with `snapshot` only after the returned sender fires,
    /// letting tests order live events before the seed.
    pub fn gated(snapshot: GameSnapshot) -> (Self, oneshot::Sender<()>) {
        let (open_tx, open_rx) = oneshot::channel();
        let fetcher = Self {
            gate: Mutex::new(Some(open_rx)),
            result: Mutex::new(Some(Ok(snapshot))),
        };
        (fetcher, open_tx)
    }
}

#[async_trait]
impl lobby_sync_client::SeedFetcher for MockFetcher {
    async fn fetch_game(&self, _game_id: GameId) -> Result<GameSnapshot, LobbyError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.result
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Err(LobbyError::SeedFetch {
                message: "already fetched".into(),
            }))
    }
}

// ── Wire frames ─────────────────────────────────────────────────────

pub fn snapshot_json(game_id: GameId, players: &[(UserId, &str)]) -> serde_json::Value {
    let creator = players.first().map_or((1, "creator"), |(id, name)| (*id, *name));
    json!({
        "id": game_id,
        "name": "test-game",
        "maxPlayers": 4,
        "createdBy": { "id": creator.0, "username": creator.1 },
        "players": players
            .iter()
            .map(|(id, name)| json!({ "user": { "id": id, "username": name } }))
            .collect::<Vec<_>>(),
    })
}

pub fn snapshot(game_id: GameId, players: &[(UserId, &str)]) -> GameSnapshot {
    serde_json::from_value(snapshot_json(game_id, players)).unwrap()
}

pub fn user_joined(game_id: GameId, user_id: UserId, username: &str) -> serde_json::Value {
    json!({
        "topic": "/topic/game-updates",
        "type": "USER_JOINED",
        "payload": {
            "gameId": game_id,
            "player": { "user": { "id": user_id, "username": username } },
        },
    })
}

pub fn user_left(game_id: GameId, user_id: UserId) -> serde_json::Value {
    json!({
        "topic": "/topic/game-updates",
        "type": "USER_LEFT",
        "payload": { "gameId": game_id, "userId": user_id },
    })
}

pub fn color_changed(game_id: GameId, user_id: UserId, color: &str) -> serde_json::Value {
    json!({
        "topic": "/topic/game-updates",
        "type": "PLAYER_COLOR_CHANGED",
        "payload": { "gameId": game_id, "userId": user_id, "color": color },
    })
}

pub fn game_cancelled(game_id: GameId, message: &str) -> serde_json::Value {
    json!({
        "topic": "/topic/game-updates",
        "type": "GAME_CANCELLED",
        "payload": { "gameId": game_id, "message": message },
    })
}

pub fn game_started(game_id: GameId) -> serde_json::Value {
    json!({
        "topic": "/topic/game-updates",
        "type": "GAME_STARTED",
        "payload": { "gameId": game_id },
    })
}

pub fn game_created(game: serde_json::Value) -> serde_json::Value {
    json!({
        "topic": "/user/queue/game-created",
        "type": "GAME_CREATED",
        "payload": { "game": game },
    })
}

pub fn server_error(message: &str) -> serde_json::Value {
    json!({
        "topic": "/user/queue/errors",
        "type": "ERROR",
        "payload": { "message": message },
    })
}

// ── Event helpers ───────────────────────────────────────────────────

/// Receive events until one matches, with a timeout guard.
pub async fn recv_until<F>(events: &mut mpsc::Receiver<LobbyEvent>, pred: F) -> LobbyEvent
where
    F: Fn(&LobbyEvent) -> bool,
{
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        if pred(&event) {
            return event;
        }
    }
}

/// Assert no event matching `pred` arrives within `window`.
pub async fn assert_no_event<F>(events: &mut mpsc::Receiver<LobbyEvent>, window: Duration, pred: F)
where
    F: Fn(&LobbyEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + window;
    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(event)) => {
                assert!(!pred(&event), "unexpected event: {event:?}");
            }
            Ok(None) | Err(_) => return,
        }
    }
}
