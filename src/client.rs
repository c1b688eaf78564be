//! Async client for one lobby session view.
//!
//! [`LobbyClient`] is a thin handle that communicates with a background
//! connection loop task via an unbounded MPSC channel. Notifications are
//! emitted on a bounded channel ([`tokio::sync::mpsc::Receiver<LobbyEvent>`])
//! returned from [`LobbyClient::start`]; the connection state and the
//! current session snapshot are additionally published on watch channels
//! for observers that only care about the latest value.
//!
//! One client is constructed per active session view. Construction spawns
//! the loop and starts the seed fetch; [`LobbyClient::shutdown`] (or
//! dropping the handle) tears everything down, including the in-flight
//! seed fetch.
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = WebSocketConnector::new("ws://localhost:8080/ws/game", tokens);
//! let (client, mut events) = LobbyClient::start(connector, fetcher, LobbyConfig::new(42));
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         LobbyEvent::SessionUpdated { session } => { /* render roster */ }
//!         LobbyEvent::SessionCancelled { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{LobbyError, Result};
use crate::event::{ConnectionState, LobbyEvent};
use crate::protocol::{
    topics, ClientFrame, Command, GameId, GameSnapshot, InboundEvent, PlayerColor, ServerFrame,
};
use crate::reconcile::{Effect, Reconciler};
use crate::registry::SubscriptionRegistry;
use crate::retry::ReconnectPolicy;
use crate::seed::SeedFetcher;
use crate::session::Session;
use crate::transport::{Connector, Transport};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default delay between reconnection attempts.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default interval between outbound heartbeats.
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(4);

/// Default inbound silence tolerated before the connection is treated as
/// lost.
const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`LobbyClient`].
///
/// The only required value is the session id; all timing parameters have
/// defaults matching the server's expectations.
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// Id of the session this view synchronizes.
    pub game_id: GameId,
    /// Fixed delay between reconnection attempts. Defaults to **5 s**.
    pub reconnect_delay: Duration,
    /// Interval between outbound heartbeat pings. Defaults to **4 s**.
    pub heartbeat_interval: Duration,
    /// Inbound silence treated as an unexpected close. Defaults to **10 s**.
    pub heartbeat_timeout: Duration,
    /// Capacity of the bounded event channel. When the consumer cannot
    /// keep up, non-critical events are dropped (with a warning) to avoid
    /// blocking the connection loop; terminal notifications are always
    /// delivered. Defaults to **256**, clamped to at least 1.
    pub event_channel_capacity: usize,
    /// Time the background loop is given to close the transport when
    /// [`LobbyClient::shutdown`] is called. Defaults to **1 s**.
    pub shutdown_timeout: Duration,
}

impl LobbyConfig {
    pub fn new(game_id: GameId) -> Self {
        Self {
            game_id,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    #[must_use]
    pub fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the client handle and the connection loop.
struct ClientState {
    connected: AtomicBool,
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to one synchronized lobby session view.
///
/// All command methods serialize an outbound frame and queue it to the
/// connection loop, returning immediately once queued. When the transport
/// is not connected they fail fast with [`LobbyError::NotConnected`]
/// instead of queuing; callers decide whether to retry.
pub struct LobbyClient {
    /// Sender half of the outbound frame channel to the connection loop.
    cmd_tx: mpsc::UnboundedSender<ClientFrame>,
    state: Arc<ClientState>,
    conn_rx: watch::Receiver<ConnectionState>,
    session_rx: watch::Receiver<Option<Session>>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Aborts the seed fetch if the loop is no longer around to do it.
    seed_abort: tokio::task::AbortHandle,
    shutdown_timeout: Duration,
    game_id: GameId,
}

impl LobbyClient {
    /// Start the connection loop and the seed fetch; returns the handle
    /// plus the event receiver.
    ///
    /// The loop connects (and reconnects) via `connector`, subscribes the
    /// recognized topics on every `connected` transition, and reconciles
    /// inbound events onto the snapshot seeded from `fetcher`.
    #[must_use = "the event receiver must be consumed to observe the session"]
    pub fn start(
        connector: impl Connector,
        fetcher: impl SeedFetcher,
        config: LobbyConfig,
    ) -> (Self, mpsc::Receiver<LobbyEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<LobbyEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_tx, conn_rx) = watch::channel(ConnectionState::Disconnected);
        let (session_tx, session_rx) = watch::channel::<Option<Session>>(None);

        let state = Arc::new(ClientState {
            connected: AtomicBool::new(false),
        });

        // The seed fetch runs concurrently with connection establishment;
        // its result is consumed (or abandoned) by the loop.
        let (seed_tx, seed_rx) = oneshot::channel::<Result<GameSnapshot>>();
        let game_id = config.game_id;
        let seed_task = tokio::spawn(async move {
            let result = fetcher.fetch_game(game_id).await;
            let _ = seed_tx.send(result);
        });
        let seed_abort = seed_task.abort_handle();

        let shutdown_timeout = config.shutdown_timeout;
        let task = tokio::spawn(lobby_loop(
            connector,
            config,
            cmd_rx,
            event_tx,
            Arc::clone(&state),
            conn_tx,
            session_tx,
            shutdown_rx,
            seed_rx,
            seed_task,
        ));

        let client = Self {
            cmd_tx,
            state,
            conn_rx,
            session_rx,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            seed_abort,
            shutdown_timeout,
            game_id,
        };

        (client, event_rx)
    }

    // ── Command dispatch ────────────────────────────────────────────

    /// Dispatch an outbound command.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::NotConnected`] if the transport is not
    /// currently connected; the command is not queued.
    pub fn dispatch(&self, command: Command) -> Result<()> {
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(LobbyError::NotConnected);
        }
        self.cmd_tx
            .send(command.into_frame())
            .map_err(|_| LobbyError::NotConnected)
    }

    /// Request creation of a new session.
    ///
    /// The acknowledgment arrives on the personal-result queue and seeds
    /// the view if the REST seed has not resolved first.
    pub fn create_game(&self, name: impl Into<String>, max_players: u8) -> Result<()> {
        self.dispatch(Command::CreateGame {
            name: name.into(),
            max_players,
        })
    }

    /// Join this view's session.
    pub fn join_game(&self) -> Result<()> {
        self.dispatch(Command::JoinGame {
            game_id: self.game_id,
        })
    }

    /// Leave this view's session.
    pub fn leave_game(&self) -> Result<()> {
        self.dispatch(Command::LeaveGame {
            game_id: self.game_id,
        })
    }

    /// Start this view's session (creator only; enforced server-side).
    pub fn start_game(&self) -> Result<()> {
        self.dispatch(Command::StartGame {
            game_id: self.game_id,
        })
    }

    /// Request an exclusive color.
    ///
    /// Never applied optimistically: a successful change comes back as a
    /// `PLAYER_COLOR_CHANGED` event, a collision as a rejection on the
    /// error queue.
    pub fn change_color(&self, color: PlayerColor) -> Result<()> {
        self.dispatch(Command::ChangeColor {
            game_id: self.game_id,
            color,
        })
    }

    // ── Observers ───────────────────────────────────────────────────

    /// Returns `true` if the transport is believed to be connected.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Watch stream of connection state transitions.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.conn_rx.clone()
    }

    /// The latest published session snapshot, if the session is forming.
    pub fn session(&self) -> Option<Session> {
        self.session_rx.borrow().clone()
    }

    /// Watch stream of published session snapshots.
    pub fn watch_session(&self) -> watch::Receiver<Option<Session>> {
        self.session_rx.clone()
    }

    /// The session id this view synchronizes.
    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    // ── Teardown ────────────────────────────────────────────────────

    /// Shut down the view: close the transport, stop the loop, abandon
    /// the seed fetch. The event receiver yields `None` once the loop
    /// exits.
    pub async fn shutdown(&mut self) {
        debug!("LobbyClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the loop with a timeout; abort if it does not exit so the
        // task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("connection loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("connection loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("connection loop aborted: {join_err}");
                    }
                }
            }
        }

        // Normally a no-op: the loop aborts the seed task on exit. Covers
        // the case where the loop itself had to be aborted above.
        self.seed_abort.abort();
        self.state.connected.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for LobbyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LobbyClient")
            .field("game_id", &self.game_id)
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for LobbyClient {
    fn drop(&mut self) {
        // `Drop` is synchronous, so the graceful path (which awaits
        // `transport.close()`) cannot run here; aborting the task drops
        // the loop future immediately. The seed fetch is aborted directly
        // because the dropped loop can no longer do it.
        self.seed_abort.abort();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Connection loop ─────────────────────────────────────────────────

/// Why the loop is exiting for good.
enum Exit {
    /// Shutdown requested or handle dropped.
    Shutdown,
    /// The seed fetch failed with no snapshot to fall back on.
    SeedFailed,
}

/// Background loop: connection lifecycle, heartbeats, subscription
/// replay, command relay, and reconciliation — all on one logical task,
/// so the reconciler never runs concurrently with itself.
#[allow(clippy::too_many_arguments)]
async fn lobby_loop(
    mut connector: impl Connector,
    config: LobbyConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientFrame>,
    event_tx: mpsc::Sender<LobbyEvent>,
    state: Arc<ClientState>,
    conn_tx: watch::Sender<ConnectionState>,
    session_tx: watch::Sender<Option<Session>>,
    mut shutdown_rx: oneshot::Receiver<()>,
    mut seed_rx: oneshot::Receiver<Result<GameSnapshot>>,
    seed_task: tokio::task::JoinHandle<()>,
) {
    debug!(game_id = config.game_id, "lobby loop started");

    let mut reconciler = Reconciler::new(config.game_id);

    // Registered handlers forward onto an internal queue that the loop
    // drains synchronously after each dispatch, preserving per-topic FIFO
    // order.
    let (routed_tx, mut routed_rx) = mpsc::unbounded_channel::<InboundEvent>();
    let mut registry = SubscriptionRegistry::new();
    for topic in topics::ALL {
        let tx = routed_tx.clone();
        registry.register(
            topic,
            Box::new(move |event| {
                let _ = tx.send(event);
            }),
        );
    }

    let mut policy = ReconnectPolicy::new(config.reconnect_delay);
    let mut seeded = false;
    let mut first_attempt = true;

    let exit: Exit = 'outer: loop {
        // Wait out the reconnect delay (except before the first attempt),
        // still responsive to shutdown and the seed result.
        if !first_attempt {
            let delay = policy.next_delay();
            debug!(attempt = policy.attempt(), "reconnecting in {delay:?}");
            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break 'outer Exit::Shutdown,
                    res = &mut seed_rx, if !seeded => {
                        seeded = true;
                        if !consume_seed(res, &mut reconciler, &session_tx, &event_tx).await {
                            break 'outer Exit::SeedFailed;
                        }
                    }
                    () = &mut sleep => break,
                }
            }
        }
        first_attempt = false;

        let _ = conn_tx.send(ConnectionState::Connecting);
        let mut transport = tokio::select! {
            _ = &mut shutdown_rx => break 'outer Exit::Shutdown,
            res = connector.connect() => match res {
                Ok(transport) => transport,
                Err(e) => {
                    warn!("connection attempt failed: {e}");
                    let _ = conn_tx.send(ConnectionState::Disconnected);
                    continue 'outer;
                }
            }
        };

        policy.on_success();
        state.connected.store(true, Ordering::Release);
        let _ = conn_tx.send(ConnectionState::Connected);
        // Connected is announced before any subscription replay so
        // observers see the transition first.
        emit_event(&event_tx, LobbyEvent::Connected).await;
        info!(game_id = config.game_id, "connected");

        // Replay the durable subscription intents on the fresh transport.
        let mut disconnect_reason: Option<Option<String>> = None;
        for topic in registry.replay() {
            if let Err(e) = send_frame(&mut transport, &ClientFrame::Subscribe { topic }).await {
                disconnect_reason = Some(Some(e.to_string()));
                break;
            }
        }

        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + config.heartbeat_interval,
            config.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let idle = tokio::time::sleep(config.heartbeat_timeout);
        tokio::pin!(idle);

        // Steady state: multiplex outbound frames, inbound frames,
        // heartbeats, the seed result, and shutdown.
        let reason: Option<String> = loop {
            if let Some(reason) = disconnect_reason.take() {
                break reason;
            }
            tokio::select! {
                _ = &mut shutdown_rx => {
                    let _ = transport.close().await;
                    break 'outer Exit::Shutdown;
                }

                res = &mut seed_rx, if !seeded => {
                    seeded = true;
                    if !consume_seed(res, &mut reconciler, &session_tx, &event_tx).await {
                        let _ = transport.close().await;
                        break 'outer Exit::SeedFailed;
                    }
                }

                cmd = cmd_rx.recv() => match cmd {
                    Some(frame) => {
                        if let Err(e) = send_frame(&mut transport, &frame).await {
                            break Some(e.to_string());
                        }
                    }
                    // Command channel closed — handle dropped.
                    None => {
                        debug!("command channel closed, shutting down lobby loop");
                        let _ = transport.close().await;
                        break 'outer Exit::Shutdown;
                    }
                },

                _ = heartbeat.tick() => {
                    if let Err(e) = send_frame(&mut transport, &ClientFrame::Ping).await {
                        break Some(e.to_string());
                    }
                }

                () = &mut idle => {
                    warn!("no inbound traffic within heartbeat timeout, treating as lost");
                    let _ = transport.close().await;
                    break Some("heartbeat timeout".into());
                }

                incoming = transport.recv() => match incoming {
                    Some(Ok(text)) => {
                        idle.as_mut().reset(Instant::now() + config.heartbeat_timeout);
                        handle_frame(&text, &mut registry);
                        while let Ok(event) = routed_rx.try_recv() {
                            let effects = reconciler.apply(event);
                            publish_effects(effects, &session_tx, &event_tx).await;
                        }
                    }
                    Some(Err(e)) => {
                        error!("inbound transport failure: {e}");
                        break Some(e.to_string());
                    }
                    // Transport closed by the server.
                    None => {
                        debug!("transport closed by server");
                        break None;
                    }
                },
            }
        };

        // Unexpected close: never fatal, always retried. Subscriptions do
        // not survive the transport, so forget them for the next replay.
        registry.mark_disconnected();
        state.connected.store(false, Ordering::Release);
        let _ = conn_tx.send(ConnectionState::Disconnected);
        emit_critical(&event_tx, LobbyEvent::Disconnected { reason }).await;
    };

    // Teardown: abandon the in-flight seed fetch and announce the final
    // disconnect.
    seed_task.abort();
    registry.mark_disconnected();
    state.connected.store(false, Ordering::Release);
    let _ = conn_tx.send(ConnectionState::Disconnected);
    let reason = match exit {
        Exit::Shutdown => "client shut down",
        Exit::SeedFailed => "seed fetch failed",
    };
    emit_critical(
        &event_tx,
        LobbyEvent::Disconnected {
            reason: Some(reason.into()),
        },
    )
    .await;

    debug!(game_id = config.game_id, "lobby loop exited");
}

/// Serialize and send one outbound frame.
async fn send_frame(transport: &mut impl Transport, frame: &ClientFrame) -> Result<()> {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            // Serialization errors are programming bugs; don't kill the loop.
            error!("failed to serialize outbound frame: {e}");
            return Ok(());
        }
    };
    debug!("sending frame: {:?}", std::mem::discriminant(frame));
    transport.send(json).await.map_err(|e| {
        error!("transport send error: {e}");
        e
    })
}

/// Decode an inbound frame and route it through the registry.
fn handle_frame(text: &str, registry: &mut SubscriptionRegistry) {
    let frame = match serde_json::from_str::<ServerFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            // Malformed frames are logged and dropped; they must never
            // crash the reconciler or corrupt the snapshot.
            warn!("failed to decode server frame: {e} — raw: {text}");
            return;
        }
    };
    match frame.topic {
        Some(topic) => {
            if !registry.dispatch(&topic, frame.event) {
                debug!(topic = %topic, "event on unregistered topic dropped");
            }
        }
        // Topic-less frames are heartbeat replies; receiving one already
        // reset the idle timer.
        None => debug!("received topic-less frame"),
    }
}

/// Consume the seed fetch result. Returns `false` if the view must be
/// abandoned.
async fn consume_seed(
    res: std::result::Result<Result<GameSnapshot>, oneshot::error::RecvError>,
    reconciler: &mut Reconciler,
    session_tx: &watch::Sender<Option<Session>>,
    event_tx: &mpsc::Sender<LobbyEvent>,
) -> bool {
    match res {
        Ok(Ok(snapshot)) => {
            let effects = reconciler.seed(snapshot);
            publish_effects(effects, session_tx, event_tx).await;
            true
        }
        Ok(Err(e)) => {
            // A creation acknowledgment may have seeded the session while
            // the fetch was failing; only an unseeded view is unusable.
            if reconciler.snapshot().is_some() || reconciler.phase().is_terminal() {
                warn!("seed fetch failed after session was already seeded: {e}");
                return true;
            }
            error!("seed fetch failed, abandoning session view: {e}");
            emit_critical(
                event_tx,
                LobbyEvent::SeedFailed {
                    message: e.to_string(),
                },
            )
            .await;
            false
        }
        Err(_) => {
            error!("seed fetch task dropped without a result");
            emit_critical(
                event_tx,
                LobbyEvent::SeedFailed {
                    message: "seed fetch aborted".into(),
                },
            )
            .await;
            false
        }
    }
}

/// Publish reconciler effects to the watch channel and the event stream.
async fn publish_effects(
    effects: Vec<Effect>,
    session_tx: &watch::Sender<Option<Session>>,
    event_tx: &mpsc::Sender<LobbyEvent>,
) {
    for effect in effects {
        match effect {
            Effect::SnapshotChanged(session) => {
                let _ = session_tx.send(Some(session.clone()));
                emit_event(event_tx, LobbyEvent::SessionUpdated { session }).await;
            }
            Effect::Cancelled { game_id, message } => {
                let _ = session_tx.send(None);
                emit_critical(event_tx, LobbyEvent::SessionCancelled { game_id, message }).await;
            }
            Effect::Started { game_id } => {
                let _ = session_tx.send(None);
                emit_critical(event_tx, LobbyEvent::SessionStarted { game_id }).await;
            }
            Effect::Rejected { message } => {
                emit_event(event_tx, LobbyEvent::CommandRejected { message }).await;
            }
        }
    }
}

/// Emit a droppable event. If the channel is full, log and drop rather
/// than blocking the connection loop.
async fn emit_event(event_tx: &mpsc::Sender<LobbyEvent>, event: LobbyEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit an event that must never be dropped (disconnects and terminal
/// notifications): blocks on channel capacity instead of dropping.
async fn emit_critical(event_tx: &mpsc::Sender<LobbyEvent>, event: LobbyEvent) {
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
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
    use crate::protocol::{PlayerEntry, UserSummary};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    // ── Mocks ───────────────────────────────────────────────────────

    /// Scripted transport: `recv()` replays the given items, then hangs.
    struct MockTransport {
        incoming: VecDeque<Option<Result<String>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<Result<String>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            };
            (transport, sent, closed)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Yields scripted transports (or connect errors) in order, then
    /// hangs on further attempts.
    struct MockConnector {
        outcomes: VecDeque<Result<MockTransport>>,
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Output = MockTransport;

        async fn connect(&mut self) -> Result<MockTransport> {
            match self.outcomes.pop_front() {
                Some(outcome) => outcome,
                None => std::future::pending().await,
            }
        }
    }

    /// Immediate seed fetcher.
    struct MockFetcher {
        result: StdMutex<Option<Result<GameSnapshot>>>,
    }

    impl MockFetcher {
        fn ok(snapshot: GameSnapshot) -> Self {
            Self {
                result: StdMutex::new(Some(Ok(snapshot))),
            }
        }

        fn err(message: &str) -> Self {
            Self {
                result: StdMutex::new(Some(Err(LobbyError::SeedFetch {
                    message: message.into(),
                }))),
            }
        }
    }

    #[async_trait]
    impl SeedFetcher for MockFetcher {
        async fn fetch_game(&self, _game_id: GameId) -> Result<GameSnapshot> {
            self.result
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(LobbyError::SeedFetch {
                    message: "already fetched".into(),
                }))
        }
    }

    /// Fetcher that never resolves; its future being dropped (on abort)
    /// drops the fetcher itself, which raises the flag.
    struct HangingFetcher {
        dropped: Arc<AtomicBool>,
    }

    impl Drop for HangingFetcher {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::Relaxed);
        }
    }

    #[async_trait]
    impl SeedFetcher for HangingFetcher {
        async fn fetch_game(&self, _game_id: GameId) -> Result<GameSnapshot> {
            std::future::pending().await
        }
    }

    fn snapshot(game_id: GameId) -> GameSnapshot {
        GameSnapshot {
            id: game_id,
            name: "test-game".into(),
            max_players: 4,
            created_by: UserSummary {
                id: 1,
                username: "u1".into(),
            },
            players: vec![PlayerEntry {
                user: UserSummary {
                    id: 1,
                    username: "u1".into(),
                },
                color: None,
                joined_at: None,
            }],
            status: None,
            created_at: None,
        }
    }

    fn test_config() -> LobbyConfig {
        LobbyConfig::new(1)
            .with_reconnect_delay(Duration::from_millis(10))
            .with_heartbeat(Duration::from_secs(30), Duration::from_secs(60))
            .with_shutdown_timeout(Duration::from_millis(200))
    }

    async fn recv_until<F>(events: &mut mpsc::Receiver<LobbyEvent>, pred: F) -> LobbyEvent
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

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn config_defaults() {
        let config = LobbyConfig::new(7);
        assert_eq!(config.game_id, 7);
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(4));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(10));
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn event_channel_capacity_is_clamped_to_one() {
        let config = LobbyConfig::new(1).with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[tokio::test]
    async fn connected_is_first_event() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let connector = MockConnector {
            outcomes: VecDeque::from([Ok(transport)]),
        };
        let (mut client, mut events) =
            LobbyClient::start(connector, MockFetcher::ok(snapshot(1)), test_config());

        let first = events.recv().await.unwrap();
        assert_eq!(first, LobbyEvent::Connected);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn subscribes_all_topics_after_connecting() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let connector = MockConnector {
            outcomes: VecDeque::from([Ok(transport)]),
        };
        let (mut client, mut events) =
            LobbyClient::start(connector, MockFetcher::ok(snapshot(1)), test_config());

        let _ = recv_until(&mut events, |e| {
            matches!(e, LobbyEvent::SessionUpdated { .. })
        })
        .await;

        let subscribed: Vec<String> = sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|json| match serde_json::from_str::<ClientFrame>(json) {
                Ok(ClientFrame::Subscribe { topic }) => Some(topic),
                _ => None,
            })
            .collect();
        for topic in topics::ALL {
            assert_eq!(
                subscribed.iter().filter(|t| *t == topic).count(),
                1,
                "expected exactly one subscription for {topic}"
            );
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn seed_publishes_initial_snapshot() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let connector = MockConnector {
            outcomes: VecDeque::from([Ok(transport)]),
        };
        let (mut client, mut events) =
            LobbyClient::start(connector, MockFetcher::ok(snapshot(1)), test_config());

        let event = recv_until(&mut events, |e| {
            matches!(e, LobbyEvent::SessionUpdated { .. })
        })
        .await;
        if let LobbyEvent::SessionUpdated { session } = event {
            assert_eq!(session.id, 1);
            assert_eq!(session.roster().len(), 1);
        }
        assert!(client.session().is_some());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn dispatch_fails_not_connected_after_shutdown() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let connector = MockConnector {
            outcomes: VecDeque::from([Ok(transport)]),
        };
        let (mut client, mut events) =
            LobbyClient::start(connector, MockFetcher::ok(snapshot(1)), test_config());

        let _ = events.recv().await; // Connected
        client.shutdown().await;

        let result = client.join_game();
        assert!(matches!(result, Err(LobbyError::NotConnected)));
    }

    #[tokio::test]
    async fn dispatch_fails_before_first_connection() {
        // Connector that never produces a transport.
        let connector = MockConnector {
            outcomes: VecDeque::new(),
        };
        let (mut client, _events) =
            LobbyClient::start(connector, MockFetcher::ok(snapshot(1)), test_config());

        assert!(matches!(client.join_game(), Err(LobbyError::NotConnected)));
        assert!(!client.is_connected());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn join_game_sends_frame_on_destination() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let connector = MockConnector {
            outcomes: VecDeque::from([Ok(transport)]),
        };
        let (mut client, mut events) =
            LobbyClient::start(connector, MockFetcher::ok(snapshot(1)), test_config());

        let _ = events.recv().await; // Connected
        client.join_game().unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        let frames: Vec<ClientFrame> = sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|json| serde_json::from_str(json).ok())
            .collect();
        assert!(frames.iter().any(|f| matches!(
            f,
            ClientFrame::Send { destination, .. } if destination == "/app/game/1/join"
        )));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn seed_failure_emits_seed_failed_and_exits() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let connector = MockConnector {
            outcomes: VecDeque::from([Ok(transport)]),
        };
        let (mut client, mut events) =
            LobbyClient::start(connector, MockFetcher::err("game not found"), test_config());

        let event = recv_until(&mut events, |e| matches!(e, LobbyEvent::SeedFailed { .. })).await;
        if let LobbyEvent::SeedFailed { message } = event {
            assert!(message.contains("game not found"));
        }

        // The loop exits: final Disconnected then channel close.
        let _ = recv_until(&mut events, |e| {
            matches!(e, LobbyEvent::Disconnected { .. })
        })
        .await;
        assert!(events.recv().await.is_none());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_emits_disconnected_and_closes_transport() {
        let (transport, _sent, closed) = MockTransport::new(vec![]);
        let connector = MockConnector {
            outcomes: VecDeque::from([Ok(transport)]),
        };
        let (mut client, mut events) =
            LobbyClient::start(connector, MockFetcher::ok(snapshot(1)), test_config());

        let _ = events.recv().await; // Connected
        client.shutdown().await;

        let event = recv_until(&mut events, |e| {
            matches!(e, LobbyEvent::Disconnected { .. })
        })
        .await;
        if let LobbyEvent::Disconnected { reason } = event {
            assert_eq!(reason.as_deref(), Some("client shut down"));
        }
        assert!(closed.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let connector = MockConnector {
            outcomes: VecDeque::from([Ok(transport)]),
        };
        let (mut client, mut events) =
            LobbyClient::start(connector, MockFetcher::ok(snapshot(1)), test_config());

        let _ = events.recv().await;
        client.shutdown().await;
        client.shutdown().await;
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown_does_not_hang() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let connector = MockConnector {
            outcomes: VecDeque::from([Ok(transport)]),
        };
        let (client, mut events) =
            LobbyClient::start(connector, MockFetcher::ok(snapshot(1)), test_config());

        let _ = events.recv().await; // Connected
        drop(client);

        // The loop task is aborted; the event channel closes eventually.
        while let Some(_event) = events.recv().await {}
    }

    #[tokio::test]
    async fn drop_aborts_the_in_flight_seed_fetch() {
        let dropped = Arc::new(AtomicBool::new(false));
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let connector = MockConnector {
            outcomes: VecDeque::from([Ok(transport)]),
        };
        let (client, mut events) = LobbyClient::start(
            connector,
            HangingFetcher {
                dropped: Arc::clone(&dropped),
            },
            test_config(),
        );

        let _ = events.recv().await; // Connected
        assert!(!dropped.load(Ordering::Relaxed));
        drop(client);

        // The abort lands asynchronously.
        for _ in 0..100 {
            if dropped.load(Ordering::Relaxed) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(
            dropped.load(Ordering::Relaxed),
            "in-flight seed fetch survived the handle drop"
        );
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let connector = MockConnector {
            outcomes: VecDeque::from([Ok(transport)]),
        };
        let (mut client, mut events) =
            LobbyClient::start(connector, MockFetcher::ok(snapshot(1)), test_config());

        let _ = events.recv().await;
        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("LobbyClient"));
        assert!(debug_str.contains("game_id"));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn connect_failure_is_retried() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let connector = MockConnector {
            outcomes: VecDeque::from([
                Err(LobbyError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                ))),
                Ok(transport),
            ]),
        };
        let (mut client, mut events) =
            LobbyClient::start(connector, MockFetcher::ok(snapshot(1)), test_config());

        // First attempt fails silently; the retry succeeds.
        let first = recv_until(&mut events, |e| matches!(e, LobbyEvent::Connected)).await;
        assert_eq!(first, LobbyEvent::Connected);

        client.shutdown().await;
    }
}
