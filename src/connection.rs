//! Room connection: one logical channel per mounted room view.
//!
//! [`RoomConnection`] is a thin handle that talks to a background connection
//! loop over an unbounded MPSC channel. The loop asks its [`Connector`] for a
//! transport, sends `join-room` as the first frame, and then multiplexes
//! outgoing commands and inbound frames. When the transport drops it backs off
//! and reconnects, sending `join-room` again on every new transport.
//!
//! Events reach exactly one subscriber at a time. [`RoomConnection::subscribe`]
//! detaches the current subscriber before attaching a new one, so repeated
//! subscription cycles can never deliver the same event twice.
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = WebSocketConnector::new("ws://localhost:3000/ws");
//! let identity = Identity::new("u1", "Alice");
//! let (mut room, mut events) =
//!     RoomConnection::open(connector, "abc123", identity, ConnectionConfig::default())?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         RoomEvent::RoomState(snapshot) => { /* … */ }
//!         RoomEvent::RoomDeleted { .. } => break,
//!         _ => {}
//!     }
//! }
//! room.close().await;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::{CaroError, Result};
use crate::event::RoomEvent;
use crate::lobby::normalize_room_code;
use crate::protocol::{ClientMessage, Coord, Identity, ServerMessage};
use crate::transport::{Connector, Transport};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Delay before the first reconnect attempt.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for the doubling reconnect delay.
const DEFAULT_RECONNECT_DELAY_MAX: Duration = Duration::from_secs(5);

// ── Configuration ───────────────────────────────────────────────────

/// Tuning for a [`RoomConnection`].
///
/// # Example
///
/// ```
/// use caro_room_client::connection::ConnectionConfig;
/// use std::time::Duration;
///
/// let config = ConnectionConfig::new()
///     .with_reconnect_delay(Duration::from_millis(500))
///     .with_max_reconnect_attempts(10);
/// assert_eq!(config.max_reconnect_attempts, Some(10));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Capacity of the bounded event channel.
    ///
    /// Room snapshots that arrive while the subscriber is full are dropped with
    /// a warning; the next snapshot carries the full state anyway. Terminal
    /// events are always delivered. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long [`RoomConnection::close`] waits for the loop before aborting it.
    pub shutdown_timeout: Duration,
    /// Delay before the first reconnect attempt; doubles on each failure.
    pub reconnect_delay: Duration,
    /// Cap for the doubling reconnect delay.
    pub reconnect_delay_max: Duration,
    /// Consecutive failed attempts tolerated before giving up. `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self {
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            reconnect_delay_max: DEFAULT_RECONNECT_DELAY_MAX,
            max_reconnect_attempts: None,
        }
    }

    /// Set the capacity of the bounded event channel. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown. Zero aborts immediately.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    #[must_use]
    pub fn with_reconnect_delay_max(mut self, delay: Duration) -> Self {
        self.reconnect_delay_max = delay;
        self
    }

    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.reconnect_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.reconnect_delay_max)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the handle and the connection loop.
struct ConnectionState {
    connected: AtomicBool,
    closed: AtomicBool,
    terminated: AtomicBool,
    joins_sent: AtomicU32,
    /// The single attached subscriber, if any.
    subscriber: StdMutex<Option<mpsc::Sender<RoomEvent>>>,
}

impl ConnectionState {
    fn new(subscriber: mpsc::Sender<RoomEvent>) -> Self {
        Self {
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            joins_sent: AtomicU32::new(0),
            subscriber: StdMutex::new(Some(subscriber)),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<mpsc::Sender<RoomEvent>>> {
        self.subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the subscriber. Dropping the old sender closes its receiver.
    fn attach(&self, sender: mpsc::Sender<RoomEvent>) {
        *self.slot() = Some(sender);
    }

    fn detach(&self) -> bool {
        self.slot().take().is_some()
    }
}

// ── Handle ──────────────────────────────────────────────────────────

/// Handle to one room channel.
///
/// Created via [`RoomConnection::open`]. Exclusively owned by the room view
/// that opened it; [`close`](Self::close) (or dropping the handle) releases
/// the channel.
pub struct RoomConnection {
    room_code: String,
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    state: Arc<ConnectionState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
    event_channel_capacity: usize,
}

impl RoomConnection {
    /// Open a channel to `room_code` as `identity` and return the handle plus
    /// the receiver of the first subscription.
    ///
    /// The room code is trimmed and uppercased.
    ///
    /// # Errors
    ///
    /// Returns [`CaroError::InvalidRoomCode`] if the code is blank.
    pub fn open<C: Connector>(
        connector: C,
        room_code: &str,
        identity: Identity,
        config: ConnectionConfig,
    ) -> Result<(Self, mpsc::Receiver<RoomEvent>)> {
        let room_code = normalize_room_code(room_code)?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        // tokio panics on a zero-capacity channel.
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<RoomEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(ConnectionState::new(event_tx));

        info!(room = %room_code, player = %identity.id, "opening room connection");
        let task = tokio::spawn(connection_loop(
            connector,
            room_code.clone(),
            identity,
            cmd_rx,
            Arc::clone(&state),
            shutdown_rx,
            config.clone(),
        ));

        let connection = Self {
            room_code,
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
            event_channel_capacity: capacity,
        };
        Ok((connection, event_rx))
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Request a move at `coord`.
    ///
    /// Commands issued while the transport is reconnecting are queued and
    /// flushed right after the next `join-room`.
    ///
    /// # Errors
    ///
    /// Returns [`CaroError::Terminated`] after the room was deleted and
    /// [`CaroError::NotConnected`] after the connection closed.
    pub fn make_move(&self, coord: Coord) -> Result<()> {
        self.send(ClientMessage::MakeMove {
            x: coord.x,
            y: coord.y,
        })
    }

    /// Ask the server to reset the board. Only the host's request takes effect.
    ///
    /// # Errors
    ///
    /// Same as [`make_move`](Self::make_move).
    pub fn restart(&self) -> Result<()> {
        self.send(ClientMessage::Restart)
    }

    // ── Subscription ────────────────────────────────────────────────

    /// Detach the current subscriber and attach a fresh one.
    ///
    /// The previous receiver yields `None` once drained; every later event
    /// goes only to the returned receiver.
    pub fn subscribe(&self) -> mpsc::Receiver<RoomEvent> {
        let (tx, rx) = mpsc::channel(self.event_channel_capacity);
        self.state.attach(tx);
        debug!(room = %self.room_code, "subscriber attached");
        rx
    }

    /// Detach the current subscriber. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if self.state.detach() {
            debug!(room = %self.room_code, "subscriber detached");
        }
    }

    /// Detach the subscriber, stop the loop and close the transport.
    ///
    /// The subscriber is detached before anything is awaited, so no event
    /// reaches it once this method has been called.
    pub async fn close(&mut self) {
        self.unsubscribe();
        debug!(room = %self.room_code, "close requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Abort the loop if it does not exit in time so it cannot detach and
        // keep the transport alive.
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

        self.state.connected.store(false, Ordering::Release);
        self.state.closed.store(true, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// The normalized room code this channel joins.
    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    /// `true` while a transport is up and joined.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// `true` once the joined room was deleted.
    pub fn is_terminated(&self) -> bool {
        self.state.terminated.load(Ordering::Acquire)
    }

    /// `true` once the loop has exited for good.
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    /// Number of `join-room` frames sent so far, one per established transport.
    pub fn joins_sent(&self) -> u32 {
        self.state.joins_sent.load(Ordering::Acquire)
    }

    fn send(&self, msg: ClientMessage) -> Result<()> {
        if self.is_terminated() {
            return Err(CaroError::Terminated {
                room_code: self.room_code.clone(),
            });
        }
        if self.is_closed() {
            return Err(CaroError::NotConnected);
        }
        self.cmd_tx
            .send(msg)
            .map_err(|_| CaroError::NotConnected)
    }
}

impl std::fmt::Debug for RoomConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomConnection")
            .field("room_code", &self.room_code)
            .field("connected", &self.is_connected())
            .field("terminated", &self.is_terminated())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for RoomConnection {
    fn drop(&mut self) {
        // `Drop` cannot await the graceful path; detach and abort so the loop
        // future (and the transport it owns) is dropped right away.
        self.state.detach();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Connection loop ─────────────────────────────────────────────────

/// Why a joined session on one transport ended.
enum SessionEnd {
    /// `close()` was called or the handle was dropped.
    Shutdown,
    /// The joined room was deleted.
    RoomDeleted,
    /// The transport dropped; reconnect.
    Dropped(Option<String>),
}

async fn connection_loop<C: Connector>(
    mut connector: C,
    room_code: String,
    identity: Identity,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    state: Arc<ConnectionState>,
    mut shutdown_rx: oneshot::Receiver<()>,
    config: ConnectionConfig,
) {
    debug!(room = %room_code, "connection loop started");
    let mut failures: u32 = 0;
    let mut established: u32 = 0;

    loop {
        let attempt = tokio::select! {
            _ = &mut shutdown_rx => {
                finish(&state, Some("client shut down".into())).await;
                return;
            }
            attempt = connector.connect() => attempt,
        };

        let mut transport = match attempt {
            Ok(transport) => transport,
            Err(e) => {
                warn!(room = %room_code, "connect attempt failed: {e}");
                failures += 1;
                if !wait_before_retry(&config, failures, &state, &mut shutdown_rx, e.to_string())
                    .await
                {
                    return;
                }
                continue;
            }
        };

        // The server keeps no session across drops: join first, every time.
        let join = ClientMessage::JoinRoom {
            room_id: room_code.clone(),
            user: identity.clone(),
        };
        if let Err(e) = send_message(&mut transport, &join).await {
            error!(room = %room_code, "failed to send join-room: {e}");
            let _ = transport.close().await;
            emit_event(&state, RoomEvent::Disconnected {
                reason: Some(e.to_string()),
            });
            failures += 1;
            if !wait_before_retry(&config, failures, &state, &mut shutdown_rx, e.to_string()).await
            {
                return;
            }
            continue;
        }

        failures = 0;
        established += 1;
        state.joins_sent.fetch_add(1, Ordering::AcqRel);
        state.connected.store(true, Ordering::Release);
        info!(room = %room_code, attempt = established, "joined room");
        emit_event(&state, RoomEvent::Connected {
            attempt: established,
        });

        let end = run_session(
            &mut transport,
            &mut cmd_rx,
            &mut shutdown_rx,
            &state,
            &room_code,
        )
        .await;
        state.connected.store(false, Ordering::Release);

        match end {
            SessionEnd::Shutdown => {
                let _ = transport.close().await;
                finish(&state, Some("client shut down".into())).await;
                return;
            }
            SessionEnd::RoomDeleted => {
                let _ = transport.close().await;
                state.terminated.store(true, Ordering::Release);
                state.closed.store(true, Ordering::Release);
                state.detach();
                return;
            }
            SessionEnd::Dropped(reason) => {
                warn!(room = %room_code, ?reason, "channel dropped");
                emit_event(&state, RoomEvent::Disconnected {
                    reason: reason.clone(),
                });
                failures = 1;
                let reason = reason.unwrap_or_else(|| "closed by server".into());
                if !wait_before_retry(&config, failures, &state, &mut shutdown_rx, reason).await {
                    return;
                }
            }
        }
    }
}

/// Multiplex commands, shutdown and inbound frames on one joined transport.
async fn run_session(
    transport: &mut impl Transport,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    shutdown_rx: &mut oneshot::Receiver<()>,
    state: &ConnectionState,
    room_code: &str,
) -> SessionEnd {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(msg) = cmd else {
                    debug!("command channel closed, shutting down connection loop");
                    return SessionEnd::Shutdown;
                };
                if let Err(e) = send_message(transport, &msg).await {
                    error!("transport send error: {e}");
                    return SessionEnd::Dropped(Some(format!("transport send error: {e}")));
                }
            }

            _ = &mut *shutdown_rx => {
                debug!("shutdown signal received");
                return SessionEnd::Shutdown;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(ServerMessage::RoomState(snapshot)) => {
                            // Snapshots are never dropped: a full subscriber
                            // pauses reading until it drains.
                            tokio::select! {
                                () = deliver(state, RoomEvent::RoomState(snapshot)) => {}
                                _ = &mut *shutdown_rx => {
                                    debug!("shutdown signal received while delivering snapshot");
                                    return SessionEnd::Shutdown;
                                }
                            }
                        }
                        Ok(ServerMessage::RoomDeleted(deleted)) => {
                            if deleted.trim().eq_ignore_ascii_case(room_code) {
                                info!(room = %room_code, "room deleted by server");
                                deliver(state, RoomEvent::RoomDeleted { room_code: deleted }).await;
                                return SessionEnd::RoomDeleted;
                            }
                            debug!(room = %room_code, deleted = %deleted, "ignoring deletion of another room");
                        }
                        Err(e) => {
                            warn!("failed to deserialize server message: {e}, raw: {text}");
                        }
                    },
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        return SessionEnd::Dropped(Some(format!("transport receive error: {e}")));
                    }
                    None => {
                        debug!("transport closed by server");
                        return SessionEnd::Dropped(None);
                    }
                }
            }
        }
    }
}

async fn send_message(transport: &mut impl Transport, msg: &ClientMessage) -> Result<()> {
    let json = serde_json::to_string(msg)?;
    debug!("sending client message: {:?}", std::mem::discriminant(msg));
    transport.send(json).await
}

/// Emit `Reconnecting` and sleep the backoff for attempt `failures`.
///
/// Returns `false` when the loop must exit: attempts exhausted or shutdown.
async fn wait_before_retry(
    config: &ConnectionConfig,
    failures: u32,
    state: &ConnectionState,
    shutdown_rx: &mut oneshot::Receiver<()>,
    last_error: String,
) -> bool {
    if config
        .max_reconnect_attempts
        .is_some_and(|max| failures > max)
    {
        warn!("giving up after {} failed attempts", failures - 1);
        finish(state, Some(format!("reconnect attempts exhausted: {last_error}"))).await;
        return false;
    }

    let delay = config.backoff(failures);
    emit_event(state, RoomEvent::Reconnecting {
        attempt: failures,
        delay,
    });

    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = &mut *shutdown_rx => {
            finish(state, Some("client shut down".into())).await;
            false
        }
    }
}

/// Emit `Closed`, mark the loop as exited and release the subscriber.
async fn finish(state: &ConnectionState, reason: Option<String>) {
    state.connected.store(false, Ordering::Release);
    deliver(state, RoomEvent::Closed { reason }).await;
    state.closed.store(true, Ordering::Release);
    state.detach();
    debug!("connection loop exited");
}

/// Deliver a status event to the current subscriber, dropping it if the
/// subscriber is full.
///
/// The send happens under the slot lock so a subscriber detached by
/// `unsubscribe()` never sees a later event.
fn emit_event(state: &ConnectionState, event: RoomEvent) {
    let slot = state.slot();
    let Some(tx) = slot.as_ref() else {
        debug!("no subscriber attached, dropping event");
        return;
    };
    match tx.try_send(event) {
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

/// Deliver `event`, waiting for capacity instead of dropping it. Used for
/// snapshots and terminal events.
///
/// The subscriber is re-checked after waiting so the event still goes only to
/// the subscriber attached at delivery time.
async fn deliver(state: &ConnectionState, event: RoomEvent) {
    let (tx, event) = {
        let slot = state.slot();
        let Some(tx) = slot.as_ref() else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => return,
            Err(mpsc::error::TrySendError::Full(event)) => (tx.clone(), event),
        }
    };
    let Ok(permit) = tx.reserve().await else {
        return;
    };
    let slot = state.slot();
    if slot.as_ref().is_some_and(|current| current.same_channel(&tx)) {
        permit.send(event);
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
    use crate::protocol::{Board, Snapshot, Symbol, Winner};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    type Script = Vec<Option<std::result::Result<String, CaroError>>>;

    // ── Mock transport ──────────────────────────────────────────────

    /// Replays one scripted connection and records what the client sent.
    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, CaroError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), CaroError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, CaroError>> {
            if let Some(item) = self.incoming.pop_front() {
                // `None` scripts a clean close.
                item
            } else {
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), CaroError> {
            Ok(())
        }
    }

    /// Hands out one scripted transport per connect; fails once scripts run out.
    struct MockConnector {
        scripts: VecDeque<Script>,
        sent: Arc<StdMutex<Vec<String>>>,
        connects: Arc<AtomicUsize>,
    }

    impl MockConnector {
        fn new(scripts: Vec<Script>) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicUsize>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let connects = Arc::new(AtomicUsize::new(0));
            let connector = Self {
                scripts: VecDeque::from(scripts),
                sent: Arc::clone(&sent),
                connects: Arc::clone(&connects),
            };
            (connector, sent, connects)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Transport = MockTransport;

        async fn connect(&mut self) -> std::result::Result<MockTransport, CaroError> {
            self.connects.fetch_add(1, Ordering::AcqRel);
            let script = self.scripts.pop_front().ok_or(CaroError::TransportClosed)?;
            Ok(MockTransport {
                incoming: VecDeque::from(script),
                sent: Arc::clone(&self.sent),
            })
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn fast_config() -> ConnectionConfig {
        ConnectionConfig::new()
            .with_reconnect_delay(Duration::from_millis(5))
            .with_reconnect_delay_max(Duration::from_millis(20))
            .with_shutdown_timeout(Duration::from_millis(200))
    }

    fn alice() -> Identity {
        Identity::new("u-alice", "Alice")
    }

    fn snapshot(id: &str, next_turn: Symbol) -> Snapshot {
        Snapshot {
            id: id.into(),
            board: Board::default(),
            players: vec![],
            next_turn,
            winner: Winner::None,
            last_move: None,
            host_id: None,
        }
    }

    fn state_json(snapshot: &Snapshot) -> String {
        serde_json::to_string(&ServerMessage::RoomState(Box::new(snapshot.clone()))).unwrap()
    }

    fn deleted_json(code: &str) -> String {
        serde_json::to_string(&ServerMessage::RoomDeleted(code.into())).unwrap()
    }

    fn sent_messages(sent: &Arc<StdMutex<Vec<String>>>) -> Vec<ClientMessage> {
        sent.lock()
            .unwrap()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn join_room_is_first_frame() {
        let (connector, sent, _) = MockConnector::new(vec![vec![]]);
        let (mut room, mut events) =
            RoomConnection::open(connector, " abc123 ", alice(), fast_config()).unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event, RoomEvent::Connected { attempt: 1 });
        assert_eq!(room.room_code(), "ABC123");
        assert!(room.is_connected());

        let messages = sent_messages(&sent);
        assert_eq!(
            messages[0],
            ClientMessage::JoinRoom {
                room_id: "ABC123".into(),
                user: alice(),
            }
        );

        room.close().await;
    }

    #[tokio::test]
    async fn blank_room_code_is_rejected() {
        let (connector, _, _) = MockConnector::new(vec![]);
        let err = RoomConnection::open(connector, "   ", alice(), fast_config()).unwrap_err();
        assert!(matches!(err, CaroError::InvalidRoomCode));
    }

    #[tokio::test]
    async fn snapshots_arrive_in_order() {
        let first = snapshot("ABC123", Symbol::X);
        let second = snapshot("ABC123", Symbol::O);
        let (connector, _, _) = MockConnector::new(vec![vec![
            Some(Ok(state_json(&first))),
            Some(Ok(state_json(&second))),
        ]]);
        let (mut room, mut events) =
            RoomConnection::open(connector, "ABC123", alice(), fast_config()).unwrap();

        let _ = events.recv().await; // Connected
        assert_eq!(events.recv().await, Some(RoomEvent::RoomState(Box::new(first))));
        assert_eq!(events.recv().await, Some(RoomEvent::RoomState(Box::new(second))));

        room.close().await;
    }

    #[tokio::test]
    async fn full_subscriber_still_gets_latest_snapshot() {
        let first = snapshot("ABC123", Symbol::X);
        let mut finished = snapshot("ABC123", Symbol::O);
        finished.winner = Winner::Win(Symbol::X);
        let (connector, _, _) = MockConnector::new(vec![vec![
            Some(Ok(state_json(&first))),
            Some(Ok(state_json(&finished))),
        ]]);
        let config = fast_config().with_event_channel_capacity(1);
        let (mut room, mut events) =
            RoomConnection::open(connector, "ABC123", alice(), config).unwrap();

        // Let the loop run into the full queue before draining.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut received = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(100), events.recv()).await
        {
            received.push(event);
        }

        assert_eq!(
            received,
            vec![
                RoomEvent::Connected { attempt: 1 },
                RoomEvent::RoomState(Box::new(first)),
                RoomEvent::RoomState(Box::new(finished)),
            ]
        );
        room.close().await;
    }

    #[tokio::test]
    async fn close_while_subscriber_is_full_does_not_hang() {
        let snap = snapshot("ABC123", Symbol::X);
        let (connector, _, _) = MockConnector::new(vec![vec![
            Some(Ok(state_json(&snap))),
            Some(Ok(state_json(&snap))),
            Some(Ok(state_json(&snap))),
        ]]);
        let config = fast_config().with_event_channel_capacity(1);
        let (mut room, _events) =
            RoomConnection::open(connector, "ABC123", alice(), config).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(1), room.close())
            .await
            .expect("close returned");
        assert!(room.is_closed());
    }

    #[tokio::test]
    async fn reconnect_sends_join_again() {
        let snap = snapshot("ABC123", Symbol::X);
        let (connector, sent, connects) = MockConnector::new(vec![
            vec![None],
            vec![Some(Ok(state_json(&snap)))],
        ]);
        let (mut room, mut events) =
            RoomConnection::open(connector, "ABC123", alice(), fast_config()).unwrap();

        assert_eq!(events.recv().await, Some(RoomEvent::Connected { attempt: 1 }));
        assert_eq!(
            events.recv().await,
            Some(RoomEvent::Disconnected { reason: None })
        );
        assert!(matches!(
            events.recv().await,
            Some(RoomEvent::Reconnecting { attempt: 1, .. })
        ));
        assert_eq!(events.recv().await, Some(RoomEvent::Connected { attempt: 2 }));
        assert_eq!(events.recv().await, Some(RoomEvent::RoomState(Box::new(snap))));

        assert_eq!(connects.load(Ordering::Acquire), 2);
        assert_eq!(room.joins_sent(), 2);
        let joins = sent_messages(&sent)
            .into_iter()
            .filter(|m| matches!(m, ClientMessage::JoinRoom { .. }))
            .count();
        assert_eq!(joins, 2);

        room.close().await;
    }

    #[tokio::test]
    async fn matching_room_deleted_is_terminal() {
        let (connector, _, connects) =
            MockConnector::new(vec![vec![Some(Ok(deleted_json("abc123")))], vec![]]);
        let (mut room, mut events) =
            RoomConnection::open(connector, "ABC123", alice(), fast_config()).unwrap();

        let _ = events.recv().await; // Connected
        assert_eq!(
            events.recv().await,
            Some(RoomEvent::RoomDeleted {
                room_code: "abc123".into()
            })
        );
        // The subscriber is released once the loop exits.
        assert_eq!(events.recv().await, None);
        assert!(room.is_terminated());
        assert_eq!(connects.load(Ordering::Acquire), 1);

        let err = room.make_move(Coord::new(1, 1)).unwrap_err();
        assert!(matches!(err, CaroError::Terminated { .. }));

        room.close().await;
    }

    #[tokio::test]
    async fn other_room_deleted_is_ignored() {
        let snap = snapshot("ABC123", Symbol::X);
        let (connector, _, _) = MockConnector::new(vec![vec![
            Some(Ok(deleted_json("ZZZ999"))),
            Some(Ok(state_json(&snap))),
        ]]);
        let (mut room, mut events) =
            RoomConnection::open(connector, "ABC123", alice(), fast_config()).unwrap();

        let _ = events.recv().await; // Connected
        assert_eq!(events.recv().await, Some(RoomEvent::RoomState(Box::new(snap))));
        assert!(!room.is_terminated());

        room.close().await;
    }

    #[tokio::test]
    async fn malformed_frame_does_not_drop_channel() {
        let snap = snapshot("ABC123", Symbol::X);
        let (connector, _, connects) = MockConnector::new(vec![vec![
            Some(Ok("{not json".into())),
            Some(Ok(r#"{"event":"room-state","data":{"id":"ABC123"}}"#.into())),
            Some(Ok(state_json(&snap))),
        ]]);
        let (mut room, mut events) =
            RoomConnection::open(connector, "ABC123", alice(), fast_config()).unwrap();

        let _ = events.recv().await; // Connected
        assert_eq!(events.recv().await, Some(RoomEvent::RoomState(Box::new(snap))));
        assert_eq!(connects.load(Ordering::Acquire), 1);

        room.close().await;
    }

    #[tokio::test]
    async fn make_move_and_restart_frames() {
        let (connector, sent, _) = MockConnector::new(vec![vec![]]);
        let (mut room, mut events) =
            RoomConnection::open(connector, "ABC123", alice(), fast_config()).unwrap();
        let _ = events.recv().await; // Connected

        room.make_move(Coord::new(3, 4)).unwrap();
        room.restart().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let messages = sent_messages(&sent);
        assert_eq!(messages[1], ClientMessage::MakeMove { x: 3, y: 4 });
        assert_eq!(messages[2], ClientMessage::Restart);

        room.close().await;
    }

    #[tokio::test]
    async fn subscribe_replaces_previous_subscriber() {
        let (connector, _, _) = MockConnector::new(vec![vec![]]);
        let (mut room, mut first) =
            RoomConnection::open(connector, "ABC123", alice(), fast_config()).unwrap();
        let _ = first.recv().await; // Connected

        let mut second = room.subscribe();
        let mut third = room.subscribe();
        // Earlier receivers are closed, not duplicated.
        assert_eq!(first.recv().await, None);
        assert_eq!(second.recv().await, None);
        assert!(third.try_recv().is_err());

        room.unsubscribe();
        room.unsubscribe();
        assert_eq!(third.recv().await, None);

        room.close().await;
    }

    #[tokio::test]
    async fn close_detaches_before_loop_exits() {
        let (connector, _, _) = MockConnector::new(vec![vec![]]);
        let (mut room, mut events) =
            RoomConnection::open(connector, "ABC123", alice(), fast_config()).unwrap();
        let _ = events.recv().await; // Connected

        room.close().await;
        // No Closed event reaches the torn-down subscriber.
        assert_eq!(events.recv().await, None);
        assert!(room.is_closed());
        assert!(matches!(
            room.make_move(Coord::new(0, 0)),
            Err(CaroError::NotConnected)
        ));
        room.close().await; // second close is harmless
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (connector, _, connects) = MockConnector::new(vec![]);
        let config = fast_config().with_max_reconnect_attempts(2);
        let (mut room, mut events) =
            RoomConnection::open(connector, "ABC123", alice(), config).unwrap();

        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            seen.push(event);
        }
        assert!(matches!(seen.last(), Some(RoomEvent::Closed { .. })));
        let retries = seen
            .iter()
            .filter(|e| matches!(e, RoomEvent::Reconnecting { .. }))
            .count();
        assert_eq!(retries, 2);
        assert_eq!(connects.load(Ordering::Acquire), 3);
        assert!(room.is_closed());

        room.close().await;
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = ConnectionConfig::new();
        assert_eq!(config.backoff(1), Duration::from_secs(1));
        assert_eq!(config.backoff(2), Duration::from_secs(2));
        assert_eq!(config.backoff(3), Duration::from_secs(4));
        assert_eq!(config.backoff(4), Duration::from_secs(5));
        assert_eq!(config.backoff(40), Duration::from_secs(5));
    }

    #[test]
    fn config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert!(config.max_reconnect_attempts.is_none());
        assert_eq!(
            ConnectionConfig::new()
                .with_event_channel_capacity(0)
                .event_channel_capacity,
            1
        );
    }
}
