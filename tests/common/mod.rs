#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Caro room client integration tests.
//!
//! Provides a channel-driven [`MockConnector`] whose transports are fed by
//! [`ServerLink`] handles, an in-memory [`FakeApi`], and JSON fixture builders
//! shaped like the server's output.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use caro_room_client::api::{GameApi, HistoryRecord};
use caro_room_client::protocol::{
    Board, Cell, ClientMessage, Coord, Identity, Player, ServerMessage, Snapshot, Symbol, Winner,
};
use caro_room_client::{CaroError, ConnectionConfig, Connector, Transport};
use tokio::sync::mpsc;

type Frame = Option<Result<String, CaroError>>;

// ── MockTransport ───────────────────────────────────────────────────

/// One connection. Frames pushed through its [`ServerLink`] are returned by
/// `recv()`; everything the client sends is recorded.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Frame>,
    sent: Arc<StdMutex<Vec<String>>>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), CaroError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, CaroError>> {
        match self.incoming.recv().await {
            Some(frame) => frame,
            // Link dropped by the test: keep the connection open.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), CaroError> {
        Ok(())
    }
}

/// Server side of one mock connection.
#[derive(Clone)]
pub struct ServerLink {
    tx: mpsc::UnboundedSender<Frame>,
    sent: Arc<StdMutex<Vec<String>>>,
}

impl ServerLink {
    pub fn push(&self, json: String) {
        let _ = self.tx.send(Some(Ok(json)));
    }

    pub fn push_snapshot(&self, snapshot: &Snapshot) {
        self.push(room_state_json(snapshot));
    }

    /// Close the connection cleanly.
    pub fn hang_up(&self) {
        let _ = self.tx.send(None);
    }

    /// Raw frames the client sent on this connection.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Decoded frames the client sent on this connection.
    pub fn sent_messages(&self) -> Vec<ClientMessage> {
        self.sent()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Hands out one prepared transport per connect, then fails.
pub struct MockConnector {
    transports: VecDeque<MockTransport>,
    connects: Arc<AtomicU32>,
}

impl MockConnector {
    /// Prepare `connections` transports and return their server links.
    pub fn new(connections: usize) -> (Self, Vec<ServerLink>, Arc<AtomicU32>) {
        let mut transports = VecDeque::new();
        let mut links = Vec::new();
        for _ in 0..connections {
            let (tx, rx) = mpsc::unbounded_channel();
            let sent = Arc::new(StdMutex::new(Vec::new()));
            transports.push_back(MockTransport {
                incoming: rx,
                sent: Arc::clone(&sent),
            });
            links.push(ServerLink { tx, sent });
        }
        let connects = Arc::new(AtomicU32::new(0));
        let connector = Self {
            transports,
            connects: Arc::clone(&connects),
        };
        (connector, links, connects)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&mut self) -> Result<MockTransport, CaroError> {
        self.connects.fetch_add(1, Ordering::AcqRel);
        self.transports
            .pop_front()
            .ok_or_else(|| CaroError::TransportReceive("connection refused".into()))
    }
}

// ── FakeApi ─────────────────────────────────────────────────────────

/// In-memory REST collaborator.
#[derive(Default)]
pub struct FakeApi {
    pub history_calls: AtomicU32,
    pub fail_history: std::sync::atomic::AtomicBool,
    pub history_delay: Option<Duration>,
}

impl FakeApi {
    pub fn history_calls(&self) -> u32 {
        self.history_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GameApi for FakeApi {
    async fn create_identity(&self, name: &str) -> Result<Identity, CaroError> {
        Ok(Identity::new(format!("id-{}", name.to_lowercase()), name))
    }

    async fn create_room(&self) -> Result<String, CaroError> {
        Ok("ROOM42".into())
    }

    async fn fetch_history(&self, me: &str, opponent: &str) -> Result<HistoryRecord, CaroError> {
        let n = self.history_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.history_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(CaroError::Http {
                status: 503,
                message: "fetch history failed".into(),
            });
        }
        Ok(HistoryRecord {
            me: me.into(),
            opponent: opponent.into(),
            wins: n,
            losses: 0,
            draws: 0,
            total: n,
        })
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

pub fn alice() -> Identity {
    Identity::new("u-alice", "Alice")
}

pub fn bob() -> Identity {
    Identity::new("u-bob", "Bob")
}

pub fn fast_config() -> ConnectionConfig {
    ConnectionConfig::new()
        .with_reconnect_delay(Duration::from_millis(5))
        .with_reconnect_delay_max(Duration::from_millis(20))
        .with_shutdown_timeout(Duration::from_millis(200))
}

/// Alice (X, host) against Bob (O) on an empty board.
pub fn snapshot(next_turn: Symbol, winner: Winner) -> Snapshot {
    Snapshot {
        id: "ABC123".into(),
        board: Board::default(),
        players: vec![
            Player {
                id: alice().id,
                name: alice().name,
                symbol: Some(Symbol::X),
            },
            Player {
                id: bob().id,
                name: bob().name,
                symbol: Some(Symbol::O),
            },
        ],
        next_turn,
        winner,
        last_move: None,
        host_id: Some(alice().id),
    }
}

/// `base` with `mark` placed at `coord` and recorded as the last move.
pub fn with_move(mut base: Snapshot, coord: Coord, mark: Cell) -> Snapshot {
    let mut rows = base.board.rows().to_vec();
    rows[coord.y][coord.x] = mark;
    base.board = Board::from_rows(rows);
    base.last_move = Some(coord);
    base
}

pub fn room_state_json(snapshot: &Snapshot) -> String {
    serde_json::to_string(&ServerMessage::RoomState(Box::new(snapshot.clone()))).unwrap()
}

pub fn room_deleted_json(code: &str) -> String {
    serde_json::to_string(&ServerMessage::RoomDeleted(code.into())).unwrap()
}
