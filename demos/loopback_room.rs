//! # Loopback Room Example
//!
//! Runs a [`RoomSession`] against an in-process fake server. The fake server
//! answers `join-room` with a snapshot, applies `make-move` requests to its own
//! board and pushes the result back, the way the real server does.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_room
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use caro_room_client::api::{GameApi, HistoryRecord};
use caro_room_client::protocol::{
    Board, Cell, ClientMessage, Coord, Identity, Player, ServerMessage, Snapshot, Symbol, Winner,
};
use caro_room_client::{
    CaroError, ConnectionConfig, Connector, RoomMarker, RoomSession, SessionUpdate, Transport,
};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: A channel-based transport and a connector that hands it out
// ─────────────────────────────────────────────────────────────────────

pub struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), CaroError> {
        self.tx
            .send(message)
            .map_err(|e| CaroError::TransportSend(e.to_string()))
    }

    /// Cancel-safe because `mpsc::UnboundedReceiver::recv` is.
    async fn recv(&mut self) -> Option<Result<String, CaroError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), CaroError> {
        Ok(())
    }
}

/// Connects once, to the fake server spawned in `main`.
struct LoopbackConnector {
    transport: Option<LoopbackTransport>,
}

#[async_trait]
impl Connector for LoopbackConnector {
    type Transport = LoopbackTransport;

    async fn connect(&mut self) -> Result<LoopbackTransport, CaroError> {
        self.transport.take().ok_or(CaroError::TransportClosed)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: A fake server holding the authoritative board
// ─────────────────────────────────────────────────────────────────────

async fn fake_server(
    mut from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut state = Snapshot {
        id: String::new(),
        board: Board::default(),
        players: vec![
            Player {
                id: "u-alice".into(),
                name: "Alice".into(),
                symbol: Some(Symbol::X),
            },
            Player {
                id: "u-bot".into(),
                name: "Bot".into(),
                symbol: Some(Symbol::O),
            },
        ],
        next_turn: Symbol::X,
        winner: Winner::None,
        last_move: None,
        host_id: Some("u-alice".into()),
    };

    while let Some(frame) = from_client.recv().await {
        tracing::info!("server received: {frame}");
        match serde_json::from_str::<ClientMessage>(&frame)? {
            ClientMessage::JoinRoom { room_id, .. } => state.id = room_id,
            ClientMessage::MakeMove { x, y } => {
                let mut rows = state.board.rows().to_vec();
                if let Some(cell) = rows.get_mut(y).and_then(|row| row.get_mut(x)) {
                    *cell = state.next_turn.mark();
                }
                state.board = Board::from_rows(rows);
                state.last_move = Some(Coord::new(x, y));
                state.next_turn = state.next_turn.other();
            }
            ClientMessage::Restart => {
                state.board = Board::default();
                state.winner = Winner::None;
                state.last_move = None;
            }
        }
        let reply = ServerMessage::RoomState(Box::new(state.clone()));
        to_client.send(serde_json::to_string(&reply)?)?;
    }
    Ok(())
}

/// History is not tracked by the loopback server.
struct OfflineApi;

#[async_trait]
impl GameApi for OfflineApi {
    async fn create_identity(&self, name: &str) -> Result<Identity, CaroError> {
        Ok(Identity::new("u-alice", name))
    }

    async fn create_room(&self) -> Result<String, CaroError> {
        Ok("LOOP01".into())
    }

    async fn fetch_history(&self, me: &str, opponent: &str) -> Result<HistoryRecord, CaroError> {
        Ok(HistoryRecord {
            me: me.into(),
            opponent: opponent.into(),
            wins: 0,
            losses: 0,
            draws: 0,
            total: 0,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Mount the room view and play one move
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    let server = tokio::spawn(fake_server(server_rx, server_tx));

    let connector = LoopbackConnector {
        transport: Some(LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        }),
    };
    let mut session = RoomSession::mount(
        connector,
        "loop01",
        Identity::new("u-alice", "Alice"),
        Arc::new(OfflineApi),
        RoomMarker::in_memory(),
        ConnectionConfig::default().with_max_reconnect_attempts(0),
    )?;

    let target = Coord::new(7, 7);
    let mut moved = false;
    while let Some(update) = session.next_update().await {
        tracing::info!("update: {update:?}");
        if !matches!(update, SessionUpdate::Refreshed { .. }) {
            continue;
        }
        if moved {
            let cell = session.store().board().cell(target);
            tracing::info!(
                "server placed {:?} at {target}; next turn {:?}",
                cell,
                session.store().next_turn()
            );
            if cell != Some(Cell::X) {
                return Err("server did not echo the move".into());
            }
            break;
        }
        // First tap selects, second tap confirms.
        session.click(target)?;
        if let Some(coord) = session.click(target)? {
            tracing::info!("submitted move at {coord}");
            moved = true;
        }
    }

    session.teardown().await;
    server.abort();
    tracing::info!("Done");
    Ok(())
}
