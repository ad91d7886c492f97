//! # Caro Room Client
//!
//! Client runtime for a two-player Caro (gomoku) room kept in sync with an
//! authoritative game server.
//!
//! The server owns the board, turns and results. This crate keeps a local
//! mirror of one room, turns taps and key presses into move requests, and
//! reports what the view should show.
//!
//! ## Features
//!
//! - **Server-authoritative**: every `room-state` snapshot replaces local state wholesale
//! - **Reconnecting channel**: `join-room` is re-sent on every new transport
//! - **Two-step moves**: select, then confirm, with at most one move per confirmation
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any backend
//! - **WebSocket built-in**: the default `transport-websocket` feature provides [`WebSocketConnector`]
//! - **HTTP built-in**: the default `http-api` feature provides [`ApiClient`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! let config = ClientConfig::from_env()?;
//! let api = Arc::new(ApiClient::new(&config.api_url, config.http_timeout)?);
//! let mut identities = IdentityStore::load(Arc::new(FileStorage::new(&config.data_dir)));
//! let identity = identities.ensure("Alice", api.as_ref()).await?;
//!
//! let mut session = RoomSession::mount(
//!     WebSocketConnector::new(&config.ws_url),
//!     "abc123",
//!     identity,
//!     api,
//!     RoomMarker::in_memory(),
//!     ConnectionConfig::default(),
//! )?;
//! while let Some(update) = session.next_update().await {
//!     if let SessionUpdate::Navigate { notice, .. } = update {
//!         println!("{notice}");
//!         break;
//!     }
//! }
//! session.teardown().await;
//! ```

pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod history;
pub mod identity;
pub mod input;
pub mod lobby;
pub mod overlay;
pub mod protocol;
pub mod session;
pub mod store;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
#[cfg(feature = "http-api")]
pub use api::ApiClient;
pub use api::GameApi;
pub use config::ClientConfig;
pub use connection::{ConnectionConfig, RoomConnection};
pub use error::{CaroError, Result};
pub use event::RoomEvent;
pub use history::{HistoryStats, HistoryTracker};
pub use identity::{FileStorage, IdentityStore, MemoryStorage, RoomMarker, Storage};
pub use input::{InputState, Key, MoveInput};
pub use lobby::{normalize_room_code, Lobby, Route};
pub use overlay::{Outcome, ResultOverlay};
pub use protocol::{
    Board, Cell, ClientMessage, Coord, Identity, Player, ServerMessage, Snapshot, Symbol, Winner,
};
pub use session::{ConnectionStatus, RoomSession, SessionUpdate};
pub use store::RoomStore;
pub use transport::{Connector, Transport};
#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
