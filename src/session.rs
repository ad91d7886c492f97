//! The mounted room view.
//!
//! [`RoomSession`] wires one [`RoomConnection`] to the local state machines:
//! every snapshot replaces the [`RoomStore`], re-validates the
//! [`MoveInput`] selection, feeds the [`ResultOverlay`] and may schedule a
//! history refresh. History lookups run as background tasks and never block
//! input.
//!
//! A `room-deleted` for this room puts the session into a terminal state:
//! local interactions become no-ops and the caller is told to navigate to the
//! landing page.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::api::GameApi;
use crate::connection::{ConnectionConfig, RoomConnection};
use crate::error::Result;
use crate::event::RoomEvent;
use crate::history::{HistoryRequest, HistoryStats, HistoryTracker};
use crate::identity::RoomMarker;
use crate::input::{InputState, Key, MoveInput};
use crate::lobby::{invite_link, Route};
use crate::overlay::{Outcome, ResultOverlay};
use crate::protocol::{Coord, Identity, Snapshot};
use crate::store::RoomStore;
use crate::transport::Connector;

type HistoryOutcome = (HistoryRequest, Result<HistoryStats>);

/// Channel status as shown in the room header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting { attempt: u32, delay: Duration },
    Closed,
}

/// What changed after the session processed one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Nothing visible changed.
    Unchanged,
    /// A new snapshot was applied.
    Refreshed {
        selection_cleared: bool,
        result_opened: bool,
    },
    /// The channel status changed.
    Status(ConnectionStatus),
    /// Head-to-head statistics were updated.
    History(HistoryStats),
    /// The room is gone. Leave for `route` and show `notice`.
    Navigate { route: Route, notice: String },
    /// The channel gave up reconnecting.
    Closed { reason: Option<String> },
}

/// State of one open room view.
pub struct RoomSession {
    connection: RoomConnection,
    events: Option<mpsc::Receiver<RoomEvent>>,
    store: RoomStore,
    input: MoveInput,
    overlay: ResultOverlay,
    history: HistoryTracker,
    history_tasks: JoinSet<HistoryOutcome>,
    api: Arc<dyn GameApi>,
    marker: RoomMarker,
    status: ConnectionStatus,
    terminated: bool,
}

impl RoomSession {
    /// Open the room channel for `identity` and mark this session as in the room.
    ///
    /// # Errors
    ///
    /// Returns [`CaroError::InvalidRoomCode`](crate::CaroError::InvalidRoomCode)
    /// for a blank code.
    pub fn mount<C: Connector>(
        connector: C,
        room_code: &str,
        identity: Identity,
        api: Arc<dyn GameApi>,
        marker: RoomMarker,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let (connection, events) =
            RoomConnection::open(connector, room_code, identity.clone(), config)?;
        marker.set(connection.room_code());
        info!(room = %connection.room_code(), player = %identity.id, "room view mounted");

        Ok(Self {
            connection,
            events: Some(events),
            store: RoomStore::new(identity),
            input: MoveInput::new(),
            overlay: ResultOverlay::new(),
            history: HistoryTracker::new(),
            history_tasks: JoinSet::new(),
            api,
            marker,
            status: ConnectionStatus::Connecting,
            terminated: false,
        })
    }

    /// Wait for the next room event or finished history lookup and apply it.
    ///
    /// Returns `None` once the event stream has ended.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        loop {
            let events = self.events.as_mut()?;
            let next = tokio::select! {
                Some(joined) = self.history_tasks.join_next(), if !self.history_tasks.is_empty() => {
                    Next::History(joined)
                }
                event = events.recv() => Next::Event(event),
            };
            match next {
                Next::Event(Some(event)) => return Some(self.handle_event(event)),
                Next::Event(None) => {
                    self.events = None;
                    return None;
                }
                Next::History(joined) => {
                    if let Some(stats) = self.finish_history(joined) {
                        return Some(SessionUpdate::History(stats));
                    }
                }
            }
        }
    }

    /// Apply one event from the connection.
    pub fn handle_event(&mut self, event: RoomEvent) -> SessionUpdate {
        if self.terminated {
            return SessionUpdate::Unchanged;
        }
        match event {
            RoomEvent::RoomState(snapshot) => self.apply_snapshot(*snapshot),
            RoomEvent::RoomDeleted { room_code } => self.terminate(&room_code),
            RoomEvent::Connected { .. } => self.set_status(ConnectionStatus::Connected),
            RoomEvent::Disconnected { .. } => self.set_status(ConnectionStatus::Disconnected),
            RoomEvent::Reconnecting { attempt, delay } => {
                self.set_status(ConnectionStatus::Reconnecting { attempt, delay })
            }
            RoomEvent::Closed { reason } => {
                self.status = ConnectionStatus::Closed;
                self.events = None;
                SessionUpdate::Closed { reason }
            }
        }
    }

    /// Collect history lookups that already finished, without waiting.
    ///
    /// Returns the latest stats if any lookup updated them.
    pub fn poll_history(&mut self) -> Option<HistoryStats> {
        let mut updated = None;
        while let Some(joined) = self.history_tasks.try_join_next() {
            if let Some(stats) = self.finish_history(joined) {
                updated = Some(stats);
            }
        }
        updated
    }

    // ── Local interactions ──────────────────────────────────────────

    /// Tap on a cell. Returns the move that was submitted, if any.
    ///
    /// # Errors
    ///
    /// Propagates [`RoomConnection::make_move`] errors.
    pub fn click(&mut self, coord: Coord) -> Result<Option<Coord>> {
        if self.terminated {
            return Ok(None);
        }
        let committed = self.input.click(coord, &self.store);
        self.submit(committed)
    }

    /// Key press. Escape also closes the result popup.
    ///
    /// # Errors
    ///
    /// Propagates [`RoomConnection::make_move`] errors.
    pub fn key(&mut self, key: Key) -> Result<Option<Coord>> {
        if self.terminated {
            return Ok(None);
        }
        if key == Key::Escape {
            self.overlay.dismiss();
        }
        let committed = self.input.key(key, &self.store);
        self.submit(committed)
    }

    /// Ask the server for a rematch. Only the host may; for anyone else this
    /// returns `Ok(false)` without sending.
    ///
    /// # Errors
    ///
    /// Propagates [`RoomConnection::restart`] errors.
    pub fn restart(&mut self) -> Result<bool> {
        if self.terminated {
            return Ok(false);
        }
        if !self.store.is_host() {
            debug!(room = %self.room_code(), "restart ignored, not the host");
            return Ok(false);
        }
        self.connection.restart()?;
        self.overlay.restart_requested();
        Ok(true)
    }

    pub fn dismiss_result(&mut self) {
        if !self.terminated {
            self.overlay.dismiss();
        }
    }

    /// Leave the room: stop background work, clear the marker and close the channel.
    pub async fn teardown(&mut self) {
        self.connection.unsubscribe();
        self.events = None;
        self.history_tasks.abort_all();
        self.input.reset();
        self.marker.release(self.connection.room_code());
        self.connection.close().await;
        info!(room = %self.room_code(), "room view torn down");
    }

    // ── View state ──────────────────────────────────────────────────

    pub fn store(&self) -> &RoomStore {
        &self.store
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.store.snapshot()
    }

    pub fn input_state(&self) -> InputState {
        self.input.state()
    }

    pub fn selection(&self) -> Option<Coord> {
        self.input.selection()
    }

    pub fn result_visible(&self) -> bool {
        self.overlay.is_visible()
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::for_viewer(
            self.store.winner(),
            self.store.players(),
            self.store.my_symbol(),
        )
    }

    pub fn history(&self) -> Option<HistoryStats> {
        self.history.stats()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn room_code(&self) -> &str {
        self.connection.room_code()
    }

    pub fn connection(&self) -> &RoomConnection {
        &self.connection
    }

    /// Shareable link to this room under `base_url`.
    pub fn invite_link(&self, base_url: &str) -> String {
        invite_link(base_url, self.room_code())
    }

    // ── Internals ───────────────────────────────────────────────────

    fn apply_snapshot(&mut self, snapshot: Snapshot) -> SessionUpdate {
        self.store.apply(snapshot);
        let selection_cleared = self.input.sync(&self.store);
        let result_opened = self.overlay.observe(self.store.winner());

        let request = self.history.observe(
            self.store.identity(),
            self.store.opponent(),
            self.store.winner(),
        );
        if let Some(request) = request {
            let api = Arc::clone(&self.api);
            debug!(opponent = %request.opponent_id, "refreshing history");
            self.history_tasks.spawn(async move {
                let result = request.fetch(api.as_ref()).await;
                (request, result)
            });
        }

        SessionUpdate::Refreshed {
            selection_cleared,
            result_opened,
        }
    }

    fn terminate(&mut self, room_code: &str) -> SessionUpdate {
        info!(room = %room_code, "room deleted, leaving");
        self.terminated = true;
        self.events = None;
        self.input.reset();
        self.overlay.dismiss();
        self.history_tasks.abort_all();
        self.marker.release(self.connection.room_code());
        SessionUpdate::Navigate {
            route: Route::Landing,
            notice: format!("Room {room_code} was deleted"),
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) -> SessionUpdate {
        self.status = status;
        SessionUpdate::Status(status)
    }

    fn submit(&mut self, committed: Option<Coord>) -> Result<Option<Coord>> {
        let Some(coord) = committed else {
            return Ok(None);
        };
        self.connection.make_move(coord)?;
        debug!(room = %self.room_code(), %coord, "move submitted");
        Ok(Some(coord))
    }

    fn finish_history(
        &mut self,
        joined: std::result::Result<HistoryOutcome, JoinError>,
    ) -> Option<HistoryStats> {
        match joined {
            Ok((request, result)) => {
                let before = self.history.stats();
                self.history.complete(&request, result);
                let after = self.history.stats();
                (after != before).then_some(after).flatten()
            }
            Err(e) if e.is_cancelled() => None,
            Err(e) => {
                warn!(error = %e, "history task failed");
                None
            }
        }
    }
}

enum Next {
    Event(Option<RoomEvent>),
    History(std::result::Result<HistoryOutcome, JoinError>),
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.marker.release(self.connection.room_code());
    }
}

impl std::fmt::Debug for RoomSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSession")
            .field("room_code", &self.room_code())
            .field("status", &self.status)
            .field("terminated", &self.terminated)
            .field("selection", &self.input.selection())
            .finish_non_exhaustive()
    }
}
