//! Events delivered to the subscriber of a [`RoomConnection`](crate::RoomConnection).

use std::time::Duration;

use crate::protocol::Snapshot;

/// Lifecycle and room events emitted by the connection loop, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// A transport was established and `join-room` was sent on it.
    ///
    /// `attempt` counts established connections: `1` for the first, higher
    /// values after each reconnect.
    Connected { attempt: u32 },

    /// The server pushed a full room snapshot.
    RoomState(Box<Snapshot>),

    /// The joined room was deleted. Terminal: no further events follow.
    RoomDeleted { room_code: String },

    /// The transport dropped. A reconnect follows unless attempts are exhausted.
    Disconnected { reason: Option<String> },

    /// Waiting `delay` before reconnect attempt number `attempt`.
    Reconnecting { attempt: u32, delay: Duration },

    /// The connection loop exited and will not reconnect.
    Closed { reason: Option<String> },
}

impl RoomEvent {
    /// `true` for events after which the loop never emits again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RoomDeleted { .. } | Self::Closed { .. })
    }
}
