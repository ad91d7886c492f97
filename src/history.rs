//! Head-to-head statistics between the local player and the current opponent.
//!
//! [`HistoryTracker`] decides *when* to fetch: once per change of the
//! `(me, opponent, winner)` key, so a finished game refreshes the numbers and
//! repeated snapshots do not. The fetch itself is a plain async call through
//! [`GameApi`] that the session runs in the background. A failed fetch is
//! logged and leaves the displayed numbers alone.

use tracing::debug;

use crate::api::{GameApi, HistoryRecord};
use crate::error::Result;
use crate::protocol::{Identity, Player, Winner};

/// Aggregated results from the local player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistoryStats {
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub total: u32,
}

impl From<HistoryRecord> for HistoryStats {
    fn from(record: HistoryRecord) -> Self {
        Self {
            wins: record.wins,
            losses: record.losses,
            draws: record.draws,
            total: record.total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HistoryKey {
    me: String,
    opponent: Option<String>,
    winner: Winner,
}

/// One pending history lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub user_id: String,
    pub opponent_id: String,
}

impl HistoryRequest {
    /// Run the lookup once.
    pub async fn fetch<A: GameApi + ?Sized>(&self, api: &A) -> Result<HistoryStats> {
        let record = api.fetch_history(&self.user_id, &self.opponent_id).await?;
        Ok(record.into())
    }
}

/// Tracks which history the view should show and when to refresh it.
#[derive(Debug, Default)]
pub struct HistoryTracker {
    key: Option<HistoryKey>,
    stats: Option<HistoryStats>,
}

impl HistoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe the current room view. Returns a request when a fetch is due.
    ///
    /// No request is issued without an opponent. Switching to a different
    /// opponent drops the stats shown for the previous one.
    pub fn observe(
        &mut self,
        me: &Identity,
        opponent: Option<&Player>,
        winner: Winner,
    ) -> Option<HistoryRequest> {
        let key = HistoryKey {
            me: me.id.clone(),
            opponent: opponent.map(|p| p.id.clone()),
            winner,
        };
        if self.key.as_ref() == Some(&key) {
            return None;
        }
        let pair_changed = self
            .key
            .as_ref()
            .is_none_or(|old| old.me != key.me || old.opponent != key.opponent);
        if pair_changed {
            self.stats = None;
        }
        let request = key.opponent.clone().map(|opponent_id| HistoryRequest {
            user_id: key.me.clone(),
            opponent_id,
        });
        self.key = Some(key);
        request
    }

    /// Record the outcome of a fetch.
    ///
    /// Results for a pair that is no longer current are discarded. Failures
    /// keep whatever was shown before.
    pub fn complete(&mut self, request: &HistoryRequest, result: Result<HistoryStats>) {
        let current = self.key.as_ref().is_some_and(|key| {
            key.me == request.user_id && key.opponent.as_deref() == Some(&request.opponent_id)
        });
        match result {
            Ok(stats) if current => self.stats = Some(stats),
            Ok(_) => debug!(opponent = %request.opponent_id, "discarding stale history"),
            Err(e) => debug!(opponent = %request.opponent_id, error = %e, "history fetch failed"),
        }
    }

    pub fn stats(&self) -> Option<HistoryStats> {
        self.stats
    }
}

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
    use crate::error::CaroError;
    use crate::protocol::Symbol;

    fn me() -> Identity {
        Identity::new("a", "Alice")
    }

    fn opponent(id: &str) -> Player {
        Player {
            id: id.into(),
            name: id.into(),
            symbol: Some(Symbol::O),
        }
    }

    fn stats(wins: u32) -> HistoryStats {
        HistoryStats {
            wins,
            losses: 0,
            draws: 0,
            total: wins,
        }
    }

    #[test]
    fn no_request_without_opponent() {
        let mut tracker = HistoryTracker::new();
        assert_eq!(tracker.observe(&me(), None, Winner::None), None);
    }

    #[test]
    fn one_request_per_key_change() {
        let mut tracker = HistoryTracker::new();
        let b = opponent("b");

        let first = tracker.observe(&me(), Some(&b), Winner::None).unwrap();
        assert_eq!(first.opponent_id, "b");
        assert_eq!(tracker.observe(&me(), Some(&b), Winner::None), None);

        assert!(tracker
            .observe(&me(), Some(&b), Winner::Win(Symbol::X))
            .is_some());
        assert_eq!(tracker.observe(&me(), Some(&b), Winner::Win(Symbol::X)), None);
    }

    #[test]
    fn failure_keeps_previous_stats() {
        let mut tracker = HistoryTracker::new();
        let b = opponent("b");
        let request = tracker.observe(&me(), Some(&b), Winner::None).unwrap();
        tracker.complete(&request, Ok(stats(2)));

        let request = tracker.observe(&me(), Some(&b), Winner::Draw).unwrap();
        tracker.complete(&request, Err(CaroError::Timeout));
        assert_eq!(tracker.stats(), Some(stats(2)));
    }

    #[test]
    fn new_opponent_drops_old_stats_and_stale_results() {
        let mut tracker = HistoryTracker::new();
        let old = tracker.observe(&me(), Some(&opponent("b")), Winner::None).unwrap();

        tracker.observe(&me(), Some(&opponent("c")), Winner::None).unwrap();
        tracker.complete(&old, Ok(stats(9)));
        assert_eq!(tracker.stats(), None);
    }
}
