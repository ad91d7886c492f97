//! Local mirror of the authoritative room state.
//!
//! [`RoomStore`] holds the latest [`Snapshot`] and answers role and permission
//! questions about the local player. Its only write path is
//! [`apply`](RoomStore::apply), which replaces the held snapshot wholesale.

use crate::protocol::{Board, Coord, Identity, Player, Snapshot, Symbol, Winner};

/// The latest snapshot of one room, seen from one identity.
#[derive(Debug, Clone)]
pub struct RoomStore {
    identity: Identity,
    snapshot: Option<Snapshot>,
    /// Shown until the first snapshot arrives.
    placeholder: Board,
}

impl RoomStore {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            snapshot: None,
            placeholder: Board::default(),
        }
    }

    /// Replace the held snapshot. Nothing from the previous value survives.
    pub fn apply(&mut self, snapshot: Snapshot) {
        self.snapshot = Some(snapshot);
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// `None` until the first `room-state` event.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn is_synced(&self) -> bool {
        self.snapshot.is_some()
    }

    /// The current board, or an empty 15×15 board before the first sync.
    pub fn board(&self) -> &Board {
        self.snapshot
            .as_ref()
            .map_or(&self.placeholder, |s| &s.board)
    }

    pub fn winner(&self) -> Winner {
        self.snapshot.as_ref().map_or(Winner::None, |s| s.winner)
    }

    pub fn next_turn(&self) -> Option<Symbol> {
        self.snapshot.as_ref().map(|s| s.next_turn)
    }

    pub fn last_move(&self) -> Option<Coord> {
        self.snapshot.as_ref().and_then(|s| s.last_move)
    }

    pub fn players(&self) -> &[Player] {
        self.snapshot.as_ref().map_or(&[], |s| s.players.as_slice())
    }

    /// The symbol seated for the local identity.
    pub fn my_symbol(&self) -> Option<Symbol> {
        self.players()
            .iter()
            .find(|p| p.id == self.identity.id)
            .and_then(|p| p.symbol)
    }

    /// The first listed player that is not the local identity.
    pub fn opponent(&self) -> Option<&Player> {
        self.players().iter().find(|p| p.id != self.identity.id)
    }

    pub fn is_host(&self) -> bool {
        self.snapshot
            .as_ref()
            .and_then(|s| s.host_id.as_deref())
            .is_some_and(|host| host == self.identity.id)
    }

    /// Seated, game undecided, and it is our turn.
    pub fn can_play(&self) -> bool {
        match (self.my_symbol(), self.snapshot.as_ref()) {
            (Some(mine), Some(s)) => !s.winner.is_decided() && s.next_turn == mine,
            _ => false,
        }
    }

    /// The player holding `symbol`, for seat labels and result text.
    pub fn player_for(&self, symbol: Symbol) -> Option<&Player> {
        self.players().iter().find(|p| p.symbol == Some(symbol))
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
    use crate::protocol::Cell;

    fn player(id: &str, symbol: Option<Symbol>) -> Player {
        Player {
            id: id.into(),
            name: id.to_uppercase(),
            symbol,
        }
    }

    fn snapshot(players: Vec<Player>, next_turn: Symbol, winner: Winner) -> Snapshot {
        Snapshot {
            id: "ABC123".into(),
            board: Board::default(),
            players,
            next_turn,
            winner,
            last_move: None,
            host_id: Some("a".into()),
        }
    }

    #[test]
    fn empty_store_has_placeholder_board() {
        let store = RoomStore::new(Identity::new("a", "A"));
        assert!(!store.is_synced());
        assert_eq!(store.board().width(), 15);
        assert!(!store.can_play());
        assert!(!store.is_host());
        assert!(store.opponent().is_none());
    }

    #[test]
    fn unassigned_symbols_cannot_play() {
        let mut store = RoomStore::new(Identity::new("a", "A"));
        store.apply(snapshot(
            vec![player("a", None), player("b", None)],
            Symbol::X,
            Winner::None,
        ));
        assert_eq!(store.my_symbol(), None);
        assert!(!store.can_play());
        assert_eq!(store.opponent().map(|p| p.id.as_str()), Some("b"));
    }

    #[test]
    fn turn_and_winner_gate_play() {
        let players = vec![player("a", Some(Symbol::X)), player("b", Some(Symbol::O))];
        let mut store = RoomStore::new(Identity::new("a", "A"));

        store.apply(snapshot(players.clone(), Symbol::X, Winner::None));
        assert!(store.can_play());
        assert!(store.is_host());

        store.apply(snapshot(players.clone(), Symbol::O, Winner::None));
        assert!(!store.can_play());

        store.apply(snapshot(players, Symbol::X, Winner::Win(Symbol::O)));
        assert!(!store.can_play());
    }

    #[test]
    fn apply_replaces_wholesale() {
        let mut store = RoomStore::new(Identity::new("a", "A"));
        let mut first = snapshot(vec![player("a", Some(Symbol::X))], Symbol::X, Winner::None);
        first.last_move = Some(Coord::new(1, 1));
        first.host_id = Some("a".into());
        store.apply(first);

        let mut second = snapshot(vec![], Symbol::O, Winner::Draw);
        second.host_id = None;
        second.board = Board::from_rows(vec![vec![Cell::X]]);
        store.apply(second.clone());

        assert_eq!(store.snapshot(), Some(&second));
        assert_eq!(store.last_move(), None);
        assert!(!store.is_host());
        assert_eq!(store.board().width(), 1);
    }

    #[test]
    fn player_for_symbol() {
        let mut store = RoomStore::new(Identity::new("a", "A"));
        store.apply(snapshot(
            vec![player("a", Some(Symbol::X)), player("b", Some(Symbol::O))],
            Symbol::X,
            Winner::None,
        ));
        assert_eq!(store.player_for(Symbol::O).map(|p| p.name.as_str()), Some("B"));
    }
}
