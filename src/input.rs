//! Two-step move confirmation.
//!
//! A first tap on an empty cell selects it; a second tap on the same cell (or
//! Enter) commits it. Touch screens have no hover, so a single tap cannot tell
//! a tentative pick from a commit.
//!
//! Every transition re-reads permission from the [`RoomStore`]. A commit
//! clears the selection in the same step that yields the move, so one
//! confirmed selection yields at most one move.

use crate::protocol::Coord;
use crate::store::RoomStore;

/// Selection state of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputState {
    #[default]
    Idle,
    Selected(Coord),
}

/// Keys the board reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Escape,
    Other,
}

impl Key {
    /// Map a key name (`"Enter"`, `"Escape"`, `"Esc"`), ignoring case.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        if name.eq_ignore_ascii_case("enter") {
            Self::Enter
        } else if name.eq_ignore_ascii_case("escape") || name.eq_ignore_ascii_case("esc") {
            Self::Escape
        } else {
            Self::Other
        }
    }
}

/// The move-input state machine for one room view.
#[derive(Debug, Default)]
pub struct MoveInput {
    state: InputState,
}

impl MoveInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> InputState {
        self.state
    }

    pub fn selection(&self) -> Option<Coord> {
        match self.state {
            InputState::Idle => None,
            InputState::Selected(coord) => Some(coord),
        }
    }

    /// Handle a tap on `coord`. Returns the move to submit, if this tap commits one.
    pub fn click(&mut self, coord: Coord, store: &RoomStore) -> Option<Coord> {
        if !store.can_play() {
            self.state = InputState::Idle;
            return None;
        }
        let empty = store.board().is_empty_at(coord);
        match self.state {
            InputState::Selected(selected) if selected == coord => self.commit(store),
            // Occupied cells never replace or create a selection.
            _ if !empty => None,
            _ => {
                self.state = InputState::Selected(coord);
                None
            }
        }
    }

    /// Handle a key press. Returns the move to submit on a confirmed Enter.
    pub fn key(&mut self, key: Key, store: &RoomStore) -> Option<Coord> {
        match key {
            Key::Enter => self.commit(store),
            Key::Escape => {
                self.state = InputState::Idle;
                None
            }
            Key::Other => None,
        }
    }

    /// Re-validate the selection after a new snapshot.
    ///
    /// Clears it when play is no longer allowed or the selected cell was
    /// filled. Returns `true` if a selection was cleared.
    pub fn sync(&mut self, store: &RoomStore) -> bool {
        let InputState::Selected(selected) = self.state else {
            return false;
        };
        if store.can_play() && store.board().is_empty_at(selected) {
            return false;
        }
        self.state = InputState::Idle;
        true
    }

    pub fn reset(&mut self) {
        self.state = InputState::Idle;
    }

    /// Take the selection and return it if it is still committable.
    fn commit(&mut self, store: &RoomStore) -> Option<Coord> {
        let InputState::Selected(selected) = std::mem::take(&mut self.state) else {
            return None;
        };
        (store.can_play() && store.board().is_empty_at(selected)).then_some(selected)
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
    use crate::protocol::{Board, Cell, Identity, Player, Snapshot, Symbol, Winner};

    fn store_with(board: Board, next_turn: Symbol, winner: Winner) -> RoomStore {
        let mut store = RoomStore::new(Identity::new("a", "Alice"));
        store.apply(Snapshot {
            id: "ABC123".into(),
            board,
            players: vec![
                Player {
                    id: "a".into(),
                    name: "Alice".into(),
                    symbol: Some(Symbol::X),
                },
                Player {
                    id: "b".into(),
                    name: "Bob".into(),
                    symbol: Some(Symbol::O),
                },
            ],
            next_turn,
            winner,
            last_move: None,
            host_id: None,
        });
        store
    }

    fn my_turn() -> RoomStore {
        store_with(Board::default(), Symbol::X, Winner::None)
    }

    fn board_with(coord: Coord, cell: Cell) -> Board {
        let mut rows = Board::default().rows().to_vec();
        rows[coord.y][coord.x] = cell;
        Board::from_rows(rows)
    }

    #[test]
    fn tap_twice_commits_once() {
        let store = my_turn();
        let mut input = MoveInput::new();
        let c = Coord::new(3, 3);

        assert_eq!(input.click(c, &store), None);
        assert_eq!(input.state(), InputState::Selected(c));
        assert_eq!(input.click(c, &store), Some(c));
        assert_eq!(input.state(), InputState::Idle);

        assert_eq!(input.key(Key::Enter, &store), None);
    }

    #[test]
    fn tap_other_empty_cell_moves_selection() {
        let store = my_turn();
        let mut input = MoveInput::new();
        input.click(Coord::new(1, 1), &store);
        assert_eq!(input.click(Coord::new(2, 2), &store), None);
        assert_eq!(input.selection(), Some(Coord::new(2, 2)));
    }

    #[test]
    fn tap_occupied_cell_is_noop() {
        let occupied = Coord::new(5, 5);
        let store = store_with(board_with(occupied, Cell::O), Symbol::X, Winner::None);
        let mut input = MoveInput::new();

        assert_eq!(input.click(occupied, &store), None);
        assert_eq!(input.state(), InputState::Idle);

        input.click(Coord::new(0, 0), &store);
        assert_eq!(input.click(occupied, &store), None);
        assert_eq!(input.selection(), Some(Coord::new(0, 0)));
    }

    #[test]
    fn tap_out_of_bounds_is_ignored() {
        let store = my_turn();
        let mut input = MoveInput::new();
        assert_eq!(input.click(Coord::new(40, 2), &store), None);
        assert_eq!(input.state(), InputState::Idle);
    }

    #[test]
    fn not_my_turn_never_selects() {
        let store = store_with(Board::default(), Symbol::O, Winner::None);
        let mut input = MoveInput::new();
        assert_eq!(input.click(Coord::new(1, 1), &store), None);
        assert_eq!(input.state(), InputState::Idle);
    }

    #[test]
    fn enter_commits_and_escape_cancels() {
        let store = my_turn();
        let mut input = MoveInput::new();
        let c = Coord::new(7, 7);

        input.click(c, &store);
        assert_eq!(input.key(Key::Escape, &store), None);
        assert_eq!(input.state(), InputState::Idle);

        input.click(c, &store);
        assert_eq!(input.key(Key::Other, &store), None);
        assert_eq!(input.key(Key::Enter, &store), Some(c));
        assert_eq!(input.state(), InputState::Idle);
    }

    #[test]
    fn sync_clears_filled_selection() {
        let c = Coord::new(4, 4);
        let mut input = MoveInput::new();
        input.click(c, &my_turn());

        let filled = store_with(board_with(c, Cell::O), Symbol::X, Winner::None);
        assert!(input.sync(&filled));
        assert_eq!(input.state(), InputState::Idle);
        assert_eq!(input.click(c, &filled), None);
    }

    #[test]
    fn sync_clears_when_play_revoked() {
        let mut input = MoveInput::new();
        input.click(Coord::new(2, 2), &my_turn());

        let won = store_with(Board::default(), Symbol::X, Winner::Win(Symbol::O));
        assert!(input.sync(&won));
        assert!(!input.sync(&won));
    }

    #[test]
    fn sync_keeps_valid_selection() {
        let store = my_turn();
        let mut input = MoveInput::new();
        input.click(Coord::new(2, 2), &store);
        assert!(!input.sync(&store));
        assert_eq!(input.selection(), Some(Coord::new(2, 2)));
    }

    #[test]
    fn key_names() {
        assert_eq!(Key::from_name("Enter"), Key::Enter);
        assert_eq!(Key::from_name("Esc"), Key::Escape);
        assert_eq!(Key::from_name("enter"), Key::Enter);
        assert_eq!(Key::from_name("esc"), Key::Escape);
        assert_eq!(Key::from_name("a"), Key::Other);
    }
}
