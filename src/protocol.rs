//! Wire-compatible protocol types for the Caro room channel.
//!
//! Every frame is a JSON object `{"event": "<name>", "data": <payload>}` with
//! kebab-case event names. Payload shapes follow the server's room state:
//!
//! - cells are integers: `0` empty, `1` for `X`, `-1` for `O`
//! - the board is row-major, so `board[y][x]`
//! - `winner` is `null`, `"X"`, `"O"` or `"draw"`

use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Board edge length used before the first snapshot arrives.
pub const DEFAULT_BOARD_SIZE: usize = 15;

// ── Symbols and cells ───────────────────────────────────────────────

/// The mark assigned to a seated player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Symbol {
    /// First mark. The server opens every game with `X` to move.
    #[default]
    X,
    /// Second mark.
    O,
}

impl Symbol {
    /// The cell value this symbol leaves on the board.
    pub fn mark(self) -> Cell {
        match self {
            Self::X => Cell::X,
            Self::O => Cell::O,
        }
    }

    /// The opposing symbol.
    pub fn other(self) -> Self {
        match self {
            Self::X => Self::O,
            Self::O => Self::X,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => f.write_str("X"),
            Self::O => f.write_str("O"),
        }
    }
}

/// A single board cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cell {
    #[default]
    Empty,
    X,
    O,
}

impl Cell {
    pub fn is_empty(self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The symbol occupying this cell, if any.
    pub fn symbol(self) -> Option<Symbol> {
        match self {
            Self::Empty => None,
            Self::X => Some(Symbol::X),
            Self::O => Some(Symbol::O),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw: i8 = match self {
            Self::Empty => 0,
            Self::X => 1,
            Self::O => -1,
        };
        serializer.serialize_i8(raw)
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match i8::deserialize(deserializer)? {
            0 => Ok(Self::Empty),
            1 => Ok(Self::X),
            -1 => Ok(Self::O),
            other => Err(de::Error::invalid_value(
                de::Unexpected::Signed(i64::from(other)),
                &"0, 1 or -1",
            )),
        }
    }
}

/// A board coordinate. `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub x: usize,
    pub y: usize,
}

impl Coord {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ── Board ───────────────────────────────────────────────────────────

/// Row-major grid of cells. Dimensions are fixed by the server at room creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    rows: Vec<Vec<Cell>>,
}

impl Board {
    /// An all-empty board of the given size.
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            rows: vec![vec![Cell::Empty; width]; height],
        }
    }

    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Width of the first row; zero for an empty board.
    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// The cell at `coord`, or `None` when it lies outside the grid.
    pub fn cell(&self, coord: Coord) -> Option<Cell> {
        self.rows.get(coord.y)?.get(coord.x).copied()
    }

    /// `true` only for an in-bounds empty cell.
    pub fn is_empty_at(&self, coord: Coord) -> bool {
        self.cell(coord).is_some_and(Cell::is_empty)
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::empty(DEFAULT_BOARD_SIZE, DEFAULT_BOARD_SIZE)
    }
}

// ── Winner ──────────────────────────────────────────────────────────

/// Outcome of the current game as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Winner {
    /// The game is still running (or has not started).
    #[default]
    None,
    /// The holder of this symbol won.
    Win(Symbol),
    /// The board filled up without a winner.
    Draw,
}

impl Winner {
    /// `true` for `Win` and `Draw`.
    pub fn is_decided(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl Serialize for Winner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::None => serializer.serialize_none(),
            Self::Win(Symbol::X) => serializer.serialize_str("X"),
            Self::Win(Symbol::O) => serializer.serialize_str("O"),
            Self::Draw => serializer.serialize_str("draw"),
        }
    }
}

impl<'de> Deserialize<'de> for Winner {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref() {
            None => Ok(Self::None),
            Some("X") => Ok(Self::Win(Symbol::X)),
            Some("O") => Ok(Self::Win(Symbol::O)),
            Some("draw") => Ok(Self::Draw),
            Some(other) => Err(de::Error::invalid_value(
                de::Unexpected::Str(other),
                &"null, \"X\", \"O\" or \"draw\"",
            )),
        }
    }
}

// ── Structs ─────────────────────────────────────────────────────────

/// The local player's identity as issued by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A player seated in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub name: String,
    /// `None` until the server assigns a seat.
    #[serde(default)]
    pub symbol: Option<Symbol>,
}

/// Full authoritative room state pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: String,
    pub board: Board,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub next_turn: Symbol,
    #[serde(default)]
    pub winner: Winner,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_move: Option<Coord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
}

// ── Messages ────────────────────────────────────────────────────────

/// Events sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Join (or rejoin) a room. Sent first on every (re)connection.
    JoinRoom {
        #[serde(rename = "roomId")]
        room_id: String,
        user: Identity,
    },
    /// Place the player's mark at `(x, y)`.
    MakeMove { x: usize, y: usize },
    /// Reset the board. The server ignores it unless the sender is the host.
    Restart,
}

/// Events sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Full room state (boxed to reduce enum size).
    RoomState(Box<Snapshot>),
    /// A room was deleted. Carries the room code.
    RoomDeleted(String),
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

    #[test]
    fn cells_decode_from_signed_integers() {
        let row: Vec<Cell> = serde_json::from_str("[0, 1, -1]").unwrap();
        assert_eq!(row, vec![Cell::Empty, Cell::X, Cell::O]);
        assert!(serde_json::from_str::<Cell>("2").is_err());
    }

    #[test]
    fn winner_null_and_strings() {
        assert_eq!(serde_json::from_str::<Winner>("null").unwrap(), Winner::None);
        assert_eq!(
            serde_json::from_str::<Winner>("\"O\"").unwrap(),
            Winner::Win(Symbol::O)
        );
        assert_eq!(serde_json::from_str::<Winner>("\"draw\"").unwrap(), Winner::Draw);
        assert!(serde_json::from_str::<Winner>("\"tie\"").is_err());
        assert_eq!(serde_json::to_string(&Winner::None).unwrap(), "null");
    }

    #[test]
    fn board_lookup_is_bounds_checked() {
        let board = Board::from_rows(vec![vec![Cell::Empty, Cell::X], vec![Cell::O, Cell::Empty]]);
        assert_eq!(board.width(), 2);
        assert_eq!(board.height(), 2);
        assert_eq!(board.cell(Coord::new(1, 0)), Some(Cell::X));
        assert_eq!(board.cell(Coord::new(0, 1)), Some(Cell::O));
        assert!(board.is_empty_at(Coord::new(1, 1)));
        assert!(!board.is_empty_at(Coord::new(2, 0)));
        assert!(!board.is_empty_at(Coord::new(0, 5)));
    }

    #[test]
    fn default_board_is_fifteen_square() {
        let board = Board::default();
        assert_eq!(board.width(), DEFAULT_BOARD_SIZE);
        assert_eq!(board.height(), DEFAULT_BOARD_SIZE);
        assert!(board.rows().iter().flatten().all(|c| c.is_empty()));
    }

    #[test]
    fn join_room_uses_room_id_field() {
        let msg = ClientMessage::JoinRoom {
            room_id: "ABC123".into(),
            user: Identity::new("u1", "Alice"),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "event": "join-room",
                "data": { "roomId": "ABC123", "user": { "id": "u1", "name": "Alice" } }
            })
        );
    }

    #[test]
    fn symbol_helpers() {
        assert_eq!(Symbol::X.other(), Symbol::O);
        assert_eq!(Symbol::O.mark(), Cell::O);
        assert_eq!(Cell::X.symbol(), Some(Symbol::X));
        assert_eq!(Symbol::O.to_string(), "O");
    }
}
