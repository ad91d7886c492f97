#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Protocol serialization tests for the Caro room client.
//!
//! Verifies the JSON shape of every outbound `ClientMessage` and decodes
//! `ServerMessage` fixtures written the way the game server emits them.

use caro_room_client::protocol::{
    Board, Cell, ClientMessage, Coord, Identity, ServerMessage, Snapshot, Symbol, Winner,
};
use serde_json::json;

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

fn decode(value: serde_json::Value) -> ServerMessage {
    serde_json::from_value(value).expect("decode server message")
}

fn empty_rows(size: usize) -> Vec<Vec<i8>> {
    vec![vec![0; size]; size]
}

fn expect_state(msg: ServerMessage) -> Snapshot {
    match msg {
        ServerMessage::RoomState(snapshot) => *snapshot,
        other => panic!("expected room-state, got {other:?}"),
    }
}

// ════════════════════════════════════════════════════════════════════
// Client → server
// ════════════════════════════════════════════════════════════════════

#[test]
fn join_room_shape() {
    let msg = ClientMessage::JoinRoom {
        room_id: "ZBAV6O".into(),
        user: Identity::new("6f1c", "Ann"),
    };
    assert_eq!(
        serde_json::to_value(&msg).unwrap(),
        json!({"event": "join-room", "data": {"roomId": "ZBAV6O", "user": {"id": "6f1c", "name": "Ann"}}})
    );
}

#[test]
fn make_move_shape() {
    let msg = ClientMessage::MakeMove { x: 3, y: 11 };
    assert_eq!(
        serde_json::to_value(&msg).unwrap(),
        json!({"event": "make-move", "data": {"x": 3, "y": 11}})
    );
}

#[test]
fn restart_has_no_payload() {
    let text = serde_json::to_string(&ClientMessage::Restart).unwrap();
    assert_eq!(text, r#"{"event":"restart"}"#);
    let back: ClientMessage = serde_json::from_str(&text).unwrap();
    assert_eq!(back, ClientMessage::Restart);
}

// ════════════════════════════════════════════════════════════════════
// Server → client fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn room_state_mid_game_fixture() {
    let mut rows = empty_rows(15);
    rows[4][3] = 1;
    rows[7][7] = -1;

    let snapshot = expect_state(decode(json!({
        "event": "room-state",
        "data": {
            "id": "ABC123",
            "board": rows,
            "players": [
                {"id": "u1", "name": "Ann", "symbol": "X"},
                {"id": "u2", "name": "Bao", "symbol": "O"}
            ],
            "nextTurn": "O",
            "winner": null,
            "lastMove": {"x": 3, "y": 4},
            "hostId": "u1"
        }
    })));

    assert_eq!(snapshot.id, "ABC123");
    assert_eq!(snapshot.board.cell(Coord::new(3, 4)), Some(Cell::X));
    assert_eq!(snapshot.board.cell(Coord::new(7, 7)), Some(Cell::O));
    assert_eq!(snapshot.board.cell(Coord::new(4, 3)), Some(Cell::Empty));
    assert_eq!(snapshot.players[1].symbol, Some(Symbol::O));
    assert_eq!(snapshot.next_turn, Symbol::O);
    assert_eq!(snapshot.winner, Winner::None);
    assert_eq!(snapshot.last_move, Some(Coord::new(3, 4)));
    assert_eq!(snapshot.host_id.as_deref(), Some("u1"));
}

#[test]
fn room_state_lobby_fixture_uses_defaults() {
    let snapshot = expect_state(decode(json!({
        "event": "room-state",
        "data": {
            "id": "ABC123",
            "board": empty_rows(15),
            "players": [{"id": "u1", "name": "Ann"}, {"id": "u2", "name": "Bao", "symbol": null}]
        }
    })));

    assert!(snapshot.players.iter().all(|p| p.symbol.is_none()));
    assert_eq!(snapshot.next_turn, Symbol::X);
    assert_eq!(snapshot.winner, Winner::None);
    assert_eq!(snapshot.last_move, None);
    assert_eq!(snapshot.host_id, None);
    assert_eq!(snapshot.board, Board::default());
}

#[test]
fn room_state_finished_fixtures() {
    for (raw, expected) in [
        (json!("X"), Winner::Win(Symbol::X)),
        (json!("O"), Winner::Win(Symbol::O)),
        (json!("draw"), Winner::Draw),
    ] {
        let snapshot = expect_state(decode(json!({
            "event": "room-state",
            "data": {"id": "R1", "board": empty_rows(3), "winner": raw}
        })));
        assert_eq!(snapshot.winner, expected);
        assert!(snapshot.winner.is_decided());
    }
}

#[test]
fn room_deleted_fixture() {
    let msg = decode(json!({"event": "room-deleted", "data": "ABC123"}));
    assert_eq!(msg, ServerMessage::RoomDeleted("ABC123".into()));
}

#[test]
fn snapshot_serializes_camel_case_and_skips_absent_fields() {
    let snapshot = Snapshot {
        id: "R1".into(),
        board: Board::empty(2, 2),
        players: vec![],
        next_turn: Symbol::O,
        winner: Winner::Draw,
        last_move: None,
        host_id: None,
    };
    let value = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(
        value,
        json!({
            "id": "R1",
            "board": [[0, 0], [0, 0]],
            "players": [],
            "nextTurn": "O",
            "winner": "draw"
        })
    );
}

// ════════════════════════════════════════════════════════════════════
// Rejected input
// ════════════════════════════════════════════════════════════════════

#[test]
fn unknown_event_is_rejected() {
    let result = serde_json::from_value::<ServerMessage>(json!({"event": "chat", "data": "hi"}));
    assert!(result.is_err());
}

#[test]
fn out_of_range_cell_is_rejected() {
    let result = serde_json::from_value::<ServerMessage>(json!({
        "event": "room-state",
        "data": {"id": "R1", "board": [[0, 2]]}
    }));
    assert!(result.is_err());
}

#[test]
fn unknown_winner_is_rejected() {
    let result = serde_json::from_value::<ServerMessage>(json!({
        "event": "room-state",
        "data": {"id": "R1", "board": [[0]], "winner": "tie"}
    }));
    assert!(result.is_err());
}

#[test]
fn missing_board_is_rejected() {
    let result =
        serde_json::from_value::<ServerMessage>(json!({"event": "room-state", "data": {"id": "R1"}}));
    assert!(result.is_err());
}
