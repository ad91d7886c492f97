#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end room view tests.
//!
//! Drives [`RoomSession`] through the scripted `MockConnector` from
//! `tests/common`: server frames are pushed per connection and the frames the
//! client sends are inspected afterwards.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use caro_room_client::protocol::{Cell, ClientMessage, Coord, Symbol, Winner};
use caro_room_client::{
    ConnectionStatus, InputState, Key, Outcome, RoomMarker, RoomSession, Route, SessionUpdate,
};

use common::{
    alice, bob, fast_config, room_deleted_json, snapshot, with_move, FakeApi, MockConnector,
    ServerLink,
};

const WAIT: Duration = Duration::from_secs(2);

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

struct Mounted {
    session: RoomSession,
    links: Vec<ServerLink>,
    api: Arc<FakeApi>,
    marker: RoomMarker,
}

fn mount_as(identity: caro_room_client::Identity, connections: usize, api: FakeApi) -> Mounted {
    let (connector, links, _) = MockConnector::new(connections);
    let api = Arc::new(api);
    let marker = RoomMarker::in_memory();
    let session = RoomSession::mount(
        connector,
        "abc123",
        identity,
        api.clone(),
        marker.clone(),
        fast_config(),
    )
    .expect("mount");
    Mounted {
        session,
        links,
        api,
        marker,
    }
}

async fn next_update(session: &mut RoomSession) -> SessionUpdate {
    tokio::time::timeout(WAIT, session.next_update())
        .await
        .expect("timed out waiting for a session update")
        .expect("event stream ended")
}

/// Skip status and history updates until a snapshot is applied.
async fn next_refresh(session: &mut RoomSession) -> (bool, bool) {
    loop {
        if let SessionUpdate::Refreshed {
            selection_cleared,
            result_opened,
        } = next_update(session).await
        {
            return (selection_cleared, result_opened);
        }
    }
}

async fn next_history(session: &mut RoomSession) -> caro_room_client::HistoryStats {
    loop {
        if let SessionUpdate::History(stats) = next_update(session).await {
            return stats;
        }
    }
}

/// Wait until the client has sent at least `count` frames on `link`.
async fn wait_for_sent(link: &ServerLink, count: usize) -> Vec<ClientMessage> {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let sent = link.sent_messages();
        if sent.len() >= count {
            return sent;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected {count} frames, got {sent:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn join_frame() -> ClientMessage {
    ClientMessage::JoinRoom {
        room_id: "ABC123".into(),
        user: alice(),
    }
}

// ════════════════════════════════════════════════════════════════════
// Scenarios
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn unassigned_symbols_leave_both_players_idle() {
    let mut unseated = snapshot(Symbol::X, Winner::None);
    for player in &mut unseated.players {
        player.symbol = None;
    }

    for identity in [alice(), bob()] {
        let mut m = mount_as(identity, 1, FakeApi::default());
        m.links[0].push_snapshot(&unseated);
        next_refresh(&mut m.session).await;

        assert!(!m.session.store().can_play());
        assert_eq!(m.session.store().board().width(), 15);
        assert_eq!(m.session.click(Coord::new(3, 3)).unwrap(), None);
        assert_eq!(m.session.input_state(), InputState::Idle);
        m.session.teardown().await;
    }
}

#[tokio::test]
async fn tap_twice_submits_exactly_one_move() {
    let mut m = mount_as(alice(), 1, FakeApi::default());
    let link = m.links[0].clone();
    link.push_snapshot(&snapshot(Symbol::X, Winner::None));
    next_refresh(&mut m.session).await;

    let c = Coord::new(3, 3);
    assert_eq!(m.session.click(c).unwrap(), None);
    assert_eq!(m.session.input_state(), InputState::Selected(c));
    assert_eq!(m.session.click(c).unwrap(), Some(c));
    assert_eq!(m.session.input_state(), InputState::Idle);
    assert_eq!(m.session.key(Key::Enter).unwrap(), None);

    let sent = wait_for_sent(&link, 2).await;
    assert_eq!(sent, vec![join_frame(), ClientMessage::MakeMove { x: 3, y: 3 }]);

    let echoed = with_move(snapshot(Symbol::O, Winner::None), c, Cell::X);
    link.push_snapshot(&echoed);
    next_refresh(&mut m.session).await;

    assert_eq!(m.session.snapshot(), Some(&echoed));
    assert_eq!(m.session.store().last_move(), Some(c));
    assert!(!m.session.store().can_play());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(link.sent_messages().len(), 2);
    m.session.teardown().await;
}

#[tokio::test]
async fn filled_selection_is_cleared_by_next_snapshot() {
    let mut m = mount_as(alice(), 1, FakeApi::default());
    let link = m.links[0].clone();
    link.push_snapshot(&snapshot(Symbol::X, Winner::None));
    next_refresh(&mut m.session).await;

    let c = Coord::new(7, 7);
    m.session.click(c).unwrap();
    link.push_snapshot(&with_move(snapshot(Symbol::X, Winner::None), c, Cell::O));
    let (selection_cleared, _) = next_refresh(&mut m.session).await;

    assert!(selection_cleared);
    assert_eq!(m.session.selection(), None);
    m.session.teardown().await;
}

#[tokio::test]
async fn result_opens_once_and_stays_dismissed() {
    let mut m = mount_as(alice(), 1, FakeApi::default());
    let link = m.links[0].clone();

    let won = snapshot(Symbol::O, Winner::Win(Symbol::X));
    link.push_snapshot(&won);
    let (_, opened) = next_refresh(&mut m.session).await;
    assert!(opened);
    assert!(m.session.result_visible());
    assert_eq!(m.session.outcome(), Outcome::Won);

    m.session.dismiss_result();
    assert!(!m.session.result_visible());

    link.push_snapshot(&with_move(won, Coord::new(1, 2), Cell::X));
    let (_, opened) = next_refresh(&mut m.session).await;
    assert!(!opened);
    assert!(!m.session.result_visible());
    m.session.teardown().await;
}

#[tokio::test]
async fn escape_closes_result_and_selection() {
    let mut m = mount_as(bob(), 1, FakeApi::default());
    m.links[0].push_snapshot(&snapshot(Symbol::X, Winner::Win(Symbol::X)));
    next_refresh(&mut m.session).await;

    assert_eq!(
        m.session.outcome(),
        Outcome::Lost {
            winner_name: "Alice".into()
        }
    );
    assert!(m.session.result_visible());
    assert_eq!(m.session.key(Key::Escape).unwrap(), None);
    assert!(!m.session.result_visible());
    m.session.teardown().await;
}

#[tokio::test]
async fn non_host_restart_sends_nothing() {
    let mut m = mount_as(bob(), 1, FakeApi::default());
    let link = m.links[0].clone();
    link.push_snapshot(&snapshot(Symbol::X, Winner::Draw));
    next_refresh(&mut m.session).await;

    assert!(!m.session.store().is_host());
    assert!(!m.session.restart().unwrap());
    assert!(m.session.result_visible());

    tokio::time::sleep(Duration::from_millis(20)).await;
    let sent = link.sent_messages();
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0], ClientMessage::JoinRoom { .. }));
    m.session.teardown().await;
}

#[tokio::test]
async fn host_restart_hides_result_optimistically() {
    let mut m = mount_as(alice(), 1, FakeApi::default());
    let link = m.links[0].clone();
    link.push_snapshot(&snapshot(Symbol::X, Winner::Draw));
    next_refresh(&mut m.session).await;

    assert!(m.session.restart().unwrap());
    assert!(!m.session.result_visible());
    let sent = wait_for_sent(&link, 2).await;
    assert_eq!(sent[1], ClientMessage::Restart);

    link.push_snapshot(&snapshot(Symbol::X, Winner::None));
    next_refresh(&mut m.session).await;
    assert!(m.session.store().can_play());
    m.session.teardown().await;
}

#[tokio::test]
async fn reconnect_rejoins_and_resumes_snapshots() {
    let mut m = mount_as(alice(), 2, FakeApi::default());
    let (first, second) = (m.links[0].clone(), m.links[1].clone());

    first.push_snapshot(&snapshot(Symbol::X, Winner::None));
    next_refresh(&mut m.session).await;
    first.hang_up();

    let mut saw_disconnect = false;
    loop {
        match next_update(&mut m.session).await {
            SessionUpdate::Status(ConnectionStatus::Disconnected) => saw_disconnect = true,
            SessionUpdate::Status(ConnectionStatus::Connected) => break,
            _ => {}
        }
    }
    assert!(saw_disconnect);
    assert_eq!(m.session.status(), ConnectionStatus::Connected);
    assert_eq!(m.session.connection().joins_sent(), 2);

    let rejoin = wait_for_sent(&second, 1).await;
    assert_eq!(rejoin[0], join_frame());

    let moved = with_move(snapshot(Symbol::O, Winner::None), Coord::new(0, 0), Cell::X);
    second.push_snapshot(&moved);
    next_refresh(&mut m.session).await;
    assert_eq!(m.session.snapshot(), Some(&moved));
    m.session.teardown().await;
}

#[tokio::test]
async fn room_deleted_navigates_to_landing() {
    let mut m = mount_as(alice(), 1, FakeApi::default());
    let link = m.links[0].clone();
    assert_eq!(m.marker.get().as_deref(), Some("ABC123"));

    link.push_snapshot(&snapshot(Symbol::X, Winner::None));
    next_refresh(&mut m.session).await;
    m.session.click(Coord::new(4, 4)).unwrap();

    link.push(room_deleted_json("abc123"));
    let update = loop {
        match next_update(&mut m.session).await {
            update @ SessionUpdate::Navigate { .. } => break update,
            _ => {}
        }
    };
    assert_eq!(
        update,
        SessionUpdate::Navigate {
            route: Route::Landing,
            notice: "Room abc123 was deleted".into(),
        }
    );
    assert!(m.session.is_terminated());
    assert_eq!(m.session.selection(), None);
    assert_eq!(m.marker.get(), None);

    assert_eq!(m.session.click(Coord::new(4, 4)).unwrap(), None);
    assert!(!m.session.restart().unwrap());
    assert!(m.session.next_update().await.is_none());
    m.session.teardown().await;
}

#[tokio::test]
async fn teardown_stops_delivery_and_clears_marker() {
    let mut m = mount_as(alice(), 1, FakeApi::default());
    let link = m.links[0].clone();
    link.push_snapshot(&snapshot(Symbol::X, Winner::None));
    next_refresh(&mut m.session).await;

    m.session.teardown().await;
    assert_eq!(m.marker.get(), None);
    assert!(m.session.connection().is_closed());

    link.push_snapshot(&snapshot(Symbol::O, Winner::None));
    assert!(m.session.next_update().await.is_none());
    assert_eq!(m.session.store().next_turn(), Some(Symbol::X));
}

#[tokio::test]
async fn old_session_drop_keeps_new_marker() {
    let marker = RoomMarker::in_memory();
    let (first_connector, _first_links, _) = MockConnector::new(1);
    let (second_connector, _second_links, _) = MockConnector::new(1);
    let api = Arc::new(FakeApi::default());

    let first = RoomSession::mount(
        first_connector,
        "abc123",
        alice(),
        api.clone(),
        marker.clone(),
        fast_config(),
    )
    .unwrap();
    let second = RoomSession::mount(
        second_connector,
        "xyz789",
        alice(),
        api,
        marker.clone(),
        fast_config(),
    )
    .unwrap();

    drop(first);
    assert_eq!(marker.get().as_deref(), Some("XYZ789"));
    drop(second);
    assert_eq!(marker.get(), None);
}

#[tokio::test]
async fn history_refreshes_per_opponent_and_result() {
    let mut m = mount_as(alice(), 1, FakeApi::default());
    let link = m.links[0].clone();

    link.push_snapshot(&snapshot(Symbol::X, Winner::None));
    let stats = next_history(&mut m.session).await;
    assert_eq!(stats.wins, 1);
    assert_eq!(m.session.history(), Some(stats));

    link.push_snapshot(&with_move(
        snapshot(Symbol::O, Winner::None),
        Coord::new(2, 2),
        Cell::X,
    ));
    next_refresh(&mut m.session).await;
    assert_eq!(m.api.history_calls(), 1);

    link.push_snapshot(&snapshot(Symbol::O, Winner::Win(Symbol::X)));
    let stats = next_history(&mut m.session).await;
    assert_eq!(stats.wins, 2);
    assert_eq!(m.api.history_calls(), 2);
    m.session.teardown().await;
}

#[tokio::test]
async fn history_failure_keeps_previous_stats() {
    let mut m = mount_as(alice(), 1, FakeApi::default());
    let link = m.links[0].clone();

    link.push_snapshot(&snapshot(Symbol::X, Winner::None));
    let stats = next_history(&mut m.session).await;

    m.api.fail_history.store(true, Ordering::SeqCst);
    link.push_snapshot(&snapshot(Symbol::X, Winner::Draw));
    next_refresh(&mut m.session).await;

    let deadline = tokio::time::Instant::now() + WAIT;
    while m.api.history_calls() < 2 {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(m.session.poll_history(), None);
    assert_eq!(m.session.history(), Some(stats));
    m.session.teardown().await;
}

#[tokio::test]
async fn slow_history_does_not_block_moves() {
    let api = FakeApi {
        history_delay: Some(Duration::from_secs(30)),
        ..FakeApi::default()
    };
    let mut m = mount_as(alice(), 1, api);
    let link = m.links[0].clone();
    link.push_snapshot(&snapshot(Symbol::X, Winner::None));
    next_refresh(&mut m.session).await;

    let c = Coord::new(5, 5);
    m.session.click(c).unwrap();
    assert_eq!(m.session.click(c).unwrap(), Some(c));
    let sent = wait_for_sent(&link, 2).await;
    assert_eq!(sent[1], ClientMessage::MakeMove { x: 5, y: 5 });
    assert_eq!(m.session.history(), None);
    m.session.teardown().await;
}

#[tokio::test]
async fn invite_link_points_at_room() {
    let mut m = mount_as(alice(), 1, FakeApi::default());
    assert_eq!(
        m.session.invite_link("https://caro.example/"),
        "https://caro.example/room/ABC123"
    );
    m.session.teardown().await;
}
