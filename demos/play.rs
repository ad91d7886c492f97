//! # Terminal Play Example
//!
//! A small terminal client against a running Caro server:
//!
//! 1. Load (or register) the local identity
//! 2. Create a room, or join the code given on the command line
//! 3. Render each snapshot and read moves from stdin
//!
//! Commands: `<x> <y>` taps a cell (tap twice to confirm), `enter` confirms,
//! `esc` cancels, `restart` asks for a rematch (host only), `quit` leaves.
//!
//! ## Running
//!
//! ```sh
//! # Create a room as "Alice":
//! cargo run --example play -- Alice
//!
//! # Join an existing room:
//! cargo run --example play -- Bob ABC123
//!
//! # Point at another server:
//! CARO_API_URL=https://caro.example cargo run --example play -- Alice
//! ```

use std::sync::Arc;
use std::time::Duration;

use caro_room_client::protocol::Coord;
use caro_room_client::{
    ApiClient, ClientConfig, ConnectionConfig, FileStorage, IdentityStore, Key, Lobby,
    MemoryStorage, RoomMarker, RoomSession, RoomStore, Route, SessionUpdate, WebSocketConnector,
};
use tokio::io::{AsyncBufReadExt, BufReader};

fn render(store: &RoomStore, selection: Option<Coord>) {
    if !store.is_synced() {
        println!("Waiting for the room state...");
        return;
    }
    let board = store.board();
    let mut out = String::new();
    for (y, row) in board.rows().iter().enumerate() {
        for (x, cell) in row.iter().enumerate() {
            let here = Coord::new(x, y);
            match cell.symbol() {
                Some(symbol) => out.push_str(&symbol.to_string()),
                None if selection == Some(here) => out.push('*'),
                None => out.push('.'),
            }
            out.push(if store.last_move() == Some(here) { '<' } else { ' ' });
        }
        out.push('\n');
    }
    println!("{out}");
    match store.next_turn().and_then(|s| store.player_for(s)) {
        Some(player) if !store.winner().is_decided() => println!("{} to move", player.name),
        _ => {}
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let config = ClientConfig::from_env()?;
    let mut args = std::env::args().skip(1);
    let name = args.next().unwrap_or_default();
    let code = args.next();

    let api = Arc::new(ApiClient::new(&config.api_url, config.http_timeout)?);
    let mut identities = IdentityStore::load(Arc::new(FileStorage::new(&config.data_dir)));

    // ── Lobby ───────────────────────────────────────────────────────
    let mut lobby = Lobby::new();
    let route = match code {
        Some(code) => lobby.join_room(&mut identities, api.as_ref(), &name, &code).await?,
        None => lobby.create_room(&mut identities, api.as_ref(), &name).await?,
    };
    let Route::Room(room_code) = route else {
        return Err("lobby did not route to a room".into());
    };
    let identity = identities.require()?.clone();
    tracing::info!("Joining {room_code} as {} ({})", identity.name, identity.id);

    // ── Room ────────────────────────────────────────────────────────
    let connector = WebSocketConnector::new(&config.ws_url).with_connect_timeout(Duration::from_secs(5));
    let mut session = RoomSession::mount(
        connector,
        &room_code,
        identity,
        api,
        RoomMarker::new(Arc::new(MemoryStorage::new())),
        ConnectionConfig::default(),
    )?;
    println!("Invite: {}", session.invite_link(&config.api_url));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            update = session.next_update() => {
                let Some(update) = update else { break };
                match update {
                    SessionUpdate::Refreshed { result_opened, .. } => {
                        render(session.store(), session.selection());
                        if result_opened {
                            println!("{}", session.outcome());
                        }
                    }
                    SessionUpdate::History(stats) => println!(
                        "Head to head: {} W / {} L / {} D ({} games)",
                        stats.wins, stats.losses, stats.draws, stats.total
                    ),
                    SessionUpdate::Status(status) => tracing::info!("channel: {status:?}"),
                    SessionUpdate::Navigate { notice, .. } => {
                        println!("{notice}");
                        break;
                    }
                    SessionUpdate::Closed { reason } => {
                        println!("Connection closed: {}", reason.as_deref().unwrap_or("unknown"));
                        break;
                    }
                    SessionUpdate::Unchanged => {}
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let words: Vec<&str> = line.split_whitespace().collect();
                let submitted = match words.as_slice() {
                    ["quit"] => break,
                    [name] if Key::from_name(name) != Key::Other => session.key(Key::from_name(name))?,
                    ["restart"] => {
                        if !session.restart()? {
                            println!("Only the host can restart");
                        }
                        None
                    }
                    [x, y] => match (x.parse(), y.parse()) {
                        (Ok(x), Ok(y)) => session.click(Coord::new(x, y))?,
                        _ => None,
                    },
                    _ => None,
                };
                match submitted {
                    Some(coord) => println!("Move sent: {coord}"),
                    None => render(session.store(), session.selection()),
                }
            }
        }
    }

    session.teardown().await;
    Ok(())
}
