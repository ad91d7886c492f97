#![no_main]

use caro_room_client::protocol::{Coord, Identity, ServerMessage};
use caro_room_client::{MoveInput, RoomStore};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(msg) = serde_json::from_slice::<ServerMessage>(data) else {
        return;
    };

    // Arbitrary snapshots must never panic the derivations or the input
    // machine, including ragged or empty boards.
    if let ServerMessage::RoomState(snapshot) = msg {
        let me = snapshot
            .players
            .first()
            .map_or_else(|| Identity::new("fuzz", "Fuzz"), |p| Identity::new(p.id.clone(), p.name.clone()));
        let mut store = RoomStore::new(me);
        store.apply(*snapshot);
        let _ = (store.can_play(), store.is_host(), store.opponent());

        let mut input = MoveInput::new();
        let target = store.last_move().unwrap_or(Coord::new(0, 0));
        input.click(target, &store);
        input.sync(&store);
        input.click(target, &store);
    }
});
