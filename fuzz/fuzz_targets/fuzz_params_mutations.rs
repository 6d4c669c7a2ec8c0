#![no_main]

use std::rc::Rc;

use libfuzzer_sys::fuzz_target;
use navsync_backend::{MemoryHistory, NavigationBackend};
use navsync_core::normalize::query_body;
use navsync_core::{Encoder, SyncConfig, SyncEngine};

const NAMES: [&str; 4] = ["a", "b", "c d", "x&y"];
const VALUES: [&str; 8] = ["", "1", "2", "a b", "1,2", "%", "x ", "a#b"];

fuzz_target!(|data: &[u8]| {
    // First byte picks the layout, the rest are (op, name, value) triples.
    let Some((&layout, ops)) = data.split_first() else {
        return;
    };
    let config = SyncConfig::default()
        .with_join_arrays(layout & 1 == 0)
        .with_skip_empty_values(layout & 2 == 0)
        .with_encoder(if layout & 4 == 0 { Encoder::Percent } else { Encoder::Raw });
    let backend = Rc::new(MemoryHistory::default());
    let Ok(engine) = SyncEngine::new(Rc::clone(&backend), config) else {
        return;
    };

    for chunk in ops.chunks_exact(3) {
        let name = NAMES[chunk[1] as usize % NAMES.len()];
        let value = VALUES[chunk[2] as usize % VALUES.len()];
        let params = engine.search_params().expect("engine is live");
        let pushes = engine.stats().pushes;
        let changed = match chunk[0] % 7 {
            0 => params.set(name, value),
            1 => params.append(name, value),
            2 => params.delete(name),
            3 => params.sort(),
            4 => params.delete_all(),
            5 => engine.location().set_query(value).map(|_| false),
            _ => backend.go_back().map(|()| false).map_err(Into::into),
        }
        .unwrap_or(false);

        if changed {
            assert_eq!(engine.stats().pushes, pushes + 1, "one push per change");
        }
        let location = engine.location();
        let params = engine.search_params().expect("engine is live");
        assert_eq!(params.to_string(), query_body(&location.query()));
        assert_eq!(backend.current_entry().query, location.query());
    }
});
