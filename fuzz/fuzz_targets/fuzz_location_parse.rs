#![no_main]

use libfuzzer_sys::fuzz_target;
use navsync_backend::Entry;
use navsync_core::normalize::{canonical_entry, canonical_path, compose_entry};
use navsync_core::{Encoder, Resolve, SearchParams, SyncConfig, ToStringOptions};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    // An accepted href resolves to a valid entry whose href parses again.
    if let Ok(parts) = canonical_path(input) {
        let entry = parts.resolve(&Entry::new("/"), Resolve::Assign);
        let canonical = canonical_entry(&entry).expect("resolved entry is canonical");
        let href = compose_entry(&canonical);
        assert!(
            canonical_path(href.as_str()).is_ok(),
            "composed href rejected: {href:?}"
        );
    }

    // Parameter rendering is stable under re-parse for every layout.
    let options = ToStringOptions::default().encoder(Encoder::Percent);
    for config in [
        SyncConfig::default(),
        SyncConfig::default().with_join_arrays(false),
        SyncConfig::default().with_join_arrays_with(";"),
    ] {
        let params = SearchParams::with_config(input, config.clone());
        let rendered = params.to_string_with(&options);
        let reparsed = SearchParams::with_config(&rendered, config);
        assert_eq!(reparsed.to_string_with(&options), rendered);
        assert_eq!(reparsed.len(), params.len());
    }
});
