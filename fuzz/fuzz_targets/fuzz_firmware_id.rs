//! Fuzz target: `FirmwareId::new` and `ServerUrl::new`
//!
//! Whatever the validators accept must be safe to splice into a request
//! path (no query or fragment in the server base), and the check URL
//! built from them must fit its buffer.
//!
//! cargo fuzz run fuzz_firmware_id

#![no_main]

use libfuzzer_sys::fuzz_target;
use ota_agent::app::checker::check_url;
use ota_agent::app::types::{FIRMWARE_ID_MAX_LEN, FirmwareId, ServerUrl};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let (left, right) = text.split_once('\n').unwrap_or((text, ""));

    let id = FirmwareId::new(left).ok();
    if let Some(id) = &id {
        let s = id.as_str();
        assert!(!s.is_empty() && s.len() <= FIRMWARE_ID_MAX_LEN);
        assert!(!s.contains(['/', '?', '#', '%', ' ']));
    }

    if let Ok(server) = ServerUrl::new(right) {
        let s = server.as_str();
        assert!(s.starts_with("https://"));
        assert!(!s.contains(['?', '#']));
        assert!(!s.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()));
        assert!(!server.base()["https://".len()..].is_empty());

        if let Some(id) = &id {
            let url = check_url(&server, id, None).unwrap();
            assert!(url.ends_with(&format!("/v1/check/{}?hash=", id.as_str())));
        }
    }
});
