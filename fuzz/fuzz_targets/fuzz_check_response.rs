//! Fuzz target: `checker::parse_hash_body`
//!
//! Feeds arbitrary bytes as a 200 check body. The parser must never panic,
//! and anything it accepts must be a hex fingerprint that fits the hash
//! bound and appears verbatim inside the body.
//!
//! cargo fuzz run fuzz_check_response

#![no_main]

use libfuzzer_sys::fuzz_target;
use ota_agent::app::checker::parse_hash_body;
use ota_agent::app::types::FIRMWARE_HASH_MAX_LEN;

fuzz_target!(|data: &[u8]| {
    if let Ok(hash) = parse_hash_body(data, false) {
        let s = hash.as_str();
        assert!(!s.is_empty() && s.len() <= FIRMWARE_HASH_MAX_LEN);
        assert!(s.bytes().all(|b| b.is_ascii_hexdigit()));
        assert!(data.windows(s.len()).any(|w| w == s.as_bytes()));
    }

    // A truncated read is never accepted.
    assert!(parse_hash_body(data, true).is_err());
});
