#![no_main]

use libfuzzer_sys::fuzz_target;
use tonus_navigation::{NavAction, MAX_TOKEN_BYTES};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    if let Ok(action) = NavAction::decode(&raw) {
        let encoded = action.encode();
        assert_eq!(encoded, raw);
        assert!(encoded.len() <= MAX_TOKEN_BYTES);
        assert_eq!(NavAction::decode(&encoded), Ok(action));
    }
});
