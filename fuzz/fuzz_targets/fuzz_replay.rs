#![no_main]

use handgate_station::{FingerExtractor, ReplaySource};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // Parsing arbitrary frame files should not panic
        let source = ReplaySource::parse(text, FingerExtractor::default());
        // Each line expands to at most 10 000 frames
        assert!(source.remaining() <= text.lines().count() * 10_000);
    }
});
