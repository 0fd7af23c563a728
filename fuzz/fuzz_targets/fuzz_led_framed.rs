#![no_main]

use std::time::{Duration, Instant};

use handgate_core::protocol::encode;
use handgate_core::{FramedDecoder, LedProtocol};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Pairs of (byte, delay in ms since the previous byte)
    let mut decoder = FramedDecoder::new();
    let mut now = Instant::now();

    for pair in data.chunks(2) {
        if let Some(delay) = pair.get(1) {
            now += Duration::from_millis(u64::from(*delay));
        }
        // Decoding should not panic
        if let Ok(Some(command)) = decoder.push(pair[0], now) {
            // A decoded command re-encodes to a packet that decodes the same
            let packet = encode(LedProtocol::Framed, &command.fingers, command.status);
            let mut fresh = FramedDecoder::new();
            let mut decoded = None;
            for byte in packet {
                decoded = fresh.push(byte, now).expect("re-encoded packet is valid");
            }
            assert_eq!(decoded, Some(command));
        }
    }
});
