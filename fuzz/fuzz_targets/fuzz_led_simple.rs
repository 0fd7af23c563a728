#![no_main]

use handgate_core::protocol::encode;
use handgate_core::{LedProtocol, LedStatus, SimpleDecoder};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut decoder = SimpleDecoder::new();

    for &byte in data {
        match decoder.push(byte) {
            Ok(Some(command)) => {
                assert_eq!(command.status, LedStatus::Reflect);
                assert_eq!(
                    encode(LedProtocol::Simple, &command.fingers, command.status),
                    command.fingers.bits().to_vec()
                );
                assert_eq!(decoder.pending(), 0);
            }
            Ok(None) => assert!(decoder.pending() > 0),
            // A bad byte drops the partial packet
            Err(_) => assert_eq!(decoder.pending(), 0),
        }
    }
});
