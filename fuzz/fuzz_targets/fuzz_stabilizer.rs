#![no_main]

use std::time::{Duration, Instant};

use arbitrary::Arbitrary;
use handgate_core::{FingerVector, GestureCode, GestureStabilizer, Observation, StabilizerConfig};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    stable_frames: u8,
    debounce_ms: u16,
    require_no_hand: bool,
    no_hand_frames: u8,
    ignore_closed_fist: bool,
    /// (mask, frame gap in ms); masks above 31 mean no hand
    frames: Vec<(u8, u8)>,
}

fuzz_target!(|input: Input| {
    let config = StabilizerConfig {
        stable_frames: u32::from(input.stable_frames),
        debounce: Duration::from_millis(u64::from(input.debounce_ms)),
        require_no_hand: input.require_no_hand,
        no_hand_frames: u32::from(input.no_hand_frames),
        ignore_closed_fist: input.ignore_closed_fist,
    };
    let debounce = config.debounce;
    let mut stabilizer = GestureStabilizer::new(config);
    let mut now = Instant::now();
    let mut last_event: Option<Instant> = None;

    for (mask, gap) in input.frames {
        now += Duration::from_millis(u64::from(gap));
        let observation = match GestureCode::try_from(mask) {
            Ok(code) => Observation::Hand(code.to_vector()),
            Err(_) => Observation::NoHand,
        };

        if let Some(event) = stabilizer.observe(observation, now) {
            // Events only fire on a hand showing the emitted gesture
            assert_eq!(observation.fingers(), Some(event.code.to_vector()));
            assert_eq!(event.at, now);
            if input.ignore_closed_fist {
                assert_ne!(event.code.to_vector(), FingerVector::CLOSED);
            }
            if let Some(previous) = last_event {
                assert!(now.duration_since(previous) >= debounce);
            }
            last_event = Some(now);
        }
    }
});
