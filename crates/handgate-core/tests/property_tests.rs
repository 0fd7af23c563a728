//! Property-based tests for handgate-core using proptest
//!
//! These tests verify invariants that should hold for all frame streams
//! and sequences.

use std::time::{Duration, Instant};

use handgate_core::{
    protocol::{encode, FramedDecoder, LedProtocol, LedStatus, SimpleDecoder},
    AttemptAuditor, FactorChecks, FactorKind, FactorOutcome, FingerVector, GestureCode,
    GestureKind, GestureSequence, GestureStabilizer, MemoryAuditLog, Observation,
    RecorderConfig, SequenceRecorder, SessionStatus, StabilizerConfig, SubjectId,
};
use proptest::prelude::*;

const FRAME: Duration = Duration::from_millis(33);

// ============================================
// Strategies
// ============================================

fn arb_vector() -> impl Strategy<Value = FingerVector> {
    any::<[bool; 5]>().prop_map(FingerVector::new)
}

fn arb_observation() -> impl Strategy<Value = Observation> {
    prop_oneof![
        1 => Just(Observation::NoHand),
        3 => arb_vector().prop_map(Observation::Hand),
    ]
}

/// Runs of identical observations, so streams actually stabilize
fn arb_frame_stream() -> impl Strategy<Value = Vec<Observation>> {
    prop::collection::vec((arb_observation(), 1usize..30), 1..40).prop_map(|runs| {
        runs.into_iter()
            .flat_map(|(obs, len)| std::iter::repeat(obs).take(len))
            .collect()
    })
}

fn arb_stabilizer_config() -> impl Strategy<Value = StabilizerConfig> {
    (1u32..15, 0u64..1500, any::<bool>(), 1u32..10).prop_map(
        |(stable_frames, debounce_ms, require_no_hand, no_hand_frames)| StabilizerConfig {
            stable_frames,
            debounce: Duration::from_millis(debounce_ms),
            require_no_hand,
            no_hand_frames,
            ignore_closed_fist: false,
        },
    )
}

fn arb_kind() -> impl Strategy<Value = GestureKind> {
    prop_oneof![Just(GestureKind::Pin), Just(GestureKind::Pattern)]
}

fn arb_sequence() -> impl Strategy<Value = GestureSequence> {
    arb_kind().prop_flat_map(|kind| {
        prop::collection::vec(0u8..=31, kind.required_len()).prop_map(move |masks| {
            GestureSequence::from_masks(kind, owner(), &masks).unwrap()
        })
    })
}

fn owner() -> SubjectId {
    SubjectId::new("0102030405").unwrap()
}

/// Feed a stream, returning (frame index, code) for each event
fn run(config: StabilizerConfig, frames: &[Observation]) -> Vec<(usize, GestureCode, Instant)> {
    let t0 = Instant::now();
    let mut stab = GestureStabilizer::new(config);
    frames
        .iter()
        .enumerate()
        .filter_map(|(i, obs)| {
            let now = t0 + FRAME * i as u32;
            stab.observe(*obs, now).map(|e| (i, e.code, e.at))
        })
        .collect()
}

// ============================================
// Property Tests
// ============================================

proptest! {
    // ----------------------------------------
    // Stabilizer Properties
    // ----------------------------------------

    #[test]
    fn stable_hold_emits_once_at_threshold(
        v in arb_vector(),
        threshold in 1u32..20,
        extra in 0usize..50,
    ) {
        let config = StabilizerConfig { stable_frames: threshold, ..StabilizerConfig::default() };
        let frames = vec![Observation::Hand(v); threshold as usize + extra];
        let events = run(config, &frames);

        prop_assert_eq!(events.len(), 1);
        prop_assert_eq!(events[0].0, threshold as usize - 1);
        prop_assert_eq!(events[0].1, GestureCode::from_vector(&v));
    }

    #[test]
    fn events_respect_debounce(
        config in arb_stabilizer_config(),
        frames in arb_frame_stream(),
    ) {
        let debounce = config.debounce;
        let events = run(config, &frames);
        for pair in events.windows(2) {
            prop_assert!(pair[1].2.duration_since(pair[0].2) >= debounce);
        }
    }

    #[test]
    fn events_follow_a_stable_run(
        config in arb_stabilizer_config(),
        frames in arb_frame_stream(),
    ) {
        let needed = config.stable_frames as usize;
        for (i, code, _) in run(config, &frames) {
            prop_assert!(i + 1 >= needed);
            for obs in &frames[i + 1 - needed..=i] {
                prop_assert_eq!(obs.fingers().map(GestureCode::from), Some(code));
            }
        }
    }

    #[test]
    fn release_required_between_events(
        stable_frames in 1u32..10,
        no_hand_frames in 1u32..10,
        frames in arb_frame_stream(),
    ) {
        let config = StabilizerConfig {
            stable_frames,
            debounce: Duration::ZERO,
            require_no_hand: true,
            no_hand_frames,
            ignore_closed_fist: false,
        };
        let events = run(config, &frames);
        for pair in events.windows(2) {
            let between = &frames[pair[0].0 + 1..pair[1].0];
            let mut longest = 0u32;
            let mut current = 0u32;
            for obs in between {
                if *obs == Observation::NoHand {
                    current += 1;
                    longest = longest.max(current);
                } else {
                    current = 0;
                }
            }
            prop_assert!(longest >= no_hand_frames);
        }
    }

    #[test]
    fn no_hand_never_stabilizes(config in arb_stabilizer_config(), len in 0usize..200) {
        let frames = vec![Observation::NoHand; len];
        prop_assert!(run(config, &frames).is_empty());
    }

    // ----------------------------------------
    // Recorder Properties
    // ----------------------------------------

    #[test]
    fn recorder_completes_at_required_length(
        kind in arb_kind(),
        masks in prop::collection::vec(0u8..=31, 10),
    ) {
        let t0 = Instant::now();
        let mut rec = SequenceRecorder::new(
            kind,
            owner(),
            t0,
            RecorderConfig::since_start(Duration::from_secs(120)),
        );
        let required = kind.required_len();
        for (i, mask) in masks.iter().take(required).enumerate() {
            let event = handgate_core::GestureEvent {
                code: GestureCode::try_from(*mask).unwrap(),
                at: t0 + Duration::from_secs(i as u64 + 1),
            };
            let status = rec.push(event);
            if i + 1 < required {
                prop_assert_eq!(status, SessionStatus::AwaitingMore);
            } else {
                prop_assert_eq!(status, SessionStatus::Complete);
            }
        }
        let seq = rec.finish().unwrap();
        prop_assert_eq!(seq.masks(), masks[..required].to_vec());
    }

    #[test]
    fn recorder_times_out_when_short(kind in arb_kind(), pushed in 0usize..4, timeout_secs in 1u64..200) {
        let t0 = Instant::now();
        let mut rec = SequenceRecorder::new(
            kind,
            owner(),
            t0,
            RecorderConfig::since_start(Duration::from_secs(timeout_secs)),
        );
        for i in 0..pushed {
            rec.push(handgate_core::GestureEvent {
                code: GestureCode::try_from(1).unwrap(),
                at: t0 + Duration::from_millis(i as u64),
            });
        }
        let late = t0 + Duration::from_secs(timeout_secs) + Duration::from_millis(1);
        prop_assert_eq!(rec.poll(late), SessionStatus::TimedOut);
        prop_assert!(rec.captured().is_empty());
    }

    // ----------------------------------------
    // Verifier Properties
    // ----------------------------------------

    #[test]
    fn verify_is_reflexive(seq in arb_sequence()) {
        prop_assert!(handgate_core::verify(&seq, &seq).unwrap());
    }

    #[test]
    fn verify_rejects_single_difference(seq in arb_sequence(), pos in 0usize..10, flip in 1u8..=31) {
        let pos = pos % seq.len();
        let mut masks = seq.masks();
        masks[pos] ^= flip;
        let other = GestureSequence::from_masks(seq.kind(), owner(), &masks).unwrap();
        prop_assert!(!handgate_core::verify(&other, &seq).unwrap());
    }

    // ----------------------------------------
    // Auditor Properties
    // ----------------------------------------

    #[test]
    fn auditor_success_iff_all_passed(verdicts in prop::collection::vec(any::<bool>(), 3), overall in any::<bool>()) {
        let mut auditor = AttemptAuditor::new(MemoryAuditLog::new());
        let mut checks = FactorChecks::required(FactorKind::ALL);
        for (factor, passed) in FactorKind::ALL.into_iter().zip(&verdicts) {
            checks.record(factor, *passed);
        }
        let attempt = auditor.record(owner(), checks, overall, None);

        prop_assert_eq!(attempt.success(), overall && verdicts.iter().all(|v| *v));
        prop_assert_eq!(attempt.reason().is_none(), attempt.success());
        prop_assert_eq!(auditor.sink().len(), 1);
    }

    #[test]
    fn auditor_early_abort_marks_rest_not_evaluated(failed_at in 0usize..3) {
        let mut auditor = AttemptAuditor::new(MemoryAuditLog::new());
        let mut checks = FactorChecks::required(FactorKind::ALL);
        for factor in &FactorKind::ALL[..failed_at] {
            checks.record(*factor, true);
        }
        checks.record(FactorKind::ALL[failed_at], false);

        let attempt = auditor.record(owner(), checks, false, None);
        for factor in &FactorKind::ALL[failed_at + 1..] {
            prop_assert_eq!(attempt.checks().get(*factor), Some(FactorOutcome::NotEvaluated));
        }
        prop_assert_eq!(attempt.checks().first_failed(), Some(FactorKind::ALL[failed_at]));
    }

    // ----------------------------------------
    // LED Codec Properties
    // ----------------------------------------

    #[test]
    fn framed_decoder_recovers_command(
        noise in prop::collection::vec(any::<u8>().prop_filter("not a header", |b| *b != 0x41), 0..20),
        v in arb_vector(),
        status in prop_oneof![Just(LedStatus::Reflect), Just(LedStatus::Success), Just(LedStatus::Failure)],
    ) {
        let now = Instant::now();
        let mut dec = FramedDecoder::new();
        for b in noise {
            prop_assert_eq!(dec.push(b, now).unwrap(), None);
        }
        let mut last = None;
        for b in encode(LedProtocol::Framed, &v, status) {
            last = dec.push(b, now).unwrap();
        }
        let cmd = last.unwrap();
        prop_assert_eq!(cmd.fingers, v);
        prop_assert_eq!(cmd.status, status);
    }

    #[test]
    fn decoders_survive_arbitrary_bytes(bytes in prop::collection::vec(any::<u8>(), 0..200)) {
        let now = Instant::now();
        let mut framed = FramedDecoder::new();
        let mut simple = SimpleDecoder::new();
        for b in bytes {
            let _ = framed.push(b, now);
            let _ = simple.push(b);
            prop_assert!(simple.pending() < 5);
        }
    }
}
