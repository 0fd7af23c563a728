//! Recorded frame replay
//!
//! A replay file is JSON Lines, one frame per line:
//!
//! ```text
//! null                                   no hand
//! "none"                                 no hand
//! [1, 0, 0, 0, 0]                        finger bits, thumb first
//! 19                                     gesture mask
//! {"mask": 1, "repeat": 10}              repeated frame
//! {"bits": [0,1,1,0,0], "repeat": 10}
//! {"landmarks": [...21 points...], "handedness": "Left"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. A line that cannot
//! be understood becomes a dropped frame.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use handgate_core::{FingerVector, GestureCode, Observation};

use super::landmarks::{FingerExtractor, HandLandmarks, Handedness};
use super::{FingerStateSource, ScriptedSource, SensorError};

#[derive(Debug, Deserialize)]
struct FrameRecord {
    #[serde(default)]
    landmarks: Option<HandLandmarks>,
    #[serde(default)]
    handedness: Handedness,
    #[serde(default)]
    bits: Option<[u8; 5]>,
    #[serde(default)]
    mask: Option<u8>,
    #[serde(default = "one")]
    repeat: u32,
}

fn one() -> u32 {
    1
}

/// Longest run a single line may expand to
const MAX_REPEAT: u32 = 10_000;

/// Frames replayed from a JSON Lines file
#[derive(Debug)]
pub struct ReplaySource {
    path: Option<PathBuf>,
    frames: ScriptedSource,
}

impl ReplaySource {
    /// Read and parse a replay file
    pub fn open(path: &Path, extractor: FingerExtractor) -> Result<Self, SensorError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SensorError::Unavailable(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut source = Self::parse(&text, extractor);
        source.path = Some(path.to_path_buf());
        info!(
            path = %path.display(),
            frames = source.frames.remaining(),
            "Loaded frame replay"
        );
        Ok(source)
    }

    /// Like [`ReplaySource::open`], but a file that cannot be read gives
    /// a source whose first frame fails with [`SensorError::Unavailable`],
    /// so the failure surfaces where frames are consumed
    pub fn open_deferred(path: &Path, extractor: FingerExtractor) -> Self {
        match Self::open(path, extractor) {
            Ok(source) => source,
            Err(e) => {
                warn!(path = %path.display(), "Frame replay unavailable: {}", e);
                Self {
                    path: Some(path.to_path_buf()),
                    frames: ScriptedSource::new().error(e),
                }
            }
        }
    }

    /// Parse replay text
    pub fn parse(text: &str, extractor: FingerExtractor) -> Self {
        let mut frames = ScriptedSource::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_line(line, &extractor) {
                Ok((observation, repeat)) => {
                    frames = match observation {
                        Observation::Hand(v) => frames.hand(v, repeat),
                        Observation::NoHand => frames.no_hand(repeat),
                    };
                }
                Err(reason) => {
                    debug!(line = number + 1, %reason, "Unreadable replay frame");
                    frames = frames.error(SensorError::FrameDropped(format!(
                        "line {}: {}",
                        number + 1,
                        reason
                    )));
                }
            }
        }
        Self { path: None, frames }
    }

    /// Report "no hand" after the last frame so the capture budget decides
    /// when to stop
    pub fn idle_when_done(mut self) -> Self {
        self.frames = self.frames.idle_when_done();
        self
    }

    /// Frames left to replay
    pub fn remaining(&self) -> usize {
        self.frames.remaining()
    }
}

fn parse_line(line: &str, extractor: &FingerExtractor) -> Result<(Observation, usize), String> {
    let value: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
    match value {
        Value::Null => Ok((Observation::NoHand, 1)),
        Value::String(s) if s.eq_ignore_ascii_case("none") || s.eq_ignore_ascii_case("no_hand") => {
            Ok((Observation::NoHand, 1))
        }
        Value::Number(n) => {
            let mask = n
                .as_u64()
                .and_then(|m| u8::try_from(m).ok())
                .ok_or_else(|| format!("invalid gesture mask {}", n))?;
            Ok((Observation::Hand(mask_vector(mask)?), 1))
        }
        Value::Array(_) => {
            let bits: [u8; 5] = serde_json::from_value(value).map_err(|e| e.to_string())?;
            let vector = FingerVector::from_bits(bits).map_err(|e| e.to_string())?;
            Ok((Observation::Hand(vector), 1))
        }
        Value::Object(_) => {
            let record: FrameRecord = serde_json::from_value(value).map_err(|e| e.to_string())?;
            if record.repeat > MAX_REPEAT {
                return Err(format!("repeat {} exceeds {}", record.repeat, MAX_REPEAT));
            }
            let observation = if let Some(hand) = &record.landmarks {
                Observation::Hand(extractor.extract(hand, record.handedness))
            } else if let Some(bits) = record.bits {
                Observation::Hand(FingerVector::from_bits(bits).map_err(|e| e.to_string())?)
            } else if let Some(mask) = record.mask {
                Observation::Hand(mask_vector(mask)?)
            } else {
                Observation::NoHand
            };
            Ok((observation, record.repeat as usize))
        }
        other => Err(format!("unsupported frame {}", other)),
    }
}

fn mask_vector(mask: u8) -> Result<FingerVector, String> {
    GestureCode::try_from(mask)
        .map(GestureCode::to_vector)
        .map_err(|e| e.to_string())
}

#[async_trait]
impl FingerStateSource for ReplaySource {
    async fn next_observation(&mut self) -> Result<Observation, SensorError> {
        self.frames.next_observation().await
    }

    fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("replay {}", path.display()),
            None => "replay".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::landmarks::tests::hand_with;

    async fn drain(mut source: ReplaySource) -> Vec<Result<Observation, SensorError>> {
        let mut out = Vec::new();
        loop {
            match source.next_observation().await {
                Err(SensorError::Exhausted) => return out,
                other => out.push(other),
            }
        }
    }

    #[tokio::test]
    async fn test_parses_every_line_form() {
        let hand = hand_with([false, true, true, false, false], Handedness::Left);
        let landmarks = serde_json::to_string(&hand).unwrap();
        let text = format!(
            "# header\nnull\n\"none\"\n[1,0,0,0,0]\n19\n{{\"mask\": 2, \"repeat\": 3}}\n\n{{\"landmarks\": {}, \"handedness\": \"Left\"}}\n",
            landmarks
        );
        let frames = drain(ReplaySource::parse(&text, FingerExtractor::default())).await;

        let v = |bits| Ok(Observation::Hand(FingerVector::from_bits(bits).unwrap()));
        assert_eq!(
            frames,
            vec![
                Ok(Observation::NoHand),
                Ok(Observation::NoHand),
                v([1, 0, 0, 0, 0]),
                v([1, 1, 0, 0, 1]),
                v([0, 1, 0, 0, 0]),
                v([0, 1, 0, 0, 0]),
                v([0, 1, 0, 0, 0]),
                v([0, 1, 1, 0, 0]),
            ]
        );
    }

    #[tokio::test]
    async fn test_bad_lines_become_dropped_frames() {
        let text = "[1,0,0]\n{not json\n40\n{\"mask\": 1, \"repeat\": 20000}\n[0,0,0,0,1]\n";
        let frames = drain(ReplaySource::parse(text, FingerExtractor::default())).await;
        assert_eq!(frames.len(), 5);
        assert!(frames[..4]
            .iter()
            .all(|f| matches!(f, Err(SensorError::FrameDropped(_)))));
        assert!(frames[4].is_ok());
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let err = ReplaySource::open(Path::new("/nonexistent/frames.jsonl"), FingerExtractor::default())
            .unwrap_err();
        assert!(matches!(err, SensorError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_deferred_open_fails_on_first_frame() {
        let mut source = ReplaySource::open_deferred(
            Path::new("/nonexistent/frames.jsonl"),
            FingerExtractor::default(),
        )
        .idle_when_done();
        assert_eq!(source.remaining(), 1);
        assert!(matches!(
            source.next_observation().await,
            Err(SensorError::Unavailable(_))
        ));
    }

    #[test]
    fn test_open_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.jsonl");
        std::fs::write(&path, "{\"mask\": 1, \"repeat\": 10}\nnull\n").unwrap();
        let source = ReplaySource::open(&path, FingerExtractor::default()).unwrap();
        assert_eq!(source.remaining(), 11);
        assert!(source.describe().contains("frames.jsonl"));
    }
}
