//! Landmark quantization
//!
//! The hand model reports 21 normalized landmarks per hand (x to the right,
//! y downwards, both in `0..1`). Each finger is reduced to extended or
//! flexed here, with margins that absorb landmark jitter, so the stabilizer
//! only ever sees exact symbols.

use serde::{Deserialize, Serialize};

use handgate_core::{Finger, FingerVector, FINGER_COUNT};

use crate::config::StationConfig;
use crate::error::{Result, StationError};

/// Landmarks per hand
pub const LANDMARK_COUNT: usize = 21;

const THUMB_TIP: usize = 4;
const THUMB_IP: usize = 3;

/// (tip, pip) landmark indices for index..pinky
const FINGER_JOINTS: [(usize, usize); FINGER_COUNT - 1] = [(8, 6), (12, 10), (16, 14), (20, 18)];

/// One normalized landmark
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// Which hand the model saw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Handedness {
    #[default]
    #[serde(alias = "right", alias = "RIGHT")]
    Right,
    #[serde(alias = "left", alias = "LEFT")]
    Left,
}

/// The 21 landmarks of one hand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Landmark>", into = "Vec<Landmark>")]
pub struct HandLandmarks([Landmark; LANDMARK_COUNT]);

impl HandLandmarks {
    /// Build from exactly 21 landmarks
    pub fn new(points: Vec<Landmark>) -> Result<Self> {
        let count = points.len();
        let points: [Landmark; LANDMARK_COUNT] = points.try_into().map_err(|_| {
            StationError::Validation(format!(
                "hand needs {} landmarks, got {}",
                LANDMARK_COUNT, count
            ))
        })?;
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(StationError::Validation(
                "landmark coordinates must be finite".into(),
            ));
        }
        Ok(Self(points))
    }

    /// Landmark by index
    pub fn point(&self, index: usize) -> Option<&Landmark> {
        self.0.get(index)
    }
}

impl TryFrom<Vec<Landmark>> for HandLandmarks {
    type Error = StationError;

    fn try_from(points: Vec<Landmark>) -> Result<Self> {
        Self::new(points)
    }
}

impl From<HandLandmarks> for Vec<Landmark> {
    fn from(hand: HandLandmarks) -> Self {
        hand.0.to_vec()
    }
}

/// Turns landmarks into a finger vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FingerExtractor {
    /// Horizontal margin for the thumb
    pub margin_x: f32,
    /// Vertical margin for the other fingers
    pub margin_y: f32,
}

impl Default for FingerExtractor {
    fn default() -> Self {
        Self {
            margin_x: 0.03,
            margin_y: 0.04,
        }
    }
}

impl FingerExtractor {
    pub fn from_config(config: &StationConfig) -> Self {
        Self {
            margin_x: config.margin_x,
            margin_y: config.margin_y,
        }
    }

    /// Quantize one hand.
    ///
    /// Thumb: extended when its tip is further out than its IP joint by
    /// more than `margin_x`, mirrored for the left hand. Other fingers:
    /// extended when the tip is above the PIP joint by more than
    /// `margin_y`.
    pub fn extract(&self, hand: &HandLandmarks, handedness: Handedness) -> FingerVector {
        let lm = &hand.0;
        let mut fingers = [false; FINGER_COUNT];

        let dx = lm[THUMB_TIP].x - lm[THUMB_IP].x;
        let outward = match handedness {
            Handedness::Right => dx,
            Handedness::Left => -dx,
        };
        fingers[Finger::Thumb.index()] = outward > self.margin_x;

        for (slot, (tip, pip)) in fingers[1..].iter_mut().zip(FINGER_JOINTS) {
            *slot = lm[tip].y < lm[pip].y - self.margin_y;
        }

        FingerVector::new(fingers)
    }
}
