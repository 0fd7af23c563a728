//! Core value types: fingers, gesture codes, factor kinds and identifiers

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{FINGER_COUNT, PATTERN_LENGTH, PIN_LENGTH};

/// A finger, in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    /// All fingers in wire order
    pub const ALL: [Finger; FINGER_COUNT] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    /// Position of this finger in a vector
    pub fn index(self) -> usize {
        self as usize
    }

    /// Bit of this finger inside a gesture code
    pub fn mask(self) -> u8 {
        1 << self.index()
    }
}

/// Extension state of the five fingers of one hand, for one frame
///
/// `true` means extended. Produced once per frame and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FingerVector([bool; FINGER_COUNT]);

impl FingerVector {
    /// All fingers flexed (closed fist)
    pub const CLOSED: FingerVector = FingerVector([false; FINGER_COUNT]);

    /// All fingers extended (open palm)
    pub const OPEN: FingerVector = FingerVector([true; FINGER_COUNT]);

    /// Create from extension flags ordered thumb..pinky
    pub fn new(fingers: [bool; FINGER_COUNT]) -> Self {
        Self(fingers)
    }

    /// Create from 0/1 bytes ordered thumb..pinky
    pub fn from_bits(bits: [u8; FINGER_COUNT]) -> Result<Self> {
        let mut fingers = [false; FINGER_COUNT];
        for (slot, bit) in fingers.iter_mut().zip(bits) {
            *slot = match bit {
                0 => false,
                1 => true,
                other => return Err(Error::InvalidFingerBit(other)),
            };
        }
        Ok(Self(fingers))
    }

    /// 0/1 bytes ordered thumb..pinky
    pub fn bits(&self) -> [u8; FINGER_COUNT] {
        self.0.map(u8::from)
    }

    /// Whether a finger is extended
    pub fn is_extended(&self, finger: Finger) -> bool {
        self.0[finger.index()]
    }

    /// Number of extended fingers
    pub fn extended_count(&self) -> usize {
        self.0.iter().filter(|f| **f).count()
    }

    /// Extension flags ordered thumb..pinky
    pub fn as_array(&self) -> &[bool; FINGER_COUNT] {
        &self.0
    }
}

impl fmt::Display for FingerVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for extended in self.0 {
            f.write_str(if extended { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// A discrete gesture symbol
///
/// Stored as a 5-bit mask (thumb = 1, index = 2, middle = 4, ring = 8,
/// pinky = 16) so enrolled sequences stay compact. Equality is exact
/// equality of the underlying finger vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct GestureCode(u8);

impl GestureCode {
    /// Largest valid mask
    pub const MAX: u8 = 0b1_1111;

    /// Derive the code for a finger vector
    pub fn from_vector(vector: &FingerVector) -> Self {
        let mask = Finger::ALL
            .iter()
            .filter(|f| vector.is_extended(**f))
            .fold(0u8, |acc, f| acc | f.mask());
        Self(mask)
    }

    /// Finger vector this code stands for
    pub fn to_vector(self) -> FingerVector {
        FingerVector(Finger::ALL.map(|f| self.0 & f.mask() != 0))
    }

    /// Raw 5-bit mask
    pub fn mask(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for GestureCode {
    type Error = Error;

    fn try_from(mask: u8) -> Result<Self> {
        if mask > Self::MAX {
            return Err(Error::InvalidGestureCode(mask));
        }
        Ok(Self(mask))
    }
}

impl From<GestureCode> for u8 {
    fn from(code: GestureCode) -> u8 {
        code.0
    }
}

impl From<FingerVector> for GestureCode {
    fn from(vector: FingerVector) -> Self {
        Self::from_vector(&vector)
    }
}

impl fmt::Display for GestureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_vector().fmt(f)
    }
}

/// What the extractor saw in one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// A hand was detected with these finger states
    Hand(FingerVector),
    /// No hand in view
    NoHand,
}

impl Observation {
    /// Finger states if a hand was seen
    pub fn fingers(&self) -> Option<FingerVector> {
        match self {
            Observation::Hand(v) => Some(*v),
            Observation::NoHand => None,
        }
    }
}

impl From<Option<FingerVector>> for Observation {
    fn from(v: Option<FingerVector>) -> Self {
        v.map_or(Observation::NoHand, Observation::Hand)
    }
}

/// Kind of gesture sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GestureKind {
    /// Short per-area code (4 gestures)
    Pin,
    /// Long per-subject code (10 gestures)
    Pattern,
}

impl GestureKind {
    /// Number of gestures a finalized sequence must have
    pub fn required_len(self) -> usize {
        match self {
            GestureKind::Pin => PIN_LENGTH,
            GestureKind::Pattern => PATTERN_LENGTH,
        }
    }
}

impl fmt::Display for GestureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GestureKind::Pin => f.write_str("PIN"),
            GestureKind::Pattern => f.write_str("pattern"),
        }
    }
}

/// An independent proof of identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FactorKind {
    /// Possession of an RFID card
    Rfid,
    /// Gesture PIN
    Pin,
    /// Gesture pattern
    Pattern,
}

impl FactorKind {
    /// Factors in the order an attempt evaluates them
    pub const ALL: [FactorKind; 3] = [FactorKind::Rfid, FactorKind::Pin, FactorKind::Pattern];

    /// Gesture kind backing this factor, if any
    pub fn gesture_kind(self) -> Option<GestureKind> {
        match self {
            FactorKind::Rfid => None,
            FactorKind::Pin => Some(GestureKind::Pin),
            FactorKind::Pattern => Some(GestureKind::Pattern),
        }
    }
}

impl From<GestureKind> for FactorKind {
    fn from(kind: GestureKind) -> Self {
        match kind {
            GestureKind::Pin => FactorKind::Pin,
            GestureKind::Pattern => FactorKind::Pattern,
        }
    }
}

impl fmt::Display for FactorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactorKind::Rfid => f.write_str("RFID"),
            FactorKind::Pin => f.write_str("PIN"),
            FactorKind::Pattern => f.write_str("PATTERN"),
        }
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create from a non-empty string (surrounding whitespace is trimmed)
            pub fn new(id: impl Into<String>) -> Result<Self> {
                let id = id.into();
                let trimmed = id.trim();
                if trimmed.is_empty() {
                    return Err(Error::InvalidIdentifier(format!(
                        "{} cannot be empty",
                        stringify!($name)
                    )));
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Borrow the identifier
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(id: String) -> Result<Self> {
                Self::new(id)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identity of the person authenticating (national id number)
    SubjectId
);

string_id!(
    /// Identity of a physical access area
    AreaId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gesture_code_bit_order() {
        let thumb = FingerVector::from_bits([1, 0, 0, 0, 0]).unwrap();
        let code = GestureCode::from_vector(&thumb);
        assert_eq!(code.mask(), 1);
        assert_eq!(code.to_string(), "10000");

        let pinky = FingerVector::from_bits([0, 0, 0, 0, 1]).unwrap();
        assert_eq!(GestureCode::from(pinky).mask(), 16);
    }

    #[test]
    fn test_gesture_code_vector_roundtrip() {
        for mask in 0..=GestureCode::MAX {
            let code = GestureCode::try_from(mask).unwrap();
            assert_eq!(GestureCode::from_vector(&code.to_vector()), code);
        }
    }

    #[test]
    fn test_gesture_code_rejects_out_of_range() {
        assert_eq!(GestureCode::try_from(32), Err(Error::InvalidGestureCode(32)));
        assert!(serde_json::from_str::<GestureCode>("40").is_err());
    }

    #[test]
    fn test_finger_bits_validation() {
        assert!(FingerVector::from_bits([0, 1, 1, 0, 0]).is_ok());
        assert_eq!(
            FingerVector::from_bits([0, 2, 0, 0, 0]),
            Err(Error::InvalidFingerBit(2))
        );
    }

    #[test]
    fn test_extended_count() {
        let v = FingerVector::from_bits([0, 1, 1, 0, 1]).unwrap();
        assert_eq!(v.extended_count(), 3);
        assert!(v.is_extended(Finger::Middle));
        assert!(!v.is_extended(Finger::Thumb));
    }

    #[test]
    fn test_required_lengths() {
        assert_eq!(GestureKind::Pin.required_len(), 4);
        assert_eq!(GestureKind::Pattern.required_len(), 10);
        assert_eq!(FactorKind::from(GestureKind::Pattern), FactorKind::Pattern);
    }

    #[test]
    fn test_identifiers_trim_and_reject_empty() {
        let id = SubjectId::new("  0102030405 ").unwrap();
        assert_eq!(id.as_str(), "0102030405");
        assert!(AreaId::new("   ").is_err());
        assert!(serde_json::from_str::<AreaId>("\"\"").is_err());
    }
}
