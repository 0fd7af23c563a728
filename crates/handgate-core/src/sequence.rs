//! Finalized gesture sequences (enrolled or captured)

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{GestureCode, GestureKind, SubjectId};

/// An ordered, complete run of gestures
///
/// A sequence always has exactly `kind.required_len()` gestures; the
/// constructor and deserialization both enforce it. There are no mutators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSequence", into = "RawSequence")]
pub struct GestureSequence {
    kind: GestureKind,
    owner: SubjectId,
    codes: Vec<GestureCode>,
}

impl GestureSequence {
    /// Build a sequence, rejecting the wrong length for `kind`
    pub fn new(kind: GestureKind, owner: SubjectId, codes: Vec<GestureCode>) -> Result<Self> {
        let expected = kind.required_len();
        if codes.len() != expected {
            return Err(Error::InvalidSequenceLength {
                kind,
                expected,
                actual: codes.len(),
            });
        }
        Ok(Self { kind, owner, codes })
    }

    /// Build from raw 5-bit masks
    pub fn from_masks(kind: GestureKind, owner: SubjectId, masks: &[u8]) -> Result<Self> {
        let codes = masks
            .iter()
            .map(|m| GestureCode::try_from(*m))
            .collect::<Result<Vec<_>>>()?;
        Self::new(kind, owner, codes)
    }

    /// PIN or pattern
    pub fn kind(&self) -> GestureKind {
        self.kind
    }

    /// Who the sequence belongs to (or who captured it)
    pub fn owner(&self) -> &SubjectId {
        &self.owner
    }

    /// The gestures, in order
    pub fn codes(&self) -> &[GestureCode] {
        &self.codes
    }

    /// Raw masks, in order
    pub fn masks(&self) -> Vec<u8> {
        self.codes.iter().map(|c| c.mask()).collect()
    }

    /// Number of gestures
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Always false for a valid sequence
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
struct RawSequence {
    kind: GestureKind,
    owner: SubjectId,
    codes: Vec<GestureCode>,
}

impl TryFrom<RawSequence> for GestureSequence {
    type Error = Error;

    fn try_from(raw: RawSequence) -> Result<Self> {
        Self::new(raw.kind, raw.owner, raw.codes)
    }
}

impl From<GestureSequence> for RawSequence {
    fn from(seq: GestureSequence) -> Self {
        Self {
            kind: seq.kind,
            owner: seq.owner,
            codes: seq.codes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> SubjectId {
        SubjectId::new("0102030405").unwrap()
    }

    #[test]
    fn test_pin_requires_four() {
        assert!(GestureSequence::from_masks(GestureKind::Pin, owner(), &[1, 3, 7, 15]).is_ok());

        let err = GestureSequence::from_masks(GestureKind::Pin, owner(), &[1, 3, 7]).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidSequenceLength {
                kind: GestureKind::Pin,
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn test_pattern_requires_ten() {
        let masks = [1, 1, 2, 3, 5, 8, 13, 21, 3, 1];
        let seq = GestureSequence::from_masks(GestureKind::Pattern, owner(), &masks).unwrap();
        assert_eq!(seq.len(), 10);
        assert_eq!(seq.masks(), masks.to_vec());

        assert!(GestureSequence::from_masks(GestureKind::Pattern, owner(), &masks[..4]).is_err());
    }

    #[test]
    fn test_rejects_invalid_mask() {
        assert_eq!(
            GestureSequence::from_masks(GestureKind::Pin, owner(), &[1, 2, 3, 99]),
            Err(Error::InvalidGestureCode(99))
        );
    }

    #[test]
    fn test_deserialize_validates_length() {
        let json = r#"{"kind":"pin","owner":"0102030405","codes":[1,2]}"#;
        assert!(serde_json::from_str::<GestureSequence>(json).is_err());

        let json = r#"{"kind":"pin","owner":"0102030405","codes":[1,2,4,8]}"#;
        let seq: GestureSequence = serde_json::from_str(json).unwrap();
        assert_eq!(seq.kind(), GestureKind::Pin);
    }
}
