//! Factor verification
//!
//! Exact, ordered comparison. No partial credit and no edit-distance
//! tolerance: one wrong or missing gesture fails the factor.

use crate::error::{Error, Result};
use crate::sequence::GestureSequence;

/// Compare a captured sequence against the enrolled one.
///
/// Returns `Ok(true)` on a match and `Ok(false)` on any difference.
/// Comparing sequences of different kinds is a caller bug and returns
/// [`Error::KindMismatch`] instead of a verdict.
pub fn verify(captured: &GestureSequence, enrolled: &GestureSequence) -> Result<bool> {
    if captured.kind() != enrolled.kind() {
        return Err(Error::KindMismatch {
            captured: captured.kind(),
            enrolled: enrolled.kind(),
        });
    }

    Ok(captured.codes() == enrolled.codes())
}
