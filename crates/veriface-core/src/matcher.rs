//! Threshold-based match decision over face-encoding distances.
//!
//! Pure functions of their inputs; no state is retained between calls.
//! Every verification decision in the system goes through here.

use crate::types::{FaceEncoding, MatchResult};

/// Default match tolerance. Lower is stricter (fewer false positives, more
/// false negatives).
pub const DEFAULT_TOLERANCE: f32 = 0.7;

/// Display confidence for a distance: `(1 - d) * 100`.
///
/// Not a calibrated probability. Deliberately unclamped so a distance above
/// 1.0 reports as negative rather than silently saturating.
pub fn confidence(distance: f32) -> f32 {
    (1.0 - distance) * 100.0
}

/// Compare every probe against the reference encoding.
///
/// Returns one [`MatchResult`] per probe, in probe order, with
/// `is_match = distance <= tolerance`.
pub fn match_probes(
    reference: &FaceEncoding,
    probes: &[FaceEncoding],
    tolerance: f32,
) -> Vec<MatchResult> {
    probes
        .iter()
        .enumerate()
        .map(|(probe_index, probe)| {
            let distance = reference.distance(probe);
            MatchResult {
                probe_index,
                is_match: distance <= tolerance,
                distance,
                confidence: confidence(distance),
            }
        })
        .collect()
}

/// Pick the single result worth reporting for an attempt.
///
/// Any positive match wins over all distances: the first probe with
/// `is_match == true` is returned. With no positives, the probe with the
/// strictly minimal distance is the "best" non-match; ties go to the first
/// occurrence. `None` only when `results` is empty.
pub fn select_report(results: &[MatchResult]) -> Option<&MatchResult> {
    if let Some(hit) = results.iter().find(|r| r.is_match) {
        return Some(hit);
    }
    results.iter().fold(None, |best: Option<&MatchResult>, r| match best {
        Some(b) if b.distance <= r.distance => Some(b),
        _ => Some(r),
    })
}
