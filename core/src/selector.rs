//! Reduction of a periodogram to transit candidates.
//!
//! The best candidate is the valid grid point with the highest power.
//! Powers equal to within [`TIE_TOLERANCE`] (relative) are resolved in
//! favour of the shorter period, so the choice never depends on grid
//! order or on how the grid was split across workers.

use crate::error::{Result, TransitError};
use crate::types::{Periodogram, PeriodogramPoint, TransitCandidate};

/// Relative tolerance under which two powers count as equal.
pub const TIE_TOLERANCE: f64 = 1e-9;

fn powers_tie(a: f64, b: f64) -> bool {
    (a - b).abs() <= TIE_TOLERANCE * a.abs().max(b.abs())
}

fn to_candidate(point: &PeriodogramPoint) -> Option<TransitCandidate> {
    point.fit.map(|fit| TransitCandidate {
        period: point.period,
        duration: fit.duration,
        depth: fit.depth,
        power: fit.power,
        epoch: fit.epoch,
    })
}

/// Select the single best candidate.
///
/// The maximum power is found first; the candidate is then the shortest
/// period whose power is within [`TIE_TOLERANCE`] of that maximum.  Fails
/// with `EmptyData` when the periodogram holds no valid point.
pub fn select_candidate(periodogram: &Periodogram) -> Result<TransitCandidate> {
    let max_power = periodogram
        .points()
        .iter()
        .filter_map(PeriodogramPoint::power)
        .reduce(f64::max)
        .ok_or_else(|| {
            TransitError::empty(format!(
                "none of {} periodogram points is valid",
                periodogram.len()
            ))
        })?;

    periodogram
        .points()
        .iter()
        .filter_map(to_candidate)
        .filter(|c| powers_tie(c.power, max_power))
        .min_by(|a, b| a.period.total_cmp(&b.period))
        .ok_or_else(|| TransitError::empty("no periodogram point reaches the maximum power"))
}

/// The `n` strongest candidates, best first.
///
/// Sorting needs a total order, so powers are compared exactly here and
/// only exact ties fall back to the shorter period.  Neighbouring grid
/// points around a strong signal are all reported; no peak clustering is
/// applied.
pub fn rank_candidates(periodogram: &Periodogram, n: usize) -> Vec<TransitCandidate> {
    let mut all: Vec<TransitCandidate> = periodogram.points().iter().filter_map(to_candidate).collect();
    all.sort_by(|a, b| b.power.total_cmp(&a.power).then(a.period.total_cmp(&b.period)));
    all.truncate(n);
    all
}
