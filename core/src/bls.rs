//! Box Least Squares search engine for transit detection.
//!
//! # Background
//!
//! A planet crossing the disc of its host star blocks a small fraction of
//! the star's light for a few hours, once per orbit.  To first order the
//! light curve of such a system is flat with a periodic, rectangular
//! ("box") dip.  The *Box Least Squares* search (Kovács, Zucker & Mazeh
//! 2002) tries every plausible period and, for each one, folds the light
//! curve on that period and looks for the box that best explains the
//! folded flux.  A genuine transit adds coherently at the right period and
//! stands out; noise and wrong periods smear it away.
//!
//! # Algorithm overview
//!
//! 1. **Weights**: inverse-variance weights `w = 1 / σ²` from the flux
//!    errors; flux is centred on its weighted mean.
//! 2. **Period grid**: `grid_size` periods spaced linearly between
//!    `period_min` and `period_max`.
//! 3. **Folding**: for each period `P`, every sample time is reduced to
//!    its phase `t mod P` in `[0, P)` and the samples are ordered by phase.
//! 4. **Box fit**: for each trial duration (see [`DURATION_MULTIPLIERS`])
//!    a window is slid across the folded curve, starting at every sample
//!    and wrapping around phase zero.  Prefix sums give the in-transit
//!    weight `W_in` and weighted flux in O(1) per window.  The
//!    least-squares box depth is the difference between the weighted
//!    out-of-transit and in-transit means, and the detection power is
//!    `depth² × W_in` (zero for a brightening).
//! 5. **Periodogram**: the best window per period.  A period where every
//!    window holds either all samples or none is marked invalid.
//!
//! Step 3–5 are independent per period and run on a **rayon** pool.  The
//! grid is evaluated in order, chunk by chunk, so an evaluation budget
//! always covers a prefix of the grid and results do not depend on the
//! number of worker threads.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::error::{Result, TransitError};
use crate::selector;
use crate::types::{
    BoxFit, LightCurve, Periodogram, PeriodogramPoint, SearchParams, SearchResult,
    DURATION_MULTIPLIERS,
};

/// Grid points evaluated between two budget checks.
const CHUNK_SIZE: usize = 256;

/// Weighted, mean-subtracted samples shared read-only by every worker.
struct FoldInput<'a> {
    time: &'a [f64],
    /// `w_i`
    weight: Vec<f64>,
    /// `w_i × (y_i − ȳ)`
    weighted_flux: Vec<f64>,
}

impl<'a> FoldInput<'a> {
    fn new(time: &'a [f64], flux: &[f64], flux_err: &[f64]) -> Result<Self> {
        if flux.len() != time.len() || flux_err.len() != time.len() {
            return Err(TransitError::format(format!(
                "column length mismatch: time={}, flux={}, flux_err={}",
                time.len(),
                flux.len(),
                flux_err.len()
            )));
        }
        if let Some(i) = (0..flux.len()).find(|&i| !flux[i].is_finite() || !flux_err[i].is_finite()) {
            return Err(TransitError::format(format!(
                "sample {} has non-finite flux or error; preprocess the light curve first",
                i
            )));
        }
        if let Some(i) = flux_err.iter().position(|&e| e <= 0.0) {
            return Err(TransitError::format(format!(
                "sample {} has non-positive flux error {}",
                i, flux_err[i]
            )));
        }

        let weight: Vec<f64> = flux_err.iter().map(|e| 1.0 / (e * e)).collect();
        if let Some(i) = weight.iter().position(|w| !w.is_finite()) {
            return Err(TransitError::format(format!(
                "sample {} has flux error {} too small to weight",
                i, flux_err[i]
            )));
        }
        let total: f64 = weight.iter().sum();
        let mean = weight.iter().zip(flux).map(|(w, y)| w * y).sum::<f64>() / total;
        if !total.is_finite() || !mean.is_finite() {
            return Err(TransitError::format(
                "inverse-variance weights overflow; flux errors are too small",
            ));
        }
        let weighted_flux = weight.iter().zip(flux).map(|(w, y)| w * (y - mean)).collect();

        Ok(Self {
            time,
            weight,
            weighted_flux,
        })
    }

    fn len(&self) -> usize {
        self.time.len()
    }
}

// ---------------------------------------------------------------------------
// BlsEngine
// ---------------------------------------------------------------------------

/// The main Box Least Squares search engine.
///
/// Construct with a [`SearchParams`] and call [`BlsEngine::search`] on a
/// cleaned light curve to obtain a [`SearchResult`].
#[derive(Clone, Debug, Default)]
pub struct BlsEngine {
    /// Configuration controlling the period grid, durations and budget.
    params: SearchParams,
}

impl BlsEngine {
    pub fn new(params: SearchParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    /// Run the search on a preprocessed light curve.
    ///
    /// Fails with `InvalidConfig` for a degenerate configuration,
    /// `Format` when the curve still holds non-finite samples, and
    /// `SearchTimeout` when the budget expires before the first grid point
    /// is evaluated.  Running out of budget later yields a result with
    /// `partial = true`.
    pub fn search(&self, lc: &LightCurve) -> Result<SearchResult> {
        let start = Instant::now();
        self.params.validate()?;
        if lc.is_empty() {
            return Err(TransitError::empty("light curve has no samples"));
        }

        let grid = self.params.period_grid();
        info!(
            "Starting BLS search: {} samples, {} periods in [{:.4}, {:.4}] d, duration fraction {:.3}",
            lc.len(),
            grid.len(),
            self.params.period_min,
            self.params.period_max,
            self.params.duration_fraction,
        );

        // ------------------------------------------------------------------
        // Step 1: Weights
        // ------------------------------------------------------------------
        let time = lc.time().to_vec();
        let flux = lc.flux().to_vec();
        let flux_err = lc.flux_err().to_vec();
        let input = FoldInput::new(&time, &flux, &flux_err)?;

        // ------------------------------------------------------------------
        // Step 2-5: Parallel period sweep
        // ------------------------------------------------------------------
        let deadline = self
            .params
            .timeout_ms
            .map(|ms| start + Duration::from_millis(ms));
        let points = if self.params.n_workers > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.params.n_workers)
                .build()
                .map_err(|e| TransitError::config(format!("cannot build worker pool: {}", e)))?;
            pool.install(|| self.sweep(&input, &grid, deadline))
        } else {
            self.sweep(&input, &grid, deadline)
        };

        let evaluated = points.len();
        if evaluated == 0 {
            return Err(TransitError::SearchTimeout {
                evaluated,
                grid_size: grid.len(),
            });
        }

        let periodogram = Periodogram::new(points);
        let n_invalid = evaluated - periodogram.n_valid();
        let partial = evaluated < grid.len();
        if self.params.emit_warnings {
            if n_invalid > 0 {
                warn!("{} of {} periods had only degenerate windows", n_invalid, evaluated);
            }
            if partial {
                warn!(
                    "Search budget expired after {} of {} periods; result is partial",
                    evaluated,
                    grid.len()
                );
            }
        }

        let candidate = selector::select_candidate(&periodogram).ok();
        let elapsed = start.elapsed().as_millis() as u64;
        match &candidate {
            Some(c) => info!(
                "Search complete in {} ms: best period {:.5} d, depth {:.0} ppm, power {:.3}",
                elapsed,
                c.period,
                c.depth_ppm(),
                c.power,
            ),
            None => info!("Search complete in {} ms: no valid periods", elapsed),
        }

        Ok(SearchResult {
            periodogram,
            candidate,
            partial,
            evaluated,
            grid_size: grid.len(),
            processing_time_ms: elapsed,
        })
    }

    // ======================================================================
    // Internal helpers
    // ======================================================================

    /// Evaluate the grid in order, chunk by chunk, until the budget runs
    /// out.  Each chunk is spread over the current rayon pool.
    fn sweep(&self, input: &FoldInput, grid: &[f64], deadline: Option<Instant>) -> Vec<PeriodogramPoint> {
        let limit = self
            .params
            .max_evaluations
            .map_or(grid.len(), |m| m.min(grid.len()));

        let mut points = Vec::with_capacity(limit);
        for chunk in grid[..limit].chunks(CHUNK_SIZE) {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            let evaluated: Vec<PeriodogramPoint> = chunk
                .par_iter()
                .map(|&period| self.evaluate_period(input, period))
                .collect();
            points.extend(evaluated);
        }
        debug!("Evaluated {} of {} grid points", points.len(), grid.len());
        points
    }

    /// Fold the light curve on `period` and find the best box.
    fn evaluate_period(&self, input: &FoldInput, period: f64) -> PeriodogramPoint {
        let n = input.len();

        // -- fold and order by phase ---------------------------------------
        let mut order: Vec<(f64, usize)> = input
            .time
            .iter()
            .enumerate()
            .map(|(i, &t)| (t.rem_euclid(period), i))
            .collect();
        order.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        // -- prefix sums over the folded curve, unrolled twice for wrap ----
        let mut cum_w = vec![0.0; 2 * n + 1];
        let mut cum_y = vec![0.0; 2 * n + 1];
        for k in 0..2 * n {
            let i = order[k % n].1;
            cum_w[k + 1] = cum_w[k] + input.weight[i];
            cum_y[k + 1] = cum_y[k] + input.weighted_flux[i];
        }
        let total_w = cum_w[n];
        let phase = |k: usize| {
            if k < n {
                order[k].0
            } else {
                order[k - n].0 + period
            }
        };

        // -- slide each trial window ---------------------------------------
        let mut best: Option<BoxFit> = None;
        for multiplier in DURATION_MULTIPLIERS {
            let duration = multiplier * self.params.duration_fraction * period;
            let mut end = 0;
            for start in 0..n {
                end = end.max(start);
                let stop = phase(start) + duration;
                while end < start + n && phase(end) < stop {
                    end += 1;
                }

                let n_in = end - start;
                if n_in == 0 || n_in == n {
                    continue;
                }
                let w_in = cum_w[end] - cum_w[start];
                let w_out = total_w - w_in;
                if !(w_in > 0.0) || !(w_out > 0.0) {
                    continue;
                }

                // Flux is centred, so the out-of-transit weighted sum is
                // minus the in-transit one.
                let y_in = cum_y[end] - cum_y[start];
                let depth = -y_in / w_out - y_in / w_in;
                let power = if depth > 0.0 { depth * depth * w_in } else { 0.0 };

                if best.map_or(true, |b| power > b.power) {
                    best = Some(BoxFit {
                        power,
                        duration,
                        depth: depth.max(0.0),
                        epoch: phase(start),
                        n_in_transit: n_in,
                    });
                }
            }
        }

        PeriodogramPoint { period, fit: best }
    }
}
