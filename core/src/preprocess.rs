//! Light-curve cleaning and normalisation.
//!
//! 1. **Cleaning**: drop every sample whose flux or flux error is
//!    non-finite.  Time is already finite by construction.
//! 2. **Detrending** (optional): divide flux and error by a running
//!    median of flux to flatten slow stellar or instrumental trends.
//! 3. **Normalisation**: divide flux and error by the median flux so the
//!    out-of-transit baseline sits at ≈ 1.0.  The divisor is recorded in
//!    the output metadata.
//!
//! The input curve is never modified; a new [`LightCurve`] is returned.

use log::{debug, warn};
use ndarray::{Array1, Zip};

use crate::error::{Result, TransitError};
use crate::types::{Detrend, LightCurve, PreprocessParams};

/// Scale factor turning a MAD into a Gaussian σ estimate.
pub const MAD_TO_SIGMA: f64 = 1.4826;

/// Median of the finite values in `values`; `None` if there are none.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_unstable_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some(0.5 * (sorted[mid - 1] + sorted[mid]))
    } else {
        Some(sorted[mid])
    }
}

/// σ ≈ 1.4826 × MAD over the finite values in `values`.
pub fn robust_scatter(values: &[f64]) -> Option<f64> {
    let m = median(values)?;
    let abs_devs: Vec<f64> = values
        .iter()
        .filter(|v| v.is_finite())
        .map(|v| (v - m).abs())
        .collect();
    median(&abs_devs).map(|mad| MAD_TO_SIGMA * mad)
}

/// Median of `flux` over all samples within ±`window / 2` of each time.
///
/// `time` must be sorted ascending.
fn running_median(time: &Array1<f64>, flux: &Array1<f64>, window: f64) -> Array1<f64> {
    let half = 0.5 * window;
    let n = time.len();
    let mut lo = 0;
    let mut hi = 0;
    let mut out = Array1::<f64>::zeros(n);
    let mut buf = Vec::new();

    for i in 0..n {
        while time[lo] < time[i] - half {
            lo += 1;
        }
        while hi < n && time[hi] <= time[i] + half {
            hi += 1;
        }
        buf.clear();
        buf.extend(flux.slice(ndarray::s![lo..hi]).iter().copied());
        // The window always contains sample i itself.
        out[i] = median(&buf).unwrap_or(flux[i]);
    }
    out
}

/// Cleans and normalises light curves.
#[derive(Clone, Debug, Default)]
pub struct Preprocessor {
    params: PreprocessParams,
}

impl Preprocessor {
    pub fn new(params: PreprocessParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PreprocessParams {
        &self.params
    }

    /// Produce a cleaned, normalised copy of `lc`.
    ///
    /// Fails with `EmptyData` when no sample has finite flux and error,
    /// and with `InvalidConfig` when the median flux is zero.
    pub fn process(&self, lc: &LightCurve) -> Result<LightCurve> {
        // ------------------------------------------------------------------
        // Step 1: Drop non-finite samples
        // ------------------------------------------------------------------
        let keep: Vec<usize> = (0..lc.len())
            .filter(|&i| lc.flux()[i].is_finite() && lc.flux_err()[i].is_finite())
            .collect();

        let dropped = lc.len() - keep.len();
        if keep.is_empty() {
            return Err(TransitError::empty(format!(
                "all {} samples have non-finite flux or flux_err",
                lc.len()
            )));
        }
        if dropped > 0 && self.params.emit_warnings {
            warn!("Dropped {} of {} samples with non-finite flux", dropped, lc.len());
        }

        let time: Array1<f64> = keep.iter().map(|&i| lc.time()[i]).collect();
        let mut flux: Array1<f64> = keep.iter().map(|&i| lc.flux()[i]).collect();
        let mut flux_err: Array1<f64> = keep.iter().map(|&i| lc.flux_err()[i]).collect();

        // ------------------------------------------------------------------
        // Step 2: Optional detrending
        // ------------------------------------------------------------------
        if self.params.detrend == Detrend::RunningMedian {
            let window = self.params.detrend_window_days;
            if !(window > 0.0) || !window.is_finite() {
                return Err(TransitError::config(format!(
                    "detrend_window_days must be positive, got {}",
                    window
                )));
            }
            let trend = running_median(&time, &flux, window);
            if trend.iter().any(|&t| t == 0.0) {
                return Err(TransitError::config(
                    "running median of flux is zero; cannot detrend",
                ));
            }
            Zip::from(&mut flux)
                .and(&mut flux_err)
                .and(&trend)
                .for_each(|f, e, &t| {
                    *f /= t;
                    *e /= t.abs();
                });
            debug!("Detrended with a {:.3} d running median", window);
        }

        // ------------------------------------------------------------------
        // Step 3: Median normalisation
        // ------------------------------------------------------------------
        let divisor = median(&flux.to_vec())
            .ok_or_else(|| TransitError::empty("no finite flux values"))?;
        if divisor == 0.0 {
            return Err(TransitError::config(
                "median flux is zero; cannot normalise",
            ));
        }

        flux.mapv_inplace(|f| f / divisor);
        flux_err.mapv_inplace(|e| e / divisor.abs());

        // Division can still overflow for pathological inputs.
        if flux.iter().chain(flux_err.iter()).any(|v| !v.is_finite()) {
            return Err(TransitError::config(
                "normalisation produced non-finite values",
            ));
        }

        let mut metadata = lc.metadata().clone();
        metadata.normalization = Some(metadata.normalization_or_default() * divisor);

        debug!(
            "Normalised {} samples by median flux {:.6}",
            flux.len(),
            divisor
        );

        Ok(LightCurve::from_parts(time, flux, flux_err, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::Metadata;

    fn curve(flux: Vec<f64>, err: Vec<f64>) -> LightCurve {
        let time = (0..flux.len()).map(|i| i as f64 * 0.1).collect();
        LightCurve::from_columns(time, flux, err, Metadata::default()).unwrap()
    }

    #[test]
    fn median_handles_even_odd_and_nan() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[f64::NAN, 5.0]), Some(5.0));
        assert_eq!(median(&[f64::NAN]), None);
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn drops_non_finite_and_normalises() {
        let lc = curve(
            vec![200.0, f64::NAN, 100.0, 300.0, f64::INFINITY, 200.0],
            vec![2.0, 2.0, 2.0, f64::NAN, 2.0, 2.0],
        );
        let out = Preprocessor::default().process(&lc).unwrap();

        assert_eq!(out.len(), 3);
        assert_eq!(out.flux().to_vec(), vec![1.0, 0.5, 1.0]);
        assert_eq!(out.flux_err().to_vec(), vec![0.01, 0.01, 0.01]);
        assert_eq!(out.metadata().normalization, Some(200.0));
        // input untouched
        assert_eq!(lc.len(), 6);
        assert_eq!(lc.metadata().normalization, None);
    }

    #[test]
    fn all_nan_flux_is_empty_data() {
        let lc = curve(vec![f64::NAN; 4], vec![1.0; 4]);
        let err = Preprocessor::default().process(&lc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyDataError);
    }

    #[test]
    fn zero_median_is_invalid_config() {
        let lc = curve(vec![0.0, 0.0, 1.0], vec![1.0; 3]);
        let err = Preprocessor::default().process(&lc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfigError);
    }

    #[test]
    fn normalisation_is_idempotent_on_flat_curves() {
        let lc = curve(vec![5.0; 10], vec![0.5; 10]);
        let p = Preprocessor::default();
        let once = p.process(&lc).unwrap();
        let twice = p.process(&once).unwrap();

        assert_eq!(once.flux(), twice.flux());
        assert_eq!(once.flux_err(), twice.flux_err());
        assert_eq!(twice.metadata().normalization, Some(5.0));
    }

    #[test]
    fn running_median_removes_linear_trend() {
        let n = 200;
        let time: Vec<f64> = (0..n).map(|i| i as f64 * 0.05).collect();
        let flux: Vec<f64> = time.iter().map(|t| 100.0 + 2.0 * t).collect();
        let lc = LightCurve::from_columns(time, flux, vec![0.1; n], Metadata::default()).unwrap();

        let p = Preprocessor::new(PreprocessParams {
            detrend: Detrend::RunningMedian,
            detrend_window_days: 0.52,
            ..PreprocessParams::default()
        });
        let out = p.process(&lc).unwrap();
        // Interior samples sit at the centre of a symmetric window.
        for &f in out.flux().slice(ndarray::s![10..n - 10]) {
            assert!((f - 1.0).abs() < 1e-9, "flux {}", f);
        }
    }

    #[test]
    fn rejects_bad_detrend_window() {
        let lc = curve(vec![1.0; 5], vec![0.1; 5]);
        let p = Preprocessor::new(PreprocessParams {
            detrend: Detrend::RunningMedian,
            detrend_window_days: 0.0,
            ..PreprocessParams::default()
        });
        assert_eq!(
            p.process(&lc).unwrap_err().kind(),
            ErrorKind::InvalidConfigError
        );
    }
}
