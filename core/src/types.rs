//! Common types shared across the transit-search pipeline.
//!
//! These structures represent the fundamental data objects of a
//! transit search: the light curve and its observation metadata, the
//! search and cleaning configuration, the periodogram produced by the
//! Box Least Squares engine, and the candidate handed to downstream
//! classification.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransitError};
use crate::preprocess::robust_scatter;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Placeholder reported for any absent descriptive string field.
pub const UNKNOWN: &str = "UNKNOWN";

/// Default catalog id (absent `KEPLERID` / `TICID`).
pub const DEFAULT_CATALOG_ID: i64 = 0;

/// Default observing-epoch index (absent `QUARTER` / `SECTOR` / `CAMPAIGN`).
pub const DEFAULT_EPOCH_INDEX: i64 = -1;

/// Default time unit: days.
pub const DEFAULT_TIME_UNIT: &str = "d";

/// Observation metadata for a light curve.
///
/// Every field is optional so that "absent from the source file" stays
/// distinguishable from "present with a value".  The accessor methods
/// return the documented default for absent fields.
#[cfg_attr(feature = "python", pyo3::pyclass(get_all, set_all))]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Target name, e.g. `"K00007.01"` (`OBJECT`).
    pub object_id: Option<String>,

    /// Numeric catalog id (`KEPLERID`, `TICID`).
    pub catalog_id: Option<i64>,

    /// Mission name (`MISSION`, falling back to `TELESCOP`).
    pub mission: Option<String>,

    /// Telescope name (`TELESCOP`).
    pub telescope: Option<String>,

    /// Instrument name (`INSTRUME`).
    pub instrument: Option<String>,

    /// Cadence description, e.g. `"long cadence"` (`OBSMODE`).
    pub observing_mode: Option<String>,

    /// Observing-epoch index: Kepler quarter, TESS sector or K2 campaign.
    pub epoch_index: Option<i64>,

    /// Observation start time in the file's time system (`TSTART`).
    pub start_time: Option<f64>,

    /// Observation stop time in the file's time system (`TSTOP`).
    pub stop_time: Option<f64>,

    /// Unit of the time column (`TIMEUNIT` or the column's `TUNITn`).
    pub time_unit: Option<String>,

    /// Reference epoch of the time column, as a Julian date
    /// (`BJDREFI + BJDREFF`).
    pub time_reference: Option<f64>,

    /// Divisor applied to flux by the preprocessor.  `None` until the
    /// light curve has been normalised.
    pub normalization: Option<f64>,
}

impl Metadata {
    pub fn object_id_or_default(&self) -> &str {
        self.object_id.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn catalog_id_or_default(&self) -> i64 {
        self.catalog_id.unwrap_or(DEFAULT_CATALOG_ID)
    }

    pub fn mission_or_default(&self) -> &str {
        self.mission.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn telescope_or_default(&self) -> &str {
        self.telescope.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn instrument_or_default(&self) -> &str {
        self.instrument.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn epoch_index_or_default(&self) -> i64 {
        self.epoch_index.unwrap_or(DEFAULT_EPOCH_INDEX)
    }

    pub fn time_unit_or_default(&self) -> &str {
        self.time_unit.as_deref().unwrap_or(DEFAULT_TIME_UNIT)
    }

    /// Normalisation divisor, `1.0` when the curve was never normalised.
    pub fn normalization_or_default(&self) -> f64 {
        self.normalization.unwrap_or(1.0)
    }
}

// ---------------------------------------------------------------------------
// LightCurve
// ---------------------------------------------------------------------------

/// A time series of stellar brightness measurements.
///
/// Invariants upheld by every constructor: the three arrays have equal
/// length, every time value is finite, and time is sorted ascending.
/// Flux and flux error may still contain non-finite values until the
/// curve has been through [`crate::preprocess::Preprocessor`].
///
/// Deserialization goes through [`LightCurve::from_columns`], so the
/// invariants hold for curves read back from JSON too.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLightCurve")]
pub struct LightCurve {
    time: Array1<f64>,
    flux: Array1<f64>,
    flux_err: Array1<f64>,
    metadata: Metadata,
}

/// Serialized form of [`LightCurve`], before validation.
#[derive(Deserialize)]
struct RawLightCurve {
    time: Array1<f64>,
    flux: Array1<f64>,
    flux_err: Array1<f64>,
    #[serde(default)]
    metadata: Metadata,
}

impl TryFrom<RawLightCurve> for LightCurve {
    type Error = TransitError;

    fn try_from(raw: RawLightCurve) -> Result<Self> {
        Self::from_columns(raw.time.to_vec(), raw.flux.to_vec(), raw.flux_err.to_vec(), raw.metadata)
    }
}

impl LightCurve {
    /// Build a light curve from raw columns.
    ///
    /// Samples with a non-finite time are dropped and the remainder is
    /// stably sorted by time.  Fails with `Format` when the columns have
    /// different lengths and with `EmptyData` when nothing is left.
    pub fn from_columns(
        time: Vec<f64>,
        flux: Vec<f64>,
        flux_err: Vec<f64>,
        metadata: Metadata,
    ) -> Result<Self> {
        if time.len() != flux.len() || time.len() != flux_err.len() {
            return Err(TransitError::format(format!(
                "column length mismatch: time={}, flux={}, flux_err={}",
                time.len(),
                flux.len(),
                flux_err.len()
            )));
        }

        let mut order: Vec<usize> = (0..time.len()).filter(|&i| time[i].is_finite()).collect();
        if order.is_empty() {
            return Err(TransitError::empty("light curve has no samples with finite time"));
        }
        order.sort_by(|&a, &b| time[a].total_cmp(&time[b]));

        Ok(Self {
            time: order.iter().map(|&i| time[i]).collect(),
            flux: order.iter().map(|&i| flux[i]).collect(),
            flux_err: order.iter().map(|&i| flux_err[i]).collect(),
            metadata,
        })
    }

    /// Build a light curve from in-memory arrays, as supplied by a raw
    /// prediction request.
    ///
    /// When `flux_err` is `None` every sample is assigned the robust
    /// scatter of the flux (`1.4826 × MAD`), or `1.0` if that is zero.
    pub fn from_arrays(
        time: Vec<f64>,
        flux: Vec<f64>,
        flux_err: Option<Vec<f64>>,
        metadata: Metadata,
    ) -> Result<Self> {
        let flux_err = match flux_err {
            Some(err) => err,
            None => {
                let sigma = robust_scatter(&flux)
                    .filter(|s| *s > 0.0)
                    .unwrap_or(1.0);
                vec![sigma; flux.len()]
            }
        };
        Self::from_columns(time, flux, flux_err, metadata)
    }

    /// Assemble a curve from arrays that already satisfy the invariants.
    pub(crate) fn from_parts(
        time: Array1<f64>,
        flux: Array1<f64>,
        flux_err: Array1<f64>,
        metadata: Metadata,
    ) -> Self {
        debug_assert!(time.len() == flux.len() && time.len() == flux_err.len());
        Self {
            time,
            flux,
            flux_err,
            metadata,
        }
    }

    pub fn time(&self) -> &Array1<f64> {
        &self.time
    }

    pub fn flux(&self) -> &Array1<f64> {
        &self.flux
    }

    pub fn flux_err(&self) -> &Array1<f64> {
        &self.flux_err
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// First and last sample time.
    pub fn time_span(&self) -> Option<(f64, f64)> {
        Some((*self.time.first()?, *self.time.last()?))
    }
}

// ---------------------------------------------------------------------------
// TransitCandidate
// ---------------------------------------------------------------------------

/// A periodic box-shaped dip selected from a periodogram.
#[cfg_attr(feature = "python", pyo3::pyclass(get_all))]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitCandidate {
    /// Orbital period in days.
    pub period: f64,

    /// Transit duration in days.
    pub duration: f64,

    /// Fractional depth of the dip (positive for a dimming).
    pub depth: f64,

    /// Detection strength, `depth² × Σ w_in`.  Never negative.
    pub power: f64,

    /// Phase-folded time (days, in `[0, period)`) of the first in-transit
    /// sample.
    pub epoch: f64,
}

impl TransitCandidate {
    /// Depth in parts per million.
    pub fn depth_ppm(&self) -> f64 {
        self.depth * 1e6
    }

    /// Duration in hours.
    pub fn duration_hours(&self) -> f64 {
        self.duration * 24.0
    }

    /// Predicted mid-transit times falling inside `[t_start, t_stop]`.
    pub fn transit_times(&self, t_start: f64, t_stop: f64) -> Vec<f64> {
        if !(self.period > 0.0) || t_stop < t_start {
            return Vec::new();
        }
        let mid = self.epoch + 0.5 * self.duration;
        let first = ((t_start - mid) / self.period).ceil() as i64;
        let last = ((t_stop - mid) / self.period).floor() as i64;
        (first..=last).map(|k| mid + k as f64 * self.period).collect()
    }
}

// ---------------------------------------------------------------------------
// Periodogram
// ---------------------------------------------------------------------------

/// Best box fit found at a single trial period.
#[cfg_attr(feature = "python", pyo3::pyclass(get_all))]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxFit {
    pub power: f64,
    pub duration: f64,
    pub depth: f64,
    pub epoch: f64,
    /// Number of samples inside the winning window.
    pub n_in_transit: usize,
}

/// One grid point of a periodogram.
///
/// `fit` is `None` when every tested window was degenerate (it held
/// either no samples or all of them); such points are excluded from
/// candidate selection rather than reported as zero power.
#[cfg_attr(feature = "python", pyo3::pyclass(get_all))]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodogramPoint {
    pub period: f64,
    pub fit: Option<BoxFit>,
}

impl PeriodogramPoint {
    pub fn is_valid(&self) -> bool {
        self.fit.is_some()
    }

    pub fn power(&self) -> Option<f64> {
        self.fit.map(|f| f.power)
    }
}

/// Detection strength as a function of trial period, in grid order.
#[cfg_attr(feature = "python", pyo3::pyclass(get_all))]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Periodogram {
    points: Vec<PeriodogramPoint>,
}

impl Periodogram {
    pub fn new(points: Vec<PeriodogramPoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[PeriodogramPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of grid points holding a valid fit.
    pub fn n_valid(&self) -> usize {
        self.points.iter().filter(|p| p.is_valid()).count()
    }
}

// ---------------------------------------------------------------------------
// SearchParams
// ---------------------------------------------------------------------------

/// Transit durations tested at every trial period, as multiples of
/// `duration_fraction × period`.
pub const DURATION_MULTIPLIERS: [f64; 3] = [0.5, 1.0, 1.5];

/// Configuration for a Box Least Squares search.
#[cfg_attr(feature = "python", pyo3::pyclass(get_all, set_all))]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Shortest trial period, in days.
    pub period_min: f64,

    /// Longest trial period, in days.
    pub period_max: f64,

    /// Number of trial periods, evenly spaced on a linear scale between
    /// `period_min` and `period_max` (both inclusive).
    pub grid_size: usize,

    /// Nominal transit duration as a fraction of the trial period.  The
    /// search tests each multiple in [`DURATION_MULTIPLIERS`] of it.
    pub duration_fraction: f64,

    /// Stop after this many grid points and return a partial result.
    pub max_evaluations: Option<usize>,

    /// Wall-clock budget in milliseconds; on expiry the search returns a
    /// partial result.
    pub timeout_ms: Option<u64>,

    /// Number of rayon worker threads.  `0` uses the global pool (all
    /// available cores).
    pub n_workers: usize,

    /// Log data-quality warnings (dropped samples, degenerate periods,
    /// partial results).
    pub emit_warnings: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            period_min: 0.5,
            period_max: 20.0,
            grid_size: 5000,
            duration_fraction: 0.05,
            max_evaluations: None,
            timeout_ms: None,
            n_workers: 0,
            emit_warnings: true,
        }
    }
}

impl SearchParams {
    /// Reject configurations that cannot describe a period grid.
    pub fn validate(&self) -> Result<()> {
        if self.grid_size == 0 {
            return Err(TransitError::config("grid_size must be positive"));
        }
        if !self.period_min.is_finite() || !self.period_max.is_finite() {
            return Err(TransitError::config("period bounds must be finite"));
        }
        if self.period_min <= 0.0 {
            return Err(TransitError::config(format!(
                "period_min must be positive, got {}",
                self.period_min
            )));
        }
        if self.period_min >= self.period_max {
            return Err(TransitError::config(format!(
                "period_min ({}) must be less than period_max ({})",
                self.period_min, self.period_max
            )));
        }
        let widest = DURATION_MULTIPLIERS.iter().copied().fold(0.0, f64::max);
        if !(self.duration_fraction > 0.0) || self.duration_fraction * widest >= 1.0 {
            return Err(TransitError::config(format!(
                "duration_fraction must lie in (0, {:.4}), got {}",
                1.0 / widest,
                self.duration_fraction
            )));
        }
        Ok(())
    }

    /// The trial periods, in ascending order.
    pub fn period_grid(&self) -> Vec<f64> {
        if self.grid_size == 1 {
            return vec![self.period_min];
        }
        let step = (self.period_max - self.period_min) / (self.grid_size - 1) as f64;
        (0..self.grid_size)
            .map(|k| self.period_min + k as f64 * step)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// PreprocessParams
// ---------------------------------------------------------------------------

/// Low-frequency trend removal applied before normalisation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detrend {
    #[default]
    None,
    /// Divide by the running median of flux over a centred time window.
    RunningMedian,
}

/// Configuration for [`crate::preprocess::Preprocessor`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessParams {
    pub detrend: Detrend,

    /// Full width of the running-median window, in days.
    pub detrend_window_days: f64,

    /// Log a warning when samples are dropped.
    pub emit_warnings: bool,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            detrend: Detrend::None,
            detrend_window_days: 1.0,
            emit_warnings: true,
        }
    }
}

// ---------------------------------------------------------------------------
// SearchResult
// ---------------------------------------------------------------------------

/// Output of a single Box Least Squares search run.
#[cfg_attr(feature = "python", pyo3::pyclass(get_all))]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Evaluated grid points, in ascending period order.
    pub periodogram: Periodogram,

    /// Best candidate, `None` when no grid point produced a valid fit.
    pub candidate: Option<TransitCandidate>,

    /// Whether the evaluation budget expired before the grid was covered.
    pub partial: bool,

    /// Number of grid points evaluated.
    pub evaluated: usize,

    /// Number of grid points requested.
    pub grid_size: usize,

    /// Wall-clock processing time for the search, in milliseconds.
    pub processing_time_ms: u64,
}

// ---------------------------------------------------------------------------
// TransitRecord
// ---------------------------------------------------------------------------

/// The `transit_params` object of the prediction service response.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitParams {
    pub period_days: f64,
    pub duration_hours: f64,
    pub depth_ppm: f64,
}

/// Downstream record handed to the classifier.
///
/// The field names are part of an external response schema and must not
/// change.
#[cfg_attr(feature = "python", pyo3::pyclass(get_all))]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitRecord {
    pub period_days: f64,
    pub duration_hours: f64,
    pub depth_ppm: f64,
    pub power: f64,
    pub metadata: Metadata,
    /// The search budget expired and this is the best of a partial grid.
    pub partial: bool,
}

impl TransitRecord {
    pub fn from_candidate(candidate: &TransitCandidate, metadata: Metadata, partial: bool) -> Self {
        Self {
            period_days: candidate.period,
            duration_hours: candidate.duration_hours(),
            depth_ppm: candidate.depth_ppm(),
            power: candidate.power,
            metadata,
            partial,
        }
    }

    pub fn transit_params(&self) -> TransitParams {
        TransitParams {
            period_days: self.period_days,
            duration_hours: self.duration_hours,
            depth_ppm: self.depth_ppm,
        }
    }

    /// Serialise the record to a JSON string for interoperability.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TransitError::format(format!("cannot serialise record: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_columns_sorts_and_drops_non_finite_time() {
        let lc = LightCurve::from_columns(
            vec![3.0, f64::NAN, 1.0, 2.0],
            vec![30.0, 99.0, 10.0, 20.0],
            vec![0.3, 0.9, 0.1, 0.2],
            Metadata::default(),
        )
        .unwrap();

        assert_eq!(lc.len(), 3);
        assert_eq!(lc.time().to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(lc.flux().to_vec(), vec![10.0, 20.0, 30.0]);
        assert_eq!(lc.flux_err().to_vec(), vec![0.1, 0.2, 0.3]);
        assert_eq!(lc.time_span(), Some((1.0, 3.0)));
    }

    #[test]
    fn from_columns_rejects_length_mismatch() {
        let err = LightCurve::from_columns(vec![1.0, 2.0], vec![1.0], vec![1.0, 1.0], Metadata::default())
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::FormatError);
    }

    #[test]
    fn deserialization_upholds_invariants() {
        let lc = LightCurve::from_columns(
            vec![1.0, 2.0, 3.0],
            vec![1.0, 0.99, 1.01],
            vec![0.01; 3],
            Metadata::default(),
        )
        .unwrap();
        let value = serde_json::to_value(&lc).unwrap();
        let back: LightCurve = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(back, lc);

        // flux_err holding a single sample against three times.
        let mut short = value.clone();
        short["flux_err"] = serde_json::to_value(Array1::from(vec![0.01])).unwrap();
        assert!(serde_json::from_value::<LightCurve>(short).is_err());

        let mut unsorted = value;
        unsorted["time"] = serde_json::to_value(Array1::from(vec![3.0, 1.0, 2.0])).unwrap();
        let sorted: LightCurve = serde_json::from_value(unsorted).unwrap();
        assert_eq!(sorted.time().to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(sorted.flux().to_vec(), vec![0.99, 1.01, 1.0]);
    }

    #[test]
    fn from_arrays_estimates_missing_errors() {
        let lc = LightCurve::from_arrays(
            vec![0.0, 1.0, 2.0, 3.0, 4.0],
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            None,
            Metadata::default(),
        )
        .unwrap();
        // median 3, absolute deviations {2,1,0,1,2} -> MAD 1
        for &e in lc.flux_err() {
            assert!((e - 1.4826).abs() < 1e-12);
        }

        let flat = LightCurve::from_arrays(vec![0.0, 1.0], vec![1.0, 1.0], None, Metadata::default())
            .unwrap();
        assert_eq!(flat.flux_err().to_vec(), vec![1.0, 1.0]);
    }

    #[test]
    fn metadata_defaults_apply_only_when_absent() {
        let mut meta = Metadata::default();
        assert_eq!(meta.object_id_or_default(), UNKNOWN);
        assert_eq!(meta.epoch_index_or_default(), DEFAULT_EPOCH_INDEX);
        assert_eq!(meta.time_unit_or_default(), "d");

        meta.epoch_index = Some(0);
        meta.object_id = Some("K00007.01".into());
        assert_eq!(meta.epoch_index_or_default(), 0);
        assert_eq!(meta.object_id_or_default(), "K00007.01");
    }

    #[test]
    fn unit_conversions_are_linear() {
        let c = TransitCandidate {
            period: 3.0,
            duration: 0.1,
            depth: 0.01,
            power: 12.0,
            epoch: 0.95,
        };
        assert_eq!(c.depth_ppm(), 0.01 * 1e6);
        assert_eq!(c.duration_hours(), 0.1 * 24.0);

        let record = TransitRecord::from_candidate(&c, Metadata::default(), false);
        let params = record.transit_params();
        assert_eq!(params.period_days, 3.0);
        assert_eq!(params.depth_ppm, c.depth_ppm());
        assert_eq!(params.duration_hours, c.duration_hours());
    }

    #[test]
    fn transit_times_cover_the_span() {
        let c = TransitCandidate {
            period: 3.0,
            duration: 0.2,
            depth: 0.01,
            power: 1.0,
            epoch: 0.9,
        };
        let times = c.transit_times(0.0, 10.0);
        assert_eq!(times.len(), 4);
        for (k, t) in times.iter().enumerate() {
            assert!((t - (1.0 + 3.0 * k as f64)).abs() < 1e-12);
        }
        assert!(c.transit_times(10.0, 0.0).is_empty());
    }

    #[test]
    fn period_grid_is_linear_and_inclusive() {
        let params = SearchParams {
            period_min: 1.0,
            period_max: 2.0,
            grid_size: 5,
            ..SearchParams::default()
        };
        assert_eq!(params.period_grid(), vec![1.0, 1.25, 1.5, 1.75, 2.0]);
    }

    #[test]
    fn validate_rejects_degenerate_configs() {
        let equal = SearchParams {
            period_min: 3.0,
            period_max: 3.0,
            ..SearchParams::default()
        };
        assert_eq!(
            equal.validate().unwrap_err().kind(),
            crate::error::ErrorKind::InvalidConfigError
        );

        let zero_grid = SearchParams {
            grid_size: 0,
            ..SearchParams::default()
        };
        assert!(zero_grid.validate().is_err());

        let wide = SearchParams {
            duration_fraction: 0.9,
            ..SearchParams::default()
        };
        assert!(wide.validate().is_err());

        assert!(SearchParams::default().validate().is_ok());
    }

    #[test]
    fn record_json_keeps_schema_field_names() {
        let c = TransitCandidate {
            period: 2.5,
            duration: 0.125,
            depth: 0.002,
            power: 3.0,
            epoch: 0.0,
        };
        let json = TransitRecord::from_candidate(&c, Metadata::default(), false)
            .to_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["period_days"], 2.5);
        assert_eq!(value["duration_hours"], 3.0);
        assert_eq!(value["depth_ppm"], 2000.0);
        assert!(value.get("metadata").is_some());
    }
}
