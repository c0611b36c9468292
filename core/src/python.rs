//! Python bindings, compiled with the `python` feature.

use pyo3::exceptions::{PyIOError, PyTimeoutError, PyValueError};
use pyo3::prelude::*;

use crate::config::PipelineConfig;
use crate::error::TransitError;
use crate::ingest::LightCurveReader;
use crate::pipeline::TransitPipeline;
use crate::types::{
    BoxFit, LightCurve, Metadata, Periodogram, PeriodogramPoint, PreprocessParams, SearchParams,
    SearchResult, TransitCandidate, TransitRecord,
};

impl From<TransitError> for PyErr {
    fn from(err: TransitError) -> Self {
        let msg = format!("[{}] {}", err.kind(), err);
        match err {
            TransitError::Io(_) => PyIOError::new_err(msg),
            TransitError::SearchTimeout { .. } => PyTimeoutError::new_err(msg),
            _ => PyValueError::new_err(msg),
        }
    }
}

#[pymethods]
impl SearchParams {
    #[new]
    #[pyo3(signature = (
        period_min=0.5,
        period_max=20.0,
        grid_size=5000,
        duration_fraction=0.05,
        max_evaluations=None,
        timeout_ms=None,
        n_workers=0,
        emit_warnings=true
    ))]
    #[allow(clippy::too_many_arguments)]
    fn py_new(
        period_min: f64,
        period_max: f64,
        grid_size: usize,
        duration_fraction: f64,
        max_evaluations: Option<usize>,
        timeout_ms: Option<u64>,
        n_workers: usize,
        emit_warnings: bool,
    ) -> Self {
        Self {
            period_min,
            period_max,
            grid_size,
            duration_fraction,
            max_evaluations,
            timeout_ms,
            n_workers,
            emit_warnings,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "SearchParams(period=[{:.3}, {:.3}] d, grid={}, duration_fraction={:.3}, workers={})",
            self.period_min, self.period_max, self.grid_size, self.duration_fraction, self.n_workers,
        )
    }
}

#[pymethods]
impl TransitCandidate {
    #[pyo3(name = "depth_ppm")]
    fn py_depth_ppm(&self) -> f64 {
        self.depth_ppm()
    }

    #[pyo3(name = "duration_hours")]
    fn py_duration_hours(&self) -> f64 {
        self.duration_hours()
    }

    fn __repr__(&self) -> String {
        format!(
            "TransitCandidate(period={:.5} d, duration={:.2} h, depth={:.0} ppm, power={:.3})",
            self.period,
            self.duration_hours(),
            self.depth_ppm(),
            self.power,
        )
    }
}

#[pymethods]
impl Metadata {
    fn __repr__(&self) -> String {
        format!(
            "Metadata(object='{}', mission='{}', epoch_index={})",
            self.object_id_or_default(),
            self.mission_or_default(),
            self.epoch_index_or_default(),
        )
    }
}

#[pymethods]
impl Periodogram {
    /// Trial periods in grid order.
    fn periods(&self) -> Vec<f64> {
        self.points().iter().map(|p| p.period).collect()
    }

    /// Power per period; `None` marks a degenerate grid point.
    fn powers(&self) -> Vec<Option<f64>> {
        self.points().iter().map(PeriodogramPoint::power).collect()
    }

    fn __len__(&self) -> usize {
        self.len()
    }

    fn __repr__(&self) -> String {
        format!("Periodogram(points={}, valid={})", self.len(), self.n_valid())
    }
}

#[pymethods]
impl SearchResult {
    fn __repr__(&self) -> String {
        format!(
            "SearchResult(evaluated={}/{}, partial={}, candidate={}, time={}ms)",
            self.evaluated,
            self.grid_size,
            self.partial,
            if self.candidate.is_some() { "yes" } else { "none" },
            self.processing_time_ms,
        )
    }
}

#[pymethods]
impl TransitRecord {
    /// Serialise the record to a JSON string.
    #[pyo3(name = "to_json")]
    fn py_to_json(&self) -> PyResult<String> {
        Ok(self.to_json()?)
    }

    fn __repr__(&self) -> String {
        format!(
            "TransitRecord(period={:.4} d, duration={:.2} h, depth={:.0} ppm, partial={})",
            self.period_days, self.duration_hours, self.depth_ppm, self.partial,
        )
    }
}

/// Read a light curve and return `(time, flux, flux_err, metadata)`.
#[pyfunction]
fn read_light_curve(path: &str) -> PyResult<(Vec<f64>, Vec<f64>, Vec<f64>, Metadata)> {
    let lc = LightCurveReader::default().read(path)?;
    Ok((
        lc.time().to_vec(),
        lc.flux().to_vec(),
        lc.flux_err().to_vec(),
        lc.metadata().clone(),
    ))
}

/// Clean raw arrays and run the period search on them.
///
/// A missing `flux_err` is estimated from the scatter of the flux.
#[pyfunction]
#[pyo3(signature = (time, flux, flux_err=None, params=None))]
fn search(
    time: Vec<f64>,
    flux: Vec<f64>,
    flux_err: Option<Vec<f64>>,
    params: Option<SearchParams>,
) -> PyResult<SearchResult> {
    let search = params.unwrap_or_default();
    let config = PipelineConfig {
        preprocess: PreprocessParams {
            emit_warnings: search.emit_warnings,
            ..PreprocessParams::default()
        },
        search,
    };
    let lc = LightCurve::from_arrays(time, flux, flux_err, Metadata::default())?;
    Ok(TransitPipeline::new(config).search(&lc)?)
}

/// Run the full analysis on a file and return the downstream record.
#[pyfunction]
#[pyo3(signature = (path, params=None))]
fn analyze_file(path: &str, params: Option<SearchParams>) -> PyResult<TransitRecord> {
    let config = PipelineConfig {
        search: params.unwrap_or_default(),
        ..PipelineConfig::default()
    };
    let analysis = TransitPipeline::new(config).analyze_file(path)?;
    Ok(analysis.record)
}

/// The top-level Python module exposed by this crate.
#[pymodule]
fn transitsearch_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<SearchParams>()?;
    m.add_class::<TransitCandidate>()?;
    m.add_class::<Metadata>()?;
    m.add_class::<TransitRecord>()?;
    m.add_class::<BoxFit>()?;
    m.add_class::<PeriodogramPoint>()?;
    m.add_class::<Periodogram>()?;
    m.add_class::<SearchResult>()?;
    m.add_function(wrap_pyfunction!(read_light_curve, m)?)?;
    m.add_function(wrap_pyfunction!(search, m)?)?;
    m.add_function(wrap_pyfunction!(analyze_file, m)?)?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
