//! End-to-end transit analysis: file → light curve → cleaned curve →
//! periodogram → candidate → downstream record.
//!
//! Stages run one after the other; each fully consumes its
//! predecessor's output.  Ingestion and preprocessing errors are returned
//! unchanged and are never retried.

use std::path::Path;
use std::time::Instant;

use log::info;
use serde::{Deserialize, Serialize};

use crate::bls::BlsEngine;
use crate::config::PipelineConfig;
use crate::error::{Result, TransitError};
use crate::ingest::LightCurveReader;
use crate::preprocess::Preprocessor;
use crate::types::{LightCurve, SearchResult, TransitCandidate, TransitRecord};

/// Everything a single analysis produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Record handed to the classifier.
    pub record: TransitRecord,

    /// The selected candidate in native units.
    pub candidate: TransitCandidate,

    /// Predicted mid-transit times inside the observed span.
    pub transit_times: Vec<f64>,

    /// Samples left after cleaning.
    pub n_samples: usize,

    /// Grid points evaluated and requested.
    pub evaluated: usize,
    pub grid_size: usize,

    /// Wall-clock time for the whole analysis, in milliseconds.
    pub processing_time_ms: u64,
}

/// Runs the full analysis chain with one configuration.
#[derive(Clone, Debug, Default)]
pub struct TransitPipeline {
    config: PipelineConfig,
}

impl TransitPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read and analyse a FITS or delimited text light curve.
    pub fn analyze_file(&self, path: impl AsRef<Path>) -> Result<Analysis> {
        let lc = LightCurveReader::new(self.config.preprocess.emit_warnings).read(path)?;
        self.analyze(&lc)
    }

    /// Clean a light curve and search it, returning the whole periodogram.
    ///
    /// Unlike [`TransitPipeline::analyze`] this succeeds when no grid point
    /// is valid; the result then carries no candidate.
    pub fn search(&self, lc: &LightCurve) -> Result<SearchResult> {
        let cleaned = Preprocessor::new(self.config.preprocess.clone()).process(lc)?;
        BlsEngine::new(self.config.search.clone()).search(&cleaned)
    }

    /// Analyse an ingested light curve.
    pub fn analyze(&self, lc: &LightCurve) -> Result<Analysis> {
        let start = Instant::now();

        let cleaned = Preprocessor::new(self.config.preprocess.clone()).process(lc)?;
        let result = BlsEngine::new(self.config.search.clone()).search(&cleaned)?;

        let candidate = result.candidate.clone().ok_or_else(|| {
            TransitError::empty(format!(
                "no valid periodogram point among {} evaluated",
                result.evaluated
            ))
        })?;

        let transit_times = cleaned
            .time_span()
            .map(|(t0, t1)| candidate.transit_times(t0, t1))
            .unwrap_or_default();
        let record = TransitRecord::from_candidate(&candidate, cleaned.metadata().clone(), result.partial);

        let elapsed = start.elapsed().as_millis() as u64;
        info!(
            "Analysis of {} complete in {} ms: P = {:.4} d, duration = {:.2} h, depth = {:.0} ppm{}",
            record.metadata.object_id_or_default(),
            elapsed,
            record.period_days,
            record.duration_hours,
            record.depth_ppm,
            if record.partial { " (partial)" } else { "" },
        );

        Ok(Analysis {
            record,
            candidate,
            transit_times,
            n_samples: cleaned.len(),
            evaluated: result.evaluated,
            grid_size: result.grid_size,
            processing_time_ms: elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::{Metadata, PreprocessParams, SearchParams};

    fn quiet(grid_size: usize) -> PipelineConfig {
        PipelineConfig {
            preprocess: PreprocessParams {
                emit_warnings: false,
                ..PreprocessParams::default()
            },
            search: SearchParams {
                period_min: 0.5,
                period_max: 3.0,
                grid_size,
                emit_warnings: false,
                ..SearchParams::default()
            },
        }
    }

    #[test]
    fn search_returns_periodogram_from_raw_arrays() {
        let time: Vec<f64> = (0..400).map(|i| i as f64 * 0.02).collect();
        let flux: Vec<f64> = time
            .iter()
            .map(|&t| if (t - 0.3).rem_euclid(1.2) < 0.06 { 995.0 } else { 1000.0 })
            .collect();
        let lc = LightCurve::from_arrays(time, flux, None, Metadata::default()).unwrap();

        let result = TransitPipeline::new(quiet(300)).search(&lc).unwrap();
        assert_eq!(result.periodogram.len(), 300);
        assert_eq!(result.evaluated, 300);
        let c = result.candidate.unwrap();
        assert!((c.period - 1.2).abs() < 0.02, "period {}", c.period);
    }

    #[test]
    fn search_without_valid_points_has_no_candidate() {
        let lc = LightCurve::from_columns(vec![1.0], vec![2.0], vec![0.1], Metadata::default()).unwrap();
        let pipeline = TransitPipeline::new(quiet(20));

        let result = pipeline.search(&lc).unwrap();
        assert_eq!(result.periodogram.n_valid(), 0);
        assert!(result.candidate.is_none());

        assert_eq!(pipeline.analyze(&lc).unwrap_err().kind(), ErrorKind::EmptyDataError);
    }
}
