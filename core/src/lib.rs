//! # transitsearch-core
//!
//! Transit detection in stellar light curves, with optional Python
//! bindings via [PyO3](https://pyo3.rs).
//!
//! ## Overview
//!
//! This crate provides the analytic core of a planet-candidate
//! prediction service: it turns a light-curve file into the period,
//! duration and depth of the strongest periodic dimming, ready for a
//! downstream classifier.
//!
//! | Module         | Purpose                                                  |
//! |----------------|----------------------------------------------------------|
//! | [`ingest`]     | Reads FITS and delimited text light curves               |
//! | [`fits`]       | FITS header and binary-table decoding                    |
//! | [`metadata`]   | Header keywords → typed [`Metadata`]                     |
//! | [`preprocess`] | Drops unusable samples, detrends, normalises flux        |
//! | [`bls`]        | Box Least Squares period search                          |
//! | [`selector`]   | Picks the best candidate from a periodogram              |
//! | [`pipeline`]   | Runs every stage end to end                              |
//! | [`config`]     | TOML configuration                                       |
//! | [`types`]      | Shared data structures (light curve, candidates, params) |
//!
//! ## Rust usage
//!
//! ```no_run
//! use transitsearch_core::{PipelineConfig, TransitPipeline};
//!
//! let pipeline = TransitPipeline::new(PipelineConfig::default());
//! let analysis = pipeline.analyze_file("kepler_light_curve_sample.fits")?;
//! println!("{}", analysis.record.to_json()?);
//! # Ok::<(), transitsearch_core::TransitError>(())
//! ```
//!
//! ## Python usage
//!
//! When built with the `python` feature the library exposes a module
//! called `transitsearch_core`:
//!
//! ```python
//! import transitsearch_core
//!
//! params = transitsearch_core.SearchParams(period_min=0.5, period_max=20.0)
//! record = transitsearch_core.analyze_file("hot_jupiter_lc.csv", params)
//! print(record.period_days, record.duration_hours, record.depth_ppm)
//! ```

pub mod bls;
pub mod config;
pub mod error;
pub mod fits;
pub mod ingest;
pub mod metadata;
pub mod pipeline;
pub mod preprocess;
pub mod selector;
pub mod types;

#[cfg(feature = "python")]
mod python;

// Re-export the most commonly used items at crate root for convenience.
pub use bls::BlsEngine;
pub use config::PipelineConfig;
pub use error::{ErrorKind, Result, TransitError};
pub use ingest::LightCurveReader;
pub use pipeline::{Analysis, TransitPipeline};
pub use preprocess::Preprocessor;
pub use selector::select_candidate;
pub use types::{
    Detrend, LightCurve, Metadata, Periodogram, PreprocessParams, SearchParams, SearchResult,
    TransitCandidate, TransitParams, TransitRecord,
};
