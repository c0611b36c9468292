//! Pipeline configuration file support.
//!
//! A configuration file is TOML with two optional tables; any missing key
//! takes its documented default:
//!
//! ```toml
//! [preprocess]
//! detrend = "running_median"
//! detrend_window_days = 1.0
//!
//! [search]
//! period_min = 0.5
//! period_max = 20.0
//! grid_size = 5000
//! duration_fraction = 0.05
//! timeout_ms = 30000
//! n_workers = 0
//! emit_warnings = true
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransitError};
use crate::types::{PreprocessParams, SearchParams};

/// Settings for every stage of [`crate::pipeline::TransitPipeline`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub preprocess: PreprocessParams,
    pub search: SearchParams,
}

impl PipelineConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| TransitError::config(format!("failed to parse config: {}", e)))
    }

    /// Load a configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }
}
