//! Light-curve readers for mission FITS products and delimited text.
//!
//! Light curves reach the pipeline in one of two formats:
//!
//! - **FITS** (`.fits`, `.fit`, `.fts`): a primary header with
//!   observation keywords plus a binary-table extension holding `TIME`, a
//!   flux column and its uncertainty (`FLUX`/`FLUX_ERR`, or the mission
//!   names `PDCSAP_FLUX`/`PDCSAP_FLUX_ERR`, `SAP_FLUX`/`SAP_FLUX_ERR`).
//! - **Delimited text** (`.csv`, `.txt`, `.tsv`): a header row naming
//!   `time`, `flux` and `flux_err` (case-insensitive), one row per sample.
//!
//! This module provides a [`LightCurveIO`] trait with one implementation
//! per format ([`FitsReader`] and [`TextReader`]).  The high-level
//! [`LightCurveReader`] picks the backend from the file extension.
//!
//! Every reader materialises the full arrays before returning.  The file
//! handle is owned by the reading function and closed on every exit
//! path, including parse failures.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::{debug, info, warn};

use crate::error::{Result, TransitError};
use crate::fits::FitsFile;
use crate::metadata;
use crate::types::{LightCurve, Metadata};

/// Time column name in FITS tables.
pub const TIME_COLUMN: &str = "TIME";

/// Flux columns tried in order; each pairs with `<name>_ERR`.
pub const FLUX_COLUMNS: [&str; 3] = ["FLUX", "PDCSAP_FLUX", "SAP_FLUX"];

/// Accepted header names for the text-format error column.
const TEXT_ERROR_COLUMNS: [&str; 3] = ["flux_err", "flux_error", "fluxerr"];

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstract interface for reading a light curve from a file.
///
/// Implement this trait to add support for new file formats.
pub trait LightCurveIO {
    /// Parse a light curve from an already-open stream.
    fn parse<R: Read>(&self, reader: R) -> Result<LightCurve>;

    /// Open the file at `path` and parse it.
    fn read(&self, path: &Path) -> Result<LightCurve> {
        let file = File::open(path)?;
        self.parse(BufReader::new(file))
    }
}

/// Assemble a curve from raw columns, reporting samples lost to a
/// non-finite time stamp.
fn assemble(
    time: Vec<f64>,
    flux: Vec<f64>,
    flux_err: Vec<f64>,
    metadata: Metadata,
    emit_warnings: bool,
) -> Result<LightCurve> {
    let n_raw = time.len();
    let n_bad_time = time.iter().filter(|t| !t.is_finite()).count();
    let lc = LightCurve::from_columns(time, flux, flux_err, metadata)?;
    if n_bad_time > 0 && emit_warnings {
        warn!(
            "Dropped {} of {} samples with non-finite time",
            n_bad_time, n_raw
        );
    }
    Ok(lc)
}

// ---------------------------------------------------------------------------
// FITS reader
// ---------------------------------------------------------------------------

/// Reader for mission light-curve FITS files.
#[derive(Clone, Debug)]
pub struct FitsReader {
    pub emit_warnings: bool,
}

impl Default for FitsReader {
    fn default() -> Self {
        Self { emit_warnings: true }
    }
}

impl LightCurveIO for FitsReader {
    fn parse<R: Read>(&self, reader: R) -> Result<LightCurve> {
        let fits = FitsFile::read(reader)?;
        if fits.tables.is_empty() {
            return Err(TransitError::format("FITS file has no BINTABLE extension"));
        }

        let found = fits.tables.iter().find_map(|table| {
            table.column(TIME_COLUMN)?;
            FLUX_COLUMNS
                .iter()
                .find(|name| {
                    table.column(name).is_some()
                        && table.column(&format!("{}_ERR", name)).is_some()
                })
                .map(|name| (table, *name))
        });

        let (table, flux_name) = found.ok_or_else(|| {
            let available: Vec<&str> = fits.tables[0]
                .columns
                .iter()
                .map(|c| c.name.as_str())
                .collect();
            TransitError::format(format!(
                "no table holds {} plus one of {:?} with its _ERR column (found {:?})",
                TIME_COLUMN, FLUX_COLUMNS, available
            ))
        })?;

        if flux_name != FLUX_COLUMNS[0] && self.emit_warnings {
            warn!("No {} column; using {}", FLUX_COLUMNS[0], flux_name);
        }

        let time = table.read_f64_column(TIME_COLUMN)?;
        let flux = table.read_f64_column(flux_name)?;
        let flux_err = table.read_f64_column(&format!("{}_ERR", flux_name))?;

        let mut meta = metadata::extract(&[&fits.primary, &table.header]);
        if meta.time_unit.is_none() {
            meta.time_unit = table
                .column(TIME_COLUMN)
                .and_then(|c| c.unit.clone())
                .filter(|u| !u.trim().is_empty());
        }

        debug!(
            "FITS table: {} rows, flux column {}, object {}",
            table.n_rows(),
            flux_name,
            meta.object_id_or_default()
        );

        assemble(time, flux, flux_err, meta, self.emit_warnings)
    }
}

// ---------------------------------------------------------------------------
// Delimited text reader
// ---------------------------------------------------------------------------

/// Reader for delimited text light curves.
#[derive(Clone, Debug)]
pub struct TextReader {
    pub delimiter: u8,
    pub emit_warnings: bool,
}

impl Default for TextReader {
    fn default() -> Self {
        Self {
            delimiter: b',',
            emit_warnings: true,
        }
    }
}

impl TextReader {
    pub fn tab_separated() -> Self {
        Self {
            delimiter: b'\t',
            ..Self::default()
        }
    }

    fn parse_cell(cell: &str, column: &str, line: u64) -> Result<f64> {
        if cell.is_empty() {
            return Ok(f64::NAN);
        }
        cell.parse::<f64>().map_err(|_| {
            TransitError::format(format!(
                "line {}: cannot parse {} value '{}'",
                line, column, cell
            ))
        })
    }
}

impl LightCurveIO for TextReader {
    fn parse<R: Read>(&self, reader: R) -> Result<LightCurve> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
        };
        let (i_time, i_flux, i_err) = match (
            find(&["time"]),
            find(&["flux"]),
            find(&TEXT_ERROR_COLUMNS),
        ) {
            (Some(t), Some(f), Some(e)) => (t, f, e),
            _ => {
                return Err(TransitError::format(format!(
                    "header must name time, flux and flux_err columns (found {:?})",
                    headers.iter().collect::<Vec<_>>()
                )))
            }
        };

        let mut time = Vec::new();
        let mut flux = Vec::new();
        let mut flux_err = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let cell = |i: usize| record.get(i).unwrap_or("");
            time.push(Self::parse_cell(cell(i_time), "time", line)?);
            flux.push(Self::parse_cell(cell(i_flux), "flux", line)?);
            flux_err.push(Self::parse_cell(cell(i_err), "flux_err", line)?);
        }

        if time.is_empty() {
            return Err(TransitError::empty("text light curve has no data rows"));
        }
        debug!("Text light curve: {} rows", time.len());

        assemble(time, flux, flux_err, Metadata::default(), self.emit_warnings)
    }
}

// ---------------------------------------------------------------------------
// High-level reader with format auto-detection
// ---------------------------------------------------------------------------

/// Supported on-disk formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Fits,
    Csv,
    Tsv,
}

impl FileFormat {
    /// Infer the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "fits" | "fit" | "fts" => Ok(FileFormat::Fits),
            "csv" | "txt" => Ok(FileFormat::Csv),
            "tsv" => Ok(FileFormat::Tsv),
            other => Err(TransitError::format(format!(
                "unsupported light-curve file extension '{}'",
                other
            ))),
        }
    }
}

/// Auto-detecting light-curve reader.
///
/// Given a file path, [`LightCurveReader`] inspects the extension and
/// delegates to the appropriate backend.
#[derive(Clone, Debug)]
pub struct LightCurveReader {
    pub emit_warnings: bool,
}

impl Default for LightCurveReader {
    fn default() -> Self {
        Self { emit_warnings: true }
    }
}

impl LightCurveReader {
    pub fn new(emit_warnings: bool) -> Self {
        Self { emit_warnings }
    }

    /// Read a FITS or delimited text light curve.
    pub fn read(&self, path: impl AsRef<Path>) -> Result<LightCurve> {
        let path = path.as_ref();
        let format = FileFormat::from_path(path)?;
        let lc = match format {
            FileFormat::Fits => FitsReader {
                emit_warnings: self.emit_warnings,
            }
            .read(path)?,
            FileFormat::Csv => TextReader {
                emit_warnings: self.emit_warnings,
                ..TextReader::default()
            }
            .read(path)?,
            FileFormat::Tsv => TextReader {
                emit_warnings: self.emit_warnings,
                ..TextReader::tab_separated()
            }
            .read(path)?,
        };
        info!(
            "Loaded {} samples from {} ({:?})",
            lc.len(),
            path.display(),
            format
        );
        Ok(lc)
    }
}
