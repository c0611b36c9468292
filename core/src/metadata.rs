//! Metadata extraction from FITS header keywords.
//!
//! A pure lookup: each [`Metadata`] field is read from a fixed list of
//! keywords and left `None` when none of them is present.  Absence is
//! never an error; the documented defaults are applied by the
//! `*_or_default` accessors on [`Metadata`].
//!
//! | Field            | Keywords (first match wins)        |
//! |------------------|------------------------------------|
//! | `object_id`      | `OBJECT`                           |
//! | `catalog_id`     | `KEPLERID`, `TICID`                |
//! | `mission`        | `MISSION`, `TELESCOP`              |
//! | `telescope`      | `TELESCOP`                         |
//! | `instrument`     | `INSTRUME`                         |
//! | `observing_mode` | `OBSMODE`                          |
//! | `epoch_index`    | `QUARTER`, `SECTOR`, `CAMPAIGN`    |
//! | `start_time`     | `TSTART`                           |
//! | `stop_time`      | `TSTOP`                            |
//! | `time_unit`      | `TIMEUNIT`                         |
//! | `time_reference` | `BJDREFI` + `BJDREFF`              |

use crate::fits::Header;
use crate::types::Metadata;

fn first_str(headers: &[&Header], keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        headers
            .iter()
            .find_map(|h| h.get_str(key))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn first_i64(headers: &[&Header], keys: &[&str]) -> Option<i64> {
    keys.iter()
        .find_map(|key| headers.iter().find_map(|h| h.get_i64(key)))
}

fn first_f64(headers: &[&Header], keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|key| headers.iter().find_map(|h| h.get_f64(key)))
        .filter(|v| v.is_finite())
}

/// Extract metadata from a list of headers, searched in order.
///
/// Ingestion passes the primary header first and the light-curve table
/// header second, so primary keywords take precedence while time-system
/// keywords that missions only write on the table are still found.
pub fn extract(headers: &[&Header]) -> Metadata {
    let time_reference = match (
        first_f64(headers, &["BJDREFI"]),
        first_f64(headers, &["BJDREFF"]),
    ) {
        (Some(i), Some(f)) => Some(i + f),
        (Some(i), None) => Some(i),
        (None, Some(f)) => Some(f),
        (None, None) => None,
    };

    Metadata {
        object_id: first_str(headers, &["OBJECT"]),
        catalog_id: first_i64(headers, &["KEPLERID", "TICID"]),
        mission: first_str(headers, &["MISSION", "TELESCOP"]),
        telescope: first_str(headers, &["TELESCOP"]),
        instrument: first_str(headers, &["INSTRUME"]),
        observing_mode: first_str(headers, &["OBSMODE"]),
        epoch_index: first_i64(headers, &["QUARTER", "SECTOR", "CAMPAIGN"]),
        start_time: first_f64(headers, &["TSTART"]),
        stop_time: first_f64(headers, &["TSTOP"]),
        time_unit: first_str(headers, &["TIMEUNIT"]),
        time_reference,
        normalization: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::HeaderValue;
    use crate::types::{DEFAULT_CATALOG_ID, UNKNOWN};

    fn kepler_primary() -> Header {
        let mut h = Header::new();
        h.insert("OBJECT", HeaderValue::Str("K00007.01".into()));
        h.insert("KEPLERID", HeaderValue::Int(11853905));
        h.insert("OBSMODE", HeaderValue::Str("long cadence".into()));
        h.insert("MISSION", HeaderValue::Str("Kepler".into()));
        h.insert("TELESCOP", HeaderValue::Str("Kepler".into()));
        h.insert("INSTRUME", HeaderValue::Str("Kepler Photometer".into()));
        h.insert("QUARTER", HeaderValue::Int(1));
        h.insert("TSTART", HeaderValue::Float(131.512));
        h.insert("TSTOP", HeaderValue::Float(164.983));
        h
    }

    #[test]
    fn extracts_kepler_keywords() {
        let primary = kepler_primary();
        let mut table = Header::new();
        table.insert("TIMEUNIT", HeaderValue::Str("d".into()));
        table.insert("BJDREFI", HeaderValue::Int(2454833));
        table.insert("BJDREFF", HeaderValue::Float(0.0));

        let meta = extract(&[&primary, &table]);
        assert_eq!(meta.object_id.as_deref(), Some("K00007.01"));
        assert_eq!(meta.catalog_id, Some(11853905));
        assert_eq!(meta.mission.as_deref(), Some("Kepler"));
        assert_eq!(meta.instrument.as_deref(), Some("Kepler Photometer"));
        assert_eq!(meta.observing_mode.as_deref(), Some("long cadence"));
        assert_eq!(meta.epoch_index, Some(1));
        assert_eq!(meta.start_time, Some(131.512));
        assert_eq!(meta.stop_time, Some(164.983));
        assert_eq!(meta.time_unit.as_deref(), Some("d"));
        assert_eq!(meta.time_reference, Some(2454833.0));
        assert_eq!(meta.normalization, None);
    }

    #[test]
    fn tess_keywords_and_telescope_fallback() {
        let mut h = Header::new();
        h.insert("TELESCOP", HeaderValue::Str("TESS".into()));
        h.insert("TICID", HeaderValue::Int(25155310));
        h.insert("SECTOR", HeaderValue::Int(14));

        let meta = extract(&[&h]);
        assert_eq!(meta.mission.as_deref(), Some("TESS"));
        assert_eq!(meta.catalog_id, Some(25155310));
        assert_eq!(meta.epoch_index, Some(14));
    }

    #[test]
    fn absent_keywords_fall_back_to_defaults() {
        let meta = extract(&[&Header::new()]);
        assert_eq!(meta, Metadata::default());
        assert_eq!(meta.object_id_or_default(), UNKNOWN);
        assert_eq!(meta.mission_or_default(), UNKNOWN);
        assert_eq!(meta.catalog_id_or_default(), DEFAULT_CATALOG_ID);

        let mut blank = Header::new();
        blank.insert("OBJECT", HeaderValue::Str("   ".into()));
        assert_eq!(extract(&[&blank]).object_id, None);
    }

    #[test]
    fn primary_header_takes_precedence() {
        let primary = kepler_primary();
        let mut table = Header::new();
        table.insert("OBJECT", HeaderValue::Str("other".into()));
        assert_eq!(
            extract(&[&primary, &table]).object_id.as_deref(),
            Some("K00007.01")
        );
    }
}
