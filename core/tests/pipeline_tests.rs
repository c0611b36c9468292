//! End-to-end scenarios: injected transits, empty input, determinism and
//! configuration boundaries.

use std::io::Write;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use transitsearch_core::{
    BlsEngine, Detrend, ErrorKind, LightCurve, Metadata, PipelineConfig, PreprocessParams,
    Preprocessor, SearchParams, TransitPipeline,
};

const N_SAMPLES: usize = 2000;
const SPAN_DAYS: f64 = 30.0;
const NOISE: f64 = 0.001;

/// Flat light curve with Gaussian noise and a periodic box dip.
fn injected_curve(period: f64, t0: f64, duration: f64, depth: f64, seed: u64) -> LightCurve {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, NOISE).unwrap();

    let time: Vec<f64> = (0..N_SAMPLES)
        .map(|i| i as f64 * SPAN_DAYS / N_SAMPLES as f64)
        .collect();
    let flux = time
        .iter()
        .map(|&t| {
            let dip = if (t - t0).rem_euclid(period) < duration { depth } else { 0.0 };
            1.0 - dip + noise.sample(&mut rng)
        })
        .collect();
    LightCurve::from_arrays(time, flux, Some(vec![NOISE; N_SAMPLES]), Metadata::default()).unwrap()
}

fn quiet_params(grid_size: usize) -> SearchParams {
    SearchParams {
        period_min: 0.5,
        period_max: 20.0,
        grid_size,
        emit_warnings: false,
        ..SearchParams::default()
    }
}

#[test]
fn recovers_injected_transit() {
    let lc = injected_curve(3.0, 1.234, 0.1, 0.01, 42);
    let config = PipelineConfig {
        search: quiet_params(5000),
        ..PipelineConfig::default()
    };

    let analysis = TransitPipeline::new(config).analyze(&lc).unwrap();
    let record = &analysis.record;

    assert!(
        (record.period_days - 3.0).abs() / 3.0 < 0.01,
        "period {}",
        record.period_days
    );
    let depth = analysis.candidate.depth;
    assert!((depth - 0.01).abs() / 0.01 < 0.2, "depth {}", depth);
    assert!(!record.partial);
    assert_eq!(analysis.evaluated, 5000);
    assert_eq!(analysis.n_samples, N_SAMPLES);

    // Ten transits fall inside the 30-day span.
    assert!((9..=11).contains(&analysis.transit_times.len()));
    for t in &analysis.transit_times {
        let phase = (t - 1.234).rem_euclid(3.0);
        let offset = phase.min(3.0 - phase);
        assert!(offset < 0.2, "transit time {} off by {}", t, offset);
    }
}

#[test]
fn unit_conversions_hold_for_selected_candidate() {
    let lc = injected_curve(4.2, 0.5, 0.15, 0.004, 7);
    let config = PipelineConfig {
        search: quiet_params(800),
        ..PipelineConfig::default()
    };
    let analysis = TransitPipeline::new(config).analyze(&lc).unwrap();

    let c = &analysis.candidate;
    let r = &analysis.record;
    assert_eq!(r.depth_ppm, c.depth * 1e6);
    assert_eq!(r.duration_hours, c.duration * 24.0);
    assert_eq!(r.period_days, c.period);
    assert_eq!(r.power, c.power);

    let params = r.transit_params();
    assert_eq!(params.depth_ppm, r.depth_ppm);
    assert_eq!(params.duration_hours, r.duration_hours);
}

#[test]
fn search_is_deterministic() {
    let lc = injected_curve(2.2, 0.3, 0.08, 0.006, 3);
    let cleaned = Preprocessor::default().process(&lc).unwrap();
    let engine = BlsEngine::new(quiet_params(600));

    let a = engine.search(&cleaned).unwrap();
    let b = engine.search(&cleaned).unwrap();
    assert_eq!(a.periodogram, b.periodogram);

    let (ca, cb) = (a.candidate.unwrap(), b.candidate.unwrap());
    assert_eq!(ca.period, cb.period);
    assert_eq!(ca.duration, cb.duration);
    assert_eq!(ca.depth, cb.depth);
    assert_eq!(ca.power, cb.power);
}

#[test]
fn all_nan_flux_fails_with_empty_data() {
    let time: Vec<f64> = (0..100).map(|i| i as f64 * 0.1).collect();
    let lc = LightCurve::from_arrays(time, vec![f64::NAN; 100], Some(vec![0.001; 100]), Metadata::default())
        .unwrap();

    let err = TransitPipeline::default().analyze(&lc).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyDataError);
}

#[test]
fn equal_period_bounds_are_rejected() {
    let lc = injected_curve(3.0, 1.0, 0.1, 0.01, 1);
    let config = PipelineConfig {
        search: SearchParams {
            period_min: 3.0,
            period_max: 3.0,
            ..quiet_params(100)
        },
        ..PipelineConfig::default()
    };
    let err = TransitPipeline::new(config).analyze(&lc).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfigError);
}

#[test]
fn flat_curve_ties_resolve_to_shortest_period() {
    // Without any dip every period scores zero power.
    let time: Vec<f64> = (0..500).map(|i| i as f64 * 0.05).collect();
    let lc = LightCurve::from_arrays(time, vec![1.0; 500], Some(vec![0.001; 500]), Metadata::default())
        .unwrap();
    let config = PipelineConfig {
        search: SearchParams {
            period_min: 1.0,
            period_max: 5.0,
            ..quiet_params(50)
        },
        ..PipelineConfig::default()
    };

    for _ in 0..3 {
        let analysis = TransitPipeline::new(config.clone()).analyze(&lc).unwrap();
        assert_eq!(analysis.candidate.period, 1.0);
        assert_eq!(analysis.candidate.power, 0.0);
    }
}

#[test]
fn budget_expiry_marks_record_partial() {
    let lc = injected_curve(3.0, 1.0, 0.1, 0.01, 5);
    let config = PipelineConfig {
        search: SearchParams {
            max_evaluations: Some(300),
            ..quiet_params(2000)
        },
        ..PipelineConfig::default()
    };
    let analysis = TransitPipeline::new(config).analyze(&lc).unwrap();
    assert!(analysis.record.partial);
    assert_eq!(analysis.evaluated, 300);
    assert_eq!(analysis.grid_size, 2000);
}

#[test]
fn analyzes_csv_file_with_detrending() {
    let lc = injected_curve(2.5, 0.4, 0.12, 0.008, 11);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hot_jupiter_lc.csv");

    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "time,flux,flux_err").unwrap();
    for i in 0..lc.len() {
        // Scale to raw counts on a slow linear trend.
        let t = lc.time()[i];
        let trend = 5000.0 * (1.0 + 0.001 * t);
        writeln!(f, "{},{},{}", t, lc.flux()[i] * trend, lc.flux_err()[i] * trend).unwrap();
    }
    writeln!(f, "30.5,,1.0").unwrap();
    drop(f);

    let config = PipelineConfig {
        preprocess: PreprocessParams {
            detrend: Detrend::RunningMedian,
            detrend_window_days: 1.0,
            emit_warnings: false,
        },
        search: SearchParams {
            period_min: 1.0,
            period_max: 6.0,
            ..quiet_params(2000)
        },
    };
    let analysis = TransitPipeline::new(config).analyze_file(&path).unwrap();

    assert!((analysis.record.period_days - 2.5).abs() < 0.025);
    assert_eq!(analysis.n_samples, N_SAMPLES);
    assert!(analysis.record.metadata.normalization.is_some());
    assert_eq!(analysis.record.metadata.object_id, None);
}
