use approx::assert_relative_eq;

use lightcurve_timing::data_access::table::read_table;
use lightcurve_timing::statistical_methods::statistics::median;
use lightcurve_timing::{
    AnalysisConfig, AnalysisError, AnalysisSession, LightCurveHandle, LightCurveSource, RawLightCurve,
    Result, SearchQuery, TimeWindow,
};

const PERIOD: f64 = 3.0;
const FIRST_ECLIPSE: f64 = 1.0;

/// Two sectors of an eclipsing binary with primary eclipses every 3 days.
struct SyntheticSource;

fn eclipses(t: f64) -> f64 {
    (0..10)
        .map(|k| {
            let z = (t - (FIRST_ECLIPSE + PERIOD * k as f64)) / 0.05;
            0.05 * (-0.5 * z * z).exp()
        })
        .sum::<f64>()
}

impl LightCurveSource for SyntheticSource {
    fn search(&self, query: &SearchQuery) -> Result<Vec<LightCurveHandle>> {
        let handles = [1, 2]
            .into_iter()
            .map(|sector| LightCurveHandle {
                mission: query.mission.clone(),
                target_name: query.target.clone(),
                sector: Some(sector),
                exptime_secs: 120.0,
                author: "SPOC".to_string(),
                obs_id: format!("synthetic-s{:04}", sector),
                data_uri: None,
            })
            .collect();
        Ok(handles)
    }

    fn download(&self, handle: &LightCurveHandle) -> Result<RawLightCurve> {
        let (start, scale) = match handle.sector {
            Some(1) => (0.0, 1200.0),
            _ => (14.0, 800.0),
        };
        let time: Vec<f64> = (0..1300).map(|i| start + i as f64 * 0.01).collect();
        let mut flux: Vec<f64> = time.iter().map(|&t| scale * (1.0 - eclipses(t))).collect();
        let flux_error = vec![scale * 0.001; time.len()];
        let mut quality = vec![0; time.len()];

        if handle.sector == Some(1) {
            flux[10] = f64::NAN;
        } else {
            // desaturation event
            quality[20] = 32;
        }

        Ok(RawLightCurve {
            time,
            flux,
            flux_error,
            quality,
        })
    }
}

fn config_in(dir: &std::path::Path, render_plots: bool) -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.output.output_dir = dir.to_path_buf();
    config.output.render_plots = render_plots;
    config
}

#[test]
fn test_full_workflow_with_plots() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = AnalysisSession::new(config_in(dir.path(), true), Box::new(SyntheticSource));

    let found = session.search("TIC 99", "TESS", None).unwrap();
    assert_eq!(found.len(), 2);

    let only_second = session.select(&[2]).unwrap();
    assert_eq!(only_second.len(), 1);
    assert_eq!(only_second[0].sector, Some(2));
    assert!(matches!(session.select(&[7]), Err(AnalysisError::EmptySelection)));

    let all = session.select(&[]).unwrap();
    let written = session.process(&all).unwrap();
    assert_eq!(written.len(), 2);
    assert_eq!(written[0], dir.path().join("TIC_99_light_curve.tsv"));
    assert!(written.iter().all(|p| p.exists()));

    let series = session.series().unwrap();
    assert_eq!(series.len(), 2 * 1300 - 2);
    assert_relative_eq!(median(series.flux()).unwrap(), 1.0, epsilon = 1e-9);
    assert!(series.time().windows(2).all(|w| w[0] < w[1]));

    let epoch = session
        .initial_epoch(TimeWindow::new(0.7, 1.3).unwrap(), None)
        .unwrap();
    assert!((epoch.epoch() - FIRST_ECLIPSE).abs() < 1e-3, "epoch {}", epoch.epoch());
    let boundaries = epoch.boundaries.expect("eclipse crosses the threshold");
    assert!(boundaries.ingress < FIRST_ECLIPSE && FIRST_ECLIPSE < boundaries.egress);
    assert_eq!(session.epoch(), Some(epoch.epoch()));
    assert_eq!(epoch.plots.len(), 1);

    let period = session
        .get_period(TimeWindow::new(0.7, 1.3).unwrap(), TimeWindow::new(3.7, 4.3).unwrap())
        .unwrap();
    assert!((period.estimate.period - PERIOD).abs() < 1e-3, "period {}", period.estimate.period);
    assert!(period.fold.phase.iter().all(|p| (0.0..1.0).contains(p)));
    assert_eq!(period.plots.len(), 2);

    let pg = session.periodogram().unwrap();
    assert!(pg.period.is_finite() && pg.period > 0.0);
    assert_relative_eq!(pg.fold_period, 4.0 * pg.period);
    assert_eq!(pg.plots.len(), 2);
    assert!(pg.plots.iter().all(|p| p.exists()));
}

#[test]
fn test_table_reload_and_fold_without_plots() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = AnalysisSession::new(config_in(dir.path(), false), Box::new(SyntheticSource));
    session.search("TIC 99", "TESS", None).unwrap();
    let handles = session.select(&[1]).unwrap();
    let written = session.process(&handles).unwrap();
    assert_eq!(written.len(), 1);

    let reloaded = read_table(&written[0]).unwrap();
    let original = session.series().unwrap();
    assert_eq!(reloaded.len(), original.len());
    for (a, b) in reloaded.flux().iter().zip(original.flux()) {
        assert!((a - b).abs() <= 1e-6);
    }

    let mut fresh = AnalysisSession::new(config_in(dir.path(), false), Box::new(SyntheticSource));
    fresh.load_series(reloaded);
    let fold = fresh.fold(FIRST_ECLIPSE, PERIOD).unwrap();
    assert!(fold.plots.is_empty());

    // every eclipse lands at phase zero
    let deepest = fold
        .fold
        .phase
        .iter()
        .zip(fresh.series().unwrap().flux())
        .filter(|(_, f)| **f < 0.96)
        .map(|(p, _)| *p)
        .collect::<Vec<_>>();
    assert!(!deepest.is_empty());
    assert!(deepest.iter().all(|p| *p < 0.02 || *p > 0.98));
}
