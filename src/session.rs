//! Interactive analysis workflow: search, process, epoch, period.
//!
//! The session holds everything one target's analysis accumulates (search
//! results, the cleaned series, the reference epoch) and hands finished
//! results to the renderer when plotting is enabled.

use std::fs;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::data_access::data_cleaner::clean_and_concatenate;
use crate::data_access::table::write_table;
use crate::data_access::{Cadence, LightCurveHandle, LightCurveSeries, LightCurveSource, SearchQuery};
use crate::error::{io_err, AnalysisError, Result};
use crate::rendering::PlotRenderer;
use crate::statistical_methods::least_squares::LevenbergMarquardt;
use crate::statistical_methods::periodogram::{LombScargle, Periodogram};
use crate::timing::{
    detect_boundaries, fit_minimum, fold_series, period_from_minima, GaussianFitResult, PeriodEstimate,
    PhaseCurve, TimeWindow, TransitBoundaries,
};

const DEFAULT_TARGET: &str = "lightcurve";

#[derive(Debug, Clone)]
pub struct EpochResult {
    pub fit: GaussianFitResult,
    /// `None` when no sample crossed the depth threshold
    pub boundaries: Option<TransitBoundaries>,
    pub plots: Vec<PathBuf>,
}

impl EpochResult {
    pub fn epoch(&self) -> f64 {
        self.fit.center
    }
}

#[derive(Debug, Clone)]
pub struct PeriodogramResult {
    pub periodogram: Periodogram,
    /// Period at maximum power
    pub period: f64,
    /// `harmonics * period`, the period used for the folded diagram
    pub fold_period: f64,
    pub fold: PhaseCurve,
    pub plots: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PeriodResult {
    pub estimate: PeriodEstimate,
    pub fold: PhaseCurve,
    pub plots: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FoldResult {
    pub fold: PhaseCurve,
    pub plots: Vec<PathBuf>,
}

pub struct AnalysisSession {
    config: AnalysisConfig,
    source: Box<dyn LightCurveSource>,
    target: String,
    search_results: Vec<LightCurveHandle>,
    series: Option<LightCurveSeries>,
    epoch: Option<f64>,
    renderer: Option<PlotRenderer>,
}

impl AnalysisSession {
    pub fn new(config: AnalysisConfig, source: Box<dyn LightCurveSource>) -> AnalysisSession {
        let mut session = AnalysisSession {
            config,
            source,
            target: String::new(),
            search_results: Vec::new(),
            series: None,
            epoch: None,
            renderer: None,
        };
        session.set_target(DEFAULT_TARGET);
        session
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Name used in output file names.
    pub fn set_target(&mut self, target: &str) {
        self.target = target.trim().to_string();
        self.renderer = self
            .config
            .output
            .render_plots
            .then(|| PlotRenderer::new(self.config.output.clone(), &self.target));
    }

    pub fn search_results(&self) -> &[LightCurveHandle] {
        &self.search_results
    }

    pub fn series(&self) -> Option<&LightCurveSeries> {
        self.series.as_ref()
    }

    pub fn epoch(&self) -> Option<f64> {
        self.epoch
    }

    pub fn set_epoch(&mut self, epoch: f64) {
        self.epoch = Some(epoch);
    }

    fn solver(&self) -> LevenbergMarquardt {
        LevenbergMarquardt::new(self.config.fit.max_iterations, self.config.fit.tolerance)
    }

    fn loaded_series(&self) -> Result<&LightCurveSeries> {
        self.series.as_ref().ok_or(AnalysisError::SeriesNotLoaded)
    }

    /// Search the source and remember the results. Zero results are not an
    /// error; the returned slice is simply empty.
    pub fn search(
        &mut self,
        target: &str,
        mission: &str,
        cadence: Option<Cadence>,
    ) -> Result<&[LightCurveHandle]> {
        let query = SearchQuery::new(target, mission, cadence);
        self.set_target(&query.target);
        self.search_results = self.source.search(&query)?;

        if self.search_results.is_empty() {
            warn!(target = %query.target, mission = %query.mission, "no light curves found");
        } else {
            info!(
                target = %query.target,
                count = self.search_results.len(),
                "found light curves"
            );
        }
        Ok(&self.search_results)
    }

    /// Handles for the given sectors, or every handle when `sectors` is empty.
    pub fn select(&self, sectors: &[u32]) -> Result<Vec<LightCurveHandle>> {
        if self.search_results.is_empty() {
            return Err(AnalysisError::NoSearchResults);
        }
        let selected: Vec<LightCurveHandle> = self
            .search_results
            .iter()
            .filter(|h| sectors.is_empty() || h.sector.is_some_and(|s| sectors.contains(&s)))
            .cloned()
            .collect();
        if selected.is_empty() {
            return Err(AnalysisError::EmptySelection);
        }
        Ok(selected)
    }

    /// Download, clean and stitch the selected products, then write the
    /// table and light curve plot. Returns the written paths.
    pub fn process(&mut self, handles: &[LightCurveHandle]) -> Result<Vec<PathBuf>> {
        if handles.is_empty() {
            return Err(AnalysisError::EmptySelection);
        }

        let mut sectors = Vec::with_capacity(handles.len());
        for handle in handles {
            info!(product = %handle, "downloading light curve");
            sectors.push(self.source.download(handle)?);
        }

        let data = &self.config.data;
        let series = clean_and_concatenate(sectors, data.quality_bitmask, data.clip_sigma)?;
        if series.is_empty() {
            return Err(AnalysisError::EmptySelection);
        }
        info!(samples = series.len(), sectors = handles.len(), "light curve ready");

        let output_dir = &self.config.output.output_dir;
        fs::create_dir_all(output_dir).map_err(|e| io_err(output_dir, e))?;
        let table_path = self.config.output.path_for(&self.target, "light_curve", "tsv");
        write_table(&table_path, &series)?;

        let mut written = vec![table_path];
        if let Some(renderer) = &self.renderer {
            written.push(renderer.light_curve(&series)?);
        }

        self.series = Some(series);
        self.epoch = None;
        Ok(written)
    }

    /// Install a series loaded from elsewhere, e.g. a saved table.
    pub fn load_series(&mut self, series: LightCurveSeries) {
        self.series = Some(series);
        self.epoch = None;
    }

    /// Fit the minimum inside `window` and store its center as the epoch.
    pub fn initial_epoch(&mut self, window: TimeWindow, frac_depth: Option<f64>) -> Result<EpochResult> {
        let series = self.loaded_series()?;
        let frac_depth = frac_depth.unwrap_or(self.config.transit.frac_depth);

        let boundaries = match detect_boundaries(series, window, frac_depth) {
            Ok(b) => {
                info!(ingress = b.ingress, egress = b.egress, "transit boundaries");
                Some(b)
            }
            Err(AnalysisError::NoTransitDetected { start, end }) => {
                warn!(start, end, frac_depth, "no transit detected, fitting without boundaries");
                None
            }
            Err(e) => return Err(e),
        };

        let fit = fit_minimum(series, window, &self.solver())?;
        info!(epoch = fit.center, "initial epoch");

        let mut plots = Vec::new();
        if let Some(renderer) = &self.renderer {
            let selected = series.select(window.start(), window.end());
            plots.push(renderer.epoch_fit(&selected, &fit, boundaries.as_ref())?);
        }

        self.epoch = Some(fit.center);
        Ok(EpochResult {
            fit,
            boundaries,
            plots,
        })
    }

    /// Lomb-Scargle period plus a fold at the configured harmonic of it.
    pub fn periodogram(&self) -> Result<PeriodogramResult> {
        let series = self.loaded_series()?;
        let settings = &self.config.periodogram;
        let ls = LombScargle::new(settings.oversample_factor, settings.max_frequency);
        let periodogram = ls.compute(series.time(), series.flux())?;
        let period = periodogram
            .period_at_max_power()
            .ok_or(AnalysisError::InsufficientData {
                needed: 3,
                got: series.len(),
            })?;

        let fold_period = settings.harmonics * period;
        let epoch = series.time()[0];
        let fold = fold_series(series, epoch, fold_period)?;
        info!(period, fold_period, "periodogram peak");

        let mut plots = Vec::new();
        if let Some(renderer) = &self.renderer {
            plots.push(renderer.periodogram(&periodogram)?);
            plots.push(renderer.phase_diagram(&fold, "periodogram_fold")?);
        }

        Ok(PeriodogramResult {
            periodogram,
            period,
            fold_period,
            fold,
            plots,
        })
    }

    /// Period from two minima of the same type, folded about the stored epoch.
    pub fn get_period(&self, first: TimeWindow, second: TimeWindow) -> Result<PeriodResult> {
        let series = self.loaded_series()?;
        let epoch = self.epoch.ok_or(AnalysisError::EpochNotSet)?;

        let estimate = period_from_minima(series, first, second, &self.solver())?;
        info!(
            period = estimate.period,
            error = ?estimate.period_error(),
            "period from minima"
        );
        let fold = fold_series(series, epoch, estimate.period)?;

        let mut plots = Vec::new();
        if let Some(renderer) = &self.renderer {
            plots.push(renderer.minima_fits(series, [first, second], &estimate)?);
            plots.push(renderer.phase_diagram(&fold, "phase_diagram")?);
        }

        Ok(PeriodResult {
            estimate,
            fold,
            plots,
        })
    }

    /// Fold the series at a known ephemeris.
    pub fn fold(&self, epoch: f64, period: f64) -> Result<FoldResult> {
        let series = self.loaded_series()?;
        let fold = fold_series(series, epoch, period)?;

        let mut plots = Vec::new();
        if let Some(renderer) = &self.renderer {
            plots.push(renderer.phase_diagram(&fold, "phase_diagram")?);
        }
        Ok(FoldResult { fold, plots })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_access::RawLightCurve;

    struct EmptySource;

    impl LightCurveSource for EmptySource {
        fn search(&self, _query: &SearchQuery) -> Result<Vec<LightCurveHandle>> {
            Ok(Vec::new())
        }

        fn download(&self, _handle: &LightCurveHandle) -> Result<RawLightCurve> {
            Err(AnalysisError::Mast("nothing to download".into()))
        }
    }

    fn session() -> AnalysisSession {
        let mut config = AnalysisConfig::default();
        config.output.render_plots = false;
        AnalysisSession::new(config, Box::new(EmptySource))
    }

    #[test]
    fn test_empty_search_is_not_an_error() {
        let mut s = session();
        let found = s.search("TIC 1", "TESS", None).unwrap();
        assert!(found.is_empty());
        assert_eq!(s.target(), "TIC 1");
        assert!(matches!(s.select(&[]), Err(AnalysisError::NoSearchResults)));
    }

    #[test]
    fn test_operations_need_a_series() {
        let mut s = session();
        let w = TimeWindow::new(0.0, 1.0).unwrap();
        assert!(matches!(s.initial_epoch(w, None), Err(AnalysisError::SeriesNotLoaded)));
        assert!(matches!(s.periodogram(), Err(AnalysisError::SeriesNotLoaded)));
        assert!(matches!(s.get_period(w, w), Err(AnalysisError::SeriesNotLoaded)));
        assert!(matches!(s.fold(0.0, 1.0), Err(AnalysisError::SeriesNotLoaded)));
    }

    #[test]
    fn test_period_needs_epoch() {
        let mut s = session();
        let time: Vec<f64> = (0..100).map(|i| i as f64 * 0.1).collect();
        s.load_series(LightCurveSeries::new(time, vec![1.0; 100], vec![0.01; 100]).unwrap());
        let w = TimeWindow::new(0.0, 1.0).unwrap();
        assert!(matches!(s.get_period(w, w), Err(AnalysisError::EpochNotSet)));

        s.set_epoch(0.5);
        assert_eq!(s.epoch(), Some(0.5));
        assert!(matches!(s.fold(0.5, 0.0), Err(AnalysisError::DivisionByZero)));
    }

    #[test]
    fn test_process_without_handles_is_empty_selection() {
        let mut s = session();
        assert!(matches!(s.process(&[]), Err(AnalysisError::EmptySelection)));
    }
}
