//! SVG plots of analysis results.
//!
//! Rendering only consumes finished results; nothing here feeds back into the
//! computations.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use plotters::coord::combinators::BindKeyPoints;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;
use tracing::info;

use crate::config::OutputConfig;
use crate::data_access::LightCurveSeries;
use crate::error::{io_err, AnalysisError, Result};
use crate::statistical_methods::periodogram::Periodogram;
use crate::statistical_methods::statistics::segment_on_gaps;
use crate::timing::phase::EXTENDED_PHASE_RANGE;
use crate::timing::{GaussianFitResult, PeriodEstimate, PhaseCurve, TimeWindow, TransitBoundaries};

/// Gaps wider than this many median cadences break the light curve line
const GAP_FACTOR: f64 = 5.0;

const TIME_LABEL: &str = "Time - 2457000 (BTJD days)";
const FLUX_LABEL: &str = "Normalized flux";

fn render_err<E: std::fmt::Display>(e: E) -> AnalysisError {
    AnalysisError::Render(e.to_string())
}

/// Padded axis range around finite values
fn padded_range<'a>(values: impl IntoIterator<Item = &'a f64>) -> Range<f64> {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return 0.0..1.0;
    }
    let span = hi - lo;
    let pad = if span > 0.0 { span * 0.05 } else { lo.abs().max(1.0) * 0.01 };
    (lo - pad)..(hi + pad)
}

pub struct PlotRenderer {
    output: OutputConfig,
    target: String,
}

impl PlotRenderer {
    pub fn new(output: OutputConfig, target: &str) -> PlotRenderer {
        PlotRenderer {
            output,
            target: target.to_string(),
        }
    }

    fn path(&self, kind: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output.output_dir).map_err(|e| io_err(&self.output.output_dir, e))?;
        Ok(self.output.path_for(&self.target, kind, "svg"))
    }

    /// Normalized light curve, one line per contiguous segment.
    pub fn light_curve(&self, series: &LightCurveSeries) -> Result<PathBuf> {
        let path = self.path("light_curve")?;
        draw_light_curve(&path, series)?;
        info!(path = %path.display(), "wrote light curve plot");
        Ok(path)
    }

    /// Window data, Gaussian model, fitted T0 and (when found) ingress/egress.
    pub fn epoch_fit(
        &self,
        window: &LightCurveSeries,
        fit: &GaussianFitResult,
        boundaries: Option<&TransitBoundaries>,
    ) -> Result<PathBuf> {
        let path = self.path("epoch_fit")?;
        draw_epoch_fit(&path, window, fit, boundaries)?;
        info!(path = %path.display(), "wrote epoch fit plot");
        Ok(path)
    }

    /// Side-by-side fits of the two minima used for the period.
    pub fn minima_fits(
        &self,
        series: &LightCurveSeries,
        windows: [TimeWindow; 2],
        estimate: &PeriodEstimate,
    ) -> Result<PathBuf> {
        let path = self.path("minima_fits")?;
        draw_minima_fits(&path, series, windows, estimate)?;
        info!(path = %path.display(), "wrote minima fit plot");
        Ok(path)
    }

    pub fn periodogram(&self, pg: &Periodogram) -> Result<PathBuf> {
        let path = self.path("periodogram")?;
        draw_periodogram(&path, pg)?;
        info!(path = %path.display(), "wrote periodogram plot");
        Ok(path)
    }

    /// Extended phase diagram over `[-0.25, 1.25]`.
    pub fn phase_diagram(&self, curve: &PhaseCurve, kind: &str) -> Result<PathBuf> {
        let path = self.path(kind)?;
        draw_phase_diagram(&path, curve)?;
        info!(path = %path.display(), "wrote phase diagram");
        Ok(path)
    }
}

fn draw_light_curve(path: &Path, series: &LightCurveSeries) -> Result<()> {
    let root = SVGBackend::new(path, (1800, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let time = series.time();
    let flux = series.flux();
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(padded_range(time), padded_range(flux))
        .map_err(render_err)?;
    chart
        .configure_mesh()
        .x_desc(TIME_LABEL)
        .y_desc(FLUX_LABEL)
        .draw()
        .map_err(render_err)?;

    for (start, end) in segment_on_gaps(time, GAP_FACTOR) {
        chart
            .draw_series(LineSeries::new((start..end).map(|i| (time[i], flux[i])), &BLACK))
            .map_err(render_err)?;
    }

    root.present().map_err(render_err)?;
    Ok(())
}

fn draw_epoch_fit(
    path: &Path,
    window: &LightCurveSeries,
    fit: &GaussianFitResult,
    boundaries: Option<&TransitBoundaries>,
) -> Result<()> {
    let root = SVGBackend::new(path, (800, 400)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let y_range = padded_range(window.flux());
    let mut chart = ChartBuilder::on(&root)
        .caption("Gaussian fit to the eclipse", ("sans-serif", 22))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(padded_range(window.time()), y_range.clone())
        .map_err(render_err)?;
    chart
        .configure_mesh()
        .x_desc("Time")
        .y_desc("Flux")
        .draw()
        .map_err(render_err)?;

    draw_fit(&mut chart, window, fit)?;

    let (y0, y1) = (y_range.start, y_range.end);
    chart
        .draw_series(LineSeries::new(vec![(fit.center, y0), (fit.center, y1)], &BLUE))
        .map_err(render_err)?
        .label(format!("T0 = {:.5}", fit.center))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));

    if let Some(b) = boundaries {
        for (t, name) in [(b.ingress, "Ingress"), (b.egress, "Egress")] {
            chart
                .draw_series(LineSeries::new(vec![(t, y0), (t, y1)], &BLACK))
                .map_err(render_err)?
                .label(format!("{}: {:.2}", name, t))
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLACK));
        }
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(render_err)?;
    root.present().map_err(render_err)?;
    Ok(())
}

fn draw_minima_fits(
    path: &Path,
    series: &LightCurveSeries,
    windows: [TimeWindow; 2],
    estimate: &PeriodEstimate,
) -> Result<()> {
    let root = SVGBackend::new(path, (1500, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let panels = root.split_evenly((1, 2));
    let fits = [&estimate.first, &estimate.second];
    for (index, panel) in panels.iter().enumerate() {
        let window = series.select(windows[index].start(), windows[index].end());
        let fit = fits[index];
        let y_range = padded_range(window.flux());
        let mut chart = ChartBuilder::on(panel)
            .caption(format!("Minimum {}", index + 1), ("sans-serif", 24))
            .margin(15)
            .x_label_area_size(45)
            .y_label_area_size(70)
            .build_cartesian_2d(padded_range(window.time()), y_range.clone())
            .map_err(render_err)?;
        chart
            .configure_mesh()
            .x_labels(6)
            .x_desc("Time (BTJD)")
            .y_desc(FLUX_LABEL)
            .draw()
            .map_err(render_err)?;

        draw_fit(&mut chart, &window, fit)?;
        chart
            .draw_series(LineSeries::new(
                vec![(fit.center, y_range.start), (fit.center, y_range.end)],
                &BLUE,
            ))
            .map_err(render_err)?
            .label(format!("Minimum {:.5}", fit.center))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::LowerLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(render_err)?;
    }

    root.present().map_err(render_err)?;
    Ok(())
}

fn draw_periodogram(path: &Path, pg: &Periodogram) -> Result<()> {
    let root = SVGBackend::new(path, (1200, 450)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let caption = match pg.period_at_max_power() {
        Some(p) => format!("Lomb-Scargle periodogram, peak at {:.4} d", p),
        None => "Lomb-Scargle periodogram".to_string(),
    };
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 22))
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(70)
        .build_cartesian_2d(padded_range(&pg.frequency), padded_range(&pg.power))
        .map_err(render_err)?;
    chart
        .configure_mesh()
        .x_desc("Frequency (1/d)")
        .y_desc("Power")
        .draw()
        .map_err(render_err)?;

    chart
        .draw_series(LineSeries::new(
            pg.frequency.iter().copied().zip(pg.power.iter().copied()),
            &BLACK,
        ))
        .map_err(render_err)?;
    if let Some(peak) = pg.peak() {
        chart
            .draw_series(std::iter::once(Circle::new(peak, 4, RED.filled())))
            .map_err(render_err)?;
    }

    root.present().map_err(render_err)?;
    Ok(())
}

/// Ticks every quarter phase across the extended range
fn phase_ticks() -> Vec<f64> {
    let (lo, hi) = EXTENDED_PHASE_RANGE;
    let steps = ((hi - lo) / 0.25).round() as usize;
    (0..=steps).map(|i| lo + 0.25 * i as f64).collect()
}

fn draw_phase_diagram(path: &Path, curve: &PhaseCurve) -> Result<()> {
    let root = SVGBackend::new(path, (1800, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let (lo, hi) = EXTENDED_PHASE_RANGE;
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(
            (lo..hi).with_key_points(phase_ticks()),
            padded_range(&curve.extended_flux),
        )
        .map_err(render_err)?;
    chart
        .configure_mesh()
        .x_label_formatter(&|x| format!("{:.2}", x))
        .x_desc("Orbital phase")
        .y_desc("Flux")
        .draw()
        .map_err(render_err)?;

    chart
        .draw_series(
            curve
                .extended_phase
                .iter()
                .zip(&curve.extended_flux)
                .map(|(&p, &f)| Circle::new((p, f), 2, BLACK.filled())),
        )
        .map_err(render_err)?;

    root.present().map_err(render_err)?;
    Ok(())
}

type TimeFluxChart<'a, 'b> = ChartContext<'a, SVGBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// Window samples as points with the fitted Gaussian over them
fn draw_fit(chart: &mut TimeFluxChart<'_, '_>, window: &LightCurveSeries, fit: &GaussianFitResult) -> Result<()> {
    chart
        .draw_series(
            window
                .time()
                .iter()
                .zip(window.flux())
                .map(|(&t, &f)| Circle::new((t, f), 2, BLACK.filled())),
        )
        .map_err(render_err)?
        .label("Data")
        .legend(|(x, y)| Circle::new((x, y), 3, BLACK.filled()));

    let time = window.time();
    if let (Some(&t0), Some(&t1)) = (time.first(), time.last()) {
        let n = 400;
        let model = (0..=n).map(|i| {
            let t = t0 + (t1 - t0) * i as f64 / n as f64;
            (t, fit.evaluate(t))
        });
        chart
            .draw_series(LineSeries::new(model, &RED))
            .map_err(render_err)?
            .label("Gaussian fit")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::phase::fold_series;

    fn renderer(dir: &std::path::Path) -> PlotRenderer {
        let output = OutputConfig {
            output_dir: dir.to_path_buf(),
            ..OutputConfig::default()
        };
        PlotRenderer::new(output, "TIC 1")
    }

    #[test]
    fn test_padded_range() {
        let r = padded_range(&[1.0, 2.0, f64::NAN]);
        assert!(r.start < 1.0 && r.end > 2.0);
        let flat = padded_range(&[1.0, 1.0]);
        assert!(flat.start < 1.0 && flat.end > 1.0);
        assert_eq!(padded_range(&Vec::<f64>::new()), 0.0..1.0);
    }

    #[test]
    fn test_light_curve_and_phase_plots_written() {
        let dir = tempfile::tempdir().unwrap();
        let time: Vec<f64> = (0..200).map(|i| i as f64 * 0.05).collect();
        let flux: Vec<f64> = time.iter().map(|t| 1.0 + 0.01 * t.sin()).collect();
        let series = LightCurveSeries::new(time, flux, vec![0.001; 200]).unwrap();

        let r = renderer(dir.path());
        let lc = r.light_curve(&series).unwrap();
        assert_eq!(lc, dir.path().join("TIC_1_light_curve.svg"));
        assert!(fs::metadata(&lc).unwrap().len() > 0);

        let curve = fold_series(&series, 0.0, 2.0).unwrap();
        let phase = r.phase_diagram(&curve, "phase_diagram").unwrap();
        let svg = fs::read_to_string(phase).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains(">0.50<") && svg.contains(">0.75<"));
    }

    #[test]
    fn test_phase_ticks_fall_on_quarters() {
        assert_eq!(phase_ticks(), vec![-0.25, 0.0, 0.25, 0.5, 0.75, 1.0, 1.25]);
    }

    #[test]
    fn test_every_plot_returns_its_own_path() {
        use crate::statistical_methods::least_squares::LevenbergMarquardt;
        use crate::statistical_methods::periodogram::LombScargle;
        use crate::timing::{fit_minimum, period_from_minima};

        let dir = tempfile::tempdir().unwrap();
        let time: Vec<f64> = (0..=800).map(|i| i as f64 * 0.01).collect();
        let flux: Vec<f64> = time
            .iter()
            .map(|t| {
                let near = (t - 1.0).rem_euclid(3.0).min(3.0 - (t - 1.0).rem_euclid(3.0));
                1.0 - 0.05 * (-0.5 * (near / 0.1).powi(2)).exp()
            })
            .collect();
        let series = LightCurveSeries::new(time, flux, vec![0.001; 801]).unwrap();
        let solver = LevenbergMarquardt::default();
        let w1 = TimeWindow::new(0.5, 1.5).unwrap();
        let w2 = TimeWindow::new(3.5, 4.5).unwrap();

        let r = renderer(dir.path());
        let fit = fit_minimum(&series, w1, &solver).unwrap();
        let epoch = r.epoch_fit(&series.select(0.5, 1.5), &fit, None).unwrap();
        let estimate = period_from_minima(&series, w1, w2, &solver).unwrap();
        let minima = r.minima_fits(&series, [w1, w2], &estimate).unwrap();
        let pg = LombScargle::default().compute(series.time(), series.flux()).unwrap();
        let periodogram = r.periodogram(&pg).unwrap();

        assert_eq!(epoch, dir.path().join("TIC_1_epoch_fit.svg"));
        assert_eq!(minima, dir.path().join("TIC_1_minima_fits.svg"));
        assert_eq!(periodogram, dir.path().join("TIC_1_periodogram.svg"));
        assert!([epoch, minima, periodogram].iter().all(|p| fs::metadata(p).unwrap().len() > 0));
    }
}
