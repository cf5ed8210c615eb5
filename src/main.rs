use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use lightcurve_timing::data_access::fits_access::LocalFitsSource;
use lightcurve_timing::data_access::mast::MastClient;
use lightcurve_timing::data_access::table::read_table;
use lightcurve_timing::{AnalysisConfig, AnalysisError, AnalysisSession, Cadence, LightCurveSource, TimeWindow};

#[derive(Parser)]
#[command(name = "lightcurve-timing")]
#[command(author, version, about = "Eclipse timing for TESS and Kepler light curves", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the light curves available for a target
    Search {
        /// Target name or identifier, e.g. "TIC 261136679"
        target: String,

        #[arg(short, long, default_value = "TESS")]
        mission: String,

        /// fast, short or long
        #[arg(long, value_parser = parse_cadence)]
        cadence: Option<Cadence>,

        /// Search local FITS files instead of MAST
        #[arg(long)]
        fits_dir: Option<PathBuf>,
    },

    /// Download, clean and stitch light curves into a table
    Process {
        target: String,

        #[arg(short, long, default_value = "TESS")]
        mission: String,

        #[arg(long, value_parser = parse_cadence)]
        cadence: Option<Cadence>,

        /// Comma-separated sectors; all sectors when omitted
        #[arg(long, value_delimiter = ',')]
        sectors: Vec<u32>,

        /// Read local FITS files instead of MAST
        #[arg(long)]
        fits_dir: Option<PathBuf>,
    },

    /// Fit the initial epoch from one minimum
    Epoch {
        /// Light curve table written by `process`
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, num_args = 2, value_names = ["START", "END"], allow_negative_numbers = true)]
        window: Vec<f64>,

        /// Fraction of the depth that marks ingress and egress
        #[arg(long)]
        frac_depth: Option<f64>,
    },

    /// Period from two minima of the same type
    Period {
        #[arg(short, long)]
        input: PathBuf,

        /// Reference epoch (T0)
        #[arg(long, allow_negative_numbers = true)]
        epoch: f64,

        #[arg(long, num_args = 2, value_names = ["START", "END"], allow_negative_numbers = true)]
        first: Vec<f64>,

        #[arg(long, num_args = 2, value_names = ["START", "END"], allow_negative_numbers = true)]
        second: Vec<f64>,
    },

    /// Lomb-Scargle period estimate
    Periodogram {
        #[arg(short, long)]
        input: PathBuf,

        /// Multiple of the peak period used for the folded diagram
        #[arg(long)]
        harmonics: Option<f64>,
    },

    /// Phase diagram for a known ephemeris
    Fold {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, allow_negative_numbers = true)]
        epoch: f64,

        #[arg(long)]
        period: f64,
    },
}

fn parse_cadence(s: &str) -> std::result::Result<Cadence, String> {
    s.parse().map_err(|e: AnalysisError| e.to_string())
}

fn window(bounds: &[f64]) -> Result<TimeWindow> {
    let [start, end] = bounds else {
        bail!("a window needs exactly two values, got {}", bounds.len());
    };
    Ok(TimeWindow::new(*start, *end)?)
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => AnalysisConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(AnalysisConfig::default()),
    }
}

fn source(config: &AnalysisConfig, fits_dir: Option<PathBuf>) -> Result<Box<dyn LightCurveSource>> {
    match fits_dir {
        Some(dir) => Ok(Box::new(LocalFitsSource::new(dir))),
        None => Ok(Box::new(
            MastClient::new(&config.data).context("Failed to create MAST client")?,
        )),
    }
}

/// Session over a saved table; the target name comes from the file name.
fn table_session(config: AnalysisConfig, input: &Path) -> Result<AnalysisSession> {
    let series = read_table(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let dir = input.parent().map(Path::to_path_buf).unwrap_or_default();
    let target = input
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.trim_end_matches("_light_curve").to_string())
        .unwrap_or_else(|| "lightcurve".to_string());

    let mut session = AnalysisSession::new(config, Box::new(LocalFitsSource::new(dir)));
    session.set_target(&target);
    session.load_series(series);
    Ok(session)
}

fn print_plots(plots: &[PathBuf]) {
    for plot in plots {
        println!("Plot:    {}", plot.display());
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Search {
            target,
            mission,
            cadence,
            fits_dir,
        } => {
            let source = source(&config, fits_dir)?;
            let mut session = AnalysisSession::new(config, source);
            let found = session
                .search(&target, &mission, cadence)
                .with_context(|| format!("Search for {} failed", target))?;
            if found.is_empty() {
                println!("No light curves found for {} ({})", target, mission);
            }
            for (i, handle) in found.iter().enumerate() {
                println!("{:>3}  {}", i, handle);
            }
        }

        Commands::Process {
            target,
            mission,
            cadence,
            sectors,
            fits_dir,
        } => {
            let source = source(&config, fits_dir)?;
            let mut session = AnalysisSession::new(config, source);
            session
                .search(&target, &mission, cadence)
                .with_context(|| format!("Search for {} failed", target))?;
            let handles = session.select(&sectors)?;
            let written = session.process(&handles).context("Processing failed")?;
            if let Some(series) = session.series() {
                println!("Samples: {}", series.len());
            }
            for path in written {
                println!("Wrote:   {}", path.display());
            }
        }

        Commands::Epoch {
            input,
            window: bounds,
            frac_depth,
        } => {
            let mut session = table_session(config, &input)?;
            let result = session.initial_epoch(window(&bounds)?, frac_depth)?;
            println!("T0:      {:.6}", result.epoch());
            if let Some(err) = result.fit.center_error() {
                println!("T0 err:  {:.6}", err);
            }
            match result.boundaries {
                Some(b) => {
                    println!("Ingress: {:.6}", b.ingress);
                    println!("Egress:  {:.6}", b.egress);
                    println!("Depth:   {:.6}", b.depth);
                }
                None => println!("No transit boundaries detected"),
            }
            print_plots(&result.plots);
        }

        Commands::Period {
            input,
            epoch,
            first,
            second,
        } => {
            let mut session = table_session(config, &input)?;
            session.set_epoch(epoch);
            let result = session.get_period(window(&first)?, window(&second)?)?;
            println!("Minimum 1: {:.6}", result.estimate.first.center);
            println!("Minimum 2: {:.6}", result.estimate.second.center);
            println!("Period:    {:.6} d", result.estimate.period);
            if let Some(err) = result.estimate.period_error() {
                println!("Error:     {:.6} d", err);
            }
            print_plots(&result.plots);
        }

        Commands::Periodogram { input, harmonics } => {
            if let Some(h) = harmonics {
                config.periodogram.harmonics = h;
                config.validate()?;
            }
            let session = table_session(config, &input)?;
            let result = session.periodogram()?;
            println!("Period at max power: {:.6} d", result.period);
            println!("Folded at:           {:.6} d", result.fold_period);
            print_plots(&result.plots);
        }

        Commands::Fold {
            input,
            epoch,
            period,
        } => {
            let session = table_session(config, &input)?;
            let result = session.fold(epoch, period)?;
            println!("Folded {} samples", result.fold.phase.len());
            print_plots(&result.plots);
        }
    }

    Ok(())
}
