//! Error types for light curve analysis

use std::path::PathBuf;
use thiserror::Error;

/// Every failure an analysis step can surface to its caller
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// A search has not produced any light curve products to select from
    #[error("No light curves found for the requested target; run a search first")]
    NoSearchResults,

    /// The caller selected no products to process
    #[error("No light curves selected for the requested sectors")]
    EmptySelection,

    /// The least-squares solver failed or the window was underdetermined
    #[error("Gaussian fit did not converge: {reason}")]
    FitDivergence { reason: String },

    /// No sample fell below the fractional depth threshold
    #[error("No transit detected in window ({start}..{end})")]
    NoTransitDetected { start: f64, end: f64 },

    /// A phase fold was requested with a zero period
    #[error("Period must be non-zero to fold a light curve")]
    DivisionByZero,

    /// An operation needs a processed light curve
    #[error("No light curve loaded; process or load a light curve first")]
    SeriesNotLoaded,

    /// Phase folding needs an epoch from the minimum fit
    #[error("Reference epoch not set; fit the initial epoch first")]
    EpochNotSet,

    /// Window bounds are inverted or not finite
    #[error("Invalid time window ({start}..{end})")]
    InvalidWindow { start: f64, end: f64 },

    /// Too few samples for the requested computation
    #[error("Insufficient data: need at least {needed} samples, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Periodogram upper bound falls below the grid's first frequency
    #[error("Empty frequency grid: upper bound {max} is below the resolution {min}")]
    InvalidFrequencyRange { min: f64, max: f64 },

    /// Flux is non-finite or cannot be normalized (zero or non-finite median)
    #[error("Invalid flux: {0}")]
    InvalidFlux(String),

    /// Parallel arrays of a light curve disagree in length
    #[error("Length mismatch: time={time}, flux={flux}, flux_error={flux_error}")]
    LengthMismatch {
        time: usize,
        flux: usize,
        flux_error: usize,
    },

    /// File handed to the FITS reader is not a FITS file
    #[error("Not a FITS file: {0:?}")]
    NotFitsFile(PathBuf),

    /// Error raised by cfitsio
    #[error("FITS error: {0}")]
    Fits(#[from] fitsio::errors::Error),

    /// File I/O error with the offending path
    #[error("File I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Transport failure while talking to MAST
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// MAST answered but the answer is unusable
    #[error("MAST error: {0}")]
    Mast(String),

    /// Malformed light curve table
    #[error("Table error on line {line}: {message}")]
    Table { line: usize, message: String },

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Plot backend failure
    #[error("Rendering error: {0}")]
    Render(String),
}

/// Result type for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Convert a std::io::Error to AnalysisError with path context
pub fn io_err(path: impl Into<PathBuf>, err: std::io::Error) -> AnalysisError {
    AnalysisError::Io {
        path: path.into(),
        source: err,
    }
}
