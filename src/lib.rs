//! Eclipse timing for space-telescope light curves.
//!
//! Find and download per-sector light curves from MAST, clean and stitch
//! them, then measure an initial epoch from a Gaussian fit to a minimum, a
//! period from two minima, and a Lomb-Scargle estimate for comparison.

pub mod config;
pub mod data_access;
pub mod error;
pub mod rendering;
pub mod session;
pub mod statistical_methods;
pub mod timing;

pub use config::AnalysisConfig;
pub use data_access::{Cadence, LightCurveHandle, LightCurveSeries, LightCurveSource, RawLightCurve, SearchQuery};
pub use error::{AnalysisError, Result};
pub use session::AnalysisSession;
pub use timing::TimeWindow;
