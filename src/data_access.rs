pub mod data_cleaner;
pub mod fits_access;
pub mod mast;
pub mod table;

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Cleaned, concatenated light curve: three parallel arrays of equal length
/// with no NaN flux.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightCurveSeries {
    time: Vec<f64>,
    flux: Vec<f64>,
    flux_error: Vec<f64>,
}

impl LightCurveSeries {
    pub fn new(time: Vec<f64>, flux: Vec<f64>, flux_error: Vec<f64>) -> Result<LightCurveSeries> {
        if time.len() != flux.len() || time.len() != flux_error.len() {
            return Err(AnalysisError::LengthMismatch {
                time: time.len(),
                flux: flux.len(),
                flux_error: flux_error.len(),
            });
        }
        if let Some(i) = flux.iter().position(|f| !f.is_finite()) {
            return Err(AnalysisError::InvalidFlux(format!(
                "sample {} at t={} has flux {}",
                i, time[i], flux[i]
            )));
        }
        Ok(LightCurveSeries {
            time,
            flux,
            flux_error,
        })
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn flux(&self) -> &[f64] {
        &self.flux
    }

    pub fn flux_error(&self) -> &[f64] {
        &self.flux_error
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Append another series, keeping the arrays parallel.
    pub fn extend(&mut self, other: LightCurveSeries) {
        self.time.extend(other.time);
        self.flux.extend(other.flux);
        self.flux_error.extend(other.flux_error);
    }

    pub(crate) fn extend_one(&mut self, time: f64, flux: f64, flux_error: f64) {
        self.time.push(time);
        self.flux.push(flux);
        self.flux_error.push(flux_error);
    }

    /// Samples with `start <= t <= end`, in series order.
    pub fn select(&self, start: f64, end: f64) -> LightCurveSeries {
        let mut out = LightCurveSeries::default();
        for i in 0..self.time.len() {
            let t = self.time[i];
            if t >= start && t <= end {
                out.extend_one(t, self.flux[i], self.flux_error[i]);
            }
        }
        out
    }
}

/// One sector (or quarter/campaign) exactly as read from a FITS product
#[derive(Debug, Clone, Default)]
pub struct RawLightCurve {
    pub time: Vec<f64>,
    pub flux: Vec<f64>,
    pub flux_error: Vec<f64>,
    pub quality: Vec<i32>,
}

/// Exposure-time class used to filter search results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    /// Below 60 s
    Fast,
    /// 60 s up to 300 s
    Short,
    /// 300 s and longer
    Long,
}

impl Cadence {
    pub fn matches(&self, exptime_secs: f64) -> bool {
        match self {
            Cadence::Fast => exptime_secs < 60.0,
            Cadence::Short => (60.0..300.0).contains(&exptime_secs),
            Cadence::Long => exptime_secs >= 300.0,
        }
    }
}

impl FromStr for Cadence {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(Cadence::Fast),
            "short" => Ok(Cadence::Short),
            "long" => Ok(Cadence::Long),
            other => Err(AnalysisError::Config(format!(
                "unknown cadence '{}', expected fast, short or long",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub target: String,
    pub mission: String,
    pub cadence: Option<Cadence>,
}

impl SearchQuery {
    pub fn new(target: &str, mission: &str, cadence: Option<Cadence>) -> SearchQuery {
        SearchQuery {
            target: target.trim().to_string(),
            mission: mission.trim().to_string(),
            cadence,
        }
    }
}

/// A downloadable per-sector light curve product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightCurveHandle {
    pub mission: String,
    pub target_name: String,
    /// Sector for TESS, quarter for Kepler, campaign for K2
    pub sector: Option<u32>,
    pub exptime_secs: f64,
    pub author: String,
    pub obs_id: String,
    /// MAST product URI; resolved at download time when absent
    pub data_uri: Option<String>,
}

impl Display for LightCurveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let sector = self
            .sector
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "{} sector {:>3}  {:<10} {:>6.0} s  {}",
            self.mission, sector, self.author, self.exptime_secs, self.target_name
        )
    }
}

/// Search-and-download collaborator
pub trait LightCurveSource {
    fn search(&self, query: &SearchQuery) -> Result<Vec<LightCurveHandle>>;

    fn download(&self, handle: &LightCurveHandle) -> Result<RawLightCurve>;
}
