//! Configuration for the analysis session.
//!
//! Every section has defaults, so an empty TOML file (or no file at all) is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{io_err, AnalysisError, Result};

/// TESS quality flags dropped by default: attitude tweak, safe mode, coarse
/// point, earth point, desaturation event and manual exclude.
pub const DEFAULT_QUALITY_BITMASK: i32 = 175;

/// Default fractional depth used to locate ingress and egress
pub const DEFAULT_FRAC_DEPTH: f64 = 0.06;

/// Default MAST API root
pub const DEFAULT_MAST_URL: &str = "https://mast.stsci.edu";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub output: OutputConfig,
    pub data: DataConfig,
    pub fit: FitConfig,
    pub transit: TransitConfig,
    pub periodogram: PeriodogramConfig,
}

impl AnalysisConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AnalysisConfig = toml::from_str(content)
            .map_err(|e| AnalysisError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        self.output.validate()?;

        if !(self.transit.frac_depth > 0.0 && self.transit.frac_depth <= 1.0) {
            return Err(AnalysisError::Config(format!(
                "transit.frac_depth must be in (0, 1], got {}",
                self.transit.frac_depth
            )));
        }
        if !(self.periodogram.oversample_factor > 0.0) {
            return Err(AnalysisError::Config(
                "periodogram.oversample_factor must be greater than 0".into(),
            ));
        }
        if !(self.periodogram.harmonics > 0.0) {
            return Err(AnalysisError::Config(
                "periodogram.harmonics must be greater than 0".into(),
            ));
        }
        if let Some(max) = self.periodogram.max_frequency {
            if !(max > 0.0) {
                return Err(AnalysisError::Config(
                    "periodogram.max_frequency must be greater than 0".into(),
                ));
            }
        }
        if self.fit.max_iterations == 0 {
            return Err(AnalysisError::Config(
                "fit.max_iterations must be greater than 0".into(),
            ));
        }
        if let Some(k) = self.data.clip_sigma {
            if !(k > 0.0) {
                return Err(AnalysisError::Config(
                    "data.clip_sigma must be greater than 0".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Where plots and tables are written and how they are named
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
    /// Supports `{target}`, `{kind}` and `{ext}`
    pub filename_template: String,
    pub render_plots: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            filename_template: "{target}_{kind}.{ext}".to_string(),
            render_plots: true,
        }
    }
}

impl OutputConfig {
    pub fn validate(&self) -> Result<()> {
        if self.filename_template.trim().is_empty() {
            return Err(AnalysisError::Config(
                "output.filename_template must not be empty".into(),
            ));
        }
        // without {kind} every plot of a run lands on the same file
        if !self.filename_template.contains("{kind}") {
            return Err(AnalysisError::Config(
                "output.filename_template must contain {kind}".into(),
            ));
        }
        Ok(())
    }

    /// Build the output path for one artifact of a run.
    pub fn path_for(&self, target: &str, kind: &str, ext: &str) -> PathBuf {
        let name = self
            .filename_template
            .replace("{target}", &sanitize(target))
            .replace("{kind}", kind)
            .replace("{ext}", ext);
        self.output_dir.join(name)
    }
}

/// Make a target identifier safe to embed in a file name
fn sanitize(target: &str) -> String {
    let cleaned: String = target
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "lightcurve".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    pub quality_bitmask: i32,
    /// Upper-only sigma clip in units of the MAD-derived sigma
    pub clip_sigma: Option<f64>,
    pub cache_dir: PathBuf,
    pub timeout_secs: u64,
    pub mast_url: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            quality_bitmask: DEFAULT_QUALITY_BITMASK,
            clip_sigma: None,
            cache_dir: default_cache_dir(),
            timeout_secs: 60,
            mast_url: DEFAULT_MAST_URL.to_string(),
        }
    }
}

/// Get the cache directory path
pub fn default_cache_dir() -> PathBuf {
    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".cache").join("lightcurve-timing")
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct FitConfig {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1.49012e-8,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TransitConfig {
    pub frac_depth: f64,
}

impl Default for TransitConfig {
    fn default() -> Self {
        Self {
            frac_depth: DEFAULT_FRAC_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PeriodogramConfig {
    pub oversample_factor: f64,
    /// Multiple of the peak period used for the folded diagram
    pub harmonics: f64,
    pub max_frequency: Option<f64>,
}

impl Default for PeriodogramConfig {
    fn default() -> Self {
        Self {
            oversample_factor: 1.0,
            harmonics: 4.0,
            max_frequency: None,
        }
    }
}
