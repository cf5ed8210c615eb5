use fitsio::FitsFile;
use std::{fs, path::Path, path::PathBuf};
use tracing::debug;

use crate::data_access::{LightCurveHandle, LightCurveSource, RawLightCurve, SearchQuery};
use crate::error::{io_err, AnalysisError, Result};

const TIME_COLUMN: &str = "TIME";
const FLUX_COLUMN: &str = "PDCSAP_FLUX";
const FLUX_ERR_COLUMN: &str = "PDCSAP_FLUX_ERR";
const QUALITY_COLUMN: &str = "QUALITY";

fn get_fits_ptr(path: &Path) -> Result<FitsFile> {
    if path.extension().and_then(|ext| ext.to_str()) != Some("fits") {
        return Err(AnalysisError::NotFitsFile(path.to_path_buf()));
    }
    let fptr = FitsFile::open(path)?;
    Ok(fptr)
}

fn load_light_curve(fptr: &mut FitsFile) -> Result<RawLightCurve> {
    let hdu = fptr.hdu(1)?;
    let time: Vec<f64> = hdu.read_col(fptr, TIME_COLUMN)?;
    let flux: Vec<f64> = hdu.read_col(fptr, FLUX_COLUMN)?;
    let flux_error: Vec<f64> = hdu.read_col(fptr, FLUX_ERR_COLUMN)?;
    let quality: Vec<i32> = hdu.read_col(fptr, QUALITY_COLUMN)?;

    if time.len() != flux.len() || time.len() != flux_error.len() || time.len() != quality.len() {
        return Err(AnalysisError::LengthMismatch {
            time: time.len(),
            flux: flux.len(),
            flux_error: flux_error.len(),
        });
    }

    Ok(RawLightCurve {
        time,
        flux,
        flux_error,
        quality,
    })
}

/// Read the light curve table (HDU 1) of a mission `_lc.fits` product.
pub fn read_light_curve(path: &Path) -> Result<RawLightCurve> {
    let mut fptr = get_fits_ptr(path)?;
    let raw = load_light_curve(&mut fptr)?;
    debug!(path = %path.display(), samples = raw.time.len(), "read light curve");
    Ok(raw)
}

/// Sector number from a TESS SPOC file name such as
/// `tess2025180145000-s0094-0000000006286534-0291-s_lc.fits`.
pub fn sector_from_file_name(name: &str) -> Option<u32> {
    name.split('-')
        .find(|part| part.len() == 5 && part.starts_with('s'))
        .and_then(|part| part[1..].parse().ok())
}

/// Light curve products already on disk: every `.fits` file in one directory.
pub struct LocalFitsSource {
    dir: PathBuf,
}

impl LocalFitsSource {
    pub fn new(dir: impl Into<PathBuf>) -> LocalFitsSource {
        LocalFitsSource { dir: dir.into() }
    }

    pub fn fits_names(&self) -> Result<Vec<String>> {
        let mut fits_names: Vec<String> = Vec::new();

        for entry in fs::read_dir(&self.dir).map_err(|e| io_err(&self.dir, e))? {
            let entry = entry.map_err(|e| io_err(&self.dir, e))?;
            let path = entry.path();

            if path.extension().and_then(|e| e.to_str()) != Some("fits") {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                fits_names.push(name.to_string());
            }
        }
        fits_names.sort();

        Ok(fits_names)
    }
}

impl LightCurveSource for LocalFitsSource {
    fn search(&self, query: &SearchQuery) -> Result<Vec<LightCurveHandle>> {
        let handles = self
            .fits_names()?
            .into_iter()
            .map(|name| LightCurveHandle {
                mission: query.mission.clone(),
                target_name: query.target.clone(),
                sector: sector_from_file_name(&name),
                exptime_secs: f64::NAN,
                author: "local".to_string(),
                data_uri: Some(self.dir.join(&name).to_string_lossy().into_owned()),
                obs_id: name,
            })
            .collect();
        Ok(handles)
    }

    fn download(&self, handle: &LightCurveHandle) -> Result<RawLightCurve> {
        let path = handle
            .data_uri
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.dir.join(&handle.obs_id));
        read_light_curve(&path)
    }
}
