//! Search and download of mission light curves from MAST.
//!
//! Catalog identifiers (`TIC 261136679`, `KIC 8462852`, `EPIC 201367065` or a
//! bare number) are matched on the archive's `target_name`; anything else is
//! resolved to coordinates and matched by a small cone search.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::DataConfig;
use crate::data_access::fits_access::read_light_curve;
use crate::data_access::{LightCurveHandle, LightCurveSource, RawLightCurve, SearchQuery};
use crate::error::{io_err, AnalysisError, Result};

/// Cone radius for name-resolved targets, in degrees (3.6 arcsec)
const SEARCH_RADIUS_DEG: f64 = 0.001;

/// Pipelines whose products carry `PDCSAP_FLUX` light curve tables
const PIPELINES: [&str; 4] = ["SPOC", "TESS-SPOC", "Kepler", "K2"];

#[derive(Debug, Clone, PartialEq)]
pub enum TargetId {
    /// Archive `target_name` for a catalog identifier
    Catalog(String),
    /// Free-form name that needs resolving
    Name(String),
}

impl TargetId {
    /// Catalog prefixes only count for their own mission: `KIC 123` under
    /// TESS is a name to resolve, not TIC 123.
    pub fn parse(target: &str, mission: &str) -> TargetId {
        let trimmed = target.trim();
        let upper = trimmed.to_uppercase();
        let digits_after = |prefix: &str| -> Option<u64> {
            let rest = upper.strip_prefix(prefix)?;
            rest.trim_start_matches([' ', '-', '_']).parse().ok()
        };

        let mission = Mission::from_name(mission);
        let number = mission
            .catalog_prefixes()
            .iter()
            .find_map(|prefix| digits_after(prefix))
            .or_else(|| upper.parse().ok());

        match number {
            Some(id) => TargetId::Catalog(match mission {
                Mission::Kepler => format!("kplr{:09}", id),
                Mission::K2 => format!("ktwo{}", id),
                Mission::Tess => id.to_string(),
            }),
            None => TargetId::Name(trimmed.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mission {
    Tess,
    Kepler,
    K2,
}

impl Mission {
    fn from_name(name: &str) -> Mission {
        match name.trim().to_lowercase().as_str() {
            "kepler" => Mission::Kepler,
            "k2" => Mission::K2,
            _ => Mission::Tess,
        }
    }

    fn catalog_prefixes(&self) -> &'static [&'static str] {
        match self {
            Mission::Tess => &["TIC"],
            Mission::Kepler => &["KIC", "KPLR"],
            Mission::K2 => &["EPIC", "KTWO"],
        }
    }

    fn collection(&self) -> &'static str {
        match self {
            Mission::Tess => "TESS",
            Mission::Kepler => "Kepler",
            Mission::K2 => "K2",
        }
    }
}

pub struct MastClient {
    client: Client,
    base_url: String,
    cache_dir: PathBuf,
}

impl MastClient {
    pub fn new(config: &DataConfig) -> Result<MastClient> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(MastClient {
            client,
            base_url: config.mast_url.trim_end_matches('/').to_string(),
            cache_dir: config.cache_dir.clone(),
        })
    }

    /// POST one request to the MAST `invoke` endpoint.
    fn invoke(&self, request: &Value) -> Result<Value> {
        let url = format!("{}/api/v0/invoke", self.base_url);
        debug!(%url, service = %request["service"], "MAST request");

        let response = self
            .client
            .post(&url)
            .form(&[("request", request.to_string())])
            .send()?;
        if !response.status().is_success() {
            return Err(AnalysisError::Mast(format!(
                "request failed, status: {}",
                response.status()
            )));
        }
        let body: Value = response.json()?;
        if body.get("status").and_then(Value::as_str) == Some("ERROR") {
            let msg = body
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(AnalysisError::Mast(msg.to_string()));
        }
        Ok(body)
    }

    fn resolve_position(&self, name: &str) -> Result<(f64, f64)> {
        let request = json!({
            "service": "Mast.Name.Lookup",
            "params": { "input": name, "format": "json" },
            "format": "json",
        });
        let body = self.invoke(&request)?;
        let coord = body
            .get("resolvedCoordinate")
            .and_then(Value::as_array)
            .and_then(|coords| coords.first())
            .ok_or_else(|| AnalysisError::Mast(format!("could not resolve target '{}'", name)))?;
        match (field_f64(coord, "ra"), field_f64(coord, "decl")) {
            (Some(ra), Some(dec)) => Ok((ra, dec)),
            _ => Err(AnalysisError::Mast(format!("no coordinates for target '{}'", name))),
        }
    }

    fn observations(&self, query: &SearchQuery) -> Result<Vec<Value>> {
        let mission = Mission::from_name(&query.mission);
        let mut filters = vec![
            json!({ "paramName": "obs_collection", "values": [mission.collection()] }),
            json!({ "paramName": "dataproduct_type", "values": ["timeseries"] }),
            json!({ "paramName": "provenance_name", "values": PIPELINES }),
        ];

        let request = match TargetId::parse(&query.target, &query.mission) {
            TargetId::Catalog(target_name) => {
                filters.push(json!({ "paramName": "target_name", "values": [target_name] }));
                json!({
                    "service": "Mast.Caom.Filtered",
                    "format": "json",
                    "params": { "columns": "*", "filters": filters },
                })
            }
            TargetId::Name(name) => {
                let (ra, dec) = self.resolve_position(&name)?;
                json!({
                    "service": "Mast.Caom.Filtered.Position",
                    "format": "json",
                    "params": {
                        "columns": "*",
                        "filters": filters,
                        "position": format!("{}, {}, {}", ra, dec, SEARCH_RADIUS_DEG),
                    },
                })
            }
        };

        Ok(data_rows(self.invoke(&request)?))
    }

    fn products(&self, obs_id: &str) -> Result<Vec<Value>> {
        let request = json!({
            "service": "Mast.Caom.Products",
            "format": "json",
            "params": { "obsid": obs_id },
        });
        Ok(data_rows(self.invoke(&request)?))
    }

    /// Download a product into the cache, reusing a previous download.
    fn fetch(&self, data_uri: &str) -> Result<PathBuf> {
        let file_name = data_uri
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AnalysisError::Mast(format!("malformed product URI '{}'", data_uri)))?;
        let path = self.cache_dir.join(file_name);
        if file_exists_and_not_empty(&path) {
            debug!(path = %path.display(), "using cached light curve");
            return Ok(path);
        }

        fs::create_dir_all(&self.cache_dir).map_err(|e| io_err(&self.cache_dir, e))?;
        let url = format!("{}/api/v0.1/Download/file", self.base_url);
        info!(file = file_name, "downloading light curve");

        let mut response = self.client.get(&url).query(&[("uri", data_uri)]).send()?;
        if !response.status().is_success() {
            return Err(AnalysisError::Mast(format!(
                "failed to download {}, status: {}",
                file_name,
                response.status()
            )));
        }

        // partial downloads never land under the final name
        let temp_path = path.with_extension("tmp");
        let mut file = BufWriter::new(File::create(&temp_path).map_err(|e| io_err(&temp_path, e))?);
        std::io::copy(&mut response, &mut file).map_err(|e| io_err(&temp_path, e))?;
        file.flush().map_err(|e| io_err(&temp_path, e))?;
        drop(file);
        fs::rename(&temp_path, &path).map_err(|e| io_err(&path, e))?;

        Ok(path)
    }
}

impl LightCurveSource for MastClient {
    fn search(&self, query: &SearchQuery) -> Result<Vec<LightCurveHandle>> {
        let rows = self.observations(query)?;
        let mut handles = handles_from_rows(&rows, query);
        if Mission::from_name(&query.mission) != Mission::Tess {
            let mut per_file = Vec::new();
            for observation in &handles {
                let products = self.products(&observation.obs_id)?;
                per_file.extend(handles_from_products(observation, &products));
            }
            handles = per_file;
        }
        info!(target = %query.target, found = handles.len(), "light curve search");
        Ok(handles)
    }

    fn download(&self, handle: &LightCurveHandle) -> Result<RawLightCurve> {
        let data_uri = match &handle.data_uri {
            Some(uri) => uri.clone(),
            None => pick_light_curve_product(&self.products(&handle.obs_id)?).ok_or_else(|| {
                AnalysisError::Mast(format!("no light curve product for observation {}", handle.obs_id))
            })?,
        };
        let path = self.fetch(&data_uri)?;
        read_light_curve(&path)
    }
}

fn file_exists_and_not_empty(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(metadata) => metadata.is_file() && metadata.len() > 0,
        Err(_) => false,
    }
}

fn data_rows(body: Value) -> Vec<Value> {
    match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(rows)) => rows,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// String view of a column that MAST may send as a string or a number
fn field_str(row: &Value, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_f64(row: &Value, key: &str) -> Option<f64> {
    match row.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Observation rows → handles, filtered by cadence and sorted by sector.
pub fn handles_from_rows(rows: &[Value], query: &SearchQuery) -> Vec<LightCurveHandle> {
    let mut handles: Vec<LightCurveHandle> = rows
        .iter()
        .filter_map(|row| {
            let obs_id = field_str(row, "obsid")?;
            let exptime_secs = field_f64(row, "t_exptime").unwrap_or(f64::NAN);
            if let Some(cadence) = query.cadence {
                if !cadence.matches(exptime_secs) {
                    return None;
                }
            }
            Some(LightCurveHandle {
                mission: field_str(row, "obs_collection").unwrap_or_else(|| query.mission.clone()),
                target_name: field_str(row, "target_name").unwrap_or_else(|| query.target.clone()),
                sector: field_f64(row, "sequence_number").map(|s| s as u32),
                exptime_secs,
                author: field_str(row, "provenance_name").unwrap_or_default(),
                obs_id,
                data_uri: None,
            })
        })
        .collect();

    handles.sort_by(|a, b| {
        a.sector
            .cmp(&b.sector)
            .then(a.exptime_secs.total_cmp(&b.exptime_secs))
    });
    handles
}

/// Light curve tables: TESS `_lc`/`fast-lc`, Kepler and K2 `_llc`/`_slc`
fn is_light_curve_product(name: &str) -> bool {
    ["_lc.fits", "fast-lc.fits", "_llc.fits", "_slc.fits"]
        .iter()
        .any(|suffix| name.ends_with(suffix))
}

/// K2 campaign from a file name such as `ktwo201367065-c01_llc.fits`
pub fn campaign_from_file_name(name: &str) -> Option<u32> {
    let stem = name.split('_').next()?;
    let tag = stem.rsplit('-').next()?;
    tag.strip_prefix('c')?.parse().ok()
}

/// The light curve table among an observation's products.
pub fn pick_light_curve_product(rows: &[Value]) -> Option<String> {
    rows.iter()
        .filter(|row| field_str(row, "productFilename").is_some_and(|name| is_light_curve_product(&name)))
        .find_map(|row| field_str(row, "dataURI"))
}

/// Kepler and K2 observations bundle one light curve file per quarter or
/// campaign; every file becomes its own handle, in file name order.
pub fn handles_from_products(observation: &LightCurveHandle, rows: &[Value]) -> Vec<LightCurveHandle> {
    let mut files: Vec<(String, String)> = rows
        .iter()
        .filter_map(|row| {
            let name = field_str(row, "productFilename")?;
            if !is_light_curve_product(&name) {
                return None;
            }
            Some((name, field_str(row, "dataURI")?))
        })
        .collect();
    files.sort();
    files.dedup_by(|a, b| a.0 == b.0);

    files
        .into_iter()
        .map(|(name, uri)| LightCurveHandle {
            sector: campaign_from_file_name(&name).or(observation.sector),
            data_uri: Some(uri),
            ..observation.clone()
        })
        .collect()
}
