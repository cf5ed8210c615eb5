//! Plain-text light curve tables.
//!
//! One sample per line, tab-separated `time flux flux_error` with six decimals,
//! preceded by a `#` header comment.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::data_access::LightCurveSeries;
use crate::error::{io_err, AnalysisError, Result};

pub const TABLE_HEADER: &str = "# time\tflux\tflux_error";

pub fn write_table(path: &Path, series: &LightCurveSeries) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
    }
    let file = File::create(path).map_err(|e| io_err(path, e))?;
    let mut out = BufWriter::new(file);

    writeln!(out, "{}", TABLE_HEADER).map_err(|e| io_err(path, e))?;
    for i in 0..series.len() {
        writeln!(
            out,
            "{:.6}\t{:.6}\t{:.6}",
            series.time()[i],
            series.flux()[i],
            series.flux_error()[i]
        )
        .map_err(|e| io_err(path, e))?;
    }
    out.flush().map_err(|e| io_err(path, e))?;
    Ok(())
}

/// Read a table written by [`write_table`] (or any whitespace-separated
/// three-column text file). Rows with non-finite flux are dropped.
pub fn read_table(path: &Path) -> Result<LightCurveSeries> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    let reader = BufReader::new(file);

    let mut series = LightCurveSeries::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| io_err(path, e))?;
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let values = trimmed
            .split_whitespace()
            .map(|v| v.parse::<f64>())
            .collect::<std::result::Result<Vec<f64>, _>>()
            .map_err(|e| AnalysisError::Table {
                line: line_no,
                message: e.to_string(),
            })?;
        if values.len() != 3 {
            return Err(AnalysisError::Table {
                line: line_no,
                message: format!("expected 3 columns, found {}", values.len()),
            });
        }
        if values.iter().all(|v| v.is_finite()) {
            series.extend_one(values[0], values[1], values[2]);
        }
    }
    Ok(series)
}
