//! Staged spectrum loading.
//!
//! Turns the CSV product written by the fetcher back into an ordered flux
//! series. Two layouts are accepted:
//! - one sample per row in a `flux` column (sampled spectra as served)
//! - a single row whose `flux` cell holds an array literal (`[a, b, ...]`)

use std::fs::File;

use tracing::{debug, warn};

use crate::data::datalink::ProductTable;
use crate::domain::SpectralSample;
use crate::error::AppError;
use crate::io::staging::StagingArea;

const FLUX_COLUMN: &str = "flux";

/// Load the flux series from the staging area.
///
/// When several products are staged the first by file name is used.
pub fn load_spectrum(staging: &StagingArea) -> Result<SpectralSample, AppError> {
    let files = staging.staged_files().map_err(|e| {
        AppError::inference(format!(
            "Failed to list staging directory '{}': {e}",
            staging.path().display()
        ))
    })?;

    let Some(path) = files.first() else {
        return Err(AppError::inference(format!(
            "No staged spectrum found in '{}'",
            staging.path().display()
        )));
    };
    if files.len() > 1 {
        warn!(
            count = files.len(),
            chosen = %path.display(),
            "Multiple staged products; using the first by name"
        );
    }

    let file = File::open(path)
        .map_err(|e| AppError::inference(format!("Failed to open '{}': {e}", path.display())))?;
    let table = ProductTable::from_csv_reader(file)
        .map_err(|e| AppError::inference(format!("Failed to read '{}': {e}", path.display())))?;
    let flux = flux_from_table(&table).map_err(AppError::inference)?;
    debug!(samples = flux.len(), "Loaded flux series");

    Ok(SpectralSample {
        product: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        flux,
    })
}

/// Extract the flux column as `f64`s, rejecting empty or non-finite series.
pub fn flux_from_table(table: &ProductTable) -> Result<Vec<f64>, String> {
    let col = table
        .column(FLUX_COLUMN)
        .ok_or_else(|| format!("missing '{FLUX_COLUMN}' column"))?;

    let cells: Vec<&str> = table
        .rows
        .iter()
        .map(|row| row.get(col).map(String::as_str).unwrap_or(""))
        .collect();

    let flux = match cells.as_slice() {
        [single] if is_array_literal(single) => parse_array_literal(single)?,
        _ => cells
            .iter()
            .enumerate()
            .map(|(i, cell)| parse_flux_value(cell).ok_or_else(|| format!("invalid flux value '{cell}' at row {}", i + 1)))
            .collect::<Result<Vec<_>, _>>()?,
    };

    if flux.is_empty() {
        return Err("flux series is empty".to_string());
    }
    Ok(flux)
}

fn is_array_literal(cell: &str) -> bool {
    let t = cell.trim();
    (t.starts_with('[') && t.ends_with(']')) || (t.starts_with('(') && t.ends_with(')'))
}

fn parse_array_literal(cell: &str) -> Result<Vec<f64>, String> {
    let t = cell.trim();
    let inner = &t[1..t.len() - 1];
    inner
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(i, s)| parse_flux_value(s).ok_or_else(|| format!("invalid flux value '{s}' at index {i}")))
        .collect()
}

fn parse_flux_value(raw: &str) -> Option<f64> {
    let v = raw.trim().parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}
