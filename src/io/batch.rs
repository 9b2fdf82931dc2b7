//! Batch request files.
//!
//! A batch file is a CSV with any of the columns `source_id`, `ra`, `dec`.
//! Blank cells mean "not supplied"; each row becomes one independent request.
//! Rows that cannot be parsed are kept with their error so the caller can
//! report them alongside the successful runs.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;

use crate::domain::PredictionRequest;
use crate::error::AppError;

/// One parsed batch row.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    /// 1-based line number in the file (header is line 1).
    pub line: usize,
    pub request: Result<PredictionRequest, String>,
}

pub fn read_batch_requests(path: &Path) -> Result<Vec<BatchEntry>, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::invalid_request(format!("Failed to open batch file '{}': {e}", path.display()))
    })?;
    parse_batch_requests(file)
}

pub fn parse_batch_requests<R: Read>(reader: R) -> Result<Vec<BatchEntry>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::invalid_request(format!("Failed to read batch headers: {e}")))?
        .clone();
    let header_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase(), idx))
        .collect();

    let has_id = header_map.contains_key("source_id");
    let has_coords = header_map.contains_key("ra") && header_map.contains_key("dec");
    if !has_id && !has_coords {
        return Err(AppError::invalid_request(
            "Batch file needs a 'source_id' column or both 'ra' and 'dec' columns.",
        ));
    }

    let mut entries = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // +2: records start after the header, lines are 1-based.
        let line = idx + 2;
        let request = match result {
            Ok(record) => parse_row(&record, &header_map),
            Err(e) => Err(format!("CSV parse error: {e}")),
        };
        entries.push(BatchEntry { line, request });
    }
    Ok(entries)
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<PredictionRequest, String> {
    let cell = |name: &str| {
        header_map
            .get(name)
            .and_then(|&idx| record.get(idx))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    let coord = |name: &str| -> Result<Option<f64>, String> {
        cell(name)
            .map(|s| s.parse::<f64>().map_err(|e| format!("invalid {name} '{s}': {e}")))
            .transpose()
    };

    Ok(PredictionRequest {
        source_id: cell("source_id").map(str::to_string),
        ra: coord("ra")?,
        dec: coord("dec")?,
    })
}
