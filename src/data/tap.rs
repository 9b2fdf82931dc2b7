//! Gaia archive TAP integration (synchronous ADQL queries).

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::domain::{CatalogEntry, ClassProbabilities, ConeBox, ResolvedSource};
use crate::error::AppError;

const SOURCE_TABLE: &str = "gaiadr3.gaia_source_lite";
const ASTROPHYSICAL_TABLE: &str = "gaiadr3.astrophysical_parameters";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Transport(String),
    #[error("catalog returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected catalog response: {0}")]
    Parse(String),
}

/// Query capability over the remote catalog.
pub trait CatalogClient: Send + Sync {
    /// Core position lookup for one identifier.
    fn query_by_identifier(&self, source_id: u64) -> Result<Vec<CatalogEntry>, CatalogError>;

    /// Objects inside a box around `(ra, dec)`, nearest first.
    fn query_by_cone(&self, ra: f64, dec: f64, cone: ConeBox) -> Result<Vec<CatalogEntry>, CatalogError>;

    /// Astrometry joined with classification probabilities for one identifier.
    fn query_joined(&self, source_id: u64) -> Result<Vec<ResolvedSource>, CatalogError>;
}

pub struct TapClient {
    client: Client,
    url: String,
}

impl TapClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build TAP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    fn run_query(&self, adql: &str) -> Result<TapTable, CatalogError> {
        debug!(query = adql, "Executing ADQL query");
        let resp = self
            .client
            .post(&self.url)
            .form(&[
                ("REQUEST", "doQuery"),
                ("LANG", "ADQL"),
                ("FORMAT", "json"),
                ("QUERY", adql),
            ])
            .send()
            .map_err(|e| CatalogError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(CatalogError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        resp.json::<TapTable>()
            .map_err(|e| CatalogError::Parse(format!("invalid TAP JSON: {e}")))
    }
}

impl CatalogClient for TapClient {
    fn query_by_identifier(&self, source_id: u64) -> Result<Vec<CatalogEntry>, CatalogError> {
        parse_entries(&self.run_query(&identifier_query(source_id))?)
    }

    fn query_by_cone(&self, ra: f64, dec: f64, cone: ConeBox) -> Result<Vec<CatalogEntry>, CatalogError> {
        parse_entries(&self.run_query(&cone_query(ra, dec, cone))?)
    }

    fn query_joined(&self, source_id: u64) -> Result<Vec<ResolvedSource>, CatalogError> {
        parse_resolved_sources(&self.run_query(&joined_query(source_id))?)
    }
}

/// JSON body returned by the TAP service for `FORMAT=json`.
#[derive(Debug, Deserialize)]
pub struct TapTable {
    pub metadata: Vec<TapColumn>,
    pub data: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
pub struct TapColumn {
    pub name: String,
}

impl TapTable {
    fn column(&self, name: &str) -> Option<usize> {
        self.metadata.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn required(&self, name: &str) -> Result<usize, CatalogError> {
        self.column(name)
            .ok_or_else(|| CatalogError::Parse(format!("missing column '{name}'")))
    }
}

pub fn identifier_query(source_id: u64) -> String {
    format!("SELECT source_id, ra, dec FROM {SOURCE_TABLE} WHERE source_id = {source_id}")
}

pub fn cone_query(ra: f64, dec: f64, cone: ConeBox) -> String {
    format!(
        "SELECT TOP 1 source_id, ra, dec, \
         DISTANCE(POINT('ICRS', ra, dec), POINT('ICRS', {ra}, {dec})) AS dist \
         FROM {SOURCE_TABLE} \
         WHERE 1 = CONTAINS(POINT('ICRS', ra, dec), BOX('ICRS', {ra}, {dec}, {w}, {h})) \
         ORDER BY dist ASC",
        w = cone.width_deg,
        h = cone.height_deg,
    )
}

pub fn joined_query(source_id: u64) -> String {
    let probs: Vec<String> = ClassProbabilities::COLUMNS
        .iter()
        .map(|&(m, c)| format!("ap.{}", ClassProbabilities::column_name(m, c)))
        .collect();
    format!(
        "SELECT src.source_id, src.ra, src.dec, src.parallax, src.parallax_over_error, \
         src.ruwe, src.has_xp_sampled, {} \
         FROM {SOURCE_TABLE} AS src \
         JOIN {ASTROPHYSICAL_TABLE} AS ap ON src.source_id = ap.source_id \
         WHERE src.source_id = {source_id}",
        probs.join(", ")
    )
}

pub fn parse_entries(table: &TapTable) -> Result<Vec<CatalogEntry>, CatalogError> {
    let id_col = table.required("source_id")?;
    let ra_col = table.required("ra")?;
    let dec_col = table.required("dec")?;

    table
        .data
        .iter()
        .map(|row| {
            Ok(CatalogEntry {
                source_id: required_u64(row, id_col, "source_id")?,
                ra: required_f64(row, ra_col, "ra")?,
                dec: required_f64(row, dec_col, "dec")?,
            })
        })
        .collect()
}

pub fn parse_resolved_sources(table: &TapTable) -> Result<Vec<ResolvedSource>, CatalogError> {
    let id_col = table.required("source_id")?;
    let ra_col = table.required("ra")?;
    let dec_col = table.required("dec")?;
    let parallax_col = table.required("parallax")?;
    let poe_col = table.required("parallax_over_error")?;
    let ruwe_col = table.required("ruwe")?;
    let xp_col = table.required("has_xp_sampled")?;

    let prob_cols: Vec<_> = ClassProbabilities::COLUMNS
        .iter()
        .filter_map(|&(m, c)| {
            table
                .column(&ClassProbabilities::column_name(m, c))
                .map(|idx| (m, c, idx))
        })
        .collect();

    let mut out = Vec::with_capacity(table.data.len());
    for row in &table.data {
        let mut class_probabilities = ClassProbabilities::default();
        for &(method, class, idx) in &prob_cols {
            if let Some(p) = optional_f64(row.get(idx)) {
                class_probabilities.insert(method, class, p);
            }
        }

        out.push(ResolvedSource {
            source_id: required_u64(row, id_col, "source_id")?,
            ra: required_f64(row, ra_col, "ra")?,
            dec: required_f64(row, dec_col, "dec")?,
            parallax: optional_f64(row.get(parallax_col)),
            parallax_over_error: optional_f64(row.get(poe_col)),
            ruwe: optional_f64(row.get(ruwe_col)),
            has_spectrum: value_bool(row.get(xp_col)),
            class_probabilities,
        });
    }
    Ok(out)
}

fn required_u64(row: &[Value], idx: usize, name: &str) -> Result<u64, CatalogError> {
    let value = row.get(idx);
    let parsed = match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| CatalogError::Parse(format!("invalid {name}: {value:?}")))
}

fn required_f64(row: &[Value], idx: usize, name: &str) -> Result<f64, CatalogError> {
    optional_f64(row.get(idx)).ok_or_else(|| CatalogError::Parse(format!("missing {name}")))
}

fn optional_f64(value: Option<&Value>) -> Option<f64> {
    let v = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}

fn value_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "t" | "1"),
        _ => false,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}
