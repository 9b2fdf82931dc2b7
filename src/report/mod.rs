//! Reporting: terminal summaries and JSON output lines.

pub mod format;

pub use format::*;

use serde::Serialize;

use crate::domain::{PredictionResponse, PredictionResult};
use crate::error::{AppError, ErrorResponse};

/// One output line of `xpc batch`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchLine {
    pub line: usize,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PredictionResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

impl BatchLine {
    pub fn from_outcome(line: usize, correlation_id: String, outcome: &Result<PredictionResult, AppError>) -> Self {
        match outcome {
            Ok(result) => Self {
                line,
                correlation_id,
                source_id: Some(result.source_id),
                result: Some(PredictionResponse::from(result)),
                error: None,
            },
            Err(e) => Self {
                line,
                correlation_id,
                source_id: None,
                result: None,
                error: Some(e.to_response()),
            },
        }
    }
}
