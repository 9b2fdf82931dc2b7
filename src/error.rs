//! Crate-wide error type.
//!
//! Every stage fails with a narrow [`ErrorKind`]; the detail text keeps the
//! original cause so callers can log or return it verbatim.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable failure taxonomy reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed identifier/coordinates, or neither supplied.
    InvalidRequest,
    /// Catalog lookup returned zero rows.
    NoSourceFound,
    /// Soft quality issues present.
    PoorQuality,
    /// Spectral data absent for the object.
    NoData,
    /// Bulk data service failure.
    DataDownloadError,
    /// Model evaluation failure.
    InferenceError,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Wire name used in structured error bodies.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::NoSourceFound => "NoSourceFound",
            ErrorKind::PoorQuality => "PoorQuality",
            ErrorKind::NoData => "NoData",
            ErrorKind::DataDownloadError => "DataDownloadError",
            ErrorKind::InferenceError => "InferenceError",
            ErrorKind::Internal => "InternalError",
        }
    }

    /// Client-caused kinds map to a 4xx outcome, the rest to 5xx.
    pub fn is_client_error(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidRequest | ErrorKind::NoSourceFound | ErrorKind::PoorQuality | ErrorKind::NoData
        )
    }

    pub fn http_status(self) -> u16 {
        if self.is_client_error() { 400 } else { 500 }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    kind: ErrorKind,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn no_source_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoSourceFound, message)
    }

    pub fn download(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DataDownloadError, message)
    }

    pub fn inference(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InferenceError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Process exit code for the `xpc` binary.
    pub fn exit_code(&self) -> u8 {
        match self.kind {
            ErrorKind::Internal => 1,
            ErrorKind::InvalidRequest => 2,
            ErrorKind::NoSourceFound | ErrorKind::PoorQuality | ErrorKind::NoData => 3,
            ErrorKind::DataDownloadError => 4,
            ErrorKind::InferenceError => 5,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.kind.name().to_string(),
            detail: self.message.clone(),
        }
    }
}

/// Structured failure body: `{ "error": <kind>, "detail": <text> }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
}
