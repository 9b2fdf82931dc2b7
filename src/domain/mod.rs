//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the resolved catalog row (`ResolvedSource`) and its class probabilities
//! - quality verdicts, spectral samples and prediction results
//! - request/response shapes and the run configuration (`PipelineConfig`)

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
