//! Classifier capability and the inference stage built on it.
//!
//! Stage flow:
//! staged CSV -> flux series -> L2 normalization -> `(1, 1, n)` tensor
//! -> raw score -> sigmoid -> rounded label

use thiserror::Error;
use tracing::{debug, error, info};

use crate::domain::SpectralSample;
use crate::error::AppError;
use crate::io::spectrum::load_spectrum;
use crate::io::staging::StagingArea;
use crate::math::{l2_normalize, round_label, sigmoid};
use crate::models::tensor::Tensor3;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("input shape mismatch: {0}")]
    Shape(String),
    #[error("numerical error: {0}")]
    Numerical(String),
    #[error("invalid weights: {0}")]
    Weights(String),
}

/// A loaded, frozen binary classifier.
///
/// Implementations are read-only during `forward` and shared across runs.
pub trait Classifier: Send + Sync {
    /// Raw (pre-activation) score for each batch item.
    fn forward(&self, input: &Tensor3) -> Result<Vec<f64>, ModelError>;
}

/// Output of the inference stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inference {
    pub label: u8,
    pub probability: f64,
}

/// Normalize a flux series and lay it out as a single-sample tensor.
pub fn preprocess(sample: &SpectralSample) -> Result<Tensor3, AppError> {
    let normalized = l2_normalize(&sample.flux).ok_or_else(|| {
        AppError::inference(format!(
            "Inference failed: flux series from '{}' has zero or non-finite norm",
            sample.product
        ))
    })?;
    Ok(Tensor3::from_series(&normalized))
}

/// Run the classifier on a prepared tensor and threshold its score.
pub fn predict(classifier: &dyn Classifier, input: &Tensor3) -> Result<Inference, AppError> {
    debug!(shape = ?input.shape(), "Input shape");

    let scores = classifier.forward(input).map_err(|e| {
        error!("Error occurred during inference: {e}");
        AppError::inference(format!("Inference failed: {e}"))
    })?;

    let score = match scores.as_slice() {
        [score] if score.is_finite() => *score,
        [score] => {
            return Err(AppError::inference(format!("Inference failed: non-finite model output {score}")));
        }
        other => {
            return Err(AppError::inference(format!(
                "Inference failed: expected 1 score for batch of 1, got {}",
                other.len()
            )));
        }
    };

    let probability = sigmoid(score);
    let label = round_label(probability);
    debug!(probability, "Probability");
    info!(label, "Inference completed");
    Ok(Inference { label, probability })
}

/// Full inference stage over a staging area.
pub fn infer(classifier: &dyn Classifier, staging: &StagingArea) -> Result<Inference, AppError> {
    info!("Starting inference");
    let sample = load_spectrum(staging)?;
    let input = preprocess(&sample)?;
    predict(classifier, &input)
}
