//! Minimal dense 3-D tensor in `(batch, channels, length)` layout.

use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor3 {
    shape: [usize; 3],
    data: Vec<f64>,
}

impl Tensor3 {
    /// Returns `None` when `data.len()` does not match the shape.
    pub fn new(batch: usize, channels: usize, length: usize, data: Vec<f64>) -> Option<Self> {
        (batch * channels * length == data.len()).then_some(Self {
            shape: [batch, channels, length],
            data,
        })
    }

    /// A single-sample, single-channel tensor: shape `(1, 1, n)`.
    pub fn from_series(series: &DVector<f64>) -> Self {
        Self {
            shape: [1, 1, series.len()],
            data: series.iter().copied().collect(),
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn batch(&self) -> usize {
        self.shape[0]
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// One batch item as a `channels × length` matrix.
    pub fn item(&self, b: usize) -> Option<DMatrix<f64>> {
        let [batch, channels, length] = self.shape;
        if b >= batch {
            return None;
        }
        let start = b * channels * length;
        Some(DMatrix::from_row_slice(
            channels,
            length,
            &self.data[start..start + channels * length],
        ))
    }
}
