//! Vector normalization and logistic helpers.

use nalgebra::DVector;

/// Norms below this are treated as zero.
pub const NORM_EPS: f64 = 1e-10;

/// Divide every element by the Euclidean norm of the whole vector.
///
/// Returns `None` for an empty vector, a non-finite norm, or a norm below
/// [`NORM_EPS`].
pub fn l2_normalize(values: &[f64]) -> Option<DVector<f64>> {
    if values.is_empty() {
        return None;
    }
    let v = DVector::from_column_slice(values);
    let norm = v.norm();
    if !norm.is_finite() || norm < NORM_EPS {
        return None;
    }
    Some(v / norm)
}

/// Logistic function.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Round a probability to a binary label; exactly 0.5 rounds to 0 (half-to-even).
pub fn round_label(probability: f64) -> u8 {
    if probability > 0.5 { 1 } else { 0 }
}
