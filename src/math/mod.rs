//! Numeric helpers used between spectrum loading and the classifier.

pub mod norm;

pub use norm::*;
