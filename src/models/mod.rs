//! Classifier interface and the bundled 1-D CNN ensemble.
//!
//! The pipeline only depends on the `Classifier` trait; `CnnEnsemble` is the
//! concrete frozen model loaded from a JSON weight file at startup.

pub mod classifier;
pub mod cnn;
pub mod tensor;

pub use classifier::*;
pub use cnn::*;
pub use tensor::*;
