//! 1-D convolutional ensemble loaded from JSON weights.
//!
//! The weight file describes one or more members, each a sequential stack of
//! layers. Convolution weights are flattened `[out][in][kernel]`, linear
//! weights `[out][in]` (the usual exported layouts). Every member must end in a
//! single output; the ensemble score is the mean of the member scores.
//!
//! ```json
//! { "members": [ { "name": "fold-1", "layers": [
//!     { "type": "conv1d", "in_channels": 1, "out_channels": 8, "kernel_size": 5,
//!       "padding": 2, "weight": [...], "bias": [...] },
//!     { "type": "relu" },
//!     { "type": "max_pool1d", "kernel_size": 2 },
//!     { "type": "global_avg_pool" },
//!     { "type": "flatten" },
//!     { "type": "linear", "in_features": 8, "out_features": 1, "weight": [...], "bias": [...] }
//! ] } ] }
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AppError;
use crate::models::classifier::{Classifier, ModelError};
use crate::models::tensor::Tensor3;

fn default_stride() -> usize {
    1
}

/// Serialized layer description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Conv1d {
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        #[serde(default = "default_stride")]
        stride: usize,
        #[serde(default)]
        padding: usize,
        weight: Vec<f64>,
        bias: Vec<f64>,
    },
    Relu,
    MaxPool1d {
        kernel_size: usize,
        /// Defaults to `kernel_size`.
        #[serde(default)]
        stride: Option<usize>,
    },
    GlobalAvgPool,
    Flatten,
    Linear {
        in_features: usize,
        out_features: usize,
        weight: Vec<f64>,
        bias: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub layers: Vec<LayerSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleSpec {
    pub members: Vec<MemberSpec>,
}

#[derive(Debug, Clone)]
enum Layer {
    Conv1d {
        /// One `in_channels × kernel_size` matrix per output channel.
        kernels: Vec<DMatrix<f64>>,
        bias: DVector<f64>,
        stride: usize,
        padding: usize,
    },
    Relu,
    MaxPool1d {
        kernel_size: usize,
        stride: usize,
    },
    GlobalAvgPool,
    Flatten,
    Linear {
        weight: DMatrix<f64>,
        bias: DVector<f64>,
    },
}

#[derive(Debug, Clone)]
struct Member {
    name: String,
    layers: Vec<Layer>,
}

/// Frozen ensemble of 1-D CNN members.
#[derive(Debug, Clone)]
pub struct CnnEnsemble {
    members: Vec<Member>,
}

impl CnnEnsemble {
    /// Load a weight file. Failures here are startup errors, not run errors.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::internal(format!("Failed to open model '{}': {e}", path.display())))?;
        let spec: EnsembleSpec = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| AppError::internal(format!("Invalid model JSON '{}': {e}", path.display())))?;
        let ensemble = Self::from_spec(spec)
            .map_err(|e| AppError::internal(format!("Invalid model '{}': {e}", path.display())))?;
        info!(path = %path.display(), members = ensemble.len(), "Loaded classifier");
        Ok(ensemble)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        let spec: EnsembleSpec = serde_json::from_str(json).map_err(|e| ModelError::Weights(e.to_string()))?;
        Self::from_spec(spec)
    }

    pub fn from_spec(spec: EnsembleSpec) -> Result<Self, ModelError> {
        if spec.members.is_empty() {
            return Err(ModelError::Weights("ensemble has no members".to_string()));
        }
        let members = spec
            .members
            .into_iter()
            .enumerate()
            .map(|(i, m)| {
                let name = m.name.unwrap_or_else(|| format!("member-{i}"));
                let layers = m
                    .layers
                    .into_iter()
                    .map(build_layer)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| prefix_error(e, &name))?;
                Ok(Member { name, layers })
            })
            .collect::<Result<Vec<_>, ModelError>>()?;
        Ok(Self { members })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Classifier for CnnEnsemble {
    fn forward(&self, input: &Tensor3) -> Result<Vec<f64>, ModelError> {
        let mut scores = Vec::with_capacity(input.batch());
        for b in 0..input.batch() {
            let item = input
                .item(b)
                .ok_or_else(|| ModelError::Shape(format!("missing batch item {b}")))?;
            let mut total = 0.0;
            for member in &self.members {
                total += member.forward(item.clone())?;
            }
            let score = total / self.members.len() as f64;
            if !score.is_finite() {
                return Err(ModelError::Numerical(format!("non-finite score for batch item {b}")));
            }
            scores.push(score);
        }
        Ok(scores)
    }
}

impl Member {
    fn forward(&self, mut x: DMatrix<f64>) -> Result<f64, ModelError> {
        for (idx, layer) in self.layers.iter().enumerate() {
            x = layer
                .forward(x)
                .map_err(|e| prefix_error(e, &format!("{} layer {idx}", self.name)))?;
        }
        if x.len() != 1 {
            return Err(ModelError::Shape(format!(
                "{} produced {} outputs, expected 1",
                self.name,
                x.len()
            )));
        }
        Ok(x[(0, 0)])
    }
}

impl Layer {
    /// `x` is `channels × length`.
    fn forward(&self, x: DMatrix<f64>) -> Result<DMatrix<f64>, ModelError> {
        match self {
            Layer::Conv1d {
                kernels,
                bias,
                stride,
                padding,
            } => conv1d(&x, kernels, bias, *stride, *padding),
            Layer::Relu => Ok(x.map(|v| v.max(0.0))),
            Layer::MaxPool1d { kernel_size, stride } => max_pool1d(&x, *kernel_size, *stride),
            Layer::GlobalAvgPool => {
                if x.ncols() == 0 {
                    return Err(ModelError::Shape("global_avg_pool over empty length".to_string()));
                }
                Ok(DMatrix::from_fn(x.nrows(), 1, |c, _| x.row(c).mean()))
            }
            Layer::Flatten => Ok(DMatrix::from_row_slice(1, x.len(), &row_major(&x))),
            Layer::Linear { weight, bias } => {
                if x.len() != weight.ncols() {
                    return Err(ModelError::Shape(format!(
                        "linear expects {} features, got {}",
                        weight.ncols(),
                        x.len()
                    )));
                }
                let v = DVector::from_vec(row_major(&x));
                let out = weight * v + bias;
                Ok(DMatrix::from_row_slice(1, out.len(), out.as_slice()))
            }
        }
    }
}

fn conv1d(
    x: &DMatrix<f64>,
    kernels: &[DMatrix<f64>],
    bias: &DVector<f64>,
    stride: usize,
    padding: usize,
) -> Result<DMatrix<f64>, ModelError> {
    let (in_channels, kernel_size) = kernels
        .first()
        .map(|k| (k.nrows(), k.ncols()))
        .unwrap_or_default();
    if x.nrows() != in_channels {
        return Err(ModelError::Shape(format!(
            "conv1d expects {in_channels} channels, got {}",
            x.nrows()
        )));
    }
    let padded_len = x.ncols() + 2 * padding;
    if padded_len < kernel_size {
        return Err(ModelError::Shape(format!(
            "conv1d kernel {kernel_size} longer than padded input {padded_len}"
        )));
    }
    let out_len = (padded_len - kernel_size) / stride + 1;

    let at = |c: usize, pos: usize| -> f64 {
        // `pos` indexes the padded sequence.
        if pos < padding || pos - padding >= x.ncols() {
            0.0
        } else {
            x[(c, pos - padding)]
        }
    };

    Ok(DMatrix::from_fn(kernels.len(), out_len, |o, t| {
        let kernel = &kernels[o];
        let start = t * stride;
        let mut acc = bias[o];
        for c in 0..in_channels {
            for j in 0..kernel_size {
                acc += kernel[(c, j)] * at(c, start + j);
            }
        }
        acc
    }))
}

fn max_pool1d(x: &DMatrix<f64>, kernel_size: usize, stride: usize) -> Result<DMatrix<f64>, ModelError> {
    if x.ncols() < kernel_size {
        return Err(ModelError::Shape(format!(
            "max_pool1d kernel {kernel_size} longer than input {}",
            x.ncols()
        )));
    }
    let out_len = (x.ncols() - kernel_size) / stride + 1;
    Ok(DMatrix::from_fn(x.nrows(), out_len, |c, t| {
        let start = t * stride;
        (start..start + kernel_size)
            .map(|i| x[(c, i)])
            .fold(f64::NEG_INFINITY, f64::max)
    }))
}

/// Channel-major flattening (channel 0 first), matching exported layouts.
fn row_major(x: &DMatrix<f64>) -> Vec<f64> {
    let mut out = Vec::with_capacity(x.len());
    for row in x.row_iter() {
        out.extend(row.iter().copied());
    }
    out
}

fn build_layer(spec: LayerSpec) -> Result<Layer, ModelError> {
    match spec {
        LayerSpec::Conv1d {
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
            weight,
            bias,
        } => {
            if in_channels == 0 || out_channels == 0 || kernel_size == 0 || stride == 0 {
                return Err(ModelError::Weights("conv1d dimensions must be > 0".to_string()));
            }
            let per_kernel = in_channels * kernel_size;
            if weight.len() != out_channels * per_kernel || bias.len() != out_channels {
                return Err(ModelError::Weights(format!(
                    "conv1d expects {} weights and {out_channels} biases, got {} and {}",
                    out_channels * per_kernel,
                    weight.len(),
                    bias.len()
                )));
            }
            let kernels = weight
                .chunks(per_kernel)
                .map(|w| DMatrix::from_row_slice(in_channels, kernel_size, w))
                .collect();
            Ok(Layer::Conv1d {
                kernels,
                bias: DVector::from_vec(bias),
                stride,
                padding,
            })
        }
        LayerSpec::Relu => Ok(Layer::Relu),
        LayerSpec::MaxPool1d { kernel_size, stride } => {
            let stride = stride.unwrap_or(kernel_size);
            if kernel_size == 0 || stride == 0 {
                return Err(ModelError::Weights("max_pool1d dimensions must be > 0".to_string()));
            }
            Ok(Layer::MaxPool1d { kernel_size, stride })
        }
        LayerSpec::GlobalAvgPool => Ok(Layer::GlobalAvgPool),
        LayerSpec::Flatten => Ok(Layer::Flatten),
        LayerSpec::Linear {
            in_features,
            out_features,
            weight,
            bias,
        } => {
            if weight.len() != in_features * out_features || bias.len() != out_features {
                return Err(ModelError::Weights(format!(
                    "linear expects {} weights and {out_features} biases, got {} and {}",
                    in_features * out_features,
                    weight.len(),
                    bias.len()
                )));
            }
            Ok(Layer::Linear {
                weight: DMatrix::from_row_slice(out_features, in_features, &weight),
                bias: DVector::from_vec(bias),
            })
        }
    }
}

fn prefix_error(err: ModelError, context: &str) -> ModelError {
    match err {
        ModelError::Shape(m) => ModelError::Shape(format!("{context}: {m}")),
        ModelError::Numerical(m) => ModelError::Numerical(format!("{context}: {m}")),
        ModelError::Weights(m) => ModelError::Weights(format!("{context}: {m}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOUBLE_AVG: &str = r#"{ "members": [ { "layers": [
        { "type": "conv1d", "in_channels": 1, "out_channels": 1, "kernel_size": 1,
          "weight": [2.0], "bias": [0.0] },
        { "type": "global_avg_pool" },
        { "type": "flatten" },
        { "type": "linear", "in_features": 1, "out_features": 1, "weight": [1.0], "bias": [0.5] }
    ] } ] }"#;

    fn series(values: &[f64]) -> Tensor3 {
        Tensor3::new(1, 1, values.len(), values.to_vec()).unwrap()
    }

    #[test]
    fn single_member_forward() {
        let model = CnnEnsemble::from_json_str(DOUBLE_AVG).unwrap();
        let scores = model.forward(&series(&[1.0, 2.0, 3.0])).unwrap();
        assert_eq!(scores, vec![4.5]);
    }

    #[test]
    fn ensemble_averages_member_scores() {
        let spec = EnsembleSpec {
            members: vec![
                MemberSpec {
                    name: Some("a".to_string()),
                    layers: vec![
                        LayerSpec::GlobalAvgPool,
                        LayerSpec::Linear {
                            in_features: 1,
                            out_features: 1,
                            weight: vec![1.0],
                            bias: vec![1.0],
                        },
                    ],
                },
                MemberSpec {
                    name: Some("b".to_string()),
                    layers: vec![
                        LayerSpec::GlobalAvgPool,
                        LayerSpec::Linear {
                            in_features: 1,
                            out_features: 1,
                            weight: vec![1.0],
                            bias: vec![-3.0],
                        },
                    ],
                },
            ],
        };
        let model = CnnEnsemble::from_spec(spec).unwrap();
        assert_eq!(model.len(), 2);
        assert_eq!(model.forward(&series(&[2.0, 2.0])).unwrap(), vec![1.0]);
    }

    #[test]
    fn padded_conv_then_pool() {
        let conv = build_layer(LayerSpec::Conv1d {
            in_channels: 1,
            out_channels: 1,
            kernel_size: 3,
            stride: 1,
            padding: 1,
            weight: vec![1.0, 1.0, 1.0],
            bias: vec![0.0],
        })
        .unwrap();
        let x = DMatrix::from_row_slice(1, 4, &[1.0, 2.0, 3.0, 4.0]);
        let y = conv.forward(x).unwrap();
        assert_eq!(y.as_slice(), &[3.0, 6.0, 9.0, 7.0]);

        let pool = build_layer(LayerSpec::MaxPool1d {
            kernel_size: 2,
            stride: None,
        })
        .unwrap();
        assert_eq!(pool.forward(y).unwrap().as_slice(), &[6.0, 9.0]);
    }

    #[test]
    fn flatten_is_channel_major() {
        let x = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let y = Layer::Flatten.forward(x).unwrap();
        assert_eq!((y.nrows(), y.ncols()), (1, 4));
        assert_eq!(row_major(&y), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn channel_mismatch_is_a_shape_error() {
        let json = r#"{ "members": [ { "layers": [
            { "type": "conv1d", "in_channels": 2, "out_channels": 1, "kernel_size": 1,
              "weight": [1.0, 1.0], "bias": [0.0] }
        ] } ] }"#;
        let model = CnnEnsemble::from_json_str(json).unwrap();
        let err = model.forward(&series(&[1.0, 2.0])).unwrap_err();
        assert!(matches!(err, ModelError::Shape(_)));
        assert!(err.to_string().contains("member-0 layer 0"));
    }

    #[test]
    fn inconsistent_weights_are_rejected_at_load() {
        let json = r#"{ "members": [ { "layers": [
            { "type": "linear", "in_features": 2, "out_features": 1, "weight": [1.0], "bias": [0.0] }
        ] } ] }"#;
        assert!(matches!(CnnEnsemble::from_json_str(json), Err(ModelError::Weights(_))));
        assert!(CnnEnsemble::from_json_str(r#"{ "members": [] }"#).is_err());
    }

    #[test]
    fn load_reports_missing_file_as_internal() {
        let err = CnnEnsemble::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
    }
}
