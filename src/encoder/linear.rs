use std::path::Path;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::Deserialize;

use super::EncoderBackend;
use crate::error::SearchError;

#[derive(Deserialize)]
struct LinearParams {
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

/// Affine projection followed by a negative log-softmax, giving per-frame
/// label costs.
#[derive(Debug, Clone)]
pub struct LinearBackend {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl LinearBackend {
    /// `weights` is `[feature_dim, num_labels]`.
    pub fn new(weights: Array2<f32>, bias: Array1<f32>) -> Result<Self, SearchError> {
        if weights.ncols() != bias.len() {
            return Err(SearchError::InvalidConfig(format!(
                "bias has {} entries but projection has {} outputs",
                bias.len(),
                weights.ncols()
            )));
        }
        Ok(Self { weights, bias })
    }

    /// Reads `{"weights": [[...], ...], "bias": [...]}`.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, SearchError> {
        let content = std::fs::read_to_string(path)?;
        let params: LinearParams = serde_json::from_str(&content)?;
        let rows = params.weights.len();
        let cols = params.weights.first().map_or(0, Vec::len);
        let flat: Vec<f32> = params.weights.into_iter().flatten().collect();
        let weights = Array2::from_shape_vec((rows, cols), flat)?;
        Self::new(weights, Array1::from_vec(params.bias))
    }

    pub fn num_labels(&self) -> usize {
        self.bias.len()
    }
}

fn neg_log_softmax_rows(logits: &mut Array2<f32>) {
    for mut row in logits.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        let log_sum = max + row.iter().map(|&v| (v - max).exp()).sum::<f32>().ln();
        row.mapv_inplace(|v| log_sum - v);
    }
}

impl EncoderBackend for LinearBackend {
    fn forward(&mut self, features: ArrayView2<f32>) -> Result<Array2<f32>, SearchError> {
        if features.ncols() != self.weights.nrows() {
            return Err(SearchError::Backend(format!(
                "feature dimension {} does not match projection input {}",
                features.ncols(),
                self.weights.nrows()
            )));
        }
        let mut logits = features.dot(&self.weights) + &self.bias;
        neg_log_softmax_rows(&mut logits);
        Ok(logits)
    }
}
