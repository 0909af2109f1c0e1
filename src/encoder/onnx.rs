use std::path::Path;
use std::time::Instant;

use ndarray::{Array2, ArrayView2, Axis, Ix2};
use num_cpus::get_physical;
use ort::{
    execution_providers::CPUExecutionProvider,
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};

use super::EncoderBackend;
use crate::error::SearchError;

const THREAD_ENV: &str = "ORT_THREADS";

fn resolve_thread_count() -> usize {
    std::env::var(THREAD_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(get_physical)
}

/// Runs an ONNX model over `[1, T, F]` feature windows.
///
/// The output tensor may be `[1, T', V]` or `[T', V]`. Models that emit
/// log-probabilities are negated into costs.
pub struct OnnxEncoderBackend {
    session: Session,
    input_name: String,
    output_name: String,
    outputs_are_log_probs: bool,
}

impl Drop for OnnxEncoderBackend {
    fn drop(&mut self) {
        log::debug!("Dropping ONNX encoder session");
    }
}

impl OnnxEncoderBackend {
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        input_name: &str,
        output_name: &str,
    ) -> Result<Self, SearchError> {
        let start = Instant::now();
        let threads = resolve_thread_count();
        let opt = if cfg!(target_os = "windows") {
            GraphOptimizationLevel::Level1
        } else {
            GraphOptimizationLevel::Level3
        };
        let session = Session::builder()?
            .with_optimization_level(opt)?
            .with_execution_providers(vec![CPUExecutionProvider::default().build()])?
            .with_parallel_execution(true)?
            .with_intra_threads(threads)?
            .with_inter_threads(threads)?
            .commit_from_file(path.as_ref())?;
        log::info!(
            "ONNX encoder {} initialized in {:?} with {threads} threads",
            path.as_ref().display(),
            start.elapsed()
        );
        Ok(Self {
            session,
            input_name: input_name.to_string(),
            output_name: output_name.to_string(),
            outputs_are_log_probs: true,
        })
    }

    pub fn with_log_prob_outputs(mut self, outputs_are_log_probs: bool) -> Self {
        self.outputs_are_log_probs = outputs_are_log_probs;
        self
    }
}

impl EncoderBackend for OnnxEncoderBackend {
    fn forward(&mut self, features: ArrayView2<f32>) -> Result<Array2<f32>, SearchError> {
        let batch = features.insert_axis(Axis(0));
        let batch = batch.as_standard_layout();
        let start = Instant::now();
        let outputs = self.session.run(inputs![
            self.input_name.as_str() => TensorRef::from_array_view(batch.view())?,
        ])?;
        log::debug!("Encoder inference completed in {:?}", start.elapsed());

        let out = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| SearchError::OutputNotFound(self.output_name.clone()))?
            .try_extract_array::<f32>()?;
        let out = match out.ndim() {
            3 => out.index_axis(Axis(0), 0).to_owned(),
            2 => out.to_owned(),
            n => {
                return Err(SearchError::Backend(format!(
                    "encoder output '{}' has rank {n}, expected 2 or 3",
                    self.output_name
                )))
            }
        };
        let mut out = out.into_dimensionality::<Ix2>()?;
        if self.outputs_are_log_probs {
            out.mapv_inplace(|v| -v);
        }
        Ok(out)
    }
}
