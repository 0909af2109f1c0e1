mod chunked;
mod linear;
#[cfg(feature = "onnx")]
mod onnx;

use std::collections::VecDeque;
use std::time::Instant;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::SearchError;

pub use chunked::ChunkedEncoder;
pub use linear::LinearBackend;
#[cfg(feature = "onnx")]
pub use onnx::OnnxEncoderBackend;

/// Maps a `[T, F]` block of input features to `[T', V]` encoder outputs.
///
/// `T'` may be smaller than `T` for subsampling models.
pub trait EncoderBackend {
    fn forward(&mut self, features: ArrayView2<f32>) -> Result<Array2<f32>, SearchError>;
}

impl<B: EncoderBackend + ?Sized> EncoderBackend for Box<B> {
    fn forward(&mut self, features: ArrayView2<f32>) -> Result<Array2<f32>, SearchError> {
        (**self).forward(features)
    }
}

/// Returns its input unchanged. Used when the features already are scores.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughBackend;

impl EncoderBackend for PassthroughBackend {
    fn forward(&mut self, features: ArrayView2<f32>) -> Result<Array2<f32>, SearchError> {
        Ok(features.to_owned())
    }
}

/// FIFO input and output queues shared by all encoders.
#[derive(Debug, Clone)]
pub struct EncoderBuffers {
    pub(crate) input: VecDeque<Array1<f32>>,
    pub(crate) output: VecDeque<Array1<f32>>,
    pub(crate) features_missing: bool,
}

impl Default for EncoderBuffers {
    fn default() -> Self {
        Self {
            input: VecDeque::new(),
            output: VecDeque::new(),
            features_missing: true,
        }
    }
}

impl EncoderBuffers {
    pub fn reset(&mut self) {
        self.input.clear();
        self.output.clear();
        self.features_missing = true;
    }

    pub fn input_len(&self) -> usize {
        self.input.len()
    }

    pub fn output_len(&self) -> usize {
        self.output.len()
    }

    pub fn features_missing(&self) -> bool {
        self.features_missing
    }
}

/// Lazily turns buffered input frames into encoder outputs.
pub trait Encoder {
    fn buffers(&self) -> &EncoderBuffers;

    fn buffers_mut(&mut self) -> &mut EncoderBuffers;

    /// Whether enough input is buffered for one encode pass.
    fn can_encode(&self) -> bool;

    /// Runs one encode pass, moving results into the output queue.
    fn encode(&mut self) -> Result<(), SearchError>;

    fn reset(&mut self) {
        self.buffers_mut().reset();
    }

    fn add_input(&mut self, frame: ArrayView1<f32>) {
        self.buffers_mut().input.push_back(frame.to_owned());
    }

    fn add_inputs(&mut self, frames: ArrayView2<f32>) {
        for row in frames.rows() {
            self.add_input(row);
        }
    }

    fn signal_no_more_features(&mut self) {
        self.buffers_mut().features_missing = false;
    }

    /// Pops the next output frame, encoding at most once if none is queued.
    fn get_next_output(&mut self) -> Result<Option<Array1<f32>>, SearchError> {
        if let Some(output) = self.buffers_mut().output.pop_front() {
            return Ok(Some(output));
        }
        if !self.can_encode() {
            return Ok(None);
        }
        self.encode()?;
        Ok(self.buffers_mut().output.pop_front())
    }
}

pub(crate) fn stack_frames<'a, I>(frames: I) -> Result<Array2<f32>, SearchError>
where
    I: IntoIterator<Item = &'a Array1<f32>>,
{
    let mut rows = 0;
    let mut dim = None;
    let mut flat = Vec::new();
    for frame in frames {
        let d = *dim.get_or_insert(frame.len());
        if d != frame.len() {
            return Err(SearchError::Backend(format!(
                "inconsistent feature dimension: expected {d}, got {}",
                frame.len()
            )));
        }
        flat.extend(frame.iter().copied());
        rows += 1;
    }
    Ok(Array2::from_shape_vec((rows, dim.unwrap_or(0)), flat)?)
}

/// Encodes the whole segment in one pass once all features have arrived.
#[derive(Debug)]
pub struct FullInputEncoder<B> {
    backend: B,
    buffers: EncoderBuffers,
}

impl<B: EncoderBackend> FullInputEncoder<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            buffers: EncoderBuffers::default(),
        }
    }
}

impl<B: EncoderBackend> Encoder for FullInputEncoder<B> {
    fn buffers(&self) -> &EncoderBuffers {
        &self.buffers
    }

    fn buffers_mut(&mut self) -> &mut EncoderBuffers {
        &mut self.buffers
    }

    fn can_encode(&self) -> bool {
        !self.buffers.features_missing && !self.buffers.input.is_empty()
    }

    fn encode(&mut self) -> Result<(), SearchError> {
        let start = Instant::now();
        let features = stack_frames(&self.buffers.input)?;
        let outputs = self.backend.forward(features.view())?;
        log::debug!(
            "Encoded {} frames into {} outputs in {:?}",
            features.nrows(),
            outputs.nrows(),
            start.elapsed()
        );
        self.buffers.input.clear();
        self.buffers
            .output
            .extend(outputs.rows().into_iter().map(|r| r.to_owned()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    struct CountingBackend {
        calls: usize,
        emit: bool,
    }

    impl EncoderBackend for CountingBackend {
        fn forward(&mut self, features: ArrayView2<f32>) -> Result<Array2<f32>, SearchError> {
            self.calls += 1;
            if self.emit {
                Ok(features.to_owned())
            } else {
                Ok(Array2::zeros((0, features.ncols())))
            }
        }
    }

    #[test]
    fn full_input_waits_for_segment_end() {
        let mut encoder = FullInputEncoder::new(PassthroughBackend);
        encoder.add_inputs(array![[1.0, 2.0], [3.0, 4.0]].view());
        assert!(!encoder.can_encode());
        assert!(encoder.get_next_output().unwrap().is_none());

        encoder.signal_no_more_features();
        assert_eq!(encoder.get_next_output().unwrap(), Some(array![1.0, 2.0]));
        assert_eq!(encoder.get_next_output().unwrap(), Some(array![3.0, 4.0]));
        assert_eq!(encoder.get_next_output().unwrap(), None);
    }

    #[test]
    fn empty_encode_pass_is_retried_once() {
        let mut encoder = FullInputEncoder::new(CountingBackend {
            calls: 0,
            emit: false,
        });
        encoder.add_input(array![1.0].view());
        encoder.signal_no_more_features();
        assert!(encoder.get_next_output().unwrap().is_none());
        assert_eq!(encoder.backend.calls, 1);
    }

    #[test]
    fn stack_rejects_ragged_frames() {
        let frames = [array![1.0, 2.0], array![3.0]];
        assert!(stack_frames(&frames).is_err());
    }
}
