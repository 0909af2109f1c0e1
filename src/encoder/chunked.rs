use std::time::Instant;

use super::{stack_frames, Encoder, EncoderBackend, EncoderBuffers};
use crate::config::EncoderConfig;
use crate::error::SearchError;

/// Streaming encoder over a sliding `history | center | future` window.
///
/// Only outputs belonging to the center frames are emitted. After each pass
/// the center frames become history (trimmed to `chunk_history`) and the
/// future frames become the next center.
#[derive(Debug)]
pub struct ChunkedEncoder<B> {
    backend: B,
    config: EncoderConfig,
    buffers: EncoderBuffers,
    num_history: usize,
}

impl<B: EncoderBackend> ChunkedEncoder<B> {
    pub fn new(backend: B, config: EncoderConfig) -> Result<Self, SearchError> {
        config.validate()?;
        Ok(Self {
            backend,
            config,
            buffers: EncoderBuffers::default(),
            num_history: 0,
        })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    fn pending_frames(&self) -> usize {
        self.buffers.input.len() - self.num_history
    }
}

/// Maps the frame range `[start, end)` of a window of `window_len` inputs
/// onto the `num_outputs` rows the backend produced for it.
fn output_range(start: usize, end: usize, window_len: usize, num_outputs: usize) -> (usize, usize) {
    if num_outputs == window_len || window_len == 0 {
        return (start.min(num_outputs), end.min(num_outputs));
    }
    (
        start * num_outputs / window_len,
        end * num_outputs / window_len,
    )
}

impl<B: EncoderBackend> Encoder for ChunkedEncoder<B> {
    fn buffers(&self) -> &EncoderBuffers {
        &self.buffers
    }

    fn buffers_mut(&mut self) -> &mut EncoderBuffers {
        &mut self.buffers
    }

    fn reset(&mut self) {
        self.buffers.reset();
        self.num_history = 0;
    }

    fn can_encode(&self) -> bool {
        let pending = self.pending_frames();
        if self.buffers.features_missing {
            pending >= self.config.chunk_center + self.config.chunk_future
        } else {
            pending > 0
        }
    }

    fn encode(&mut self) -> Result<(), SearchError> {
        let start = Instant::now();
        let window_len = self
            .buffers
            .input
            .len()
            .min(self.num_history + self.config.chunk_center + self.config.chunk_future);
        let center_len = self
            .config
            .chunk_center
            .min(window_len - self.num_history);
        let center_end = self.num_history + center_len;

        let features = stack_frames(self.buffers.input.iter().take(window_len))?;
        let outputs = self.backend.forward(features.view())?;
        let (from, to) = output_range(self.num_history, center_end, window_len, outputs.nrows());
        self.buffers
            .output
            .extend((from..to).map(|i| outputs.row(i).to_owned()));

        let kept_history = self.config.chunk_history.min(center_end);
        self.buffers.input.drain(..center_end - kept_history);
        self.num_history = kept_history;

        log::debug!(
            "Encoded chunk of {} frames ({} center) into {} outputs in {:?}",
            window_len,
            center_len,
            to - from,
            start.elapsed()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::PassthroughBackend;
    use ndarray::{array, Array1, Array2, ArrayView2};

    fn frame(v: f32) -> Array1<f32> {
        array![v]
    }

    #[test]
    fn window_slides_center_into_history() {
        let config = EncoderConfig {
            chunk_history: 1,
            chunk_center: 2,
            chunk_future: 1,
        };
        let mut encoder = ChunkedEncoder::new(PassthroughBackend, config).unwrap();
        encoder.add_input(frame(0.0).view());
        encoder.add_input(frame(1.0).view());
        assert!(!encoder.can_encode());
        encoder.add_input(frame(2.0).view());
        assert!(encoder.can_encode());

        // window [0 1 2] (no history yet): center 0 1, future 2
        assert_eq!(encoder.get_next_output().unwrap(), Some(frame(0.0)));
        assert_eq!(encoder.get_next_output().unwrap(), Some(frame(1.0)));
        // history is now [1], pending [2]
        assert_eq!(encoder.num_history, 1);
        assert!(encoder.get_next_output().unwrap().is_none());

        encoder.add_input(frame(3.0).view());
        assert!(encoder.get_next_output().unwrap().is_none());
        encoder.add_input(frame(4.0).view());
        assert_eq!(encoder.get_next_output().unwrap(), Some(frame(2.0)));
        assert_eq!(encoder.get_next_output().unwrap(), Some(frame(3.0)));

        encoder.signal_no_more_features();
        assert_eq!(encoder.get_next_output().unwrap(), Some(frame(4.0)));
        assert_eq!(encoder.get_next_output().unwrap(), None);
    }

    struct Subsampling;

    impl EncoderBackend for Subsampling {
        fn forward(&mut self, features: ArrayView2<f32>) -> Result<Array2<f32>, SearchError> {
            let rows: Vec<f32> = features.column(0).iter().step_by(2).copied().collect();
            Ok(Array2::from_shape_vec((rows.len(), 1), rows)?)
        }
    }

    #[test]
    fn subsampled_outputs_are_sliced_proportionally() {
        let config = EncoderConfig {
            chunk_history: 2,
            chunk_center: 4,
            chunk_future: 2,
        };
        let mut encoder = ChunkedEncoder::new(Subsampling, config).unwrap();
        for v in 0..6 {
            encoder.add_input(frame(v as f32).view());
        }
        // window of 6 frames, center [0, 4) -> outputs [0, 2)
        assert_eq!(encoder.get_next_output().unwrap(), Some(frame(0.0)));
        assert_eq!(encoder.get_next_output().unwrap(), Some(frame(2.0)));
        assert!(encoder.get_next_output().unwrap().is_none());
    }

    #[test]
    fn output_range_identity() {
        assert_eq!(output_range(2, 5, 8, 8), (2, 5));
        assert_eq!(output_range(2, 6, 8, 4), (1, 3));
    }
}
