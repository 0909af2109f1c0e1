use std::collections::VecDeque;

use ndarray::{Array1, ArrayView1};

/// Frame buffer addressed by absolute step, with a segment-end flag.
///
/// Frames before the oldest step still referenced can be released with
/// [`FeatureBuffer::release_before`]; absolute indices stay valid.
#[derive(Debug, Clone)]
pub struct FeatureBuffer {
    frames: VecDeque<Array1<f32>>,
    offset: usize,
    features_missing: bool,
}

impl Default for FeatureBuffer {
    fn default() -> Self {
        Self {
            frames: VecDeque::new(),
            offset: 0,
            features_missing: true,
        }
    }
}

impl FeatureBuffer {
    pub fn reset(&mut self) {
        self.frames.clear();
        self.offset = 0;
        self.features_missing = true;
    }

    pub fn push(&mut self, frame: ArrayView1<f32>) {
        self.frames.push_back(frame.to_owned());
    }

    pub fn push_owned(&mut self, frame: Array1<f32>) {
        self.frames.push_back(frame);
    }

    pub fn signal_no_more_features(&mut self) {
        self.features_missing = false;
    }

    /// True once the segment end was signalled.
    pub fn is_complete(&self) -> bool {
        !self.features_missing
    }

    /// Number of frames received so far, including released ones.
    pub fn total_frames(&self) -> usize {
        self.offset + self.frames.len()
    }

    pub fn get(&self, step: usize) -> Option<ArrayView1<'_, f32>> {
        step.checked_sub(self.offset)
            .and_then(|i| self.frames.get(i))
            .map(|frame| frame.view())
    }

    pub fn release_before(&mut self, step: usize) {
        while self.offset < step && !self.frames.is_empty() {
            self.frames.pop_front();
            self.offset += 1;
        }
    }
}
