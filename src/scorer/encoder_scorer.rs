use std::sync::Arc;

use ndarray::{ArrayView1, ArrayView2};

use super::{
    ContextSet, FeatureBuffer, HistoryPolicy, LabelScorer, Request, ScoreWithTime,
    ScoresWithTimes, ScoringContext, ScoringContextRef,
};
use crate::encoder::Encoder;
use crate::error::SearchError;
use crate::TimeframeIndex;

/// How [`EncoderLabelScorer`] distinguishes hypotheses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    /// Only the current frame. All hypotheses at a step recombine.
    Step,
    /// Current frame plus the label history updated under the policy.
    LabelHistory(HistoryPolicy),
}

/// Time-synchronous scorer reading label costs from encoder outputs.
///
/// Output frame `t` holds the cost of every label at step `t`; each
/// extension advances one frame.
pub struct EncoderLabelScorer<E> {
    encoder: E,
    frames: FeatureBuffer,
    mode: ContextMode,
}

impl<E: Encoder> EncoderLabelScorer<E> {
    pub fn new(encoder: E, mode: ContextMode) -> Self {
        Self {
            encoder,
            frames: FeatureBuffer::default(),
            mode,
        }
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Pulls encoder outputs until frame `step` is available.
    fn fetch_until(&mut self, step: usize) -> Result<bool, SearchError> {
        while self.frames.total_frames() <= step {
            match self.encoder.get_next_output()? {
                Some(output) => self.frames.push_owned(output),
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    fn score_at(&self, step: usize, request: &Request) -> Result<Option<ScoreWithTime>, SearchError> {
        let Some(frame) = self.frames.get(step) else {
            return Ok(None);
        };
        let score = frame.get(request.token as usize).copied().ok_or_else(|| {
            SearchError::UnknownToken(format!(
                "token {} outside encoder output of size {}",
                request.token,
                frame.len()
            ))
        })?;
        Ok(Some(ScoreWithTime {
            score,
            timeframe: step as TimeframeIndex,
        }))
    }
}

impl<E: Encoder> LabelScorer for EncoderLabelScorer<E> {
    fn reset(&mut self) {
        self.encoder.reset();
        self.frames.reset();
    }

    fn signal_no_more_features(&mut self) {
        self.encoder.signal_no_more_features();
        self.frames.signal_no_more_features();
    }

    fn initial_scoring_context(&self) -> ScoringContextRef {
        match self.mode {
            ContextMode::Step => Arc::new(ScoringContext::Step { step: 0 }),
            ContextMode::LabelHistory(_) => Arc::new(ScoringContext::SequenceWithStep {
                labels: Vec::new(),
                step: 0,
            }),
        }
    }

    fn extended_scoring_context(
        &mut self,
        request: &Request,
    ) -> Result<ScoringContextRef, SearchError> {
        match self.mode {
            ContextMode::Step => {
                let step = request.context.expect_step("step")?;
                Ok(Arc::new(ScoringContext::Step { step: step + 1 }))
            }
            ContextMode::LabelHistory(policy) => policy.extend_history(request),
        }
    }

    fn add_input(&mut self, input: ArrayView1<f32>) {
        self.encoder.add_input(input);
    }

    fn add_inputs(&mut self, inputs: ArrayView2<f32>) {
        self.encoder.add_inputs(inputs);
    }

    fn compute_score_with_time(
        &mut self,
        request: &Request,
    ) -> Result<Option<ScoreWithTime>, SearchError> {
        let step = request.context.expect_step("step-carrying context")? as usize;
        if !self.fetch_until(step)? {
            return Ok(None);
        }
        self.score_at(step, request)
    }

    fn compute_scores_with_times(
        &mut self,
        requests: &[Request],
    ) -> Result<Option<ScoresWithTimes>, SearchError> {
        let mut steps = Vec::with_capacity(requests.len());
        for request in requests {
            steps.push(request.context.expect_step("step-carrying context")? as usize);
        }
        if let Some(&last) = steps.iter().max() {
            if !self.fetch_until(last)? {
                return Ok(None);
            }
        }
        let mut result = ScoresWithTimes::with_capacity(requests.len());
        for (request, step) in requests.iter().zip(steps) {
            match self.score_at(step, request)? {
                Some(value) => result.push(value),
                None => return Ok(None),
            }
        }
        Ok(Some(result))
    }

    fn cleanup_caches(&mut self, active: &ContextSet) {
        if let Some(oldest) = active.iter().filter_map(|c| c.step()).min() {
            self.frames.release_before(oldest as usize);
        }
    }
}
