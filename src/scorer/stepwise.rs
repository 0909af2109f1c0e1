use std::sync::Arc;

use ndarray::ArrayView1;

use super::{
    ContextSet, FeatureBuffer, LabelScorer, Request, ScoreWithTime, ScoringContext,
    ScoringContextRef,
};
use crate::error::SearchError;

/// Treats every input frame as a finished score vector over the vocabulary.
///
/// The context only tracks the current step, so every extension consumes
/// exactly one frame.
#[derive(Debug, Default)]
pub struct StepwiseNoOpLabelScorer {
    buffer: FeatureBuffer,
}

impl StepwiseNoOpLabelScorer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LabelScorer for StepwiseNoOpLabelScorer {
    fn reset(&mut self) {
        self.buffer.reset();
    }

    fn signal_no_more_features(&mut self) {
        self.buffer.signal_no_more_features();
    }

    fn initial_scoring_context(&self) -> ScoringContextRef {
        Arc::new(ScoringContext::Step { step: 0 })
    }

    fn extended_scoring_context(
        &mut self,
        request: &Request,
    ) -> Result<ScoringContextRef, SearchError> {
        let step = request.context.expect_step("step")?;
        Ok(Arc::new(ScoringContext::Step { step: step + 1 }))
    }

    fn add_input(&mut self, input: ArrayView1<f32>) {
        self.buffer.push(input);
    }

    fn compute_score_with_time(
        &mut self,
        request: &Request,
    ) -> Result<Option<ScoreWithTime>, SearchError> {
        let step = request.context.expect_step("step")?;
        let Some(frame) = self.buffer.get(step as usize) else {
            return Ok(None);
        };
        let score = frame.get(request.token as usize).copied().ok_or_else(|| {
            SearchError::UnknownToken(format!(
                "token {} outside score vector of size {}",
                request.token,
                frame.len()
            ))
        })?;
        Ok(Some(ScoreWithTime {
            score,
            timeframe: step,
        }))
    }

    fn cleanup_caches(&mut self, active: &ContextSet) {
        if let Some(oldest) = active.iter().filter_map(|c| c.step()).min() {
            self.buffer.release_before(oldest as usize);
        }
    }
}
