mod buffered;
mod combine;
pub mod context;
mod encoder_scorer;
mod stepwise;

use std::sync::Arc;

use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::SearchError;
use crate::{LabelIndex, Score, TimeframeIndex};

pub use buffered::FeatureBuffer;
pub use combine::{CombineLabelScorer, ScaledLabelScorer};
pub use context::{ContextSet, HiddenState, ScoringContext, ScoringContextRef};
pub use encoder_scorer::{ContextMode, EncoderLabelScorer};
pub use stepwise::StepwiseNoOpLabelScorer;

/// Semantic kind of a search step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionType {
    LabelToLabel,
    LabelLoop,
    LabelToBlank,
    BlankToLabel,
    BlankLoop,
    InitialLabel,
    InitialBlank,
    SentenceEnd,
}

impl TransitionType {
    pub fn is_loop(self) -> bool {
        matches!(self, Self::LabelLoop | Self::BlankLoop)
    }

    /// Whether the step emits a new (non-blank) token.
    pub fn emits_label(self) -> bool {
        matches!(
            self,
            Self::LabelToLabel | Self::BlankToLabel | Self::InitialLabel | Self::SentenceEnd
        )
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub context: ScoringContextRef,
    pub token: LabelIndex,
    pub transition_type: TransitionType,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWithTime {
    pub score: Score,
    pub timeframe: TimeframeIndex,
}

/// Batched scoring result; entry `i` answers request `i`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoresWithTimes {
    pub scores: Vec<Score>,
    pub timeframes: Vec<TimeframeIndex>,
}

impl ScoresWithTimes {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            scores: Vec::with_capacity(capacity),
            timeframes: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: ScoreWithTime) {
        self.scores.push(value.score);
        self.timeframes.push(value.timeframe);
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Scoring backend used by the search.
///
/// Scoring calls return `Ok(None)` when the required input has not arrived
/// yet. Errors are reserved for real failures such as a context the scorer
/// did not create or a failing model session.
pub trait LabelScorer {
    /// Drops all buffered input and cached state.
    fn reset(&mut self);

    fn signal_no_more_features(&mut self);

    fn initial_scoring_context(&self) -> ScoringContextRef;

    /// May return the request's context unchanged when nothing needs
    /// remembering for this transition.
    fn extended_scoring_context(
        &mut self,
        request: &Request,
    ) -> Result<ScoringContextRef, SearchError>;

    fn add_input(&mut self, input: ArrayView1<f32>);

    fn add_inputs(&mut self, inputs: ArrayView2<f32>) {
        for row in inputs.rows() {
            self.add_input(row);
        }
    }

    fn compute_score_with_time(
        &mut self,
        request: &Request,
    ) -> Result<Option<ScoreWithTime>, SearchError>;

    fn compute_scores_with_times(
        &mut self,
        requests: &[Request],
    ) -> Result<Option<ScoresWithTimes>, SearchError> {
        let mut result = ScoresWithTimes::with_capacity(requests.len());
        for request in requests {
            match self.compute_score_with_time(request)? {
                Some(value) => result.push(value),
                None => return Ok(None),
            }
        }
        Ok(Some(result))
    }

    /// Number of scoring rounds the search may interleave with pruning.
    fn num_sub_scorers(&self) -> usize {
        1
    }

    fn compute_sub_scores_with_times(
        &mut self,
        requests: &[Request],
        sub_scorer: usize,
    ) -> Result<Option<ScoresWithTimes>, SearchError> {
        if sub_scorer != 0 {
            return Err(SearchError::InvalidConfig(format!(
                "scorer has a single scoring round, got round {sub_scorer}"
            )));
        }
        self.compute_scores_with_times(requests)
    }

    /// Hint that only `active` contexts can still be requested.
    fn cleanup_caches(&mut self, _active: &ContextSet) {}
}

impl<S: LabelScorer + ?Sized> LabelScorer for Box<S> {
    fn reset(&mut self) {
        (**self).reset()
    }

    fn signal_no_more_features(&mut self) {
        (**self).signal_no_more_features()
    }

    fn initial_scoring_context(&self) -> ScoringContextRef {
        (**self).initial_scoring_context()
    }

    fn extended_scoring_context(
        &mut self,
        request: &Request,
    ) -> Result<ScoringContextRef, SearchError> {
        (**self).extended_scoring_context(request)
    }

    fn add_input(&mut self, input: ArrayView1<f32>) {
        (**self).add_input(input)
    }

    fn add_inputs(&mut self, inputs: ArrayView2<f32>) {
        (**self).add_inputs(inputs)
    }

    fn compute_score_with_time(
        &mut self,
        request: &Request,
    ) -> Result<Option<ScoreWithTime>, SearchError> {
        (**self).compute_score_with_time(request)
    }

    fn compute_scores_with_times(
        &mut self,
        requests: &[Request],
    ) -> Result<Option<ScoresWithTimes>, SearchError> {
        (**self).compute_scores_with_times(requests)
    }

    fn num_sub_scorers(&self) -> usize {
        (**self).num_sub_scorers()
    }

    fn compute_sub_scores_with_times(
        &mut self,
        requests: &[Request],
        sub_scorer: usize,
    ) -> Result<Option<ScoresWithTimes>, SearchError> {
        (**self).compute_sub_scores_with_times(requests, sub_scorer)
    }

    fn cleanup_caches(&mut self, active: &ContextSet) {
        (**self).cleanup_caches(active)
    }
}

/// Which transitions append the token to a label history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HistoryPolicy {
    pub blank_updates_history: bool,
    pub loop_updates_history: bool,
}

impl HistoryPolicy {
    pub fn pushes_token(&self, transition: TransitionType) -> bool {
        match transition {
            TransitionType::BlankLoop => self.blank_updates_history && self.loop_updates_history,
            TransitionType::LabelToBlank | TransitionType::InitialBlank => {
                self.blank_updates_history
            }
            TransitionType::LabelLoop => self.loop_updates_history,
            TransitionType::LabelToLabel
            | TransitionType::BlankToLabel
            | TransitionType::InitialLabel
            | TransitionType::SentenceEnd => true,
        }
    }

    /// Extends a label-history context.
    ///
    /// `Sequence` and `HiddenState` contexts are returned unchanged (same
    /// `Arc`) when the policy does not push the token. `SequenceWithStep`
    /// always advances its step.
    pub fn extend_history(&self, request: &Request) -> Result<ScoringContextRef, SearchError> {
        let push = self.pushes_token(request.transition_type);
        let extended = |labels: &[LabelIndex]| {
            let mut labels = labels.to_vec();
            if push {
                labels.push(request.token);
            }
            labels
        };

        match request.context.as_ref() {
            ScoringContext::Sequence { .. } | ScoringContext::HiddenState { .. } if !push => {
                Ok(Arc::clone(&request.context))
            }
            ScoringContext::Sequence { labels } => Ok(Arc::new(ScoringContext::Sequence {
                labels: extended(labels.as_slice()),
            })),
            ScoringContext::HiddenState { labels, state } => {
                Ok(Arc::new(ScoringContext::HiddenState {
                    labels: extended(labels.as_slice()),
                    state: Arc::clone(state),
                }))
            }
            ScoringContext::SequenceWithStep { labels, step } => {
                Ok(Arc::new(ScoringContext::SequenceWithStep {
                    labels: extended(labels.as_slice()),
                    step: step + 1,
                }))
            }
            other => Err(SearchError::ContextMismatch {
                expected: "label history",
                found: other.kind_name(),
            }),
        }
    }
}
