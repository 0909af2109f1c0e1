use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ndarray::ArrayD;

use crate::error::SearchError;
use crate::{LabelIndex, TimeframeIndex};

pub type ScoringContextRef = Arc<ScoringContext>;

/// Contexts of the surviving hypotheses, handed to
/// [`LabelScorer::cleanup_caches`](super::LabelScorer::cleanup_caches).
pub type ContextSet = HashSet<ScoringContextRef>;

/// Recurrent state carried alongside a label history.
#[derive(Debug, Clone, Default)]
pub struct HiddenState {
    pub tensors: Vec<ArrayD<f32>>,
}

/// Everything a scorer needs to remember about a hypothesis.
///
/// Contexts are immutable once published. Two equal contexts must produce
/// identical scores for identical future token sequences; recombination in
/// the search relies on that.
#[derive(Debug, Clone)]
pub enum ScoringContext {
    /// Context of scorers that keep no per-hypothesis state.
    Empty,
    Step {
        step: TimeframeIndex,
    },
    Sequence {
        labels: Vec<LabelIndex>,
    },
    SequenceWithStep {
        labels: Vec<LabelIndex>,
        step: TimeframeIndex,
    },
    /// Equality and hashing only look at `labels`; the state is fully
    /// determined by them.
    HiddenState {
        labels: Vec<LabelIndex>,
        state: Arc<HiddenState>,
    },
    /// One context per sub-scorer of a combined scorer.
    Combined(Vec<ScoringContextRef>),
}

impl ScoringContext {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Step { .. } => "step",
            Self::Sequence { .. } => "sequence",
            Self::SequenceWithStep { .. } => "sequence-with-step",
            Self::HiddenState { .. } => "hidden-state",
            Self::Combined(_) => "combined",
        }
    }

    pub fn step(&self) -> Option<TimeframeIndex> {
        match self {
            Self::Step { step } | Self::SequenceWithStep { step, .. } => Some(*step),
            _ => None,
        }
    }

    pub fn labels(&self) -> Option<&[LabelIndex]> {
        match self {
            Self::Sequence { labels }
            | Self::SequenceWithStep { labels, .. }
            | Self::HiddenState { labels, .. } => Some(labels),
            _ => None,
        }
    }

    /// Step of a step-carrying context, or a mismatch error naming `expected`.
    pub fn expect_step(&self, expected: &'static str) -> Result<TimeframeIndex, SearchError> {
        self.step().ok_or(SearchError::ContextMismatch {
            expected,
            found: self.kind_name(),
        })
    }

    pub fn sub_contexts(&self, expected_len: usize) -> Result<&[ScoringContextRef], SearchError> {
        match self {
            Self::Combined(subs) if subs.len() == expected_len => Ok(subs),
            Self::Combined(_) => Err(SearchError::ContextMismatch {
                expected: "combined context with one entry per sub-scorer",
                found: "combined",
            }),
            other => Err(SearchError::ContextMismatch {
                expected: "combined",
                found: other.kind_name(),
            }),
        }
    }
}

impl PartialEq for ScoringContext {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) => true,
            (Self::Step { step: a }, Self::Step { step: b }) => a == b,
            (Self::Sequence { labels: a }, Self::Sequence { labels: b }) => a == b,
            (
                Self::SequenceWithStep {
                    labels: la,
                    step: sa,
                },
                Self::SequenceWithStep {
                    labels: lb,
                    step: sb,
                },
            ) => sa == sb && la == lb,
            (Self::HiddenState { labels: a, .. }, Self::HiddenState { labels: b, .. }) => a == b,
            (Self::Combined(a), Self::Combined(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|(x, y)| Arc::ptr_eq(x, y) || x == y)
            }
            _ => false,
        }
    }
}

impl Eq for ScoringContext {}

impl Hash for ScoringContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Empty => {}
            Self::Step { step } => step.hash(state),
            Self::Sequence { labels } | Self::HiddenState { labels, .. } => labels.hash(state),
            Self::SequenceWithStep { labels, step } => {
                labels.hash(state);
                step.hash(state);
            }
            Self::Combined(subs) => {
                subs.len().hash(state);
                for sub in subs {
                    sub.hash(state);
                }
            }
        }
    }
}
