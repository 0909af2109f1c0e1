use std::fmt;
use std::sync::Arc;

use crate::lexicon::Lexicon;
use crate::scorer::{ScoringContextRef, TransitionType};
use crate::trace::{Trace, TraceRef};
use crate::{LabelIndex, Score, TimeframeIndex};

/// Score divided by `length^scale`.
///
/// A scale of zero returns the raw score untouched, also for zero length.
pub fn length_normalized(score: Score, length: usize, scale: Score) -> Score {
    if scale == 0.0 {
        return score;
    }
    score / (length.max(1) as Score).powf(scale)
}

/// Candidate successor of a beam entry, scored before it becomes a
/// hypothesis.
#[derive(Debug, Clone, PartialEq)]
pub struct HypothesisExtension {
    /// Index of the base hypothesis in the current beam.
    pub base: usize,
    pub token: LabelIndex,
    pub transition_type: TransitionType,
    pub score: Score,
    pub timeframe: TimeframeIndex,
    pub length: usize,
}

impl HypothesisExtension {
    pub fn new(
        base: usize,
        hyp: &LabelHypothesis,
        token: LabelIndex,
        transition_type: TransitionType,
    ) -> Self {
        Self {
            base,
            token,
            transition_type,
            score: hyp.score,
            timeframe: 0,
            length: hyp.length + usize::from(transition_type.emits_label()),
        }
    }

    pub fn scaled_score(&self, scale: Score) -> Score {
        length_normalized(self.score, self.length, scale)
    }
}

#[derive(Debug, Clone)]
pub struct LabelHypothesis {
    pub scoring_context: ScoringContextRef,
    pub current_token: Option<LabelIndex>,
    pub score: Score,
    /// Number of emitted labels.
    pub length: usize,
    pub trace: TraceRef,
    pub last_transition: Option<TransitionType>,
    /// Cleared once the hypothesis emitted sentence end.
    pub active: bool,
}

impl LabelHypothesis {
    pub fn initial(scoring_context: ScoringContextRef) -> Self {
        Self {
            scoring_context,
            current_token: None,
            score: 0.0,
            length: 0,
            trace: Trace::root(),
            last_transition: None,
            active: true,
        }
    }

    /// Applies a scored extension to `base`.
    ///
    /// Loop transitions rewrite the last trace node with the new score;
    /// every other transition appends a node.
    pub fn extend(
        base: &Self,
        extension: &HypothesisExtension,
        scoring_context: ScoringContextRef,
    ) -> Self {
        let time = extension.timeframe + 1;
        let trace = if extension.transition_type.is_loop() && !base.trace.is_root() {
            Trace::update_loop_score(&base.trace, extension.score, time)
        } else {
            Trace::append(&base.trace, extension.token, time, extension.score)
        };
        Self {
            scoring_context,
            current_token: Some(extension.token),
            score: extension.score,
            length: extension.length,
            trace,
            last_transition: Some(extension.transition_type),
            active: extension.transition_type != TransitionType::SentenceEnd,
        }
    }

    pub fn scaled_score(&self, scale: Score) -> Score {
        length_normalized(self.score, self.length, scale)
    }

    /// Whether both hypotheses share the same trace node.
    pub fn shares_trace(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.trace, &other.trace)
    }

    pub fn labels(&self) -> Vec<LabelIndex> {
        self.trace
            .perform_traceback()
            .iter()
            .map(|item| item.label)
            .collect()
    }

    pub fn display<'a>(&'a self, lexicon: &'a Lexicon) -> HypothesisDisplay<'a> {
        HypothesisDisplay { hyp: self, lexicon }
    }
}

pub struct HypothesisDisplay<'a> {
    hyp: &'a LabelHypothesis,
    lexicon: &'a Lexicon,
}

impl fmt::Display for HypothesisDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "score: {}, length: {}, traceback:",
            self.hyp.score, self.hyp.length
        )?;
        for label in self.hyp.labels() {
            write!(f, " {}", self.lexicon.symbol(label).unwrap_or("?"))?;
        }
        Ok(())
    }
}
