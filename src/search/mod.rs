mod beam;
mod engine;
mod greedy;
mod hypothesis;
mod labelsync;
mod nonautoregressive;
mod pruning;
mod statistics;

use std::sync::Arc;

use ndarray::{ArrayView1, ArrayView2};

use crate::config::{SearchConfig, SearchKind, SpecialTokens};
use crate::error::SearchError;
use crate::lattice::WordLattice;
use crate::lexicon::Lexicon;
use crate::scorer::{LabelScorer, TransitionType};
use crate::trace::Traceback;
use crate::LabelIndex;

pub use beam::LexiconfreeBeamSearch;
pub use greedy::LexiconfreeGreedySearch;
pub use hypothesis::{length_normalized, HypothesisExtension, LabelHypothesis};
pub use labelsync::LexiconfreeLabelsyncBeamSearch;
pub use nonautoregressive::NonAutoregressiveSearch;
pub use pruning::{beam_size_pruning, recombine, score_pruning};
pub use statistics::{CountStatistic, SearchStatistics, TimeStatistic};

/// Segment-level driver of a decoding search.
///
/// A segment runs `enter_segment`, any number of `put_feature(s)` calls
/// interleaved with `decode_step`, then `finish_segment`. Results can be
/// read at any point and always reflect the last completed step.
pub trait SearchAlgorithm {
    fn kind(&self) -> SearchKind;

    /// Restarts from a single empty hypothesis.
    fn reset(&mut self);

    fn enter_segment(&mut self);

    fn put_feature(&mut self, feature: ArrayView1<f32>);

    fn put_features(&mut self, features: ArrayView2<f32>);

    /// Signals the end of input and decodes every remaining step.
    fn finish_segment(&mut self) -> Result<(), SearchError>;

    /// Performs one search step. `Ok(false)` means no step could be made,
    /// either because the scorer needs more input or the search is done.
    fn decode_step(&mut self) -> Result<bool, SearchError>;

    /// Steps until no further step can be made and returns the count.
    fn decode_many_steps(&mut self) -> Result<usize, SearchError> {
        let mut steps = 0;
        while self.decode_step()? {
            steps += 1;
        }
        Ok(steps)
    }

    fn current_best_traceback(&self) -> Traceback;

    /// Part of the best traceback that every hypothesis in the beam agrees
    /// on, safe to emit while the segment is still running.
    fn current_stable_traceback(&self) -> Traceback;

    fn current_best_lattice(&self) -> WordLattice;

    fn beam(&self) -> &[LabelHypothesis];

    fn statistics(&self) -> &SearchStatistics;
}

/// Classifies the step from `previous` to `next`.
///
/// Sentence end wins over every other kind.
pub fn infer_transition_type(
    previous: Option<LabelIndex>,
    next: LabelIndex,
    tokens: &SpecialTokens,
    allow_label_loop: bool,
) -> TransitionType {
    if tokens.is_sentence_end(next) {
        return TransitionType::SentenceEnd;
    }
    let next_is_blank = tokens.is_blank(next);
    let Some(previous) = previous else {
        return if next_is_blank {
            TransitionType::InitialBlank
        } else {
            TransitionType::InitialLabel
        };
    };
    match (tokens.is_blank(previous), next_is_blank) {
        (true, true) => TransitionType::BlankLoop,
        (true, false) => TransitionType::BlankToLabel,
        (false, true) => TransitionType::LabelToBlank,
        (false, false) if allow_label_loop && previous == next => TransitionType::LabelLoop,
        (false, false) => TransitionType::LabelToLabel,
    }
}

/// Builds the search variant selected by `config.kind`.
pub fn create_search(
    config: SearchConfig,
    lexicon: Arc<Lexicon>,
    scorer: Box<dyn LabelScorer>,
) -> Result<Box<dyn SearchAlgorithm>, SearchError> {
    config.validate()?;
    if lexicon.is_empty() {
        return Err(SearchError::InvalidConfig("lexicon is empty".into()));
    }
    log::info!(
        "Creating {} search over {} labels (max-beam-size={})",
        config.kind,
        lexicon.len(),
        config.max_beam_size
    );
    let search: Box<dyn SearchAlgorithm> = match config.kind {
        SearchKind::Beam => Box::new(LexiconfreeBeamSearch::new(config, lexicon, scorer)?),
        SearchKind::Greedy => Box::new(LexiconfreeGreedySearch::new(config, lexicon, scorer)?),
        SearchKind::Labelsync => {
            Box::new(LexiconfreeLabelsyncBeamSearch::new(config, lexicon, scorer)?)
        }
        SearchKind::NonAutoregressive => {
            Box::new(NonAutoregressiveSearch::new(config, lexicon, scorer)?)
        }
    };
    Ok(search)
}
