use std::sync::Arc;

use ndarray::{ArrayView1, ArrayView2};

use super::engine::SearchEngine;
use super::hypothesis::LabelHypothesis;
use super::statistics::SearchStatistics;
use super::SearchAlgorithm;
use crate::config::{SearchConfig, SearchKind};
use crate::error::SearchError;
use crate::lattice::WordLattice;
use crate::lexicon::Lexicon;
use crate::scorer::LabelScorer;
use crate::trace::Traceback;

/// Time-synchronous beam search without lexical constraints.
///
/// Each step extends every active hypothesis by every label, prunes the
/// candidates, recombines equal scoring contexts and prunes again over
/// active and finished hypotheses together. With `maximum-stable-delay` set,
/// hypotheses that left the best path too long ago are dropped.
pub struct LexiconfreeBeamSearch {
    engine: SearchEngine,
    finished: bool,
}

impl LexiconfreeBeamSearch {
    pub fn new(
        config: SearchConfig,
        lexicon: Arc<Lexicon>,
        scorer: Box<dyn LabelScorer>,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        let tokens = config.special_tokens(&lexicon)?;
        Ok(Self {
            engine: SearchEngine::new(config, tokens, lexicon, scorer),
            finished: false,
        })
    }
}

impl SearchAlgorithm for LexiconfreeBeamSearch {
    fn kind(&self) -> SearchKind {
        SearchKind::Beam
    }

    fn reset(&mut self) {
        self.engine.reset();
        self.finished = false;
    }

    fn enter_segment(&mut self) {
        self.engine.enter_segment();
        self.finished = false;
    }

    fn put_feature(&mut self, feature: ArrayView1<f32>) {
        self.engine.put_feature(feature);
    }

    fn put_features(&mut self, features: ArrayView2<f32>) {
        self.engine.put_features(features);
    }

    fn finish_segment(&mut self) -> Result<(), SearchError> {
        self.engine.signal_no_more_features();
        let steps = self.decode_many_steps()?;
        log::debug!("Decoded {steps} remaining steps at segment end");
        self.engine.log_statistics();
        self.finished = true;
        Ok(())
    }

    fn decode_step(&mut self) -> Result<bool, SearchError> {
        if self.finished {
            return Ok(false);
        }
        let engine = &mut self.engine;
        if engine.config.use_sentence_end && engine.beam.iter().all(|h| !h.active) {
            return Ok(false);
        }

        let mut report = engine.step_report();
        let mut extensions = engine.extensions();
        if extensions.is_empty() || !engine.score_extensions(&mut extensions, &mut report)? {
            return Ok(false);
        }
        engine.prune_extensions(&mut extensions, &mut report);

        let mut new_beam = engine.extend_hypotheses(&extensions)?;
        new_beam.extend(engine.beam.iter().filter(|h| !h.active).cloned());
        if !engine.commit(new_beam, &mut report) {
            return Ok(false);
        }
        engine.apply_maximum_stable_delay(&mut report);
        Ok(true)
    }

    fn current_best_traceback(&self) -> Traceback {
        SearchEngine::traceback(self.engine.best_hypothesis())
    }

    fn current_stable_traceback(&self) -> Traceback {
        self.engine.stable_traceback()
    }

    fn current_best_lattice(&self) -> WordLattice {
        self.engine.lattice(self.engine.best_hypothesis())
    }

    fn beam(&self) -> &[LabelHypothesis] {
        &self.engine.beam
    }

    fn statistics(&self) -> &SearchStatistics {
        &self.engine.stats
    }
}
