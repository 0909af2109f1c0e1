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

/// Follows the single cheapest extension at every step.
pub struct LexiconfreeGreedySearch {
    engine: SearchEngine,
    finished: bool,
}

impl LexiconfreeGreedySearch {
    pub fn new(
        config: SearchConfig,
        lexicon: Arc<Lexicon>,
        scorer: Box<dyn LabelScorer>,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        if config.max_beam_size != 1 {
            log::debug!(
                "Greedy search ignores max-beam-size={}",
                config.max_beam_size
            );
        }
        let tokens = config.special_tokens(&lexicon)?;
        Ok(Self {
            engine: SearchEngine::new(config, tokens, lexicon, scorer),
            finished: false,
        })
    }
}

impl SearchAlgorithm for LexiconfreeGreedySearch {
    fn kind(&self) -> SearchKind {
        SearchKind::Greedy
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
        self.decode_many_steps()?;
        self.engine.log_statistics();
        self.finished = true;
        Ok(())
    }

    fn decode_step(&mut self) -> Result<bool, SearchError> {
        if self.finished {
            return Ok(false);
        }
        let engine = &mut self.engine;
        if engine.beam.iter().all(|h| !h.active) {
            return Ok(false);
        }

        let mut report = engine.step_report();
        let mut extensions = engine.extensions();
        if !engine.score_extensions(&mut extensions, &mut report)? {
            return Ok(false);
        }
        // First index wins among equal scores.
        let best = extensions
            .iter()
            .enumerate()
            .min_by(|(i, a), (j, b)| a.score.total_cmp(&b.score).then(i.cmp(j)))
            .map(|(_, ext)| ext.clone());
        let Some(best) = best else {
            return Ok(false);
        };

        let new_beam = engine.extend_hypotheses(std::slice::from_ref(&best))?;
        engine.install(new_beam, &mut report);
        Ok(true)
    }

    fn current_best_traceback(&self) -> Traceback {
        SearchEngine::traceback(self.engine.beam.first())
    }

    fn current_stable_traceback(&self) -> Traceback {
        self.engine.stable_traceback()
    }

    fn current_best_lattice(&self) -> WordLattice {
        self.engine.lattice(self.engine.beam.first())
    }

    fn beam(&self) -> &[LabelHypothesis] {
        &self.engine.beam
    }

    fn statistics(&self) -> &SearchStatistics {
        &self.engine.stats
    }
}
