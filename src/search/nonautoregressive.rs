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

/// Search over models that score every output position independently.
///
/// One call to `decode_step` walks all positions the scorer can currently
/// answer, each with the usual extend, prune and recombine pass. Positions
/// are capped at `max-labels-per-timestep` times the input frames seen.
pub struct NonAutoregressiveSearch {
    engine: SearchEngine,
    total_timesteps: usize,
    finished: bool,
}

impl NonAutoregressiveSearch {
    pub fn new(
        mut config: SearchConfig,
        lexicon: Arc<Lexicon>,
        scorer: Box<dyn LabelScorer>,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        if !config.use_blank && (config.blank_label_index.is_some() || lexicon.blank().is_some()) {
            log::info!("Enabling blank handling for non-autoregressive search");
            config.use_blank = true;
        }
        let tokens = config.special_tokens(&lexicon)?;
        Ok(Self {
            engine: SearchEngine::new(config, tokens, lexicon, scorer),
            total_timesteps: 0,
            finished: false,
        })
    }

    fn position_limit(&self) -> usize {
        (self.engine.config.max_labels_per_timestep * self.total_timesteps as f32) as usize
    }

    /// Decodes a single output position.
    fn decode_position(&mut self) -> Result<bool, SearchError> {
        let engine = &mut self.engine;
        if engine.beam.iter().all(|h| !h.active) {
            return Ok(false);
        }

        let mut report = engine.step_report();
        let mut extensions = engine.extensions();
        if !engine.score_extensions(&mut extensions, &mut report)? {
            return Ok(false);
        }
        engine.prune_extensions(&mut extensions, &mut report);

        let mut new_beam = engine.extend_hypotheses(&extensions)?;
        new_beam.extend(engine.beam.iter().filter(|h| !h.active).cloned());
        Ok(engine.commit(new_beam, &mut report))
    }
}

impl SearchAlgorithm for NonAutoregressiveSearch {
    fn kind(&self) -> SearchKind {
        SearchKind::NonAutoregressive
    }

    fn reset(&mut self) {
        self.engine.reset();
        self.total_timesteps = 0;
        self.finished = false;
    }

    fn enter_segment(&mut self) {
        self.engine.enter_segment();
        self.total_timesteps = 0;
        self.finished = false;
    }

    fn put_feature(&mut self, feature: ArrayView1<f32>) {
        self.engine.put_feature(feature);
        self.total_timesteps += 1;
    }

    fn put_features(&mut self, features: ArrayView2<f32>) {
        self.total_timesteps += features.nrows();
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
        let limit = self.position_limit();
        let mut positions = 0;
        while self.engine.step < limit && self.decode_position()? {
            positions += 1;
        }
        if self.engine.step >= limit && positions > 0 {
            log::debug!(
                "Reached the position limit {limit} for {} input frames",
                self.total_timesteps
            );
        }
        if positions > 0 {
            log::trace!("Decoded {positions} positions");
        }
        Ok(positions > 0)
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
