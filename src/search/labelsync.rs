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

/// Beam search where each step emits one label per hypothesis.
///
/// The number of steps is capped at `max-labels-per-timestep` times the
/// number of input frames seen so far. Hypotheses that emitted sentence end
/// stay in the beam and compete with the active ones.
pub struct LexiconfreeLabelsyncBeamSearch {
    engine: SearchEngine,
    total_timesteps: usize,
    features_complete: bool,
    finished: bool,
}

impl LexiconfreeLabelsyncBeamSearch {
    pub fn new(
        config: SearchConfig,
        lexicon: Arc<Lexicon>,
        scorer: Box<dyn LabelScorer>,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        let tokens = config.special_tokens(&lexicon)?;
        if tokens.sentence_end.is_none() {
            log::warn!("Label-synchronous search without sentence end only stops at the step limit");
        }
        Ok(Self {
            engine: SearchEngine::new(config, tokens, lexicon, scorer),
            total_timesteps: 0,
            features_complete: false,
            finished: false,
        })
    }

    pub fn total_timesteps(&self) -> usize {
        self.total_timesteps
    }

    fn step_limit(&self) -> usize {
        (self.engine.config.max_labels_per_timestep * self.total_timesteps as f32) as usize
    }

    fn best(&self) -> Option<&LabelHypothesis> {
        self.engine
            .best_terminated_hypothesis()
            .or_else(|| self.engine.best_active_hypothesis())
    }
}

impl SearchAlgorithm for LexiconfreeLabelsyncBeamSearch {
    fn kind(&self) -> SearchKind {
        SearchKind::Labelsync
    }

    fn reset(&mut self) {
        self.engine.reset();
        self.total_timesteps = 0;
        self.features_complete = false;
        self.finished = false;
    }

    fn enter_segment(&mut self) {
        self.engine.enter_segment();
        self.total_timesteps = 0;
        self.features_complete = false;
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
        self.features_complete = true;
        self.decode_many_steps()?;
        self.engine.log_statistics();
        self.finished = true;
        Ok(())
    }

    fn decode_step(&mut self) -> Result<bool, SearchError> {
        if self.finished {
            return Ok(false);
        }
        if self.engine.step >= self.step_limit() {
            if self.features_complete {
                log::warn!(
                    "Terminated search after {} steps, the limit for {} input frames",
                    self.engine.step,
                    self.total_timesteps
                );
                self.finished = true;
            }
            return Ok(false);
        }
        if self.engine.beam.iter().all(|h| !h.active) {
            if self.features_complete {
                self.finished = true;
            }
            return Ok(false);
        }

        let mut report = self.engine.step_report();
        let engine = &mut self.engine;
        let mut extensions = engine.extensions();
        if !engine.score_extensions(&mut extensions, &mut report)? {
            return Ok(false);
        }
        engine.prune_extensions(&mut extensions, &mut report);

        let mut new_beam = engine.extend_hypotheses(&extensions)?;
        new_beam.extend(engine.beam.iter().filter(|h| !h.active).cloned());
        if !engine.commit(new_beam, &mut report) {
            return Ok(false);
        }

        self.engine.apply_maximum_stable_delay(&mut report);

        if report.is_enabled() {
            let scale = self.engine.scale();
            let entries = [
                ("best-terminated-hyp-score", self.engine.best_terminated_hypothesis()),
                ("worst-terminated-hyp-score", self.engine.worst_terminated_hypothesis()),
                ("best-active-hyp-score", self.engine.best_active_hypothesis()),
                ("worst-active-hyp-score", self.engine.worst_active_hypothesis()),
            ];
            for (key, hyp) in entries {
                if let Some(hyp) = hyp {
                    report.record(key, hyp.score);
                    report.record(
                        key.replace("-score", "-normalized-score"),
                        hyp.scaled_score(scale),
                    );
                }
            }
        }
        Ok(true)
    }

    fn current_best_traceback(&self) -> Traceback {
        SearchEngine::traceback(self.best())
    }

    fn current_stable_traceback(&self) -> Traceback {
        self.engine.stable_traceback()
    }

    fn current_best_lattice(&self) -> WordLattice {
        self.engine.lattice(self.best())
    }

    fn beam(&self) -> &[LabelHypothesis] {
        &self.engine.beam
    }

    fn statistics(&self) -> &SearchStatistics {
        &self.engine.stats
    }
}
