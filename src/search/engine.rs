use std::collections::HashMap;
use std::sync::Arc;

use ndarray::{ArrayView1, ArrayView2};

use super::hypothesis::{HypothesisExtension, LabelHypothesis};
use super::infer_transition_type;
use super::pruning::{beam_size_pruning, recombine, score_pruning};
use super::statistics::{SearchStatistics, StepReport};
use crate::config::{SearchConfig, SpecialTokens};
use crate::error::SearchError;
use crate::lattice::WordLattice;
use crate::lexicon::Lexicon;
use crate::scorer::{ContextSet, LabelScorer, Request};
use crate::trace::{Trace, TraceRef, Traceback};
use crate::{Score, TimeframeIndex};

/// State and step building blocks shared by the search variants.
pub(crate) struct SearchEngine {
    pub config: SearchConfig,
    pub tokens: SpecialTokens,
    pub lexicon: Arc<Lexicon>,
    pub scorer: Box<dyn LabelScorer>,
    pub beam: Vec<LabelHypothesis>,
    pub stats: SearchStatistics,
    pub step: usize,
}

impl SearchEngine {
    pub fn new(
        config: SearchConfig,
        tokens: SpecialTokens,
        lexicon: Arc<Lexicon>,
        scorer: Box<dyn LabelScorer>,
    ) -> Self {
        let beam = vec![LabelHypothesis::initial(scorer.initial_scoring_context())];
        Self {
            config,
            tokens,
            lexicon,
            scorer,
            beam,
            stats: SearchStatistics::default(),
            step: 0,
        }
    }

    pub fn reset(&mut self) {
        self.stats.initialization_time.tic();
        self.scorer.reset();
        self.beam = vec![LabelHypothesis::initial(
            self.scorer.initial_scoring_context(),
        )];
        self.step = 0;
        self.stats.initialization_time.toc();
    }

    /// Clears scorer input and statistics and restarts from a fresh beam.
    pub fn enter_segment(&mut self) {
        self.stats.reset();
        self.reset();
    }

    pub fn put_feature(&mut self, feature: ArrayView1<f32>) {
        self.stats.feature_processing_time.tic();
        self.scorer.add_input(feature);
        self.stats.feature_processing_time.toc();
    }

    pub fn put_features(&mut self, features: ArrayView2<f32>) {
        self.stats.feature_processing_time.tic();
        self.scorer.add_inputs(features);
        self.stats.feature_processing_time.toc();
    }

    pub fn signal_no_more_features(&mut self) {
        self.stats.feature_processing_time.tic();
        self.scorer.signal_no_more_features();
        self.stats.feature_processing_time.toc();
    }

    pub fn step_report(&self) -> StepReport {
        StepReport::new(self.step, self.config.log_stepwise_statistics)
    }

    pub fn scale(&self) -> Score {
        self.config.length_norm_scale
    }

    /// One extension per active hypothesis and vocabulary entry.
    pub fn extensions(&self) -> Vec<HypothesisExtension> {
        let labels = self.lexicon.labels();
        let mut extensions = Vec::with_capacity(self.beam.len() * labels.len());
        for (index, hyp) in self.beam.iter().enumerate() {
            if !hyp.active {
                continue;
            }
            for token in labels.clone() {
                let transition = infer_transition_type(
                    hyp.current_token,
                    token,
                    &self.tokens,
                    self.config.allow_label_loop,
                );
                extensions.push(HypothesisExtension::new(index, hyp, token, transition));
            }
        }
        extensions
    }

    fn requests(&self, extensions: &[HypothesisExtension]) -> Vec<Request> {
        extensions
            .iter()
            .map(|ext| Request {
                context: Arc::clone(&self.beam[ext.base].scoring_context),
                token: ext.token,
                transition_type: ext.transition_type,
            })
            .collect()
    }

    /// Adds the scorer's costs to `extensions`, one round per sub-scorer.
    ///
    /// Between rounds the candidates are pruned with the intermediate
    /// limits. Returns `false` when the scorer is not ready; the extensions
    /// are then only partially scored and must be discarded.
    pub fn score_extensions(
        &mut self,
        extensions: &mut Vec<HypothesisExtension>,
        report: &mut StepReport,
    ) -> Result<bool, SearchError> {
        let rounds = self.scorer.num_sub_scorers();
        let scale = self.scale();
        for round in 0..rounds {
            let requests = self.requests(extensions);
            self.stats.scoring_time.tic();
            let result = self.scorer.compute_sub_scores_with_times(&requests, round);
            self.stats.scoring_time.toc();

            let Some(result) = result? else {
                log::trace!("Scorer not ready at step {} (round {round})", self.step);
                return Ok(false);
            };
            if result.scores.len() != requests.len() || result.timeframes.len() != requests.len() {
                return Err(SearchError::Backend(format!(
                    "scorer answered {} of {} requests",
                    result.scores.len().min(result.timeframes.len()),
                    requests.len()
                )));
            }
            for ((ext, score), timeframe) in extensions
                .iter_mut()
                .zip(&result.scores)
                .zip(&result.timeframes)
            {
                ext.score += score;
                ext.timeframe = ext.timeframe.max(*timeframe);
            }

            if round + 1 < rounds {
                if let Some(threshold) = self.config.intermediate_score_threshold {
                    score_pruning(extensions, threshold, |e| e.scaled_score(scale));
                    report.record(
                        format!("num-hyps-after-intermediate-score-pruning-{round}"),
                        extensions.len(),
                    );
                }
                beam_size_pruning(extensions, self.config.max_beam_size_per_scorer, |e| {
                    e.scaled_score(scale)
                });
                report.record(
                    format!("num-hyps-after-intermediate-beam-pruning-{round}"),
                    extensions.len(),
                );
            }
        }
        Ok(true)
    }

    /// Score-threshold pruning followed by beam-size pruning.
    pub fn prune_extensions(
        &mut self,
        extensions: &mut Vec<HypothesisExtension>,
        report: &mut StepReport,
    ) {
        let scale = self.scale();
        if let Some(threshold) = self.config.score_threshold {
            score_pruning(extensions, threshold, |e| e.scaled_score(scale));
            self.stats.num_hyps_after_score_pruning.push(extensions.len());
            report.record("num-hyps-after-score-pruning", extensions.len());
        }
        beam_size_pruning(extensions, self.config.max_beam_size, |e| {
            e.scaled_score(scale)
        });
        self.stats.num_hyps_after_beam_pruning.push(extensions.len());
        report.record("num-hyps-after-beam-pruning", extensions.len());
    }

    /// Turns scored extensions into hypotheses with extended contexts.
    pub fn extend_hypotheses(
        &mut self,
        extensions: &[HypothesisExtension],
    ) -> Result<Vec<LabelHypothesis>, SearchError> {
        self.stats.context_extension_time.tic();
        let result = extensions
            .iter()
            .map(|ext| -> Result<LabelHypothesis, SearchError> {
                let base = &self.beam[ext.base];
                let context = self.scorer.extended_scoring_context(&Request {
                    context: Arc::clone(&base.scoring_context),
                    token: ext.token,
                    transition_type: ext.transition_type,
                })?;
                if log::log_enabled!(log::Level::Trace) {
                    log::trace!(
                        "extend {} with {} ({:?})",
                        ext.base,
                        ext.token,
                        ext.transition_type
                    );
                }
                Ok(LabelHypothesis::extend(base, ext, context))
            })
            .collect();
        self.stats.context_extension_time.toc();
        result
    }

    /// Recombines and prunes `new_beam` jointly, then makes it current.
    ///
    /// Returns `false` without touching the beam if nothing survived.
    pub fn commit(
        &mut self,
        new_beam: Vec<LabelHypothesis>,
        report: &mut StepReport,
    ) -> bool {
        let scale = self.scale();
        let mut new_beam = recombine(new_beam);
        self.stats.num_hyps_after_recombination.push(new_beam.len());
        report.record("num-hyps-after-recombination", new_beam.len());

        if let Some(threshold) = self.config.score_threshold {
            score_pruning(&mut new_beam, threshold, |h| h.scaled_score(scale));
        }
        beam_size_pruning(&mut new_beam, self.config.max_beam_size, |h| {
            h.scaled_score(scale)
        });
        new_beam.sort_by(|a, b| a.scaled_score(scale).total_cmp(&b.scaled_score(scale)));

        if new_beam.is_empty() {
            log::warn!("All hypotheses were pruned at step {}", self.step);
            return false;
        }
        self.install(new_beam, report);
        true
    }

    /// Makes `new_beam` current and runs the periodic cache cleanup.
    pub fn install(&mut self, new_beam: Vec<LabelHypothesis>, report: &mut StepReport) {
        self.step += 1;
        if self.step % self.config.cache_cleanup_interval == 0 {
            let active: ContextSet = new_beam
                .iter()
                .map(|h| Arc::clone(&h.scoring_context))
                .collect();
            self.scorer.cleanup_caches(&active);
        }
        self.beam = new_beam;

        let terminated = self.beam.iter().filter(|h| !h.active).count();
        self.stats.num_active_hyps.push(self.beam.len() - terminated);
        self.stats.num_terminated_hyps.push(terminated);

        if report.is_enabled() {
            report.record("active-hyps", self.beam.len() - terminated);
            report.record("terminated-hyps", terminated);
            if let Some(best) = self.best_hypothesis() {
                report.record("best-hyp-score", best.score);
            }
            if let Some(worst) = self.worst_hypothesis() {
                report.record("worst-hyp-score", worst.score);
            }
        }
        if log::log_enabled!(log::Level::Debug) {
            for (index, hyp) in self.beam.iter().enumerate() {
                log::debug!("hypothesis {}: {}", index + 1, hyp.display(&self.lexicon));
            }
        }
    }

    fn best_by<'a, I>(hyps: I, scale: Score) -> Option<&'a LabelHypothesis>
    where
        I: Iterator<Item = &'a LabelHypothesis>,
    {
        hyps.min_by(|a, b| a.scaled_score(scale).total_cmp(&b.scaled_score(scale)))
    }

    fn worst_by<'a, I>(hyps: I, scale: Score) -> Option<&'a LabelHypothesis>
    where
        I: Iterator<Item = &'a LabelHypothesis>,
    {
        hyps.max_by(|a, b| a.scaled_score(scale).total_cmp(&b.scaled_score(scale)))
    }

    pub fn best_hypothesis(&self) -> Option<&LabelHypothesis> {
        Self::best_by(self.beam.iter(), self.scale())
    }

    pub fn worst_hypothesis(&self) -> Option<&LabelHypothesis> {
        Self::worst_by(self.beam.iter(), self.scale())
    }

    pub fn best_active_hypothesis(&self) -> Option<&LabelHypothesis> {
        Self::best_by(self.beam.iter().filter(|h| h.active), self.scale())
    }

    pub fn worst_active_hypothesis(&self) -> Option<&LabelHypothesis> {
        Self::worst_by(self.beam.iter().filter(|h| h.active), self.scale())
    }

    pub fn best_terminated_hypothesis(&self) -> Option<&LabelHypothesis> {
        Self::best_by(self.beam.iter().filter(|h| !h.active), self.scale())
    }

    pub fn worst_terminated_hypothesis(&self) -> Option<&LabelHypothesis> {
        Self::worst_by(self.beam.iter().filter(|h| !h.active), self.scale())
    }

    pub fn traceback(hyp: Option<&LabelHypothesis>) -> Traceback {
        hyp.map(|h| h.trace.perform_traceback()).unwrap_or_default()
    }

    /// Runs maximum-stable-delay pruning on every
    /// `maximum-stable-delay-pruning-interval`-th step if a delay is set.
    pub fn apply_maximum_stable_delay(&mut self, report: &mut StepReport) {
        let Some(delay) = self.config.maximum_stable_delay else {
            return;
        };
        if self.step % self.config.maximum_stable_delay_pruning_interval == 0 {
            self.maximum_stable_delay_pruning(delay, report);
        }
    }

    /// Keeps only hypotheses that agree with the best recent one on
    /// everything older than `delay` steps.
    fn maximum_stable_delay_pruning(&mut self, delay: usize, report: &mut StepReport) {
        if self.step < delay {
            return;
        }
        let cutoff = (self.step + 1 - delay) as TimeframeIndex;

        let scale = self.scale();
        let recent_best = Self::best_by(
            self.beam.iter().filter(|h| h.trace.time() >= cutoff),
            scale,
        );
        let anchor = match recent_best {
            Some(hyp) => hyp,
            None => {
                log::warn!(
                    "No hypothesis reached time {cutoff}; anchoring maximum-stable-delay pruning on the overall best"
                );
                match self.best_hypothesis() {
                    Some(hyp) => hyp,
                    None => return,
                }
            }
        };

        let mut root: &TraceRef = &anchor.trace;
        while let Some(parent) = root.parent() {
            if parent.time() < cutoff {
                break;
            }
            root = parent;
        }
        let root = Arc::clone(root);

        let before = self.beam.len();
        self.beam.retain(|hyp| passes_through(&hyp.trace, &root));
        report.record("num-hyps-after-maximum-stable-delay-pruning", self.beam.len());
        log::trace!(
            "maximum-stable-delay pruning kept {} of {before} hypotheses",
            self.beam.len()
        );
    }

    /// Traceback of the longest trace prefix shared by every hypothesis in
    /// the beam.
    pub fn stable_traceback(&self) -> Traceback {
        let Some((first, rest)) = self.beam.split_first() else {
            return Traceback::new();
        };
        let mut path: Vec<&TraceRef> =
            std::iter::successors(Some(&first.trace), |t| t.parent()).collect();
        path.reverse();
        let position: HashMap<*const Trace, usize> = path
            .iter()
            .enumerate()
            .map(|(i, t)| (Arc::as_ptr(t), i))
            .collect();

        let mut depth = path.len();
        for hyp in rest {
            let shared = std::iter::successors(Some(&hyp.trace), |t| t.parent())
                .find_map(|t| position.get(&Arc::as_ptr(t)))
                .map_or(0, |i| i + 1);
            depth = depth.min(shared);
        }
        match depth.checked_sub(1) {
            Some(last) => path[last].perform_traceback(),
            None => Traceback::new(),
        }
    }

    /// Lattice closing `best` and every other hypothesis in the beam,
    /// active or terminated.
    pub fn lattice(&self, best: Option<&LabelHypothesis>) -> WordLattice {
        let Some(best) = best else {
            return WordLattice::empty();
        };
        let others = self
            .beam
            .iter()
            .filter(|h| !h.shares_trace(best))
            .map(|h| &h.trace);
        WordLattice::from_traces(&best.trace, others, &self.lexicon)
    }

    pub fn log_statistics(&self) {
        self.stats.log();
    }
}

fn passes_through(trace: &TraceRef, ancestor: &TraceRef) -> bool {
    let mut current: Option<&TraceRef> = Some(trace);
    while let Some(node) = current {
        if Arc::ptr_eq(node, ancestor) {
            return true;
        }
        if node.time() < ancestor.time() {
            return false;
        }
        current = node.parent();
    }
    false
}
