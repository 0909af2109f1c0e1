use std::sync::Arc;

use ndarray::{ArrayView1, ArrayView2};

use super::{
    ContextSet, LabelScorer, Request, ScoreWithTime, ScoresWithTimes, ScoringContext,
    ScoringContextRef,
};
use crate::error::SearchError;
use crate::Score;

/// Multiplies every score of the wrapped scorer by a constant factor.
#[derive(Debug)]
pub struct ScaledLabelScorer<S> {
    inner: S,
    scale: Score,
}

impl<S: LabelScorer> ScaledLabelScorer<S> {
    pub fn new(inner: S, scale: Score) -> Self {
        Self { inner, scale }
    }

    pub fn scale(&self) -> Score {
        self.scale
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: LabelScorer> LabelScorer for ScaledLabelScorer<S> {
    fn reset(&mut self) {
        self.inner.reset();
    }

    fn signal_no_more_features(&mut self) {
        self.inner.signal_no_more_features();
    }

    fn initial_scoring_context(&self) -> ScoringContextRef {
        self.inner.initial_scoring_context()
    }

    fn extended_scoring_context(
        &mut self,
        request: &Request,
    ) -> Result<ScoringContextRef, SearchError> {
        self.inner.extended_scoring_context(request)
    }

    fn add_input(&mut self, input: ArrayView1<f32>) {
        self.inner.add_input(input);
    }

    fn add_inputs(&mut self, inputs: ArrayView2<f32>) {
        self.inner.add_inputs(inputs);
    }

    fn compute_score_with_time(
        &mut self,
        request: &Request,
    ) -> Result<Option<ScoreWithTime>, SearchError> {
        Ok(self
            .inner
            .compute_score_with_time(request)?
            .map(|v| ScoreWithTime {
                score: v.score * self.scale,
                timeframe: v.timeframe,
            }))
    }

    fn compute_scores_with_times(
        &mut self,
        requests: &[Request],
    ) -> Result<Option<ScoresWithTimes>, SearchError> {
        let Some(mut result) = self.inner.compute_scores_with_times(requests)? else {
            return Ok(None);
        };
        for score in &mut result.scores {
            *score *= self.scale;
        }
        Ok(Some(result))
    }

    fn cleanup_caches(&mut self, active: &ContextSet) {
        self.inner.cleanup_caches(active);
    }
}

/// Sums the scores of several scorers.
///
/// Contexts are [`ScoringContext::Combined`] with one entry per sub-scorer.
/// Each sub-scorer is one scoring round, so the search can prune between
/// them.
pub struct CombineLabelScorer {
    scorers: Vec<ScaledLabelScorer<Box<dyn LabelScorer>>>,
}

impl CombineLabelScorer {
    pub fn new(scorers: Vec<(Box<dyn LabelScorer>, Score)>) -> Result<Self, SearchError> {
        if scorers.is_empty() {
            return Err(SearchError::InvalidConfig(
                "combined scorer needs at least one sub-scorer".into(),
            ));
        }
        Ok(Self {
            scorers: scorers
                .into_iter()
                .map(|(scorer, scale)| ScaledLabelScorer::new(scorer, scale))
                .collect(),
        })
    }

    fn sub_requests(&self, requests: &[Request], index: usize) -> Result<Vec<Request>, SearchError> {
        let n = self.scorers.len();
        requests
            .iter()
            .map(|r| {
                Ok(Request {
                    context: Arc::clone(&r.context.sub_contexts(n)?[index]),
                    token: r.token,
                    transition_type: r.transition_type,
                })
            })
            .collect()
    }
}

impl LabelScorer for CombineLabelScorer {
    fn reset(&mut self) {
        self.scorers.iter_mut().for_each(|s| s.reset());
    }

    fn signal_no_more_features(&mut self) {
        self.scorers
            .iter_mut()
            .for_each(|s| s.signal_no_more_features());
    }

    fn initial_scoring_context(&self) -> ScoringContextRef {
        Arc::new(ScoringContext::Combined(
            self.scorers
                .iter()
                .map(|s| s.initial_scoring_context())
                .collect(),
        ))
    }

    fn extended_scoring_context(
        &mut self,
        request: &Request,
    ) -> Result<ScoringContextRef, SearchError> {
        let subs = request.context.sub_contexts(self.scorers.len())?;
        let mut extended = Vec::with_capacity(subs.len());
        for (scorer, context) in self.scorers.iter_mut().zip(subs) {
            extended.push(scorer.extended_scoring_context(&Request {
                context: Arc::clone(context),
                token: request.token,
                transition_type: request.transition_type,
            })?);
        }
        if extended.iter().zip(subs).all(|(a, b)| Arc::ptr_eq(a, b)) {
            return Ok(Arc::clone(&request.context));
        }
        Ok(Arc::new(ScoringContext::Combined(extended)))
    }

    fn add_input(&mut self, input: ArrayView1<f32>) {
        self.scorers.iter_mut().for_each(|s| s.add_input(input));
    }

    fn add_inputs(&mut self, inputs: ArrayView2<f32>) {
        self.scorers.iter_mut().for_each(|s| s.add_inputs(inputs));
    }

    fn compute_score_with_time(
        &mut self,
        request: &Request,
    ) -> Result<Option<ScoreWithTime>, SearchError> {
        let result = self.compute_scores_with_times(std::slice::from_ref(request))?;
        Ok(result.map(|r| ScoreWithTime {
            score: r.scores[0],
            timeframe: r.timeframes[0],
        }))
    }

    fn compute_scores_with_times(
        &mut self,
        requests: &[Request],
    ) -> Result<Option<ScoresWithTimes>, SearchError> {
        let mut total = ScoresWithTimes {
            scores: vec![0.0; requests.len()],
            timeframes: vec![0; requests.len()],
        };
        for index in 0..self.scorers.len() {
            let Some(partial) = self.compute_sub_scores_with_times(requests, index)? else {
                return Ok(None);
            };
            for i in 0..requests.len() {
                total.scores[i] += partial.scores[i];
                total.timeframes[i] = total.timeframes[i].max(partial.timeframes[i]);
            }
        }
        Ok(Some(total))
    }

    fn num_sub_scorers(&self) -> usize {
        self.scorers.len()
    }

    fn compute_sub_scores_with_times(
        &mut self,
        requests: &[Request],
        sub_scorer: usize,
    ) -> Result<Option<ScoresWithTimes>, SearchError> {
        if sub_scorer >= self.scorers.len() {
            return Err(SearchError::InvalidConfig(format!(
                "no sub-scorer with index {sub_scorer}"
            )));
        }
        let sub_requests = self.sub_requests(requests, sub_scorer)?;
        let result = self.scorers[sub_scorer].compute_scores_with_times(&sub_requests)?;
        if let Some(r) = &result {
            if r.scores.len() != requests.len() || r.timeframes.len() != requests.len() {
                return Err(SearchError::Backend(format!(
                    "sub-scorer {sub_scorer} returned {} scores and {} timeframes for {} requests",
                    r.scores.len(),
                    r.timeframes.len(),
                    requests.len()
                )));
            }
        }
        Ok(result)
    }

    fn cleanup_caches(&mut self, active: &ContextSet) {
        let n = self.scorers.len();
        for (index, scorer) in self.scorers.iter_mut().enumerate() {
            let subs: ContextSet = active
                .iter()
                .filter_map(|c| c.sub_contexts(n).ok())
                .map(|subs| Arc::clone(&subs[index]))
                .collect();
            scorer.cleanup_caches(&subs);
        }
    }
}
