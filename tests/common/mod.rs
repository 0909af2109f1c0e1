#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1};

use lexiconfree_search::scorer::{
    HistoryPolicy, Request, ScoreWithTime, ScoresWithTimes, ScoringContext, ScoringContextRef,
};
use lexiconfree_search::{LabelScorer, Score, SearchError};

/// Sizes of the batches a stub scorer has seen.
pub type BatchLog = Rc<RefCell<Vec<usize>>>;

pub fn batch_log() -> BatchLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Reads costs from input rows: row `t` holds the cost of every token at
/// step `t`. Contexts are label histories with a step.
pub struct TableScorer {
    frames: Vec<Array1<f32>>,
    policy: HistoryPolicy,
    order_free: bool,
    log: BatchLog,
}

impl TableScorer {
    pub fn new(policy: HistoryPolicy) -> Self {
        Self {
            frames: Vec::new(),
            policy,
            order_free: false,
            log: batch_log(),
        }
    }

    /// Label histories that only differ in order share a context.
    pub fn order_free(mut self) -> Self {
        self.order_free = true;
        self
    }

    pub fn with_log(mut self, log: BatchLog) -> Self {
        self.log = log;
        self
    }
}

impl LabelScorer for TableScorer {
    fn reset(&mut self) {
        self.frames.clear();
    }

    fn signal_no_more_features(&mut self) {}

    fn initial_scoring_context(&self) -> ScoringContextRef {
        Arc::new(ScoringContext::SequenceWithStep {
            labels: Vec::new(),
            step: 0,
        })
    }

    fn extended_scoring_context(
        &mut self,
        request: &Request,
    ) -> Result<ScoringContextRef, SearchError> {
        let context = self.policy.extend_history(request)?;
        if self.order_free {
            if let ScoringContext::SequenceWithStep { labels, step } = context.as_ref() {
                let mut labels = labels.clone();
                labels.sort_unstable();
                return Ok(Arc::new(ScoringContext::SequenceWithStep {
                    labels,
                    step: *step,
                }));
            }
        }
        Ok(context)
    }

    fn add_input(&mut self, input: ArrayView1<f32>) {
        self.frames.push(input.to_owned());
    }

    fn compute_score_with_time(
        &mut self,
        request: &Request,
    ) -> Result<Option<ScoreWithTime>, SearchError> {
        let step = request.context.expect_step("step")?;
        let Some(frame) = self.frames.get(step as usize) else {
            return Ok(None);
        };
        let score = frame
            .get(request.token as usize)
            .copied()
            .ok_or_else(|| SearchError::UnknownToken(request.token.to_string()))?;
        Ok(Some(ScoreWithTime {
            score,
            timeframe: step,
        }))
    }

    fn compute_scores_with_times(
        &mut self,
        requests: &[Request],
    ) -> Result<Option<ScoresWithTimes>, SearchError> {
        self.log.borrow_mut().push(requests.len());
        let mut result = ScoresWithTimes::with_capacity(requests.len());
        for request in requests {
            match self.compute_score_with_time(request)? {
                Some(value) => result.push(value),
                None => return Ok(None),
            }
        }
        Ok(Some(result))
    }
}

/// Scores batch `n` with row `n` of a fixed table, independent of input.
/// Contexts are plain label histories.
pub struct ScriptedScorer {
    rows: Vec<Vec<Score>>,
    calls: usize,
    policy: HistoryPolicy,
}

impl ScriptedScorer {
    pub fn new(rows: Vec<Vec<Score>>, policy: HistoryPolicy) -> Self {
        Self {
            rows,
            calls: 0,
            policy,
        }
    }
}

impl LabelScorer for ScriptedScorer {
    fn reset(&mut self) {
        self.calls = 0;
    }

    fn signal_no_more_features(&mut self) {}

    fn initial_scoring_context(&self) -> ScoringContextRef {
        Arc::new(ScoringContext::Sequence { labels: Vec::new() })
    }

    fn extended_scoring_context(
        &mut self,
        request: &Request,
    ) -> Result<ScoringContextRef, SearchError> {
        self.policy.extend_history(request)
    }

    fn add_input(&mut self, _input: ArrayView1<f32>) {}

    fn compute_score_with_time(
        &mut self,
        request: &Request,
    ) -> Result<Option<ScoreWithTime>, SearchError> {
        Ok(self.rows.get(self.calls).map(|row| ScoreWithTime {
            score: row[request.token as usize],
            timeframe: self.calls as u32,
        }))
    }

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
        self.calls += 1;
        Ok(Some(result))
    }
}

/// Answers request `i` of every batch with score `i`.
pub struct IndexScorer {
    pub log: BatchLog,
}

impl LabelScorer for IndexScorer {
    fn reset(&mut self) {}

    fn signal_no_more_features(&mut self) {}

    fn initial_scoring_context(&self) -> ScoringContextRef {
        Arc::new(ScoringContext::Sequence { labels: Vec::new() })
    }

    fn extended_scoring_context(
        &mut self,
        request: &Request,
    ) -> Result<ScoringContextRef, SearchError> {
        HistoryPolicy::default().extend_history(request)
    }

    fn add_input(&mut self, _input: ArrayView1<f32>) {}

    fn compute_score_with_time(
        &mut self,
        _request: &Request,
    ) -> Result<Option<ScoreWithTime>, SearchError> {
        Ok(Some(ScoreWithTime {
            score: 0.0,
            timeframe: 0,
        }))
    }

    fn compute_scores_with_times(
        &mut self,
        requests: &[Request],
    ) -> Result<Option<ScoresWithTimes>, SearchError> {
        self.log.borrow_mut().push(requests.len());
        Ok(Some(ScoresWithTimes {
            scores: (0..requests.len()).map(|i| i as Score).collect(),
            timeframes: vec![0; requests.len()],
        }))
    }
}

pub fn rows(data: &[&[f32]]) -> Array2<f32> {
    let cols = data.first().map_or(0, |r| r.len());
    let flat: Vec<f32> = data.iter().flat_map(|r| r.iter().copied()).collect();
    Array2::from_shape_vec((data.len(), cols), flat).expect("rectangular rows")
}
