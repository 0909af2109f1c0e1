use std::fmt::{Display, Write as _};
use std::time::{Duration, Instant};

/// Accumulated wall time over `tic`/`toc` pairs.
#[derive(Debug, Default)]
pub struct TimeStatistic {
    total: Duration,
    started: Option<Instant>,
}

impl TimeStatistic {
    pub fn tic(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn toc(&mut self) {
        if let Some(start) = self.started.take() {
            self.total += start.elapsed();
        }
    }

    pub fn reset(&mut self) {
        self.total = Duration::ZERO;
        self.started = None;
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn total_ms(&self) -> f64 {
        self.total.as_secs_f64() * 1000.0
    }
}

#[derive(Debug)]
pub struct CountStatistic {
    name: &'static str,
    total: usize,
    observations: usize,
    max: usize,
}

impl CountStatistic {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            total: 0,
            observations: 0,
            max: 0,
        }
    }

    pub fn push(&mut self, value: usize) {
        self.total += value;
        self.observations += 1;
        self.max = self.max.max(value);
    }

    pub fn reset(&mut self) {
        self.total = 0;
        self.observations = 0;
        self.max = 0;
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn average(&self) -> f64 {
        if self.observations == 0 {
            return 0.0;
        }
        self.total as f64 / self.observations as f64
    }

    fn log(&self) {
        log::info!(
            "{} total={} average={:.2} max={}",
            self.name,
            self.total,
            self.average(),
            self.max
        );
    }
}

/// Per-segment timers and hypothesis counters of a search.
#[derive(Debug)]
pub struct SearchStatistics {
    pub initialization_time: TimeStatistic,
    pub feature_processing_time: TimeStatistic,
    pub scoring_time: TimeStatistic,
    pub context_extension_time: TimeStatistic,
    pub num_hyps_after_score_pruning: CountStatistic,
    pub num_hyps_after_beam_pruning: CountStatistic,
    pub num_hyps_after_recombination: CountStatistic,
    pub num_active_hyps: CountStatistic,
    pub num_terminated_hyps: CountStatistic,
}

impl Default for SearchStatistics {
    fn default() -> Self {
        Self {
            initialization_time: TimeStatistic::default(),
            feature_processing_time: TimeStatistic::default(),
            scoring_time: TimeStatistic::default(),
            context_extension_time: TimeStatistic::default(),
            num_hyps_after_score_pruning: CountStatistic::new("num-hyps-after-score-pruning"),
            num_hyps_after_beam_pruning: CountStatistic::new("num-hyps-after-beam-pruning"),
            num_hyps_after_recombination: CountStatistic::new("num-hyps-after-recombination"),
            num_active_hyps: CountStatistic::new("num-active-hyps"),
            num_terminated_hyps: CountStatistic::new("num-terminated-hyps"),
        }
    }
}

impl SearchStatistics {
    pub fn reset(&mut self) {
        self.initialization_time.reset();
        self.feature_processing_time.reset();
        self.scoring_time.reset();
        self.context_extension_time.reset();
        for counter in self.counters_mut() {
            counter.reset();
        }
    }

    fn counters_mut(&mut self) -> [&mut CountStatistic; 5] {
        [
            &mut self.num_hyps_after_score_pruning,
            &mut self.num_hyps_after_beam_pruning,
            &mut self.num_hyps_after_recombination,
            &mut self.num_active_hyps,
            &mut self.num_terminated_hyps,
        ]
    }

    pub fn log(&self) {
        log::info!(
            "timing-statistics unit=milliseconds initialization-time={:.3} feature-processing-time={:.3} scoring-time={:.3} context-extension-time={:.3}",
            self.initialization_time.total_ms(),
            self.feature_processing_time.total_ms(),
            self.scoring_time.total_ms(),
            self.context_extension_time.total_ms()
        );
        for counter in [
            &self.num_hyps_after_score_pruning,
            &self.num_hyps_after_beam_pruning,
            &self.num_hyps_after_recombination,
            &self.num_active_hyps,
            &self.num_terminated_hyps,
        ] {
            if counter.observations > 0 {
                counter.log();
            }
        }
    }
}

/// Key/value record of one search step.
///
/// The record is written when it goes out of scope, so steps that bail out
/// early (for instance on a not-ready scorer) still close their block.
pub struct StepReport {
    step: usize,
    enabled: bool,
    entries: Vec<(String, String)>,
}

impl StepReport {
    pub fn new(step: usize, enabled: bool) -> Self {
        Self {
            step,
            enabled,
            entries: Vec::new(),
        }
    }

    pub fn record(&mut self, key: impl Into<String>, value: impl Display) {
        if self.enabled {
            self.entries.push((key.into(), value.to_string()));
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Drop for StepReport {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }
        let mut line = format!("search-step-stats step={}", self.step);
        for (key, value) in &self.entries {
            let _ = write!(line, " {key}={value}");
        }
        log::info!("{line}");
    }
}
