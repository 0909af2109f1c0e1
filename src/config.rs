use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SearchError;
use crate::lexicon::Lexicon;
use crate::{LabelIndex, Score};

const ENV_PREFIX: &str = "SEARCH_";
const ENCODER_ENV_PREFIX: &str = "ENCODER_";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchKind {
    #[default]
    Beam,
    Greedy,
    Labelsync,
    NonAutoregressive,
}

impl FromStr for SearchKind {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beam" => Ok(Self::Beam),
            "greedy" => Ok(Self::Greedy),
            "labelsync" | "label-sync" => Ok(Self::Labelsync),
            "non-autoregressive" | "nonautoregressive" | "nar" => Ok(Self::NonAutoregressive),
            other => Err(SearchError::InvalidConfig(format!(
                "unknown search kind '{other}'"
            ))),
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Beam => "beam",
            Self::Greedy => "greedy",
            Self::Labelsync => "labelsync",
            Self::NonAutoregressive => "non-autoregressive",
        };
        f.write_str(name)
    }
}

/// Options shared by all search variants.
///
/// JSON documents use the kebab-case option names (`max-beam-size`,
/// `score-threshold`, ...). Missing keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SearchConfig {
    pub kind: SearchKind,
    pub max_beam_size: usize,
    /// Beam applied between the rounds of a multi-scorer setup.
    pub max_beam_size_per_scorer: usize,
    /// `None` disables score pruning.
    pub score_threshold: Option<Score>,
    pub intermediate_score_threshold: Option<Score>,
    pub length_norm_scale: Score,
    pub use_blank: bool,
    pub blank_label_index: Option<LabelIndex>,
    pub allow_label_loop: bool,
    pub use_sentence_end: bool,
    pub sentence_end_index: Option<LabelIndex>,
    pub max_labels_per_timestep: f32,
    pub cache_cleanup_interval: usize,
    pub maximum_stable_delay: Option<usize>,
    pub maximum_stable_delay_pruning_interval: usize,
    pub log_stepwise_statistics: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            kind: SearchKind::Beam,
            max_beam_size: 1,
            max_beam_size_per_scorer: usize::MAX,
            score_threshold: None,
            intermediate_score_threshold: None,
            length_norm_scale: 0.0,
            use_blank: false,
            blank_label_index: None,
            allow_label_loop: false,
            use_sentence_end: false,
            sentence_end_index: None,
            max_labels_per_timestep: 1.0,
            cache_cleanup_interval: 1,
            maximum_stable_delay: None,
            maximum_stable_delay_pruning_interval: 10,
            log_stepwise_statistics: false,
        }
    }
}

fn parse_threshold(value: &str) -> Option<Option<Score>> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "none" | "unset" | "inf" => Some(None),
        v => v.parse().ok().map(Some),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl SearchConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides(ENV_PREFIX);
        config
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, SearchError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        log::debug!(
            "Loaded {} search config from {}",
            config.kind,
            path.as_ref().display()
        );
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self, prefix: &str) {
        let parse_env = |suffix: &str| std::env::var(format!("{prefix}{suffix}")).ok();
        let apply_usize = |suffix: &str, target: &mut usize| {
            if let Some(v) = parse_env(suffix).and_then(|s| s.trim().parse().ok()) {
                *target = v;
            }
        };
        let apply_flag = |suffix: &str, target: &mut bool| {
            if let Some(v) = parse_env(suffix).and_then(|s| parse_flag(&s)) {
                *target = v;
            }
        };
        let apply_index = |suffix: &str, target: &mut Option<LabelIndex>| {
            if let Some(v) = parse_env(suffix).and_then(|s| s.trim().parse().ok()) {
                *target = Some(v);
            }
        };

        if let Some(kind) = parse_env("KIND").and_then(|s| s.parse().ok()) {
            self.kind = kind;
        }
        apply_usize("MAX_BEAM_SIZE", &mut self.max_beam_size);
        apply_usize("MAX_BEAM_SIZE_PER_SCORER", &mut self.max_beam_size_per_scorer);
        apply_usize("CACHE_CLEANUP_INTERVAL", &mut self.cache_cleanup_interval);
        apply_usize(
            "MAXIMUM_STABLE_DELAY_PRUNING_INTERVAL",
            &mut self.maximum_stable_delay_pruning_interval,
        );
        apply_flag("USE_BLANK", &mut self.use_blank);
        apply_flag("ALLOW_LABEL_LOOP", &mut self.allow_label_loop);
        apply_flag("USE_SENTENCE_END", &mut self.use_sentence_end);
        apply_flag("LOG_STEPWISE_STATISTICS", &mut self.log_stepwise_statistics);
        apply_index("BLANK_LABEL_INDEX", &mut self.blank_label_index);
        apply_index("SENTENCE_END_INDEX", &mut self.sentence_end_index);

        if let Some(v) = parse_env("SCORE_THRESHOLD").and_then(|s| parse_threshold(&s)) {
            self.score_threshold = v;
        }
        if let Some(v) = parse_env("INTERMEDIATE_SCORE_THRESHOLD").and_then(|s| parse_threshold(&s))
        {
            self.intermediate_score_threshold = v;
        }
        if let Some(v) = parse_env("LENGTH_NORM_SCALE").and_then(|s| s.trim().parse().ok()) {
            self.length_norm_scale = v;
        }
        if let Some(v) = parse_env("MAX_LABELS_PER_TIMESTEP").and_then(|s| s.trim().parse().ok()) {
            self.max_labels_per_timestep = v;
        }
        if let Some(v) = parse_env("MAXIMUM_STABLE_DELAY") {
            self.maximum_stable_delay = v.trim().parse().ok().filter(|d| *d > 0);
        }
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        let invalid = |msg: String| Err(SearchError::InvalidConfig(msg));

        if self.max_beam_size == 0 {
            return invalid("max-beam-size must be at least 1".into());
        }
        if self.max_beam_size_per_scorer == 0 {
            return invalid("max-beam-size-per-scorer must be at least 1".into());
        }
        for (name, threshold) in [
            ("score-threshold", self.score_threshold),
            ("intermediate-score-threshold", self.intermediate_score_threshold),
        ] {
            if let Some(t) = threshold {
                if t.is_nan() || t < 0.0 {
                    return invalid(format!("{name} must be a non-negative number, got {t}"));
                }
            }
        }
        if !self.length_norm_scale.is_finite() {
            return invalid(format!(
                "length-norm-scale must be finite, got {}",
                self.length_norm_scale
            ));
        }
        if self.max_labels_per_timestep.is_nan() || self.max_labels_per_timestep <= 0.0 {
            return invalid(format!(
                "max-labels-per-timestep must be positive, got {}",
                self.max_labels_per_timestep
            ));
        }
        if self.cache_cleanup_interval == 0 {
            return invalid("cache-cleanup-interval must be at least 1".into());
        }
        if self.maximum_stable_delay_pruning_interval == 0 {
            return invalid("maximum-stable-delay-pruning-interval must be at least 1".into());
        }
        Ok(())
    }

    /// Resolves the blank and sentence-end indices against `lexicon`.
    ///
    /// An explicit index wins over the symbolic lookup.
    pub fn special_tokens(&self, lexicon: &Lexicon) -> Result<SpecialTokens, SearchError> {
        let resolve = |name: &'static str,
                       enabled: bool,
                       explicit: Option<LabelIndex>,
                       inferred: Option<LabelIndex>|
         -> Result<Option<LabelIndex>, SearchError> {
            if !enabled {
                return Ok(None);
            }
            let index = match (explicit, inferred) {
                (Some(e), Some(i)) if e != i => {
                    log::warn!(
                        "{name} token exists in lexicon with id {i} but is overridden by configured index {e}"
                    );
                    e
                }
                (Some(e), _) => e,
                (None, Some(i)) => {
                    log::info!("Using {name} index {i} inferred from lexicon");
                    i
                }
                (None, None) => return Err(SearchError::MissingSpecialToken(name)),
            };
            if (index as usize) >= lexicon.len() {
                return Err(SearchError::UnknownToken(format!(
                    "{name} index {index} outside vocabulary of size {}",
                    lexicon.len()
                )));
            }
            Ok(Some(index))
        };

        Ok(SpecialTokens {
            blank: resolve(
                "blank",
                self.use_blank,
                self.blank_label_index,
                lexicon.blank(),
            )?,
            sentence_end: resolve(
                "sentence-end",
                self.use_sentence_end,
                self.sentence_end_index,
                lexicon.sentence_end(),
            )?,
        })
    }
}

/// Resolved special token indices. `None` means the token is not in use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpecialTokens {
    pub blank: Option<LabelIndex>,
    pub sentence_end: Option<LabelIndex>,
}

impl SpecialTokens {
    pub fn is_blank(&self, token: LabelIndex) -> bool {
        self.blank == Some(token)
    }

    pub fn is_sentence_end(&self, token: LabelIndex) -> bool {
        self.sentence_end == Some(token)
    }
}

/// Window sizes (in input frames) of the chunked encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EncoderConfig {
    pub chunk_history: usize,
    pub chunk_center: usize,
    pub chunk_future: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            chunk_history: 0,
            chunk_center: 16,
            chunk_future: 0,
        }
    }
}

impl EncoderConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let parse_env = |suffix: &str| {
            std::env::var(format!("{ENCODER_ENV_PREFIX}{suffix}"))
                .ok()
                .and_then(|s| s.trim().parse::<usize>().ok())
        };
        if let Some(v) = parse_env("CHUNK_HISTORY") {
            config.chunk_history = v;
        }
        if let Some(v) = parse_env("CHUNK_CENTER") {
            config.chunk_center = v.max(1);
        }
        if let Some(v) = parse_env("CHUNK_FUTURE") {
            config.chunk_future = v;
        }
        config
    }

    pub fn window_size(&self) -> usize {
        self.chunk_history + self.chunk_center + self.chunk_future
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        if self.chunk_center == 0 {
            return Err(SearchError::InvalidConfig(
                "chunk-center must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
