pub mod config;
pub mod encoder;
pub mod error;
pub mod lattice;
pub mod lexicon;
pub mod scorer;
pub mod search;
pub mod trace;

pub use config::{EncoderConfig, SearchConfig, SearchKind, SpecialTokens};
pub use error::SearchError;
pub use lattice::WordLattice;
pub use lexicon::Lexicon;
pub use scorer::{LabelScorer, ScoringContext, ScoringContextRef, TransitionType};
pub use search::{create_search, LabelHypothesis, SearchAlgorithm};
pub use trace::{Trace, TraceRef, Traceback, TracebackItem};

/// Index of a vocabulary entry.
pub type LabelIndex = u32;

/// Path cost. Lower is better.
pub type Score = f32;

/// Index of an (encoded) input frame.
pub type TimeframeIndex = u32;
