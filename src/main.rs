use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use env_logger::Env;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use lexiconfree_search::encoder::{
    ChunkedEncoder, EncoderBackend, FullInputEncoder, LinearBackend, PassthroughBackend,
};
use lexiconfree_search::scorer::{
    ContextMode, EncoderLabelScorer, HistoryPolicy, StepwiseNoOpLabelScorer,
};
use lexiconfree_search::{
    create_search, EncoderConfig, LabelScorer, Lexicon, SearchConfig, SearchError, SearchKind,
    Traceback, WordLattice,
};

/// Decode a matrix of per-frame features or label costs.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON document `{"vocabulary": [...], "features": [[...], ...]}`
    input: PathBuf,

    /// Search configuration (JSON, kebab-case keys). Defaults come from
    /// `SEARCH_*` environment variables.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured search kind
    #[arg(short, long, value_parser = parse_kind)]
    kind: Option<SearchKind>,

    /// Override the configured beam size
    #[arg(short, long)]
    beam_size: Option<usize>,

    /// Use the features directly as label costs, one step per frame
    #[arg(long)]
    stepwise: bool,

    /// Project the features with a linear layer (`{"weights", "bias"}` JSON)
    #[arg(long, conflicts_with = "stepwise")]
    linear_weights: Option<PathBuf>,

    /// Encode the features with an ONNX model
    #[cfg(feature = "onnx")]
    #[arg(long, conflicts_with_all = ["stepwise", "linear_weights"])]
    onnx_model: Option<PathBuf>,

    #[cfg(feature = "onnx")]
    #[arg(long, default_value = "features")]
    onnx_input: String,

    #[cfg(feature = "onnx")]
    #[arg(long, default_value = "log_probs")]
    onnx_output: String,

    /// Let blank transitions extend the label history
    #[arg(long)]
    blank_updates_history: bool,

    /// Let loop transitions extend the label history
    #[arg(long)]
    loop_updates_history: bool,
}

#[derive(Deserialize)]
struct DecodeInput {
    vocabulary: Vec<String>,
    #[serde(alias = "scores")]
    features: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct DecodeOutput<'a> {
    kind: SearchKind,
    text: String,
    traceback: &'a Traceback,
    lattice: &'a WordLattice,
}

fn parse_kind(value: &str) -> Result<SearchKind, String> {
    value.parse().map_err(|e: SearchError| e.to_string())
}

fn build_scorer(cli: &Cli) -> Result<Box<dyn LabelScorer>, SearchError> {
    let mode = ContextMode::LabelHistory(HistoryPolicy {
        blank_updates_history: cli.blank_updates_history,
        loop_updates_history: cli.loop_updates_history,
    });

    #[cfg(feature = "onnx")]
    if let Some(model) = &cli.onnx_model {
        let backend = lexiconfree_search::encoder::OnnxEncoderBackend::from_file(
            model,
            &cli.onnx_input,
            &cli.onnx_output,
        )?;
        return chunked_scorer(Box::new(backend), mode);
    }

    if let Some(weights) = &cli.linear_weights {
        let backend = LinearBackend::from_json_file(weights)?;
        log::info!("Linear encoder with {} output labels", backend.num_labels());
        return chunked_scorer(Box::new(backend), mode);
    }
    if cli.stepwise {
        return Ok(Box::new(StepwiseNoOpLabelScorer::new()));
    }
    Ok(Box::new(EncoderLabelScorer::new(
        FullInputEncoder::new(PassthroughBackend),
        mode,
    )))
}

fn chunked_scorer(
    backend: Box<dyn EncoderBackend>,
    mode: ContextMode,
) -> Result<Box<dyn LabelScorer>, SearchError> {
    let encoder = ChunkedEncoder::new(backend, EncoderConfig::from_env())?;
    Ok(Box::new(EncoderLabelScorer::new(encoder, mode)))
}

fn run(cli: &Cli) -> Result<(), SearchError> {
    let start = Instant::now();
    let input: DecodeInput = serde_json::from_str(&std::fs::read_to_string(&cli.input)?)?;
    let rows = input.features.len();
    let cols = input.features.first().map_or(0, Vec::len);
    if input.features.iter().any(|row| row.len() != cols) {
        return Err(SearchError::InvalidConfig(
            "feature rows differ in length".into(),
        ));
    }
    let features = Array2::from_shape_vec((rows, cols), input.features.concat())?;

    let mut config = match &cli.config {
        Some(path) => SearchConfig::from_json_file(path)?,
        None => SearchConfig::from_env(),
    };
    if let Some(kind) = cli.kind {
        config.kind = kind;
    }
    if let Some(beam_size) = cli.beam_size {
        config.max_beam_size = beam_size;
    }
    let kind = config.kind;

    let lexicon = Arc::new(Lexicon::new(input.vocabulary));
    let mut search = create_search(config, Arc::clone(&lexicon), build_scorer(cli)?)?;
    search.enter_segment();
    search.put_features(features.view());
    search.finish_segment()?;

    let traceback = search.current_best_traceback();
    let lattice = search.current_best_lattice();
    let output = DecodeOutput {
        kind,
        text: lexicon.decode_text(traceback.iter().map(|item| item.label)),
        traceback: &traceback,
        lattice: &lattice,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    log::info!("Decoded {rows} frames in {:?}", start.elapsed());
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        log::error!("{}: {err}", err.user_message());
        std::process::exit(1);
    }
}
