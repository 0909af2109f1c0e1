use ndarray::ShapeError;
use thiserror::Error;

/// Errors raised by scorers, encoders and the search algorithms.
///
/// A scorer that simply lacks input is not an error: scoring calls return
/// `Ok(None)` in that case.
#[derive(Error, Debug)]
pub enum SearchError {
    #[cfg(feature = "onnx")]
    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ndarray shape error: {0}")]
    Shape(#[from] ShapeError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Scoring context mismatch: expected {expected}, found {found}")]
    ContextMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("Unknown token: {0}")]
    UnknownToken(String),
    #[error("Special token not found in lexicon: {0}")]
    MissingSpecialToken(&'static str),
    #[error("Model output not found: {0}")]
    OutputNotFound(String),
    #[error("Scoring backend failed: {0}")]
    Backend(String),
}

impl SearchError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "The search configuration is invalid.",
            Self::UnknownToken(_) | Self::MissingSpecialToken(_) => {
                "The vocabulary does not match the search configuration."
            }
            Self::ContextMismatch { .. } => {
                "The scorer received a scoring context it did not create."
            }
            Self::Io(_) | Self::Json(_) => "Input files could not be read.",
            #[cfg(feature = "onnx")]
            Self::Ort(_) => "The scoring model failed to run.",
            Self::Shape(_) | Self::OutputNotFound(_) | Self::Backend(_) => {
                "The scoring model failed to run."
            }
        }
    }
}

impl serde::Serialize for SearchError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
