use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecommenderError>;

#[derive(Debug, Error)]
pub enum RecommenderError {
    /// Encoded interactions do not cover a dense zero-based index range.
    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Unknown problem id: {0}")]
    UnknownItem(i64),

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Invalid difficulty: {0}")]
    InvalidDifficulty(String),

    #[error("Model file not found at {0}. Train the model first.")]
    MissingCheckpoint(String),

    #[error("Checkpoint mismatch: {0}")]
    CheckpointMismatch(String),

    #[error("External fetch failed: {0}")]
    ExternalFetch(String),

    #[error("Sampling error: {0}")]
    Sampling(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Data load error: {0}")]
    DataLoad(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

impl RecommenderError {
    /// Errors caused by what the caller sent, as opposed to engine state.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            RecommenderError::UnknownItem(_)
                | RecommenderError::Expression(_)
                | RecommenderError::InvalidDifficulty(_)
                | RecommenderError::InvalidInput(_)
        )
    }
}

impl From<csv::Error> for RecommenderError {
    fn from(err: csv::Error) -> Self {
        RecommenderError::DataLoad(err.to_string())
    }
}

impl From<serde_json::Error> for RecommenderError {
    fn from(err: serde_json::Error) -> Self {
        RecommenderError::DataLoad(err.to_string())
    }
}

impl From<bincode::Error> for RecommenderError {
    fn from(err: bincode::Error) -> Self {
        RecommenderError::CheckpointMismatch(format!("failed to decode checkpoint: {}", err))
    }
}

impl From<reqwest::Error> for RecommenderError {
    fn from(err: reqwest::Error) -> Self {
        RecommenderError::ExternalFetch(err.to_string())
    }
}

impl From<envy::Error> for RecommenderError {
    fn from(err: envy::Error) -> Self {
        RecommenderError::Config(err.to_string())
    }
}
