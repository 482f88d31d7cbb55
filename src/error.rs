use thiserror::Error;

#[derive(Error, Debug)]
pub enum SalinError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Source and target are misaligned: {source_lines} source lines vs {target_lines} target lines")]
    Alignment {
        source_lines: usize,
        target_lines: usize,
    },

    #[error("Length mismatch: {predictions} predictions, {references} references, {sources} sources")]
    LengthMismatch {
        predictions: usize,
        references: usize,
        sources: usize,
    },

    #[error("Artifact not found: {0}")]
    MissingArtifact(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Scoring error: {0}")]
    Scoring(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SalinError>;
