use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrendsError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source unavailable during {stage}: {message}")]
    SourceUnavailable { stage: String, message: String },

    #[error("Schema mismatch during {stage}: missing columns [{}]", missing.join(", "))]
    SchemaMismatch { stage: String, missing: Vec<String> },

    #[error("Invalid value in column '{column}': {value}")]
    InvalidValue { column: String, value: String },
}

impl TrendsError {
    pub fn source_unavailable(stage: impl Into<String>, message: impl Into<String>) -> Self {
        TrendsError::SourceUnavailable {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TrendsError>;
