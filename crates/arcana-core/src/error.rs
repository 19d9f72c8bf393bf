use thiserror::Error;

/// Errors produced while assembling the engine from configuration.
#[derive(Debug, Error)]
pub enum ArcanaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ArcanaError>;
