use thiserror::Error;

/// Errors that can occur within the store subsystem.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A JSON column failed to serialize.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No user with the given ID exists in the store.
    #[error("User not found: {id}")]
    UserNotFound { id: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
