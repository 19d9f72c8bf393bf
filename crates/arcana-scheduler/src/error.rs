use thiserror::Error;

/// Errors that can occur within the scheduling core.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying store error.
    #[error("Store error: {0}")]
    Store(#[from] arcana_store::StoreError),

    /// A user's reminder_time setting could not be parsed.
    #[error("Invalid reminder time: {0}")]
    InvalidReminderTime(String),

    /// The provided trigger has no future firing.
    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    /// No job with the given ID exists in the registry.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
