use gather_store::StoreError;
use gather_util::validation::ValidationError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced to the UI layer. Cloneable so the last one can be
/// published on the facade's error observable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// A subscription or write failed. Non-fatal; loaded data stays usable.
    #[error("transport error: {0}")]
    Transport(String),
    /// The realtime backend is missing or misconfigured.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("no room is open")]
    NoActiveRoom,
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unconfigured(msg) => ChatError::Configuration(msg),
            other => ChatError::Transport(other.to_string()),
        }
    }
}

impl From<ValidationError> for ChatError {
    fn from(err: ValidationError) -> Self {
        ChatError::InvalidInput(err.to_string())
    }
}

impl From<ConfigError> for ChatError {
    fn from(err: ConfigError) -> Self {
        ChatError::Configuration(err.to_string())
    }
}
