use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DartsError {
    #[error("Invalid setup: {message}")]
    InvalidSetup { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    // The in-memory match stays authoritative until a retry succeeds
    #[error("Persistence failure: {message}")]
    PersistenceFailure { message: String },
}

impl DartsError {
    pub fn setup(message: impl Into<String>) -> Self {
        Self::InvalidSetup { message: message.into() }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::InvalidInput { message: message.into() }
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::InvalidState { message: message.into() }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::PersistenceFailure { message: message.into() }
    }
}
