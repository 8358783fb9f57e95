use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeaseError {
    /// User-correctable rejection, reported before anything is mutated.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Data or programming error; the operation is abandoned unapplied.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl LeaseError {
    pub fn validation(reason: impl Into<String>) -> Self {
        LeaseError::Validation(reason.into())
    }

    pub fn invariant(reason: impl Into<String>) -> Self {
        LeaseError::InvariantViolation(reason.into())
    }

    /// True for failures the caller can fix by changing the request.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LeaseError::Validation(_) | LeaseError::InvalidInput { .. }
        )
    }
}

impl From<serde_json::Error> for LeaseError {
    fn from(e: serde_json::Error) -> Self {
        LeaseError::SerializationError(e.to_string())
    }
}
