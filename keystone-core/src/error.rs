use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Audit error: {0}")]
    Audit(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Record not found")]
    NotFound,

    /// A unique index was hit. Retrying may observe the conflicting row.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// A referenced row does not exist.
    #[error("Foreign key violation: {0}")]
    ForeignKey(String),

    /// The record being inserted already exists under the same id.
    #[error("Record already exists: {0}")]
    AlreadyExists(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Invalid user ID: {0}")]
    InvalidUserId(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Event handler error: {0}")]
    HandlerError(String),
}

impl Error {
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Storage(StorageError::NotFound))
    }

    /// Whether retrying the enclosing transaction may succeed.
    ///
    /// Unique constraint violations are included: a lost race on the primary
    /// email index surfaces as one and a fresh transaction sees the winner's
    /// row. Foreign key violations and duplicate ids are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Storage(
                StorageError::Database(_)
                    | StorageError::Connection(_)
                    | StorageError::Constraint(_)
            )
        )
    }
}
