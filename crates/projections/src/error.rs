//! Projection error types.

use thiserror::Error;

/// Errors that can occur while updating or querying a read model.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
