//! Service layer error types.

use common::{BatchRef, Sku};
use domain::DomainError;
use projections::ProjectionError;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while dispatching or handling messages.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// An allocation asked for a sku no product exists for.
    #[error("Invalid sku {0}")]
    InvalidSku(Sku),

    /// No product owns the batch reference.
    #[error("Batch not found: {0}")]
    BatchNotFound(BatchRef),

    /// The bus has no handler table entry for this message type.
    #[error("Unrecognized message: {0}")]
    UnrecognizedMessage(&'static str),

    /// A handler was given a message of a type it does not handle.
    #[error("Handler {handler} cannot handle {message}")]
    UnexpectedMessage {
        handler: &'static str,
        message: &'static str,
    },

    /// Sending a notification failed.
    #[error("Notification error: {0}")]
    Notification(String),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Read model error.
    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServiceError {
    /// Returns true if the failure was a lost optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ServiceError::Store(err) if err.is_conflict())
    }
}

/// Convenience type alias for service results.
pub type Result<T> = std::result::Result<T, ServiceError>;
