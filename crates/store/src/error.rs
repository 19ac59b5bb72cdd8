use common::Sku;
use thiserror::Error;

/// Errors that can occur when loading or committing products.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another unit of work changed the same product first.
    #[error("Concurrency conflict for product {sku}")]
    ConcurrencyConflict { sku: Sku },

    /// A persisted row could not be turned back into a product.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if retrying the whole operation may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
