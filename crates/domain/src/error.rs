//! Domain error types.

use common::{BatchRef, Sku};
use thiserror::Error;

/// Errors that can occur during product operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    /// The batch reference is not part of this product.
    #[error("Batch not found: {reference}")]
    BatchNotFound { reference: BatchRef },

    /// A batch with this reference already exists on the product.
    #[error("Batch {reference} already exists for sku {sku}")]
    DuplicateBatch { reference: BatchRef, sku: Sku },

    /// Order lines must ask for at least one unit.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },
}
