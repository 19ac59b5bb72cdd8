//! Read model trait for the allocations view.

use async_trait::async_trait;
use common::{BatchRef, OrderId, Sku};
use serde::{Deserialize, Serialize};

use crate::Result;

/// One allocated line as seen by the query side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRow {
    pub sku: Sku,
    pub batchref: BatchRef,
}

impl AllocationRow {
    pub fn new(sku: impl Into<Sku>, batchref: impl Into<BatchRef>) -> Self {
        Self {
            sku: sku.into(),
            batchref: batchref.into(),
        }
    }
}

/// Denormalized store answering "where did this order's lines go?".
///
/// Rows are keyed by `(orderid, sku)`. Writes are driven by domain events,
/// so a view may briefly lag behind the product store.
#[async_trait]
pub trait AllocationsReadModel: Send + Sync {
    /// Returns the name of this read model.
    fn name(&self) -> &'static str;

    /// Records that a line of the order was allocated to a batch.
    async fn add_allocation(&self, orderid: &OrderId, sku: &Sku, batchref: &BatchRef)
    -> Result<()>;

    /// Removes every row for the order's line of the given sku.
    async fn remove_allocation(&self, orderid: &OrderId, sku: &Sku) -> Result<()>;

    /// Lists an order's allocations, oldest first.
    async fn allocations_for(&self, orderid: &OrderId) -> Result<Vec<AllocationRow>>;
}
