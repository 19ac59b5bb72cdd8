//! In-memory allocations view.

use std::sync::Arc;

use async_trait::async_trait;
use common::{BatchRef, OrderId, Sku};
use tokio::sync::RwLock;

use crate::Result;
use crate::read_model::{AllocationRow, AllocationsReadModel};

#[derive(Debug, Clone)]
struct Entry {
    orderid: OrderId,
    row: AllocationRow,
}

/// Allocations view held in process memory.
///
/// Rows are kept in insertion order so queries return allocations oldest
/// first, like the database view.
#[derive(Clone, Default)]
pub struct InMemoryAllocationsView {
    rows: Arc<RwLock<Vec<Entry>>>,
}

impl InMemoryAllocationsView {
    /// Creates a new empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of rows across all orders.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl AllocationsReadModel for InMemoryAllocationsView {
    fn name(&self) -> &'static str {
        "InMemoryAllocationsView"
    }

    async fn add_allocation(
        &self,
        orderid: &OrderId,
        sku: &Sku,
        batchref: &BatchRef,
    ) -> Result<()> {
        self.rows.write().await.push(Entry {
            orderid: orderid.clone(),
            row: AllocationRow::new(sku.clone(), batchref.clone()),
        });
        Ok(())
    }

    async fn remove_allocation(&self, orderid: &OrderId, sku: &Sku) -> Result<()> {
        self.rows
            .write()
            .await
            .retain(|entry| !(&entry.orderid == orderid && &entry.row.sku == sku));
        Ok(())
    }

    async fn allocations_for(&self, orderid: &OrderId) -> Result<Vec<AllocationRow>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|entry| &entry.orderid == orderid)
            .map(|entry| entry.row.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_rows_for_one_order_in_insertion_order() {
        let view = InMemoryAllocationsView::new();
        let order1 = OrderId::new("order1");
        let order2 = OrderId::new("order2");

        view.add_allocation(&order1, &Sku::new("sku1"), &BatchRef::new("b1"))
            .await
            .unwrap();
        view.add_allocation(&order2, &Sku::new("sku1"), &BatchRef::new("b1"))
            .await
            .unwrap();
        view.add_allocation(&order1, &Sku::new("sku2"), &BatchRef::new("b2"))
            .await
            .unwrap();

        assert_eq!(
            view.allocations_for(&order1).await.unwrap(),
            vec![AllocationRow::new("sku1", "b1"), AllocationRow::new("sku2", "b2")]
        );
        assert_eq!(
            view.allocations_for(&order2).await.unwrap(),
            vec![AllocationRow::new("sku1", "b1")]
        );
    }

    #[tokio::test]
    async fn remove_only_touches_matching_order_and_sku() {
        let view = InMemoryAllocationsView::new();
        let order1 = OrderId::new("order1");

        view.add_allocation(&order1, &Sku::new("sku1"), &BatchRef::new("b1"))
            .await
            .unwrap();
        view.add_allocation(&order1, &Sku::new("sku2"), &BatchRef::new("b2"))
            .await
            .unwrap();

        view.remove_allocation(&order1, &Sku::new("sku1"))
            .await
            .unwrap();

        assert_eq!(
            view.allocations_for(&order1).await.unwrap(),
            vec![AllocationRow::new("sku2", "b2")]
        );
    }

    #[tokio::test]
    async fn unknown_order_has_no_rows() {
        let view = InMemoryAllocationsView::new();
        assert!(
            view.allocations_for(&OrderId::new("nope"))
                .await
                .unwrap()
                .is_empty()
        );
    }
}
