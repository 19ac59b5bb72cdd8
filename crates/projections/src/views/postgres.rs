//! PostgreSQL allocations view.

use async_trait::async_trait;
use common::{BatchRef, OrderId, Sku};
use sqlx::{PgPool, Row};

use crate::Result;
use crate::read_model::{AllocationRow, AllocationsReadModel};

/// Allocations view stored in the `allocations_view` table.
///
/// Each write runs outside any unit of work, so the view is eventually
/// consistent with the product tables.
#[derive(Clone)]
pub struct PostgresAllocationsView {
    pool: PgPool,
}

impl PostgresAllocationsView {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AllocationsReadModel for PostgresAllocationsView {
    fn name(&self) -> &'static str {
        "PostgresAllocationsView"
    }

    async fn add_allocation(
        &self,
        orderid: &OrderId,
        sku: &Sku,
        batchref: &BatchRef,
    ) -> Result<()> {
        sqlx::query("INSERT INTO allocations_view (orderid, sku, batchref) VALUES ($1, $2, $3)")
            .bind(orderid.as_str())
            .bind(sku.as_str())
            .bind(batchref.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_allocation(&self, orderid: &OrderId, sku: &Sku) -> Result<()> {
        sqlx::query("DELETE FROM allocations_view WHERE orderid = $1 AND sku = $2")
            .bind(orderid.as_str())
            .bind(sku.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn allocations_for(&self, orderid: &OrderId) -> Result<Vec<AllocationRow>> {
        let rows = sqlx::query(
            "SELECT sku, batchref FROM allocations_view WHERE orderid = $1 ORDER BY id ASC",
        )
        .bind(orderid.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<AllocationRow> {
                let sku: String = row.try_get("sku")?;
                let batchref: String = row.try_get("batchref")?;
                Ok(AllocationRow::new(sku, batchref))
            })
            .collect()
    }
}
