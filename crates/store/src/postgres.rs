use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{BatchRef, Sku, Version};
use domain::{Aggregate, Batch, Message, OrderLine, Product};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};

use crate::{ProductRepository, Result, Seen, StoreError, UnitOfWork, UnitOfWorkFactory};

/// SQLSTATE raised when a repeatable-read transaction loses a write race.
const SERIALIZATION_FAILURE: &str = "40001";

/// SQLSTATE raised when two transactions insert the same key.
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL-backed product store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL product store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Opens a unit of work. The transaction itself starts on first use.
    pub fn unit_of_work(&self) -> PostgresUnitOfWork {
        PostgresUnitOfWork {
            pool: self.pool.clone(),
            tx: None,
            seen: Seen::new(),
        }
    }
}

#[async_trait]
impl UnitOfWorkFactory for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        Ok(Box::new(self.unit_of_work()))
    }
}

/// Unit of work backed by one `REPEATABLE READ` transaction.
///
/// The transaction is rolled back when the unit of work is dropped before
/// committing. After a commit, the next repository call opens a new one.
pub struct PostgresUnitOfWork {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
    seen: Seen<Product>,
}

impl PostgresUnitOfWork {
    async fn connection(&mut self) -> Result<&mut PgConnection> {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => {
                let mut tx = self.pool.begin().await?;
                sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
                    .execute(&mut *tx)
                    .await?;
                tx
            }
        };
        Ok(&mut **self.tx.insert(tx))
    }

    async fn load(&mut self, sku: &Sku) -> Result<Option<&mut Product>> {
        let conn = self.connection().await?;
        match load_product(conn, sku).await? {
            Some(product) => {
                let loaded = product.version_number().as_i64();
                Ok(Some(self.seen.insert(product, Some(loaded))))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ProductRepository for PostgresUnitOfWork {
    async fn add<'a>(&'a mut self, product: Product) -> Result<&'a mut Product> {
        Ok(self.seen.insert(product, None))
    }

    async fn get<'a>(&'a mut self, sku: &Sku) -> Result<Option<&'a mut Product>> {
        if self.seen.contains(sku) {
            return Ok(self.seen.get_mut(sku));
        }
        self.load(sku).await
    }

    async fn get_by_batch_reference<'a>(
        &'a mut self,
        reference: &BatchRef,
    ) -> Result<Option<&'a mut Product>> {
        if let Some(sku) = self.seen.find_id(|p| p.batch(reference).is_some()) {
            return Ok(self.seen.get_mut(&sku));
        }

        let conn = self.connection().await?;
        let sku: Option<String> = sqlx::query_scalar("SELECT sku FROM batches WHERE reference = $1")
            .bind(reference.as_str())
            .fetch_optional(&mut *conn)
            .await?;

        match sku {
            Some(sku) => self.load(&Sku::new(sku)).await,
            None => Ok(None),
        }
    }

    fn seen(&self) -> Vec<Sku> {
        self.seen.ids()
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    fn products(&mut self) -> &mut dyn ProductRepository {
        self
    }

    #[tracing::instrument(skip(self))]
    async fn commit(&mut self) -> Result<Vec<Message>> {
        if self.seen.is_empty() {
            if let Some(tx) = self.tx.take() {
                tx.commit().await?;
            }
            return Ok(Vec::new());
        }

        self.connection().await?;
        let Some(mut tx) = self.tx.take() else {
            return Ok(Vec::new());
        };

        for tracked in self.seen.iter() {
            let product = &tracked.aggregate;
            save_product(&mut tx, product, tracked.loaded)
                .await
                .map_err(|e| conflict_or(e, product.sku()))?;
        }

        let sku = self.seen.ids().into_iter().next();
        tx.commit().await.map_err(|e| match &sku {
            Some(sku) => conflict_or(StoreError::Database(e), sku),
            None => StoreError::Database(e),
        })?;

        for tracked in self.seen.iter_mut() {
            tracked.loaded = Some(tracked.aggregate.version_number().as_i64());
        }
        metrics::counter!("unit_of_work_commits_total").increment(1);

        Ok(self.seen.drain_messages())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        self.seen.clear();
        Ok(())
    }
}

/// Turns write-race database errors into a conflict on the given product.
fn conflict_or(err: StoreError, sku: &Sku) -> StoreError {
    if let StoreError::Database(sqlx::Error::Database(ref db_err)) = err
        && matches!(
            db_err.code().as_deref(),
            Some(SERIALIZATION_FAILURE) | Some(UNIQUE_VIOLATION)
        )
    {
        metrics::counter!("unit_of_work_conflicts_total").increment(1);
        tracing::warn!(aggregate = Product::aggregate_type(), %sku, code = ?db_err.code(), "concurrent update detected");
        return StoreError::ConcurrencyConflict { sku: sku.clone() };
    }
    err
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::InvalidRow(format!("{column} out of range: {value}")))
}

async fn load_product(conn: &mut PgConnection, sku: &Sku) -> Result<Option<Product>> {
    let version: Option<i64> =
        sqlx::query_scalar("SELECT version_number FROM products WHERE sku = $1")
            .bind(sku.as_str())
            .fetch_optional(&mut *conn)
            .await?;
    let Some(version) = version else {
        return Ok(None);
    };

    let allocation_rows = sqlx::query(
        r#"
        SELECT a.batch_reference, a.orderid, a.sku, a.qty
        FROM allocations a
        JOIN batches b ON b.reference = a.batch_reference
        WHERE b.sku = $1
        ORDER BY a.id ASC
        "#,
    )
    .bind(sku.as_str())
    .fetch_all(&mut *conn)
    .await?;

    let mut allocations: HashMap<String, Vec<OrderLine>> = HashMap::new();
    for row in allocation_rows {
        let batch_reference: String = row.try_get("batch_reference")?;
        let orderid: String = row.try_get("orderid")?;
        let line_sku: String = row.try_get("sku")?;
        let qty = to_u32(row.try_get("qty")?, "qty")?;
        allocations
            .entry(batch_reference)
            .or_default()
            .push(OrderLine::new(orderid, line_sku, qty));
    }

    let batch_rows = sqlx::query(
        r#"
        SELECT reference, sku, purchased_quantity, eta
        FROM batches
        WHERE sku = $1
        ORDER BY id ASC
        "#,
    )
    .bind(sku.as_str())
    .fetch_all(&mut *conn)
    .await?;

    let mut batches = Vec::with_capacity(batch_rows.len());
    for row in batch_rows {
        let reference: String = row.try_get("reference")?;
        let batch_sku: String = row.try_get("sku")?;
        let qty = to_u32(row.try_get("purchased_quantity")?, "purchased_quantity")?;
        let eta: Option<NaiveDate> = row.try_get("eta")?;
        let lines = allocations.remove(&reference).unwrap_or_default();
        batches.push(Batch::with_allocations(reference, batch_sku, qty, eta, lines));
    }

    Ok(Some(Product::restore(sku.clone(), batches, Version::new(version))))
}

async fn save_product(
    conn: &mut PgConnection,
    product: &Product,
    loaded: Option<i64>,
) -> Result<()> {
    let sku = product.sku();
    let version = product.version_number().as_i64();

    match loaded {
        None => {
            sqlx::query("INSERT INTO products (sku, version_number) VALUES ($1, $2)")
                .bind(sku.as_str())
                .bind(version)
                .execute(&mut *conn)
                .await?;
        }
        Some(loaded) => {
            let updated = sqlx::query(
                "UPDATE products SET version_number = $2 WHERE sku = $1 AND version_number = $3",
            )
            .bind(sku.as_str())
            .bind(version)
            .bind(loaded)
            .execute(&mut *conn)
            .await?;

            if updated.rows_affected() == 0 {
                return Err(StoreError::ConcurrencyConflict { sku: sku.clone() });
            }
        }
    }

    for batch in product.batches() {
        sqlx::query(
            r#"
            INSERT INTO batches (reference, sku, purchased_quantity, eta)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (reference) DO UPDATE
            SET purchased_quantity = EXCLUDED.purchased_quantity, eta = EXCLUDED.eta
            "#,
        )
        .bind(batch.reference().as_str())
        .bind(sku.as_str())
        .bind(i64::from(batch.purchased_quantity()))
        .bind(batch.eta())
        .execute(&mut *conn)
        .await?;

        sqlx::query("DELETE FROM allocations WHERE batch_reference = $1")
            .bind(batch.reference().as_str())
            .execute(&mut *conn)
            .await?;

        for line in batch.allocations() {
            sqlx::query(
                r#"
                INSERT INTO allocations (batch_reference, orderid, sku, qty)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(batch.reference().as_str())
            .bind(line.orderid.as_str())
            .bind(line.sku.as_str())
            .bind(i64::from(line.qty))
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}
