use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use common::{BatchRef, Sku};
use domain::{Aggregate, Message, Product};
use tokio::sync::RwLock;

use crate::{ProductRepository, Result, Seen, StoreError, UnitOfWork, UnitOfWorkFactory};

/// A committed product and the number of commits that wrote it.
#[derive(Debug, Clone)]
struct StoredProduct {
    product: Product,
    revision: i64,
}

/// In-memory product store for testing.
///
/// Provides the same commit semantics as the PostgreSQL store: a unit of
/// work that loaded a product fails to commit once another unit of work has
/// committed that product in the meantime.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    products: Arc<RwLock<HashMap<Sku, StoredProduct>>>,
    commits: Arc<AtomicUsize>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding the given products.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let products = products
            .into_iter()
            .map(|product| {
                (
                    product.sku().clone(),
                    StoredProduct {
                        product,
                        revision: 0,
                    },
                )
            })
            .collect();
        Self {
            products: Arc::new(RwLock::new(products)),
            commits: Arc::default(),
        }
    }

    /// Opens a unit of work over this store.
    pub fn unit_of_work(&self) -> InMemoryUnitOfWork {
        InMemoryUnitOfWork {
            store: self.clone(),
            seen: Seen::new(),
            uncommitted: false,
        }
    }

    /// Returns the number of successful commits.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Returns a copy of the committed state of a product.
    pub async fn product(&self, sku: &Sku) -> Option<Product> {
        self.products
            .read()
            .await
            .get(sku)
            .map(|stored| stored.product.clone())
    }

    /// Returns the number of committed products.
    pub async fn product_count(&self) -> usize {
        self.products.read().await.len()
    }
}

#[async_trait]
impl UnitOfWorkFactory for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        Ok(Box::new(self.unit_of_work()))
    }
}

/// Unit of work over an [`InMemoryStore`].
///
/// Works on private copies of the committed products; they are written back
/// only on commit.
pub struct InMemoryUnitOfWork {
    store: InMemoryStore,
    seen: Seen<Product>,
    uncommitted: bool,
}

impl InMemoryUnitOfWork {
    fn load(&mut self, stored: StoredProduct) -> &mut Product {
        self.uncommitted = true;
        self.seen.insert(stored.product, Some(stored.revision))
    }
}

#[async_trait]
impl ProductRepository for InMemoryUnitOfWork {
    async fn add<'a>(&'a mut self, product: Product) -> Result<&'a mut Product> {
        self.uncommitted = true;
        Ok(self.seen.insert(product, None))
    }

    async fn get<'a>(&'a mut self, sku: &Sku) -> Result<Option<&'a mut Product>> {
        if self.seen.contains(sku) {
            return Ok(self.seen.get_mut(sku));
        }

        let stored = self.store.products.read().await.get(sku).cloned();
        match stored {
            Some(stored) => Ok(Some(self.load(stored))),
            None => Ok(None),
        }
    }

    async fn get_by_batch_reference<'a>(
        &'a mut self,
        reference: &BatchRef,
    ) -> Result<Option<&'a mut Product>> {
        if let Some(sku) = self.seen.find_id(|p| p.batch(reference).is_some()) {
            return Ok(self.seen.get_mut(&sku));
        }

        let stored = self
            .store
            .products
            .read()
            .await
            .values()
            .find(|stored| stored.product.batch(reference).is_some())
            .cloned();
        match stored {
            Some(stored) => Ok(Some(self.load(stored))),
            None => Ok(None),
        }
    }

    fn seen(&self) -> Vec<Sku> {
        self.seen.ids()
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    fn products(&mut self) -> &mut dyn ProductRepository {
        self
    }

    #[tracing::instrument(skip(self))]
    async fn commit(&mut self) -> Result<Vec<Message>> {
        {
            let mut committed = self.store.products.write().await;

            for tracked in self.seen.iter() {
                let sku = tracked.aggregate.sku();
                let current = committed.get(sku).map(|stored| stored.revision);
                if current != tracked.loaded {
                    metrics::counter!("unit_of_work_conflicts_total").increment(1);
                    tracing::warn!(aggregate = Product::aggregate_type(), %sku, ?current, loaded = ?tracked.loaded, "concurrent update detected");
                    return Err(StoreError::ConcurrencyConflict { sku: sku.clone() });
                }
            }

            for tracked in self.seen.iter_mut() {
                let revision = tracked.loaded.map_or(0, |r| r + 1);
                let mut product = tracked.aggregate.clone();
                // Pending messages belong to this unit of work, not the stored copy.
                product.take_messages();
                committed.insert(
                    product.sku().clone(),
                    StoredProduct { product, revision },
                );
                tracked.loaded = Some(revision);
            }
        }

        self.store.commits.fetch_add(1, Ordering::SeqCst);
        self.uncommitted = false;
        metrics::counter!("unit_of_work_commits_total").increment(1);

        Ok(self.seen.drain_messages())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.seen.clear();
        self.uncommitted = false;
        Ok(())
    }
}

impl Drop for InMemoryUnitOfWork {
    fn drop(&mut self) {
        if self.uncommitted && !self.seen.is_empty() {
            tracing::debug!(seen = self.seen.len(), "unit of work dropped without commit, rolling back");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Batch, Event, OrderLine, Version};

    fn store_with_lamp() -> InMemoryStore {
        InMemoryStore::with_products([Product::new(
            "LAMP",
            vec![Batch::new("b1", "LAMP", 100, None)],
        )])
    }

    #[tokio::test]
    async fn get_returns_same_instance_on_repeat() {
        let store = store_with_lamp();
        let mut uow = store.unit_of_work();

        uow.get(&Sku::new("LAMP"))
            .await
            .unwrap()
            .unwrap()
            .allocate(OrderLine::new("o1", "LAMP", 10));
        let again = uow.get(&Sku::new("LAMP")).await.unwrap().unwrap();

        assert_eq!(again.batches()[0].available_quantity(), 90);
        assert_eq!(uow.seen(), vec![Sku::new("LAMP")]);
    }

    #[tokio::test]
    async fn missing_product_is_not_seen() {
        let store = InMemoryStore::new();
        let mut uow = store.unit_of_work();

        assert!(uow.get(&Sku::new("NOPE")).await.unwrap().is_none());
        assert!(
            uow.get_by_batch_reference(&BatchRef::new("nope"))
                .await
                .unwrap()
                .is_none()
        );
        assert!(uow.seen().is_empty());
    }

    #[tokio::test]
    async fn get_by_batch_reference_finds_owner() {
        let store = store_with_lamp();
        let mut uow = store.unit_of_work();

        let product = uow
            .get_by_batch_reference(&BatchRef::new("b1"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(product.sku(), &Sku::new("LAMP"));
        assert_eq!(uow.seen(), vec![Sku::new("LAMP")]);
    }

    #[tokio::test]
    async fn commit_persists_and_drains() {
        let store = store_with_lamp();
        let mut uow = store.unit_of_work();
        uow.get(&Sku::new("LAMP"))
            .await
            .unwrap()
            .unwrap()
            .allocate(OrderLine::new("o1", "LAMP", 10));

        let messages = uow.commit().await.unwrap();

        assert_eq!(
            messages,
            vec![Message::Event(Event::allocated("o1", "LAMP", 10, "b1"))]
        );
        assert!(uow.commit().await.unwrap().is_empty());
        assert_eq!(store.commit_count(), 2);

        let committed = store.product(&Sku::new("LAMP")).await.unwrap();
        assert_eq!(committed.version(), Version::new(1));
        assert!(!committed.has_pending_messages());
    }

    #[tokio::test]
    async fn dropping_without_commit_discards_changes() {
        let store = store_with_lamp();
        {
            let mut uow = store.unit_of_work();
            uow.get(&Sku::new("LAMP"))
                .await
                .unwrap()
                .unwrap()
                .allocate(OrderLine::new("o1", "LAMP", 10));
        }

        let committed = store.product(&Sku::new("LAMP")).await.unwrap();
        assert_eq!(committed.batches()[0].available_quantity(), 100);
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn rollback_forgets_seen_products() {
        let store = store_with_lamp();
        let mut uow = store.unit_of_work();
        uow.get(&Sku::new("LAMP")).await.unwrap();

        uow.rollback().await.unwrap();

        assert!(uow.seen().is_empty());
        assert!(uow.commit().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn interleaved_units_of_work_conflict() {
        let store = store_with_lamp();
        let mut first = store.unit_of_work();
        let mut second = store.unit_of_work();

        first
            .get(&Sku::new("LAMP"))
            .await
            .unwrap()
            .unwrap()
            .allocate(OrderLine::new("orderA", "LAMP", 10));
        second
            .get(&Sku::new("LAMP"))
            .await
            .unwrap()
            .unwrap()
            .allocate(OrderLine::new("orderB", "LAMP", 10));

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();

        assert!(matches!(err, StoreError::ConcurrencyConflict { ref sku } if sku.as_str() == "LAMP"));
        let committed = store.product(&Sku::new("LAMP")).await.unwrap();
        assert_eq!(committed.version(), Version::new(1));
        assert_eq!(committed.batches()[0].available_quantity(), 90);
    }

    #[tokio::test]
    async fn concurrent_creation_of_same_sku_conflicts() {
        let store = InMemoryStore::new();
        let mut first = store.unit_of_work();
        let mut second = store.unit_of_work();

        first.add(Product::new("CHAIR", vec![])).await.unwrap();
        second.add(Product::new("CHAIR", vec![])).await.unwrap();

        first.commit().await.unwrap();
        assert!(second.commit().await.unwrap_err().is_conflict());
        assert_eq!(store.product_count().await, 1);
    }
}
