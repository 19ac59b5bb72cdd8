//! Product aggregate implementation.

use chrono::NaiveDate;
use common::{BatchRef, Sku, Version};

use crate::aggregate::Aggregate;
use crate::error::DomainError;

use super::{Batch, Command, Event, Message, OrderLine};

/// Product aggregate root.
///
/// Owns every batch stocked for one sku. All allocation decisions for that
/// sku go through this aggregate, so it is the unit of consistency and the
/// unit of optimistic locking.
#[derive(Debug, Clone)]
pub struct Product {
    sku: Sku,

    /// Batches in insertion order.
    batches: Vec<Batch>,

    /// Optimistic concurrency token, bumped on every successful allocation.
    version_number: Version,

    /// Commands and events raised since the last drain.
    messages: Vec<Message>,
}

impl Product {
    /// Creates a new product at the initial version.
    pub fn new(sku: impl Into<Sku>, batches: Vec<Batch>) -> Self {
        Self::restore(sku, batches, Version::initial())
    }

    /// Rebuilds a product from persisted state.
    pub fn restore(sku: impl Into<Sku>, batches: Vec<Batch>, version_number: Version) -> Self {
        Self {
            sku: sku.into(),
            batches,
            version_number,
            messages: Vec::new(),
        }
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn version_number(&self) -> Version {
        self.version_number
    }

    /// Looks up one of this product's batches.
    pub fn batch(&self, reference: &BatchRef) -> Option<&Batch> {
        self.batches.iter().find(|b| b.reference() == reference)
    }

    /// Registers a newly purchased batch of this product's sku.
    pub fn add_batch(
        &mut self,
        reference: impl Into<BatchRef>,
        qty: u32,
        eta: Option<NaiveDate>,
    ) -> Result<(), DomainError> {
        let reference = reference.into();
        if self.batch(&reference).is_some() {
            return Err(DomainError::DuplicateBatch {
                reference,
                sku: self.sku.clone(),
            });
        }
        self.batches
            .push(Batch::new(reference, self.sku.clone(), qty, eta));
        Ok(())
    }

    /// Allocates the line to the preferred batch that can hold it.
    ///
    /// Batches in stock win over shipments and earlier shipments win over
    /// later ones; ties go to the batch added first. Returns `None` and
    /// raises `OutOfStock` if no single batch can take the whole line.
    pub fn allocate(&mut self, line: OrderLine) -> Option<BatchRef> {
        let chosen = self
            .batches
            .iter_mut()
            .filter(|b| b.can_allocate(&line))
            .min_by_key(|b| b.eta());

        let Some(batch) = chosen else {
            self.messages
                .push(Event::out_of_stock(line.sku.clone()).into());
            return None;
        };

        let reference = batch.reference().clone();
        self.messages.push(
            Event::allocated(
                line.orderid.clone(),
                line.sku.clone(),
                line.qty,
                reference.clone(),
            )
            .into(),
        );
        batch.allocate(line);
        self.version_number = self.version_number.next();
        Some(reference)
    }

    /// Changes a batch's purchased quantity.
    ///
    /// When the batch ends up over-allocated, lines are dropped from it one
    /// at a time until it is not. Each dropped line raises `Deallocated` and
    /// an `Allocate` command to place it again.
    pub fn change_batch_quantity(
        &mut self,
        reference: &BatchRef,
        qty: u32,
    ) -> Result<(), DomainError> {
        let batch = self
            .batches
            .iter_mut()
            .find(|b| b.reference() == reference)
            .ok_or_else(|| DomainError::BatchNotFound {
                reference: reference.clone(),
            })?;

        batch.set_purchased_quantity(qty);
        while batch.available_quantity() < 0 {
            let Some(line) = batch.deallocate_one() else {
                break;
            };
            self.messages.push(
                Event::deallocated(line.orderid.clone(), line.sku.clone(), line.qty).into(),
            );
            self.messages
                .push(Command::allocate(line.orderid, line.sku, line.qty).into());
        }
        Ok(())
    }
}

impl Aggregate for Product {
    type Id = Sku;

    fn aggregate_type() -> &'static str {
        "Product"
    }

    fn id(&self) -> &Sku {
        &self.sku
    }

    fn version(&self) -> Version {
        self.version_number
    }

    fn has_pending_messages(&self) -> bool {
        !self.messages.is_empty()
    }

    fn take_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn tomorrow() -> NaiveDate {
        today().checked_add_days(Days::new(1)).unwrap()
    }

    fn later() -> NaiveDate {
        today().checked_add_days(Days::new(10)).unwrap()
    }

    fn available(product: &Product, reference: &str) -> i64 {
        product
            .batch(&BatchRef::new(reference))
            .unwrap()
            .available_quantity()
    }

    #[test]
    fn prefers_warehouse_batches_to_shipments() {
        let in_stock = Batch::new("in-stock-batch", "RETRO-CLOCK", 100, None);
        let shipment = Batch::new("shipment-batch", "RETRO-CLOCK", 100, Some(tomorrow()));
        let mut product = Product::new("RETRO-CLOCK", vec![shipment, in_stock]);

        let allocated = product.allocate(OrderLine::new("oref", "RETRO-CLOCK", 10));

        assert_eq!(allocated, Some(BatchRef::new("in-stock-batch")));
        assert_eq!(available(&product, "in-stock-batch"), 90);
        assert_eq!(available(&product, "shipment-batch"), 100);
    }

    #[test]
    fn prefers_earlier_batches() {
        let earliest = Batch::new("speedy-batch", "MINIMALIST-SPOON", 100, Some(today()));
        let medium = Batch::new("normal-batch", "MINIMALIST-SPOON", 100, Some(tomorrow()));
        let latest = Batch::new("slow-batch", "MINIMALIST-SPOON", 100, Some(later()));
        let mut product = Product::new("MINIMALIST-SPOON", vec![medium, latest, earliest]);

        product.allocate(OrderLine::new("order1", "MINIMALIST-SPOON", 10));

        assert_eq!(available(&product, "speedy-batch"), 90);
        assert_eq!(available(&product, "normal-batch"), 100);
        assert_eq!(available(&product, "slow-batch"), 100);
    }

    #[test]
    fn skips_preferred_batch_that_cannot_hold_the_line() {
        let small = Batch::new("small", "LAMP", 5, None);
        let big = Batch::new("big", "LAMP", 50, Some(today()));
        let mut product = Product::new("LAMP", vec![small, big]);

        let allocated = product.allocate(OrderLine::new("o1", "LAMP", 10));

        assert_eq!(allocated, Some(BatchRef::new("big")));
        assert_eq!(available(&product, "small"), 5);
    }

    #[test]
    fn ties_go_to_the_first_batch_added() {
        let first = Batch::new("first", "LAMP", 10, None);
        let second = Batch::new("second", "LAMP", 10, None);
        let mut product = Product::new("LAMP", vec![first, second]);

        assert_eq!(
            product.allocate(OrderLine::new("o1", "LAMP", 1)),
            Some(BatchRef::new("first"))
        );
    }

    #[test]
    fn line_lands_on_exactly_one_batch() {
        let a = Batch::new("a", "LAMP", 10, None);
        let b = Batch::new("b", "LAMP", 10, Some(today()));
        let mut product = Product::new("LAMP", vec![a, b]);
        let line = OrderLine::new("o1", "LAMP", 3);

        product.allocate(line.clone());

        let holders = product
            .batches()
            .iter()
            .filter(|batch| batch.is_allocated(&line))
            .count();
        assert_eq!(holders, 1);
    }

    #[test]
    fn allocation_raises_allocated_and_bumps_version() {
        let batch = Batch::new("b1", "LAMP", 10, None);
        let mut product = Product::new("LAMP", vec![batch]);

        product.allocate(OrderLine::new("o1", "LAMP", 4));

        assert_eq!(product.version_number(), Version::initial().next());
        assert_eq!(
            product.take_messages(),
            vec![Message::Event(Event::allocated("o1", "LAMP", 4, "b1"))]
        );
    }

    #[test]
    fn records_out_of_stock_event_if_cannot_allocate() {
        let batch = Batch::new("batch1", "SMALL-FORK", 10, Some(today()));
        let mut product = Product::new("SMALL-FORK", vec![batch]);
        product.allocate(OrderLine::new("order1", "SMALL-FORK", 10));
        product.take_messages();

        let allocation = product.allocate(OrderLine::new("order2", "SMALL-FORK", 1));

        assert_eq!(allocation, None);
        assert_eq!(
            product.take_messages(),
            vec![Message::Event(Event::out_of_stock("SMALL-FORK"))]
        );
        assert_eq!(product.version_number(), Version::initial().next());
    }

    #[test]
    fn no_partial_allocation_across_batches() {
        let a = Batch::new("a", "LAMP", 5, None);
        let b = Batch::new("b", "LAMP", 5, None);
        let mut product = Product::new("LAMP", vec![a, b]);

        assert_eq!(product.allocate(OrderLine::new("o1", "LAMP", 8)), None);
        assert_eq!(available(&product, "a"), 5);
        assert_eq!(available(&product, "b"), 5);
    }

    #[test]
    fn shrinking_a_batch_deallocates_and_requests_reallocation() {
        let b1 = Batch::new("b1", "INDIFFERENT-TABLE", 50, None);
        let b2 = Batch::new("b2", "INDIFFERENT-TABLE", 50, Some(today()));
        let mut product = Product::new("INDIFFERENT-TABLE", vec![b1, b2]);
        product.allocate(OrderLine::new("o1", "INDIFFERENT-TABLE", 20));
        product.allocate(OrderLine::new("o2", "INDIFFERENT-TABLE", 20));
        product.take_messages();
        assert_eq!(available(&product, "b1"), 10);

        product
            .change_batch_quantity(&BatchRef::new("b1"), 25)
            .unwrap();

        assert_eq!(available(&product, "b1"), 5);
        let messages = product.take_messages();
        assert_eq!(messages.len(), 2);
        let (Message::Event(Event::Deallocated(dropped)), Message::Command(Command::Allocate(retry))) =
            (&messages[0], &messages[1])
        else {
            panic!("unexpected messages: {messages:?}");
        };
        assert_eq!(dropped.orderid, retry.orderid);
        assert_eq!(retry.qty, 20);
    }

    #[test]
    fn growing_a_batch_raises_nothing() {
        let mut product = Product::new("LAMP", vec![Batch::new("b1", "LAMP", 10, None)]);
        product.allocate(OrderLine::new("o1", "LAMP", 10));
        product.take_messages();

        product
            .change_batch_quantity(&BatchRef::new("b1"), 20)
            .unwrap();

        assert!(!product.has_pending_messages());
        assert_eq!(available(&product, "b1"), 10);
    }

    #[test]
    fn change_quantity_of_unknown_batch_fails() {
        let mut product = Product::new("LAMP", vec![]);
        let err = product
            .change_batch_quantity(&BatchRef::new("nope"), 1)
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::BatchNotFound {
                reference: BatchRef::new("nope")
            }
        );
    }

    #[test]
    fn add_batch_uses_product_sku_and_rejects_duplicates() {
        let mut product = Product::new("LAMP", vec![]);
        product.add_batch("b1", 10, None).unwrap();

        assert_eq!(product.batches()[0].sku(), &Sku::new("LAMP"));
        assert!(matches!(
            product.add_batch("b1", 5, None),
            Err(DomainError::DuplicateBatch { .. })
        ));
    }
}
