//! Batch entity.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use chrono::NaiveDate;
use common::{BatchRef, Sku};

use super::OrderLine;

/// A purchased lot of stock for one sku.
///
/// Batches are entities: equality and hashing use the reference only, so two
/// in-memory copies of the same batch compare equal whatever their contents.
///
/// Allocation priority is given by [`Batch::eta`]: a batch already in stock
/// (`None`) is preferred over any shipment, and earlier shipments are
/// preferred over later ones. `Option<NaiveDate>` orders `None` first, so the
/// eta can be used directly as a sort key.
#[derive(Debug, Clone)]
pub struct Batch {
    reference: BatchRef,
    sku: Sku,
    purchased_quantity: u32,
    eta: Option<NaiveDate>,
    allocations: HashSet<OrderLine>,
}

impl Batch {
    /// Creates a batch with no allocations.
    pub fn new(
        reference: impl Into<BatchRef>,
        sku: impl Into<Sku>,
        qty: u32,
        eta: Option<NaiveDate>,
    ) -> Self {
        Self {
            reference: reference.into(),
            sku: sku.into(),
            purchased_quantity: qty,
            eta,
            allocations: HashSet::new(),
        }
    }

    /// Rebuilds a batch with previously persisted allocations.
    pub fn with_allocations(
        reference: impl Into<BatchRef>,
        sku: impl Into<Sku>,
        qty: u32,
        eta: Option<NaiveDate>,
        allocations: impl IntoIterator<Item = OrderLine>,
    ) -> Self {
        let mut batch = Self::new(reference, sku, qty, eta);
        batch.allocations.extend(allocations);
        batch
    }

    pub fn reference(&self) -> &BatchRef {
        &self.reference
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn purchased_quantity(&self) -> u32 {
        self.purchased_quantity
    }

    /// Expected arrival date; `None` means the stock is already in the warehouse.
    pub fn eta(&self) -> Option<NaiveDate> {
        self.eta
    }

    /// Returns the order lines allocated to this batch, in no particular order.
    pub fn allocations(&self) -> impl Iterator<Item = &OrderLine> {
        self.allocations.iter()
    }

    /// Returns true if the line is allocated to this batch.
    pub fn is_allocated(&self, line: &OrderLine) -> bool {
        self.allocations.contains(line)
    }

    /// Sum of the quantities of all allocated lines.
    pub fn allocated_quantity(&self) -> i64 {
        self.allocations.iter().map(|line| i64::from(line.qty)).sum()
    }

    /// Purchased minus allocated quantity.
    ///
    /// Negative right after the purchased quantity shrinks below what is
    /// already allocated, until the product deallocates enough lines.
    pub fn available_quantity(&self) -> i64 {
        i64::from(self.purchased_quantity) - self.allocated_quantity()
    }

    /// Returns true if the line is for this batch's sku and fits in what is left.
    pub fn can_allocate(&self, line: &OrderLine) -> bool {
        self.sku == line.sku && self.available_quantity() >= i64::from(line.qty)
    }

    pub(crate) fn allocate(&mut self, line: OrderLine) {
        if self.can_allocate(&line) {
            self.allocations.insert(line);
        }
    }

    /// Removes one allocation. Which one is unspecified.
    pub(crate) fn deallocate_one(&mut self) -> Option<OrderLine> {
        let line = self.allocations.iter().next().cloned()?;
        self.allocations.take(&line)
    }

    pub(crate) fn set_purchased_quantity(&mut self, qty: u32) {
        self.purchased_quantity = qty;
    }
}

impl PartialEq for Batch {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
    }
}

impl Eq for Batch {}

impl Hash for Batch {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.reference.hash(state);
    }
}
