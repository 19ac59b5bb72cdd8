//! Domain events: facts about allocation decisions.

use common::{BatchRef, OrderId, Sku};
use serde::{Deserialize, Serialize};

/// Events raised by the product aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// No batch could satisfy an order line.
    OutOfStock(OutOfStockData),

    /// An order line was assigned to a batch.
    Allocated(AllocatedData),

    /// An order line was removed from a batch after its quantity shrank.
    Deallocated(DeallocatedData),
}

/// Discriminant of an [`Event`], used to key handler tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    OutOfStock,
    Allocated,
    Deallocated,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::OutOfStock => "OutOfStock",
            EventKind::Allocated => "Allocated",
            EventKind::Deallocated => "Deallocated",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::OutOfStock(_) => EventKind::OutOfStock,
            Event::Allocated(_) => EventKind::Allocated,
            Event::Deallocated(_) => EventKind::Deallocated,
        }
    }

    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        self.kind().name()
    }

    /// Encodes the event's attributes as a flat JSON object, without the
    /// type tag.
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Event::OutOfStock(data) => serde_json::to_value(data),
            Event::Allocated(data) => serde_json::to_value(data),
            Event::Deallocated(data) => serde_json::to_value(data),
        }
    }
}

/// Data for OutOfStock event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutOfStockData {
    pub sku: Sku,
}

/// Data for Allocated event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedData {
    pub orderid: OrderId,
    pub sku: Sku,
    pub qty: u32,

    /// The batch the line landed on.
    pub batchref: BatchRef,
}

/// Data for Deallocated event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeallocatedData {
    pub orderid: OrderId,
    pub sku: Sku,
    pub qty: u32,
}

// Convenience constructors for events
impl Event {
    /// Creates an OutOfStock event.
    pub fn out_of_stock(sku: impl Into<Sku>) -> Self {
        Event::OutOfStock(OutOfStockData { sku: sku.into() })
    }

    /// Creates an Allocated event.
    pub fn allocated(
        orderid: impl Into<OrderId>,
        sku: impl Into<Sku>,
        qty: u32,
        batchref: impl Into<BatchRef>,
    ) -> Self {
        Event::Allocated(AllocatedData {
            orderid: orderid.into(),
            sku: sku.into(),
            qty,
            batchref: batchref.into(),
        })
    }

    /// Creates a Deallocated event.
    pub fn deallocated(orderid: impl Into<OrderId>, sku: impl Into<Sku>, qty: u32) -> Self {
        Event::Deallocated(DeallocatedData {
            orderid: orderid.into(),
            sku: sku.into(),
            qty,
        })
    }
}
