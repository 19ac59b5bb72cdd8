//! Domain layer for the allocation service.
//!
//! This crate provides:
//! - The `Product` aggregate and its `Batch` entities with the allocation rules
//! - `OrderLine` value object
//! - `Command`, `Event` and the `Message` union that the message bus dispatches
//! - `Aggregate` trait used by the store to track and drain aggregates

pub mod aggregate;
pub mod error;
pub mod model;

pub use aggregate::Aggregate;
pub use common::{BatchRef, OrderId, Sku, Version};
pub use error::DomainError;
pub use model::{
    Allocate, AllocatedData, Batch, ChangeBatchQuantity, Command, CommandKind, CreateBatch,
    DeallocatedData, Event, EventKind, Message, OrderLine, OutOfStockData, Product,
};
