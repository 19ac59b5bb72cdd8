//! Product aggregate and related types.

mod batch;
mod commands;
mod events;
mod message;
mod order_line;
mod product;

pub use batch::Batch;
pub use commands::{Allocate, ChangeBatchQuantity, Command, CommandKind, CreateBatch};
pub use events::{AllocatedData, DeallocatedData, Event, EventKind, OutOfStockData};
pub use message::Message;
pub use order_line::OrderLine;
pub use product::Product;
