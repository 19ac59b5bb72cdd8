//! Identifier and version types shared by every crate in the workspace.

pub mod types;

pub use types::{BatchRef, OrderId, Sku, Version};
