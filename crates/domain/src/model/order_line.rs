//! Order line value object.

use common::{OrderId, Sku};
use serde::{Deserialize, Serialize};

/// A line of a customer order: some quantity of one sku.
///
/// Order lines are values. Two lines with the same order id, sku and
/// quantity are the same line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderLine {
    /// The order this line belongs to.
    pub orderid: OrderId,

    /// The product being ordered.
    pub sku: Sku,

    /// Number of units ordered.
    pub qty: u32,
}

impl OrderLine {
    /// Creates a new order line.
    pub fn new(orderid: impl Into<OrderId>, sku: impl Into<Sku>, qty: u32) -> Self {
        Self {
            orderid: orderid.into(),
            sku: sku.into(),
            qty,
        }
    }
}
