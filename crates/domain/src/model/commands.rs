//! Commands: requests to change the state of the system.

use chrono::NaiveDate;
use common::{BatchRef, OrderId, Sku};
use serde::{Deserialize, Serialize};

/// Command to register a newly purchased batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBatch {
    /// Reference of the new batch.
    #[serde(rename = "ref")]
    pub reference: BatchRef,

    /// Sku the batch contains.
    pub sku: Sku,

    /// Purchased quantity.
    pub qty: u32,

    /// Expected arrival; `None` if already in stock.
    #[serde(default)]
    pub eta: Option<NaiveDate>,
}

/// Command to allocate an order line to a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocate {
    pub orderid: OrderId,
    pub sku: Sku,
    pub qty: u32,
}

/// Command to change the purchased quantity of an existing batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBatchQuantity {
    #[serde(rename = "ref")]
    pub reference: BatchRef,
    pub qty: u32,
}

/// Commands handled by the message bus.
///
/// Each command has exactly one handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Command {
    CreateBatch(CreateBatch),
    Allocate(Allocate),
    ChangeBatchQuantity(ChangeBatchQuantity),
}

/// Discriminant of a [`Command`], used to key handler tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    CreateBatch,
    Allocate,
    ChangeBatchQuantity,
}

impl Command {
    /// Returns the kind of this command.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::CreateBatch(_) => CommandKind::CreateBatch,
            Command::Allocate(_) => CommandKind::Allocate,
            Command::ChangeBatchQuantity(_) => CommandKind::ChangeBatchQuantity,
        }
    }

    /// Returns the command type name.
    pub fn command_type(&self) -> &'static str {
        self.kind().name()
    }
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::CreateBatch => "CreateBatch",
            CommandKind::Allocate => "Allocate",
            CommandKind::ChangeBatchQuantity => "ChangeBatchQuantity",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// Convenience constructors
impl Command {
    /// Creates a CreateBatch command.
    pub fn create_batch(
        reference: impl Into<BatchRef>,
        sku: impl Into<Sku>,
        qty: u32,
        eta: Option<NaiveDate>,
    ) -> Self {
        Command::CreateBatch(CreateBatch {
            reference: reference.into(),
            sku: sku.into(),
            qty,
            eta,
        })
    }

    /// Creates an Allocate command.
    pub fn allocate(orderid: impl Into<OrderId>, sku: impl Into<Sku>, qty: u32) -> Self {
        Command::Allocate(Allocate {
            orderid: orderid.into(),
            sku: sku.into(),
            qty,
        })
    }

    /// Creates a ChangeBatchQuantity command.
    pub fn change_batch_quantity(reference: impl Into<BatchRef>, qty: u32) -> Self {
        Command::ChangeBatchQuantity(ChangeBatchQuantity {
            reference: reference.into(),
            qty,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_kind() {
        assert_eq!(
            Command::create_batch("b1", "LAMP", 10, None).kind(),
            CommandKind::CreateBatch
        );
        assert_eq!(
            Command::allocate("o1", "LAMP", 1).command_type(),
            "Allocate"
        );
        assert_eq!(
            Command::change_batch_quantity("b1", 5).kind(),
            CommandKind::ChangeBatchQuantity
        );
    }

    #[test]
    fn create_batch_uses_ref_field_name() {
        let json = serde_json::json!({"ref": "b1", "sku": "LAMP", "qty": 10});
        let cmd: CreateBatch = serde_json::from_value(json).unwrap();
        assert_eq!(cmd.reference, BatchRef::new("b1"));
        assert_eq!(cmd.eta, None);
    }
}
