//! Command and event handlers.
//!
//! Command handlers each open their own unit of work, apply one change to
//! one product and return whatever that product raised. Event handlers talk
//! to the outside world and usually raise nothing.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{Command, DomainError, Event, Message, OrderLine, Product};
use projections::Projection;
use store::UnitOfWorkFactory;

use crate::adapters::{EventPublisher, Notifier};
use crate::error::{Result, ServiceError};

/// Handles one kind of command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Returns the handler name, used in logs.
    fn name(&self) -> &'static str;

    /// Handles the command and returns the messages it produced.
    async fn handle(&self, command: Command) -> Result<Vec<Message>>;
}

/// Handles one or more kinds of event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Returns the handler name, used in logs.
    fn name(&self) -> &'static str;

    /// Handles the event and returns the messages it produced.
    async fn handle(&self, event: &Event) -> Result<Vec<Message>>;
}

fn unexpected(handler: &'static str, message: &'static str) -> ServiceError {
    ServiceError::UnexpectedMessage { handler, message }
}

/// Registers a new batch, creating its product on first sight of the sku.
pub struct AddBatch {
    uow: Arc<dyn UnitOfWorkFactory>,
}

impl AddBatch {
    pub fn new(uow: Arc<dyn UnitOfWorkFactory>) -> Self {
        Self { uow }
    }
}

#[async_trait]
impl CommandHandler for AddBatch {
    fn name(&self) -> &'static str {
        "AddBatch"
    }

    #[tracing::instrument(skip(self, command), fields(handler = "AddBatch"))]
    async fn handle(&self, command: Command) -> Result<Vec<Message>> {
        let command_type = command.command_type();
        let Command::CreateBatch(cmd) = command else {
            return Err(unexpected(self.name(), command_type));
        };

        let mut uow = self.uow.begin().await?;
        {
            let products = uow.products();

            if let Some(owner) = products.get_by_batch_reference(&cmd.reference).await? {
                return Err(DomainError::DuplicateBatch {
                    reference: cmd.reference,
                    sku: owner.sku().clone(),
                }
                .into());
            }

            if products.get(&cmd.sku).await?.is_none() {
                products.add(Product::new(cmd.sku.clone(), vec![])).await?;
            }
            let product = products
                .get(&cmd.sku)
                .await?
                .ok_or_else(|| ServiceError::InvalidSku(cmd.sku.clone()))?;
            product.add_batch(cmd.reference.clone(), cmd.qty, cmd.eta)?;
        }
        let messages = uow.commit().await?;

        tracing::info!(batch = %cmd.reference, sku = %cmd.sku, qty = cmd.qty, "batch added");
        Ok(messages)
    }
}

/// Allocates an order line to the preferred batch of its product.
pub struct Allocate {
    uow: Arc<dyn UnitOfWorkFactory>,
}

impl Allocate {
    pub fn new(uow: Arc<dyn UnitOfWorkFactory>) -> Self {
        Self { uow }
    }
}

#[async_trait]
impl CommandHandler for Allocate {
    fn name(&self) -> &'static str {
        "Allocate"
    }

    #[tracing::instrument(skip(self, command), fields(handler = "Allocate"))]
    async fn handle(&self, command: Command) -> Result<Vec<Message>> {
        let command_type = command.command_type();
        let Command::Allocate(cmd) = command else {
            return Err(unexpected(self.name(), command_type));
        };
        if cmd.qty == 0 {
            return Err(DomainError::InvalidQuantity { quantity: cmd.qty }.into());
        }
        let line = OrderLine::new(cmd.orderid, cmd.sku, cmd.qty);

        let mut uow = self.uow.begin().await?;
        let batchref = {
            let product = uow
                .products()
                .get(&line.sku)
                .await?
                .ok_or_else(|| ServiceError::InvalidSku(line.sku.clone()))?;
            product.allocate(line.clone())
        };
        let messages = uow.commit().await?;

        match &batchref {
            Some(batchref) => {
                metrics::counter!("allocations_total").increment(1);
                tracing::info!(orderid = %line.orderid, sku = %line.sku, %batchref, "line allocated");
            }
            None => {
                metrics::counter!("out_of_stock_total").increment(1);
                tracing::info!(orderid = %line.orderid, sku = %line.sku, "out of stock");
            }
        }
        Ok(messages)
    }
}

/// Changes a batch's purchased quantity, deallocating lines if it shrank too far.
pub struct ChangeBatchQuantity {
    uow: Arc<dyn UnitOfWorkFactory>,
}

impl ChangeBatchQuantity {
    pub fn new(uow: Arc<dyn UnitOfWorkFactory>) -> Self {
        Self { uow }
    }
}

#[async_trait]
impl CommandHandler for ChangeBatchQuantity {
    fn name(&self) -> &'static str {
        "ChangeBatchQuantity"
    }

    #[tracing::instrument(skip(self, command), fields(handler = "ChangeBatchQuantity"))]
    async fn handle(&self, command: Command) -> Result<Vec<Message>> {
        let command_type = command.command_type();
        let Command::ChangeBatchQuantity(cmd) = command else {
            return Err(unexpected(self.name(), command_type));
        };

        let mut uow = self.uow.begin().await?;
        {
            let product = uow
                .products()
                .get_by_batch_reference(&cmd.reference)
                .await?
                .ok_or_else(|| ServiceError::BatchNotFound(cmd.reference.clone()))?;
            product.change_batch_quantity(&cmd.reference, cmd.qty)?;
        }
        let messages = uow.commit().await?;

        let reallocations = messages
            .iter()
            .filter(|m| matches!(m, Message::Command(_)))
            .count();
        tracing::info!(batch = %cmd.reference, qty = cmd.qty, reallocations, "batch quantity changed");
        Ok(messages)
    }
}

/// Tells the stock team a sku ran out.
pub struct SendOutOfStockNotification {
    notifier: Arc<dyn Notifier>,
    recipient: String,
}

impl SendOutOfStockNotification {
    pub fn new(notifier: Arc<dyn Notifier>, recipient: impl Into<String>) -> Self {
        Self {
            notifier,
            recipient: recipient.into(),
        }
    }
}

#[async_trait]
impl EventHandler for SendOutOfStockNotification {
    fn name(&self) -> &'static str {
        "SendOutOfStockNotification"
    }

    async fn handle(&self, event: &Event) -> Result<Vec<Message>> {
        let Event::OutOfStock(data) = event else {
            return Err(unexpected(self.name(), event.event_type()));
        };
        self.notifier
            .send(&self.recipient, &format!("Out of stock for {}", data.sku))
            .await?;
        Ok(Vec::new())
    }
}

/// Forwards allocations to external subscribers.
pub struct PublishAllocatedEvent {
    publisher: Arc<dyn EventPublisher>,
    channel: String,
}

impl PublishAllocatedEvent {
    pub fn new(publisher: Arc<dyn EventPublisher>, channel: impl Into<String>) -> Self {
        Self {
            publisher,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl EventHandler for PublishAllocatedEvent {
    fn name(&self) -> &'static str {
        "PublishAllocatedEvent"
    }

    async fn handle(&self, event: &Event) -> Result<Vec<Message>> {
        if !matches!(event, Event::Allocated(_)) {
            return Err(unexpected(self.name(), event.event_type()));
        }
        self.publisher.publish(&self.channel, event).await?;
        Ok(Vec::new())
    }
}

/// Applies allocation events to the read model.
pub struct UpdateReadModel {
    projection: Arc<dyn Projection>,
}

impl UpdateReadModel {
    pub fn new(projection: Arc<dyn Projection>) -> Self {
        Self { projection }
    }
}

#[async_trait]
impl EventHandler for UpdateReadModel {
    fn name(&self) -> &'static str {
        "UpdateReadModel"
    }

    async fn handle(&self, event: &Event) -> Result<Vec<Message>> {
        self.projection.handle(event).await?;
        Ok(Vec::new())
    }
}
