//! Composition root: builds a [`MessageBus`] from its dependencies.

use std::sync::Arc;

use domain::{CommandKind, EventKind};
use projections::{AllocationsProjection, AllocationsReadModel, Projection};
use store::UnitOfWorkFactory;

use crate::adapters::{BroadcastPublisher, EventPublisher, LoggingNotifier, Notifier};
use crate::handlers::{
    AddBatch, Allocate, ChangeBatchQuantity, PublishAllocatedEvent, SendOutOfStockNotification,
    UpdateReadModel,
};
use crate::messagebus::MessageBus;

/// Channel allocation events are published on.
pub const ALLOCATED_CHANNEL: &str = "line_allocated";

/// Recipient of out-of-stock notifications unless configured otherwise.
pub const DEFAULT_ALERT_RECIPIENT: &str = "stock@made.com";

/// Everything the handlers need from the outside world.
#[derive(Clone)]
pub struct Dependencies {
    pub uow: Arc<dyn UnitOfWorkFactory>,
    pub notifier: Arc<dyn Notifier>,
    pub publisher: Arc<dyn EventPublisher>,
    pub read_model: Arc<dyn AllocationsReadModel>,
    pub alert_recipient: String,
}

impl Dependencies {
    /// Dependencies with a logging notifier and a broadcast publisher.
    pub fn new(uow: Arc<dyn UnitOfWorkFactory>, read_model: Arc<dyn AllocationsReadModel>) -> Self {
        Self {
            uow,
            notifier: Arc::new(LoggingNotifier::new()),
            publisher: Arc::new(BroadcastPublisher::default()),
            read_model,
            alert_recipient: DEFAULT_ALERT_RECIPIENT.to_string(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_alert_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.alert_recipient = recipient.into();
        self
    }
}

/// Builds the message bus with the standard handler tables.
///
/// | message              | handlers                                   |
/// |----------------------|--------------------------------------------|
/// | `CreateBatch`        | `AddBatch`                                 |
/// | `Allocate`           | `Allocate`                                 |
/// | `ChangeBatchQuantity`| `ChangeBatchQuantity`                      |
/// | `OutOfStock`         | `SendOutOfStockNotification`               |
/// | `Allocated`          | `PublishAllocatedEvent`, `UpdateReadModel` |
/// | `Deallocated`        | `UpdateReadModel`                          |
pub fn bootstrap(deps: Dependencies) -> MessageBus {
    let projection: Arc<dyn Projection> =
        Arc::new(AllocationsProjection::new(deps.read_model.clone()));
    let update_read_model = Arc::new(UpdateReadModel::new(projection));

    tracing::debug!(alert_recipient = %deps.alert_recipient, "bootstrapping message bus");

    MessageBus::builder()
        .command(CommandKind::CreateBatch, Arc::new(AddBatch::new(deps.uow.clone())))
        .command(CommandKind::Allocate, Arc::new(Allocate::new(deps.uow.clone())))
        .command(
            CommandKind::ChangeBatchQuantity,
            Arc::new(ChangeBatchQuantity::new(deps.uow.clone())),
        )
        .event(
            EventKind::OutOfStock,
            Arc::new(SendOutOfStockNotification::new(
                deps.notifier.clone(),
                deps.alert_recipient.clone(),
            )),
        )
        .event(
            EventKind::Allocated,
            Arc::new(PublishAllocatedEvent::new(
                deps.publisher.clone(),
                ALLOCATED_CHANNEL,
            )),
        )
        .event(EventKind::Allocated, update_read_model.clone())
        .event(EventKind::Deallocated, update_read_model)
        .build()
}
