//! Service layer for the allocation service.
//!
//! This crate wires the domain to the outside world:
//! - [`MessageBus`] dispatches one inbound command or event and everything
//!   it cascades into, breadth first
//! - Command and event handlers, each running in its own unit of work
//! - Adapters for the notifier and the event publisher
//! - [`bootstrap`] builds a bus with the standard handler tables
//!
//! Commands have exactly one handler and their failures abort dispatch.
//! Events have any number of handlers; a failing event handler is logged
//! and the others still run.

pub mod adapters;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod messagebus;

pub use adapters::{
    BroadcastPublisher, EventPublisher, InMemoryNotifier, InMemoryPublisher, LoggingNotifier,
    Notifier, PublishedMessage,
};
pub use bootstrap::{ALLOCATED_CHANNEL, DEFAULT_ALERT_RECIPIENT, Dependencies, bootstrap};
pub use error::{Result, ServiceError};
pub use handlers::{CommandHandler, EventHandler};
pub use messagebus::{MessageBus, MessageBusBuilder};
