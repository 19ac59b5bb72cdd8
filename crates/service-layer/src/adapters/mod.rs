//! External collaborators the event handlers talk to.

pub mod notifications;
pub mod publisher;

pub use notifications::{InMemoryNotifier, LoggingNotifier, Notifier};
pub use publisher::{BroadcastPublisher, EventPublisher, InMemoryPublisher, PublishedMessage};
