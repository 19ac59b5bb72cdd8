//! Core aggregate trait.

use std::fmt::Display;
use std::hash::Hash;

use common::Version;

use crate::model::Message;

/// Trait for aggregates that collect outbound messages while they are mutated.
///
/// An aggregate is a cluster of domain objects treated as a single unit of
/// consistency. Methods on the aggregate never perform I/O; instead they
/// buffer the commands and events their mutations imply. The unit of work
/// takes that buffer by value once the transaction has been persisted.
pub trait Aggregate: Send + Sync {
    /// Identity of the aggregate.
    type Id: Clone + Eq + Hash + Display + Send + Sync;

    /// Returns the aggregate type name, used in logs and errors.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's identity.
    fn id(&self) -> &Self::Id;

    /// Returns the optimistic-concurrency token of the aggregate.
    fn version(&self) -> Version;

    /// Returns true if messages are waiting to be drained.
    fn has_pending_messages(&self) -> bool;

    /// Removes and returns every pending message, oldest first.
    fn take_messages(&mut self) -> Vec<Message>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Event, OrderLine, Product};
    use common::Sku;

    fn drain_all<A: Aggregate>(aggregate: &mut A) -> Vec<Message> {
        let mut drained = Vec::new();
        while aggregate.has_pending_messages() {
            drained.extend(aggregate.take_messages());
        }
        drained
    }

    #[test]
    fn take_messages_empties_the_buffer() {
        let mut product = Product::new(Sku::new("LAMP"), vec![]);
        product.allocate(OrderLine::new("o1", "LAMP", 1));
        assert!(product.has_pending_messages());

        let drained = drain_all(&mut product);
        assert_eq!(drained, vec![Message::Event(Event::out_of_stock("LAMP"))]);
        assert!(!product.has_pending_messages());
        assert!(product.take_messages().is_empty());
    }

    #[test]
    fn product_reports_identity_and_type() {
        let product = Product::new(Sku::new("LAMP"), vec![]);
        assert_eq!(Product::aggregate_type(), "Product");
        assert_eq!(product.id(), &Sku::new("LAMP"));
        assert_eq!(Aggregate::version(&product), Version::initial());
    }
}
