//! Product repository contract and the identity map behind it.

use std::collections::HashMap;

use async_trait::async_trait;
use common::{BatchRef, Sku};
use domain::{Aggregate, Message, Product};

use crate::Result;

/// Loads and registers products for the current unit of work.
///
/// Every product handed out is tracked as "seen" before the call returns.
/// Asking for the same product twice returns the same in-memory instance.
#[async_trait]
pub trait ProductRepository: Send {
    /// Registers a new product and returns the tracked instance.
    async fn add<'a>(&'a mut self, product: Product) -> Result<&'a mut Product>;

    /// Fetches a product by sku.
    async fn get<'a>(&'a mut self, sku: &Sku) -> Result<Option<&'a mut Product>>;

    /// Fetches the product owning the given batch.
    async fn get_by_batch_reference<'a>(
        &'a mut self,
        reference: &BatchRef,
    ) -> Result<Option<&'a mut Product>>;

    /// Returns the skus of every product seen so far, in first-seen order.
    fn seen(&self) -> Vec<Sku>;
}

/// An aggregate together with the concurrency token it was loaded at.
///
/// `loaded` is `None` for aggregates registered through `add` that have not
/// been committed yet.
#[derive(Debug)]
pub struct Tracked<A> {
    pub aggregate: A,
    pub loaded: Option<i64>,
}

/// Insertion-ordered identity map of the aggregates touched by a unit of work.
pub struct Seen<A: Aggregate> {
    entries: Vec<Tracked<A>>,
    index: HashMap<A::Id, usize>,
}

impl<A: Aggregate> Default for Seen<A> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<A: Aggregate> Seen<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &A::Id) -> bool {
        self.index.contains_key(id)
    }

    pub fn get_mut(&mut self, id: &A::Id) -> Option<&mut A> {
        let position = *self.index.get(id)?;
        self.entries.get_mut(position).map(|t| &mut t.aggregate)
    }

    /// Tracks an aggregate, replacing any instance with the same identity.
    ///
    /// The replaced instance is dropped together with its pending messages,
    /// so it must not have any.
    pub fn insert(&mut self, aggregate: A, loaded: Option<i64>) -> &mut A {
        let id = aggregate.id().clone();
        let tracked = Tracked { aggregate, loaded };
        let position = match self.index.get(&id) {
            Some(&position) => {
                debug_assert!(
                    !self.entries[position].aggregate.has_pending_messages(),
                    "replacing a tracked {} that still has pending messages",
                    A::aggregate_type()
                );
                self.entries[position] = tracked;
                position
            }
            None => {
                self.entries.push(tracked);
                self.index.insert(id, self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[position].aggregate
    }

    /// Returns the identity of the first aggregate matching the predicate.
    pub fn find_id(&self, predicate: impl Fn(&A) -> bool) -> Option<A::Id> {
        self.entries
            .iter()
            .find(|t| predicate(&t.aggregate))
            .map(|t| t.aggregate.id().clone())
    }

    pub fn ids(&self) -> Vec<A::Id> {
        self.entries.iter().map(|t| t.aggregate.id().clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tracked<A>> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Tracked<A>> {
        self.entries.iter_mut()
    }

    /// Forgets every tracked aggregate.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Takes the pending messages of every tracked aggregate until none is left.
    pub fn drain_messages(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while self.entries.iter().any(|t| t.aggregate.has_pending_messages()) {
            for tracked in &mut self.entries {
                messages.extend(tracked.aggregate.take_messages());
            }
        }
        messages
    }
}
