use async_trait::async_trait;
use domain::Message;

use crate::{ProductRepository, Result};

/// A transaction over the products touched while handling one message.
///
/// Nothing is persisted until [`commit`](UnitOfWork::commit). Dropping the
/// unit of work without committing rolls back whatever was done since the
/// last commit.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Returns the repository bound to this unit of work.
    fn products(&mut self) -> &mut dyn ProductRepository;

    /// Persists every seen product and drains their pending messages.
    ///
    /// Fails with [`StoreError::ConcurrencyConflict`](crate::StoreError::ConcurrencyConflict)
    /// when another unit of work committed a change to one of the same
    /// products first. May be called more than once; a commit with no new
    /// mutations drains nothing.
    async fn commit(&mut self) -> Result<Vec<Message>>;

    /// Discards uncommitted changes and forgets every seen product.
    async fn rollback(&mut self) -> Result<()>;
}

/// Opens fresh units of work.
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}
