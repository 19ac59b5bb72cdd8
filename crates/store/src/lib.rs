//! Persistence boundary for product aggregates.
//!
//! A [`UnitOfWork`] groups every product read or written while handling one
//! message. Changes are only persisted by [`UnitOfWork::commit`]; dropping a
//! unit of work without committing discards them. Committing hands back the
//! commands and events the touched products raised, oldest first.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod unit_of_work;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryUnitOfWork};
pub use postgres::{PostgresStore, PostgresUnitOfWork};
pub use repository::{ProductRepository, Seen, Tracked};
pub use unit_of_work::{UnitOfWork, UnitOfWorkFactory};
