//! Allocations views backing the query side.

pub mod allocations;
pub mod postgres;

pub use allocations::InMemoryAllocationsView;
pub use postgres::PostgresAllocationsView;
