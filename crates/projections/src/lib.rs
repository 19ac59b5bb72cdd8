//! Read side of the allocation service.
//!
//! This crate provides:
//! - [`AllocationsReadModel`] trait: record, remove and list allocations per order
//! - [`Projection`] trait and [`AllocationsProjection`], which keeps a read
//!   model in step with `Allocated` and `Deallocated` events
//! - In-memory and PostgreSQL allocations views

pub mod error;
pub mod projection;
pub mod read_model;
pub mod views;

pub use error::{ProjectionError, Result};
pub use projection::{AllocationsProjection, Projection, ProjectionPosition};
pub use read_model::{AllocationRow, AllocationsReadModel};
pub use views::{InMemoryAllocationsView, PostgresAllocationsView};
