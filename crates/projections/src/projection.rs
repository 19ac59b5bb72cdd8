//! Core projection trait and position tracking.

use std::sync::Arc;

use async_trait::async_trait;
use domain::Event;
use tokio::sync::RwLock;

use crate::Result;
use crate::read_model::AllocationsReadModel;

/// Tracks how many events a projection has processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    /// Number of events processed by this projection.
    pub events_processed: u64,
}

impl ProjectionPosition {
    /// Creates a new position at zero.
    pub fn zero() -> Self {
        Self {
            events_processed: 0,
        }
    }

    /// Advances the position by one event.
    pub fn advance(&self) -> Self {
        Self {
            events_processed: self.events_processed + 1,
        }
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.events_processed)
    }
}

/// A projection that applies domain events to a read model.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection.
    fn name(&self) -> &'static str;

    /// Handles a single event, updating the projection's read model.
    ///
    /// Events the projection does not care about are skipped but still
    /// advance the position.
    async fn handle(&self, event: &Event) -> Result<()>;

    /// Returns the current position of this projection.
    async fn position(&self) -> ProjectionPosition;
}

/// Keeps an [`AllocationsReadModel`] in step with allocation events.
pub struct AllocationsProjection {
    view: Arc<dyn AllocationsReadModel>,
    position: RwLock<ProjectionPosition>,
}

impl AllocationsProjection {
    pub fn new(view: Arc<dyn AllocationsReadModel>) -> Self {
        Self {
            view,
            position: RwLock::new(ProjectionPosition::zero()),
        }
    }
}

#[async_trait]
impl Projection for AllocationsProjection {
    fn name(&self) -> &'static str {
        "AllocationsProjection"
    }

    #[tracing::instrument(skip(self, event), fields(event_type = event.event_type()))]
    async fn handle(&self, event: &Event) -> Result<()> {
        match event {
            Event::Allocated(data) => {
                self.view
                    .add_allocation(&data.orderid, &data.sku, &data.batchref)
                    .await?;
            }
            Event::Deallocated(data) => {
                self.view.remove_allocation(&data.orderid, &data.sku).await?;
            }
            Event::OutOfStock(_) => {}
        }

        metrics::counter!("projections_events_processed").increment(1);
        let mut pos = self.position.write().await;
        *pos = pos.advance();

        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        *self.position.read().await
    }
}
