//! Batch and allocation endpoints.
//!
//! Write endpoints turn the request body into a command and hand it to the
//! message bus. The read endpoint queries the allocations view directly.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::NaiveDate;
use common::OrderId;
use domain::Command;
use projections::{AllocationRow, AllocationsReadModel};
use serde::{Deserialize, Serialize};
use service_layer::MessageBus;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub bus: Arc<MessageBus>,
    pub read_model: Arc<dyn AllocationsReadModel>,
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct AddBatchRequest {
    #[serde(rename = "ref")]
    pub reference: String,
    pub sku: String,
    pub qty: u32,
    #[serde(default)]
    pub eta: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct AllocateRequest {
    pub orderid: String,
    pub sku: String,
    pub qty: u32,
}

#[derive(Debug, Deserialize)]
pub struct ChangeBatchQuantityRequest {
    #[serde(rename = "ref")]
    pub reference: String,
    pub qty: u32,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl StatusResponse {
    fn ok() -> Json<Self> {
        Json(Self { status: "OK" })
    }
}

// -- Handlers --

/// `POST /add_batch`
#[tracing::instrument(skip(state))]
pub async fn add_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddBatchRequest>,
) -> Result<(StatusCode, Json<StatusResponse>), ApiError> {
    let command = Command::create_batch(req.reference, req.sku, req.qty, req.eta);
    state.bus.handle_command(command).await?;
    Ok((StatusCode::CREATED, StatusResponse::ok()))
}

/// `POST /allocate`
///
/// Accepted means the line was handled, not that it was placed: an
/// out-of-stock line is still a 202 and raises an alert instead.
#[tracing::instrument(skip(state))]
pub async fn allocate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AllocateRequest>,
) -> Result<(StatusCode, Json<StatusResponse>), ApiError> {
    let command = Command::allocate(req.orderid, req.sku, req.qty);
    state.bus.handle_command(command).await?;
    Ok((StatusCode::ACCEPTED, StatusResponse::ok()))
}

/// `POST /change_batch_quantity`
#[tracing::instrument(skip(state))]
pub async fn change_batch_quantity(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChangeBatchQuantityRequest>,
) -> Result<(StatusCode, Json<StatusResponse>), ApiError> {
    let command = Command::change_batch_quantity(req.reference, req.qty);
    state.bus.handle_command(command).await?;
    Ok((StatusCode::ACCEPTED, StatusResponse::ok()))
}

/// `GET /allocations/{orderid}`
pub async fn allocations_for(
    State(state): State<Arc<AppState>>,
    Path(orderid): Path<String>,
) -> Result<Json<Vec<AllocationRow>>, ApiError> {
    let orderid = OrderId::new(orderid);
    let rows = state
        .read_model
        .allocations_for(&orderid)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if rows.is_empty() {
        return Err(ApiError::NotFound(format!("No allocations for order {orderid}")));
    }
    Ok(Json(rows))
}
