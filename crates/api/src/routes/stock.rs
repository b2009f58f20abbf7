//! Stock inspection and restocking endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ItemId;
use domain::StockRecord;
use serde::{Deserialize, Serialize};

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct SetStockRequest {
    pub available_quantity: i64,
}

#[derive(Serialize)]
pub struct StockResponse {
    pub item_id: i64,
    pub available_quantity: u32,
    pub last_updated: String,
}

impl From<StockRecord> for StockResponse {
    fn from(record: StockRecord) -> Self {
        Self {
            item_id: record.item_id.as_i64(),
            available_quantity: record.available,
            last_updated: record.last_updated.to_rfc3339(),
        }
    }
}

/// GET /stock/:item_id
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<String>,
) -> Result<Json<StockResponse>, ApiError> {
    let item_id = ItemId::new(parse_id("item", &item_id)?);
    let record = state.stock.get_stock(item_id).await?;
    Ok(Json(record.into()))
}

/// PUT /stock/:item_id: overwrite the available quantity.
#[tracing::instrument(skip(state, req))]
pub async fn set(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<String>,
    Json(req): Json<SetStockRequest>,
) -> Result<Json<StockResponse>, ApiError> {
    let item_id = ItemId::new(parse_id("item", &item_id)?);
    let record = state
        .stock
        .set_stock(item_id, req.available_quantity)
        .await?;
    Ok(Json(record.into()))
}
