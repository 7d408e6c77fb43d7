//! Bid API Handlers
//!
//! Bid placement for verified users and administrative removal.

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::CoreResult;
use crate::handlers::{AppState, AuthUser};

#[derive(Debug, Deserialize)]
pub struct PlaceBidRequest {
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PlaceBidResponse {
    pub bid_id: i64,
    pub auction_id: i64,
    pub amount: Decimal,
    pub current_price: Decimal,
    pub extended_until: Option<DateTime<Utc>>,
    pub extensions_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RemoveBidRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RemoveBidResponse {
    pub bid_id: i64,
    pub auction_id: i64,
    pub current_price: Decimal,
    pub end_at: DateTime<Utc>,
    pub extensions_count: i32,
}

#[derive(Debug, Deserialize)]
pub struct BulkRemoveRequest {
    pub bid_ids: Vec<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BulkRemoveResponse {
    pub removed: Vec<i64>,
    pub failures: Vec<BulkRemoveFailure>,
}

#[derive(Debug, Serialize)]
pub struct BulkRemoveFailure {
    pub bid_id: i64,
    pub error: String,
}

/// POST /auctions/:id/bid (verified)
pub async fn place_bid(
    State(engine): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(auction_id): Path<i64>,
    Json(request): Json<PlaceBidRequest>,
) -> CoreResult<(StatusCode, Json<PlaceBidResponse>)> {
    let placed = engine
        .bids()
        .place_bid(auction_id, auth.user_id, request.amount)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(PlaceBidResponse {
            bid_id: placed.bid.id,
            auction_id: placed.bid.auction_id,
            amount: placed.bid.amount,
            current_price: placed.current_price,
            extended_until: placed.extended_until,
            extensions_count: placed.extensions_count,
            created_at: placed.bid.created_at,
        }),
    ))
}

/// POST /bids/:id/remove (admin)
pub async fn remove_bid(
    State(engine): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(bid_id): Path<i64>,
    request: Option<Json<RemoveBidRequest>>,
) -> CoreResult<Json<RemoveBidResponse>> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let removed = engine
        .bid_management()
        .remove_bid(bid_id, auth.user_id, request.reason)
        .await?;
    Ok(Json(RemoveBidResponse {
        bid_id: removed.bid.id,
        auction_id: removed.bid.auction_id,
        current_price: removed.current_price,
        end_at: removed.end_at,
        extensions_count: removed.extensions_count,
    }))
}

/// POST /bids/remove-bulk (admin)
pub async fn remove_bids_bulk(
    State(engine): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(request): Json<BulkRemoveRequest>,
) -> CoreResult<Json<BulkRemoveResponse>> {
    let report = engine
        .bid_management()
        .remove_bids_bulk(&request.bid_ids, auth.user_id, request.reason)
        .await?;
    Ok(Json(BulkRemoveResponse {
        removed: report.removed,
        failures: report
            .failures
            .into_iter()
            .map(|failure| BulkRemoveFailure {
                bid_id: failure.bid_id,
                error: failure.error,
            })
            .collect(),
    }))
}
