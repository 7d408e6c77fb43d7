//! Auction API Handlers
//!
//! Creation, listing, detail, cancellation, winner-unpaid, and reserve
//! status. The reserve price itself never appears in responses; only the
//! reserve-status projection does.

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, CoreResult, ErrorCode};
use crate::handlers::{AppState, AuthUser};
use crate::models::{Auction, AuctionStatus};
use crate::services::auction::CreateAuction;
use crate::services::reserve::ReserveStatus;
use crate::store::AuctionFilter;

#[derive(Debug, Deserialize)]
pub struct AuctionQuery {
    pub status: Option<String>,
    pub product_id: Option<i64>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAuctionRequest {
    pub product_id: i64,
    pub start_price: Decimal,
    pub bid_step: Decimal,
    pub reserve_price: Option<Decimal>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub anti_sniping_minutes: Option<i32>,
    pub max_extensions_override: Option<i32>,
    #[serde(default)]
    pub draft: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct AdminActionRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuctionResponse {
    pub id: i64,
    pub product_id: i64,
    pub status: AuctionStatus,
    pub start_price: Decimal,
    pub bid_step: Decimal,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub anti_sniping_minutes: i32,
    pub extensions_count: i32,
    pub created_at: DateTime<Utc>,
}

impl From<Auction> for AuctionResponse {
    fn from(auction: Auction) -> Self {
        Self {
            id: auction.id,
            product_id: auction.product_id,
            status: auction.status,
            start_price: auction.start_price,
            bid_step: auction.bid_step,
            start_at: auction.start_at,
            end_at: auction.end_at,
            anti_sniping_minutes: auction.anti_sniping_minutes,
            extensions_count: auction.extensions_count,
            created_at: auction.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuctionListResponse {
    pub auctions: Vec<AuctionResponse>,
}

#[derive(Debug, Serialize)]
pub struct AuctionDetailResponse {
    #[serde(flatten)]
    pub auction: AuctionResponse,
    pub bids_count: i64,
    pub current_price: Decimal,
    pub required_minimum: Decimal,
    pub time_remaining_secs: Option<i64>,
    pub reserve: ReserveStatus,
    pub bids: Vec<BidEntry>,
}

/// One row of the bid history, newest-highest first.
#[derive(Debug, Serialize)]
pub struct BidEntry {
    pub bid_id: i64,
    pub bidder_name: String,
    pub bidder_city: Option<String>,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// POST /auctions (admin)
pub async fn create_auction(
    State(engine): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(request): Json<CreateAuctionRequest>,
) -> CoreResult<(StatusCode, Json<AuctionResponse>)> {
    let auction = engine
        .auctions()
        .create_auction(
            CreateAuction {
                product_id: request.product_id,
                start_price: request.start_price,
                bid_step: request.bid_step,
                reserve_price: request.reserve_price,
                start_at: request.start_at,
                end_at: request.end_at,
                anti_sniping_minutes: request.anti_sniping_minutes,
                max_extensions_override: request.max_extensions_override,
                draft: request.draft,
            },
            auth.user_id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(auction.into())))
}

/// GET /auctions
pub async fn list_auctions(
    State(engine): State<AppState>,
    Query(query): Query<AuctionQuery>,
) -> CoreResult<Json<AuctionListResponse>> {
    let status = query
        .status
        .as_deref()
        .map(|raw| {
            AuctionStatus::parse(raw).ok_or_else(|| {
                CoreError::new(
                    ErrorCode::InvalidArgument,
                    format!("Unknown auction status {raw:?}"),
                )
            })
        })
        .transpose()?;

    let per_page = query.per_page.unwrap_or(50).clamp(1, 200);
    let page = query.page.unwrap_or(1).max(1);
    let filter = AuctionFilter {
        status,
        product_id: query.product_id,
        limit: Some(per_page),
        offset: Some((page - 1) * per_page),
    };

    let auctions = engine.auctions().list_auctions(&filter).await?;
    Ok(Json(AuctionListResponse {
        auctions: auctions.into_iter().map(Into::into).collect(),
    }))
}

/// GET /auctions/:id
pub async fn get_auction(
    State(engine): State<AppState>,
    Path(auction_id): Path<i64>,
) -> CoreResult<Json<AuctionDetailResponse>> {
    let (detail, reserve) = engine.auctions().auction_detail(auction_id).await?;
    let bids = engine.auctions().bid_history(auction_id).await?;
    let now = engine.clock().now();
    let time_remaining_secs = if detail.auction.is_open_for_bids(now) {
        Some(detail.auction.time_remaining(now).num_seconds().max(0))
    } else {
        None
    };
    let required_minimum = detail.current_price + detail.auction.bid_step;

    Ok(Json(AuctionDetailResponse {
        auction: detail.auction.into(),
        bids_count: detail.bids_count,
        current_price: detail.current_price,
        required_minimum,
        time_remaining_secs,
        reserve,
        bids: bids
            .into_iter()
            .map(|bid| BidEntry {
                bid_id: bid.id,
                bidder_name: bid.bidder_name,
                bidder_city: bid.bidder_city,
                amount: bid.amount,
                created_at: bid.created_at,
            })
            .collect(),
    }))
}

/// GET /auctions/:id/reserve-status
pub async fn reserve_status(
    State(engine): State<AppState>,
    Path(auction_id): Path<i64>,
) -> CoreResult<Json<ReserveStatus>> {
    Ok(Json(engine.auctions().reserve_status(auction_id).await?))
}

/// POST /auctions/:id/cancel (admin)
pub async fn cancel_auction(
    State(engine): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(auction_id): Path<i64>,
    request: Option<Json<AdminActionRequest>>,
) -> CoreResult<Json<AuctionResponse>> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let auction = engine
        .auctions()
        .cancel_auction(auction_id, auth.user_id, request.reason)
        .await?;
    Ok(Json(auction.into()))
}

/// POST /auctions/:id/mark-winner-unpaid (admin)
pub async fn mark_winner_unpaid(
    State(engine): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(auction_id): Path<i64>,
    request: Option<Json<AdminActionRequest>>,
) -> CoreResult<Json<AuctionResponse>> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let auction = engine
        .auctions()
        .mark_winner_unpaid(auction_id, auth.user_id, request.reason)
        .await?;
    Ok(Json(auction.into()))
}
