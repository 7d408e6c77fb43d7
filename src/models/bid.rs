//! Bid Models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A committed bid. The bidder's display identity is snapshotted at placement
/// so later profile edits do not rewrite history.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Bid {
    pub id: i64,
    pub auction_id: i64,
    pub user_id: i64,
    pub amount: Decimal,
    pub bidder_name: String,
    pub bidder_city: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a bid.
#[derive(Debug, Clone)]
pub struct NewBid {
    pub auction_id: i64,
    pub user_id: i64,
    pub amount: Decimal,
    pub bidder_name: String,
    pub bidder_city: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a successful placement, returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct PlacedBid {
    pub bid: Bid,
    pub current_price: Decimal,
    /// Set when the bid triggered an anti-sniping extension.
    pub extended_until: Option<DateTime<Utc>>,
    pub extensions_count: i32,
}
