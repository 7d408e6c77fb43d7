//! Extension Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An anti-sniping extension applied to an auction by a late winning bid.
/// Created only by the extension engine; deleted only when the triggering
/// bid is removed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuctionExtension {
    pub id: i64,
    pub auction_id: i64,
    pub extended_by_bid_id: i64,
    pub old_end_at: DateTime<Utc>,
    pub new_end_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
