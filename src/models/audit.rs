//! Audit Models
//!
//! Append-only structured event log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Audit actions recorded by the engine.
pub mod actions {
    pub const AUCTION_STARTED: &str = "AUC.STARTED";
    pub const AUCTION_ENDED_WINNER: &str = "AUC.ENDED_WINNER";
    pub const AUCTION_ENDED_NO_WINNER: &str = "AUC.ENDED_NO_WINNER";
    pub const AUCTION_CANCELLED: &str = "AUC.CANCELLED";
    pub const AUCTION_WINNER_UNPAID: &str = "AUC.WINNER_UNPAID";
    pub const AUCTION_CREATED: &str = "AUC.CREATED";
    pub const BID_REMOVED: &str = "BID.REMOVED";
}

/// Audited entity kinds.
pub mod entities {
    pub const AUCTION: &str = "auction";
    pub const BID: &str = "bid";
}

/// One append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entity_type: String,
    pub entity_id: i64,
    pub action: String,
    /// Acting user; `None` for the system (lifecycle tick).
    pub actor_id: Option<i64>,
    pub reason: Option<String>,
    pub meta: Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn auction(
        auction_id: i64,
        action: &str,
        actor_id: Option<i64>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_type: entities::AUCTION.to_string(),
            entity_id: auction_id,
            action: action.to_string(),
            actor_id,
            reason: None,
            meta: Value::Object(Default::default()),
            created_at,
        }
    }

    pub fn bid(bid_id: i64, action: &str, actor_id: Option<i64>, created_at: DateTime<Utc>) -> Self {
        Self {
            entity_type: entities::BID.to_string(),
            entity_id: bid_id,
            action: action.to_string(),
            actor_id,
            reason: None,
            meta: Value::Object(Default::default()),
            created_at,
        }
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }
}
