//! Realtime Event Schema
//!
//! Events fan out to subscribers as `{event: <kind>, data: {...}}`. The same
//! payload is framed as a `text/event-stream` block or a single websocket
//! JSON message. Payloads are idempotent; delivery is at-least-once and
//! in-order per client.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Outcome carried by the `ended` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionOutcome {
    Winner,
    ReserveNotMet,
    NoBids,
    Cancelled,
}

impl AuctionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Winner => "winner",
            Self::ReserveNotMet => "reserve_not_met",
            Self::NoBids => "no_bids",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One realtime event. `ts` is Unix seconds.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum AuctionEvent {
    BidPlaced {
        auction_id: i64,
        ts: i64,
        bid_id: i64,
        bidder_name: String,
        amount: Decimal,
        current_price: Decimal,
    },
    Outbid {
        auction_id: i64,
        ts: i64,
        current_price: Decimal,
    },
    Extended {
        auction_id: i64,
        ts: i64,
        old_end_at: DateTime<Utc>,
        new_end_at: DateTime<Utc>,
        extensions_count: i32,
    },
    Ended {
        auction_id: i64,
        ts: i64,
        outcome: AuctionOutcome,
        final_price: Option<Decimal>,
        winner_user_id: Option<i64>,
    },
    BidRemoved {
        auction_id: i64,
        ts: i64,
        bid_id: i64,
        amount: Decimal,
    },
    PriceRecomputed {
        auction_id: i64,
        ts: i64,
        current_price: Decimal,
        end_at: DateTime<Utc>,
        extensions_count: i32,
        reason: String,
    },
    Heartbeat {
        ts: i64,
    },
}

impl AuctionEvent {
    /// Event name used for the SSE `event:` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BidPlaced { .. } => "bid_placed",
            Self::Outbid { .. } => "outbid",
            Self::Extended { .. } => "extended",
            Self::Ended { .. } => "ended",
            Self::BidRemoved { .. } => "bid_removed",
            Self::PriceRecomputed { .. } => "price_recomputed",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }

    /// Compact JSON of the `data` payload alone, for SSE framing.
    pub fn data_json(&self) -> String {
        match serde_json::to_value(self) {
            Ok(value) => value
                .get("data")
                .map(|data| data.to_string())
                .unwrap_or_else(|| "{}".to_string()),
            Err(_) => "{}".to_string(),
        }
    }

    /// Full `{event, data}` JSON, one message per event on the socket
    /// transport.
    pub fn message_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn heartbeat(now: DateTime<Utc>) -> Self {
        Self::Heartbeat {
            ts: now.timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn envelope_shape() {
        let event = AuctionEvent::BidPlaced {
            auction_id: 3,
            ts: 1_717_000_000,
            bid_id: 15,
            bidder_name: "Salem".to_string(),
            amount: dec!(1100),
            current_price: dec!(1100),
        };
        let value: serde_json::Value = serde_json::from_str(&event.message_json()).unwrap();
        assert_eq!(value["event"], "bid_placed");
        assert_eq!(value["data"]["auction_id"], 3);
        assert_eq!(value["data"]["ts"], 1_717_000_000);
        assert!(value["data"]["amount"].is_string() || value["data"]["amount"].is_number());
    }

    #[test]
    fn kind_matches_tag() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap();
        let events = [
            AuctionEvent::Outbid {
                auction_id: 1,
                ts: 0,
                current_price: dec!(1100),
            },
            AuctionEvent::Extended {
                auction_id: 1,
                ts: 0,
                old_end_at: now,
                new_end_at: now + chrono::Duration::minutes(10),
                extensions_count: 1,
            },
            AuctionEvent::Ended {
                auction_id: 1,
                ts: 0,
                outcome: AuctionOutcome::NoBids,
                final_price: None,
                winner_user_id: None,
            },
            AuctionEvent::heartbeat(now),
        ];
        for event in events {
            let value: serde_json::Value = serde_json::from_str(&event.message_json()).unwrap();
            assert_eq!(value["event"], event.kind());
        }
    }

    #[test]
    fn data_json_is_payload_only() {
        let event = AuctionEvent::Heartbeat { ts: 42 };
        let data: serde_json::Value = serde_json::from_str(&event.data_json()).unwrap();
        assert_eq!(data["ts"], 42);
        assert!(data.get("event").is_none());
    }

    #[test]
    fn outcome_strings() {
        assert_eq!(AuctionOutcome::Winner.as_str(), "winner");
        assert_eq!(AuctionOutcome::ReserveNotMet.as_str(), "reserve_not_met");
        assert_eq!(AuctionOutcome::NoBids.as_str(), "no_bids");
        assert_eq!(AuctionOutcome::Cancelled.as_str(), "cancelled");
    }
}
