//! Auction Models
//!
//! The auction entity, its status graph, and derived-state helpers.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An English-ascending auction over a single product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auction {
    pub id: i64,
    pub product_id: i64,

    // Pricing
    pub start_price: Decimal,
    /// Minimum increment above the current price; a positive integer amount.
    pub bid_step: Decimal,
    /// Hidden minimum acceptable winning price.
    pub reserve_price: Option<Decimal>,

    // Timing
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub anti_sniping_minutes: i32,

    // State
    pub status: AuctionStatus,
    pub extensions_count: i32,
    /// Per-auction cap on anti-sniping extensions; `None` defers to the
    /// system setting, 0 means unlimited.
    pub max_extensions_override: Option<i32>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    Draft,
    Scheduled,
    Live,
    Ended,
    Cancelled,
    WinnerUnpaid,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Live => "live",
            Self::Ended => "ended",
            Self::Cancelled => "cancelled",
            Self::WinnerUnpaid => "winner_unpaid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "scheduled" => Some(Self::Scheduled),
            "live" => Some(Self::Live),
            "ended" => Some(Self::Ended),
            "cancelled" => Some(Self::Cancelled),
            "winner_unpaid" => Some(Self::WinnerUnpaid),
            _ => None,
        }
    }

    /// Statuses reachable from this one.
    pub fn valid_transitions(&self) -> &'static [AuctionStatus] {
        match self {
            Self::Draft => &[Self::Scheduled],
            Self::Scheduled => &[Self::Live, Self::Cancelled],
            Self::Live => &[Self::Ended, Self::Cancelled],
            Self::Ended => &[Self::WinnerUnpaid],
            Self::Cancelled => &[],
            Self::WinnerUnpaid => &[],
        }
    }

    pub fn can_transition_to(&self, next: AuctionStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Counts toward the one-active-auction-per-product constraint.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Live)
    }
}

impl Auction {
    pub fn anti_sniping_duration(&self) -> Duration {
        Duration::minutes(self.anti_sniping_minutes as i64)
    }

    /// Originally scheduled end, before any anti-sniping extensions.
    pub fn base_end_at(&self) -> DateTime<Utc> {
        self.end_at - self.anti_sniping_duration() * self.extensions_count
    }

    /// Extension cap in effect: the override if set, else the system value.
    /// 0 means unlimited.
    pub fn extension_cap(&self, system_max: i32) -> i32 {
        self.max_extensions_override.unwrap_or(system_max)
    }

    /// Lowest acceptable next bid given the current price base.
    pub fn required_minimum(&self, current_max: Option<Decimal>) -> Decimal {
        current_max.unwrap_or(self.start_price) + self.bid_step
    }

    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        self.end_at - now
    }

    pub fn is_open_for_bids(&self, now: DateTime<Utc>) -> bool {
        self.status == AuctionStatus::Live && now <= self.end_at
    }
}

/// Read model for the detail view and close decisions.
#[derive(Debug, Clone, Serialize)]
pub struct AuctionDetail {
    pub auction: Auction,
    pub bids_count: i64,
    pub current_price: Decimal,
    pub highest_bidder_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn auction(status: AuctionStatus, extensions: i32) -> Auction {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap();
        Auction {
            id: 1,
            product_id: 7,
            start_price: dec!(1000),
            bid_step: dec!(50),
            reserve_price: None,
            start_at: start,
            end_at: start + Duration::hours(2) + Duration::minutes(10 * extensions as i64),
            anti_sniping_minutes: 10,
            status,
            extensions_count: extensions,
            max_extensions_override: None,
            created_at: start,
            updated_at: None,
        }
    }

    #[test]
    fn transition_graph() {
        use AuctionStatus::*;
        assert!(Draft.can_transition_to(Scheduled));
        assert!(Scheduled.can_transition_to(Live));
        assert!(Scheduled.can_transition_to(Cancelled));
        assert!(Live.can_transition_to(Ended));
        assert!(Live.can_transition_to(Cancelled));
        assert!(Ended.can_transition_to(WinnerUnpaid));

        assert!(!Draft.can_transition_to(Live));
        assert!(!Ended.can_transition_to(Live));
        assert!(!Cancelled.can_transition_to(Scheduled));
        assert!(!WinnerUnpaid.can_transition_to(Ended));
        assert!(!Live.can_transition_to(Scheduled));
    }

    #[test]
    fn status_round_trips() {
        for status in [
            AuctionStatus::Draft,
            AuctionStatus::Scheduled,
            AuctionStatus::Live,
            AuctionStatus::Ended,
            AuctionStatus::Cancelled,
            AuctionStatus::WinnerUnpaid,
        ] {
            assert_eq!(AuctionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AuctionStatus::parse("paused"), None);
    }

    #[test]
    fn base_end_reverses_extensions() {
        let a = auction(AuctionStatus::Live, 3);
        assert_eq!(a.base_end_at() + Duration::minutes(30), a.end_at);

        let fresh = auction(AuctionStatus::Live, 0);
        assert_eq!(fresh.base_end_at(), fresh.end_at);
    }

    #[test]
    fn required_minimum_uses_start_price_for_first_bid() {
        let a = auction(AuctionStatus::Live, 0);
        assert_eq!(a.required_minimum(None), dec!(1050));
        assert_eq!(a.required_minimum(Some(dec!(1100))), dec!(1150));
    }

    #[test]
    fn extension_cap_override_wins() {
        let mut a = auction(AuctionStatus::Live, 0);
        assert_eq!(a.extension_cap(3), 3);
        a.max_extensions_override = Some(5);
        assert_eq!(a.extension_cap(3), 5);
        a.max_extensions_override = Some(0);
        assert_eq!(a.extension_cap(3), 0);
    }

    #[test]
    fn open_for_bids_window() {
        let a = auction(AuctionStatus::Live, 0);
        assert!(a.is_open_for_bids(a.end_at - Duration::seconds(1)));
        assert!(a.is_open_for_bids(a.end_at));
        assert!(!a.is_open_for_bids(a.end_at + Duration::seconds(1)));
        let scheduled = auction(AuctionStatus::Scheduled, 0);
        assert!(!scheduled.is_open_for_bids(scheduled.start_at));
    }
}
