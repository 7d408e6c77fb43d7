//! Extension Engine
//!
//! Anti-sniping state machine. A winning bid that lands within the
//! anti-sniping window of `end_at` pushes the deadline out by one window,
//! bounded by the extension cap. State lives entirely in the auction row
//! (`end_at`, `extensions_count`); the invariant
//! `end_at = base_end_at + extensions_count x window` holds at every
//! observation.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

use crate::clock::Clock;
use crate::errors::CoreResult;
use crate::models::Auction;
use crate::store::{AuctionStore, PgTx};

/// Result of an applied extension, for the `extended` broadcast.
#[derive(Debug, Clone, Copy)]
pub struct AppliedExtension {
    pub old_end_at: DateTime<Utc>,
    pub new_end_at: DateTime<Utc>,
    pub extensions_count: i32,
}

/// Decide whether a bid arriving at `now` extends the auction. Pure; the
/// snapshot must have been read under the auction row lock.
pub fn decide(auction: &Auction, now: DateTime<Utc>, system_max: i32) -> Option<DateTime<Utc>> {
    let window = auction.anti_sniping_duration();
    if window.is_zero() {
        return None;
    }
    if auction.end_at - now > window {
        return None;
    }

    let cap = auction.extension_cap(system_max);
    if cap > 0 && auction.extensions_count >= cap {
        return None;
    }

    Some(auction.end_at + window)
}

pub struct ExtensionEngine {
    store: Arc<AuctionStore>,
    clock: Arc<dyn Clock>,
}

impl ExtensionEngine {
    pub fn new(store: Arc<AuctionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Evaluate and, when due, apply an extension inside the caller's
    /// transaction. The update is conditional on the snapshotted `end_at`;
    /// a stale snapshot applies nothing.
    pub async fn apply(
        &self,
        tx: &mut PgTx,
        auction: &Auction,
        triggering_bid_id: i64,
        system_max: i32,
    ) -> CoreResult<Option<AppliedExtension>> {
        let now = self.clock.now();
        let Some(new_end_at) = decide(auction, now, system_max) else {
            return Ok(None);
        };

        let Some(extension) = self
            .store
            .apply_extension(tx, auction.id, auction.end_at, new_end_at, triggering_bid_id, now)
            .await?
        else {
            warn!(
                auction_id = auction.id,
                "extension skipped: end_at moved under our snapshot"
            );
            return Ok(None);
        };

        Ok(Some(AppliedExtension {
            old_end_at: extension.old_end_at,
            new_end_at: extension.new_end_at,
            extensions_count: auction.extensions_count + 1,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuctionStatus;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn auction(minutes_left: i64, extensions: i32, override_cap: Option<i32>) -> (Auction, DateTime<Utc>) {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap();
        let auction = Auction {
            id: 1,
            product_id: 7,
            start_price: dec!(1000),
            bid_step: dec!(50),
            reserve_price: None,
            start_at: now - Duration::hours(1),
            end_at: now + Duration::minutes(minutes_left),
            anti_sniping_minutes: 10,
            status: AuctionStatus::Live,
            extensions_count: extensions,
            max_extensions_override: override_cap,
            created_at: now - Duration::hours(2),
            updated_at: None,
        };
        (auction, now)
    }

    #[test]
    fn late_bid_extends_by_one_window() {
        let (auction, now) = auction(5, 0, None);
        let new_end = decide(&auction, now, 3).unwrap();
        assert_eq!(new_end, auction.end_at + Duration::minutes(10));
        assert_eq!(new_end, now + Duration::minutes(15));
    }

    #[test]
    fn early_bid_does_not_extend() {
        let (auction, now) = auction(11, 0, None);
        assert!(decide(&auction, now, 3).is_none());
    }

    #[test]
    fn boundary_bid_extends() {
        // Exactly at the window edge counts as within it.
        let (auction, now) = auction(10, 0, None);
        assert!(decide(&auction, now, 3).is_some());
    }

    #[test]
    fn cap_reached_blocks_extension() {
        let (auction, now) = auction(5, 3, None);
        assert!(decide(&auction, now, 3).is_none());
    }

    #[test]
    fn zero_cap_means_unlimited() {
        let (auction1, now1) = auction(5, 250, None);
        assert!(decide(&auction1, now1, 0).is_some());

        let (auction2, now2) = auction(5, 250, Some(0));
        assert!(decide(&auction2, now2, 3).is_some());
    }

    #[test]
    fn override_beats_system_cap() {
        let (auction1, now1) = auction(5, 3, Some(5));
        assert!(decide(&auction1, now1, 3).is_some());

        let (auction2, now2) = auction(5, 1, Some(1));
        assert!(decide(&auction2, now2, 3).is_none());
    }

    #[test]
    fn disabled_window_never_extends() {
        let (mut auction, now) = auction(5, 0, None);
        auction.anti_sniping_minutes = 0;
        assert!(decide(&auction, now, 3).is_none());
    }
}
