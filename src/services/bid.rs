//! Bid Service
//!
//! Validates and commits a single bid under serializable semantics, invoking
//! the extension engine under the same auction row lock. Post-commit fan-out
//! (broadcast, outbid notifications) is best-effort and never rolls the
//! committed bid back.

use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::errors::{CoreError, CoreResult, ErrorCode};
use crate::external::{NotificationSink, ProductCatalog, UserDirectory};
use crate::external::notify::{self, templates};
use crate::models::{Auction, NewBid, PlacedBid};
use crate::realtime::{AuctionEvent, Broadcaster};
use crate::services::extension::ExtensionEngine;
use crate::services::rate_limit::{RateAction, RateLimiter};
use crate::settings::SettingsCache;
use crate::store::AuctionStore;

/// Validate an offered amount against the price base and step. `base` is the
/// highest committed bid, or the start price when there are none. Decimal
/// arithmetic is exact; no tolerance.
pub fn validate_amount(base: Decimal, bid_step: Decimal, amount: Decimal) -> CoreResult<()> {
    let minimum = base + bid_step;
    if amount < minimum {
        return Err(CoreError::new(
            ErrorCode::BidBelowMinimum,
            format!("Bid must be at least {minimum}"),
        )
        .with_details(json!({ "required_minimum": minimum })));
    }
    if (amount - base) % bid_step != Decimal::ZERO {
        return Err(CoreError::new(
            ErrorCode::BidNotMultipleOfStep,
            format!("Bid must exceed {base} by a multiple of {bid_step}"),
        )
        .with_details(json!({ "base": base, "bid_step": bid_step })));
    }
    Ok(())
}

pub struct BidService {
    store: Arc<AuctionStore>,
    users: Arc<dyn UserDirectory>,
    catalog: Arc<dyn ProductCatalog>,
    notifications: Arc<dyn NotificationSink>,
    broadcaster: Arc<dyn Broadcaster>,
    rate_limiter: Arc<RateLimiter>,
    settings: Arc<SettingsCache>,
    extensions: Arc<ExtensionEngine>,
    clock: Arc<dyn Clock>,
}

impl BidService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<AuctionStore>,
        users: Arc<dyn UserDirectory>,
        catalog: Arc<dyn ProductCatalog>,
        notifications: Arc<dyn NotificationSink>,
        broadcaster: Arc<dyn Broadcaster>,
        rate_limiter: Arc<RateLimiter>,
        settings: Arc<SettingsCache>,
        extensions: Arc<ExtensionEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            users,
            catalog,
            notifications,
            broadcaster,
            rate_limiter,
            settings,
            extensions,
            clock,
        }
    }

    /// Place a bid. Preconditions are checked in order: bidder eligibility,
    /// rate cap, auction state under the row lock, then amount rules.
    pub async fn place_bid(
        &self,
        auction_id: i64,
        user_id: i64,
        amount: Decimal,
    ) -> CoreResult<PlacedBid> {
        let bidder = self
            .users
            .find(user_id)
            .await?
            .ok_or_else(CoreError::unauthenticated)?;
        if !bidder.can_bid() {
            return Err(CoreError::new(
                ErrorCode::BidVerifiedRequired,
                "Bidding requires a verified account",
            ));
        }

        let settings = self.settings.current();
        self.rate_limiter
            .check(user_id, RateAction::PlaceBid, settings.bid_rate)?;

        let mut tx = self.store.begin().await?;

        let auction = self
            .store
            .lock_auction(&mut tx, auction_id)
            .await?
            .ok_or_else(|| CoreError::auction_not_found(auction_id))?;
        let now = self.clock.now();
        self.check_open(&auction)?;
        if now > auction.end_at {
            return Err(CoreError::new(
                ErrorCode::AucElapsed,
                "Auction deadline has passed",
            ));
        }

        let current_max = self.store.max_bid_amount(&mut tx, auction_id).await?;
        let base = current_max.unwrap_or(auction.start_price);
        validate_amount(base, auction.bid_step, amount)?;

        let bid = self
            .store
            .insert_bid(
                &mut tx,
                NewBid {
                    auction_id,
                    user_id,
                    amount,
                    bidder_name: bidder.name.clone(),
                    bidder_city: bidder.city.clone(),
                    created_at: now,
                },
            )
            .await?;

        let applied = self
            .extensions
            .apply(&mut tx, &auction, bid.id, settings.max_extensions)
            .await?;

        let product_title = self
            .catalog
            .get(&mut tx, auction.product_id)
            .await?
            .map(|product| product.title)
            .unwrap_or_default();

        tx.commit().await?;

        info!(
            auction_id,
            bid_id = bid.id,
            %amount,
            extended = applied.is_some(),
            "bid committed"
        );

        let placed = PlacedBid {
            bid: bid.clone(),
            current_price: amount,
            extended_until: applied.map(|ext| ext.new_end_at),
            extensions_count: applied
                .map(|ext| ext.extensions_count)
                .unwrap_or(auction.extensions_count),
        };

        self.fan_out(&auction, &placed, &product_title).await;

        Ok(placed)
    }

    fn check_open(&self, auction: &Auction) -> CoreResult<()> {
        use crate::models::AuctionStatus;
        if auction.status != AuctionStatus::Live {
            return Err(CoreError::new(
                ErrorCode::AucNotLive,
                format!("Auction is {}", auction.status.as_str()),
            ));
        }
        Ok(())
    }

    /// Post-commit broadcast and notifications. Failures are logged, never
    /// surfaced: the bid is already committed.
    async fn fan_out(&self, auction: &Auction, placed: &PlacedBid, product_title: &str) {
        let bid = &placed.bid;
        let ts = bid.created_at.timestamp();

        self.broadcaster.broadcast_to_auction(
            auction.id,
            AuctionEvent::BidPlaced {
                auction_id: auction.id,
                ts,
                bid_id: bid.id,
                bidder_name: bid.bidder_name.clone(),
                amount: bid.amount,
                current_price: placed.current_price,
            },
        );

        if let Some(new_end_at) = placed.extended_until {
            self.broadcaster.broadcast_to_auction(
                auction.id,
                AuctionEvent::Extended {
                    auction_id: auction.id,
                    ts,
                    old_end_at: auction.end_at,
                    new_end_at,
                    extensions_count: placed.extensions_count,
                },
            );
        }

        let outbid = match self
            .store
            .outbid_user_ids(auction.id, bid.amount, bid.user_id)
            .await
        {
            Ok(user_ids) => user_ids,
            Err(err) => {
                warn!(auction_id = auction.id, error = %err, "outbid set query failed");
                return;
            }
        };
        if outbid.is_empty() {
            return;
        }

        self.broadcaster.broadcast_to_users(
            auction.id,
            &outbid,
            AuctionEvent::Outbid {
                auction_id: auction.id,
                ts,
                current_price: placed.current_price,
            },
        );

        let payload = notify::outbid_payload(auction.id, product_title, placed.current_price);
        for outbid_user in outbid {
            if let Err(err) = self
                .notifications
                .enqueue_internal(outbid_user, templates::BID_OUTBID, payload.clone())
                .await
            {
                warn!(user_id = outbid_user, error = %err, "outbid notification enqueue failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn first_bid_minimum_is_start_price_plus_step() {
        // S1: start 1000, step 50.
        assert!(validate_amount(dec!(1000), dec!(50), dec!(1050)).is_ok());
        let err = validate_amount(dec!(1000), dec!(50), dec!(1049)).unwrap_err();
        assert_eq!(err.code, ErrorCode::BidBelowMinimum);
        assert_eq!(
            err.details.unwrap()["required_minimum"],
            serde_json::json!("1050")
        );
    }

    #[test]
    fn follow_up_bid_builds_on_current_max() {
        assert!(validate_amount(dec!(1050), dec!(50), dec!(1100)).is_ok());
        assert!(validate_amount(dec!(1050), dec!(50), dec!(1200)).is_ok());
        assert!(validate_amount(dec!(1050), dec!(50), dec!(1060)).is_err());
    }

    #[test]
    fn off_step_amount_rejected() {
        // S2: 1075 is above the minimum but not on a 50 step from 1000.
        let err = validate_amount(dec!(1000), dec!(50), dec!(1075)).unwrap_err();
        assert_eq!(err.code, ErrorCode::BidNotMultipleOfStep);
    }

    #[test]
    fn step_check_is_exact_for_cents() {
        assert!(validate_amount(dec!(100.00), dec!(0.50), dec!(100.50)).is_ok());
        assert!(validate_amount(dec!(100.00), dec!(0.50), dec!(101.25)).is_err());
        assert!(validate_amount(dec!(100.00), dec!(0.50), dec!(102.00)).is_ok());
    }
}
