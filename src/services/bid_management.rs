//! Bid Management
//!
//! Administrative bid removal, single and bulk, with cascading extension
//! rollback. Removing a bid deletes the extensions it triggered and
//! recomputes the auction's current price, `end_at`, and extension count
//! from the invariant `end_at = base_end_at + extensions x window`.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::errors::{CoreError, CoreResult, ErrorCode};
use crate::external::notify::{self, templates};
use crate::external::{NotificationSink, UserDirectory};
use crate::models::audit::actions;
use crate::models::{AuditEntry, AuctionStatus, Bid};
use crate::realtime::{AuctionEvent, Broadcaster};
use crate::services::rate_limit::{RateAction, RateLimiter};
use crate::settings::SettingsCache;
use crate::store::AuctionStore;

/// How far back a bidder counts as a recent watcher of the auction.
const WATCHER_WINDOW_HOURS: i64 = 24;

/// `end_at` after a removal: strip the old extensions from the recorded end
/// to recover the scheduled base, then re-apply the surviving ones.
pub fn recomputed_end(
    old_end_at: DateTime<Utc>,
    old_extensions: i32,
    remaining_extensions: i32,
    window: Duration,
) -> DateTime<Utc> {
    let base_end_at = old_end_at - window * old_extensions;
    base_end_at + window * remaining_extensions
}

/// Recomputed auction state after one removal.
#[derive(Debug, Clone)]
pub struct RemovedBid {
    pub bid: Bid,
    pub current_price: Decimal,
    pub end_at: DateTime<Utc>,
    pub extensions_count: i32,
    pub top_bidder_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct BulkRemovalFailure {
    pub bid_id: i64,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct BulkRemovalReport {
    pub removed: Vec<i64>,
    pub failures: Vec<BulkRemovalFailure>,
}

pub struct BidManagementService {
    store: Arc<AuctionStore>,
    users: Arc<dyn UserDirectory>,
    notifications: Arc<dyn NotificationSink>,
    broadcaster: Arc<dyn Broadcaster>,
    rate_limiter: Arc<RateLimiter>,
    settings: Arc<SettingsCache>,
    clock: Arc<dyn Clock>,
}

impl BidManagementService {
    pub fn new(
        store: Arc<AuctionStore>,
        users: Arc<dyn UserDirectory>,
        notifications: Arc<dyn NotificationSink>,
        broadcaster: Arc<dyn Broadcaster>,
        rate_limiter: Arc<RateLimiter>,
        settings: Arc<SettingsCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            users,
            notifications,
            broadcaster,
            rate_limiter,
            settings,
            clock,
        }
    }

    /// Remove one bid. Broadcasts `bid_removed` then `price_recomputed`, in
    /// that order, and notifies the removed bidder, later bidders, and
    /// recent watchers.
    pub async fn remove_bid(
        &self,
        bid_id: i64,
        actor_id: i64,
        reason: Option<String>,
    ) -> CoreResult<RemovedBid> {
        self.require_admin(actor_id).await?;
        self.rate_limiter.check(
            actor_id,
            RateAction::RemoveBid,
            self.settings.current().admin_remove_rate,
        )?;

        let removed = self.remove_one(bid_id, actor_id, reason.as_deref()).await?;
        let auction_id = removed.bid.auction_id;

        self.broadcast_removal(&removed, "bid_removed");
        self.notify_removed_bidder(&removed, reason.as_deref()).await;
        self.notify_price_change(&removed).await;

        info!(bid_id, auction_id, actor_id, "bid removed");
        Ok(removed)
    }

    /// Remove a batch. Per-bid failures are collected, not fatal; one
    /// `price_recomputed` is broadcast per affected auction.
    pub async fn remove_bids_bulk(
        &self,
        bid_ids: &[i64],
        actor_id: i64,
        reason: Option<String>,
    ) -> CoreResult<BulkRemovalReport> {
        self.require_admin(actor_id).await?;
        self.rate_limiter.check(
            actor_id,
            RateAction::BulkRemoveBids,
            self.settings.current().admin_bulk_remove_rate,
        )?;

        let mut report = BulkRemovalReport::default();
        let mut final_states: HashMap<i64, RemovedBid> = HashMap::new();

        for &bid_id in bid_ids {
            match self.remove_one(bid_id, actor_id, reason.as_deref()).await {
                Ok(removed) => {
                    let ts = self.clock.now().timestamp();
                    self.broadcaster.broadcast_to_auction(
                        removed.bid.auction_id,
                        AuctionEvent::BidRemoved {
                            auction_id: removed.bid.auction_id,
                            ts,
                            bid_id: removed.bid.id,
                            amount: removed.bid.amount,
                        },
                    );
                    self.notify_removed_bidder(&removed, reason.as_deref()).await;
                    report.removed.push(bid_id);
                    final_states.insert(removed.bid.auction_id, removed);
                }
                Err(err) => {
                    warn!(bid_id, error = %err, "bulk removal: bid skipped");
                    report.failures.push(BulkRemovalFailure {
                        bid_id,
                        error: err.message.clone(),
                    });
                }
            }
        }

        for (auction_id, state) in &final_states {
            self.broadcaster.broadcast_to_auction(
                *auction_id,
                AuctionEvent::PriceRecomputed {
                    auction_id: *auction_id,
                    ts: self.clock.now().timestamp(),
                    current_price: state.current_price,
                    end_at: state.end_at,
                    extensions_count: state.extensions_count,
                    reason: "bulk_bid_removal".to_string(),
                },
            );
        }

        info!(
            requested = bid_ids.len(),
            removed = report.removed.len(),
            failed = report.failures.len(),
            actor_id,
            "bulk bid removal finished"
        );
        Ok(report)
    }

    /// One removal transaction: lock, gate, cascade, recompute, audit.
    async fn remove_one(
        &self,
        bid_id: i64,
        actor_id: i64,
        reason: Option<&str>,
    ) -> CoreResult<RemovedBid> {
        let mut tx = self.store.begin().await?;

        let bid = self
            .store
            .get_bid(&mut tx, bid_id)
            .await?
            .ok_or_else(|| CoreError::new(ErrorCode::BidNotFound, format!("Bid {bid_id} not found")))?;
        let auction = self
            .store
            .lock_auction(&mut tx, bid.auction_id)
            .await?
            .ok_or_else(|| CoreError::auction_not_found(bid.auction_id))?;

        if !matches!(auction.status, AuctionStatus::Live | AuctionStatus::Ended) {
            return Err(CoreError::new(
                ErrorCode::AucNewForbiddenState,
                format!(
                    "Bids cannot be removed while the auction is {}",
                    auction.status.as_str()
                ),
            ));
        }

        let extensions_removed = self.store.delete_extensions_for_bid(&mut tx, bid_id).await?;
        self.store.delete_bid(&mut tx, bid_id).await?;

        let now = self.clock.now();
        let snapshot = self.store.close_snapshot(&mut tx, auction.id).await?;
        let current_price = snapshot
            .highest
            .map(|highest| highest.amount)
            .unwrap_or(auction.start_price);

        let remaining = self.store.count_extensions(&mut tx, auction.id).await? as i32;
        let end_at = recomputed_end(
            auction.end_at,
            auction.extensions_count,
            remaining,
            auction.anti_sniping_duration(),
        );
        self.store
            .set_auction_schedule(&mut tx, auction.id, end_at, remaining, now)
            .await?;

        let entry = AuditEntry::bid(bid_id, actions::BID_REMOVED, Some(actor_id), now)
            .with_reason(reason.map(str::to_string))
            .with_meta(json!({
                "auction_id": auction.id,
                "amount": bid.amount,
                "extensions_removed": extensions_removed,
                "current_price": current_price,
                "end_at": end_at,
            }));
        self.store.insert_audit_tx(&mut tx, &entry).await?;

        tx.commit().await?;

        Ok(RemovedBid {
            bid,
            current_price,
            end_at,
            extensions_count: remaining,
            top_bidder_id: snapshot.highest.map(|highest| highest.user_id),
        })
    }

    fn broadcast_removal(&self, removed: &RemovedBid, reason: &str) {
        let auction_id = removed.bid.auction_id;
        let ts = self.clock.now().timestamp();
        self.broadcaster.broadcast_to_auction(
            auction_id,
            AuctionEvent::BidRemoved {
                auction_id,
                ts,
                bid_id: removed.bid.id,
                amount: removed.bid.amount,
            },
        );
        self.broadcaster.broadcast_to_auction(
            auction_id,
            AuctionEvent::PriceRecomputed {
                auction_id,
                ts,
                current_price: removed.current_price,
                end_at: removed.end_at,
                extensions_count: removed.extensions_count,
                reason: reason.to_string(),
            },
        );
    }

    async fn notify_removed_bidder(&self, removed: &RemovedBid, reason: Option<&str>) {
        let payload = notify::bid_removed_payload(
            removed.bid.auction_id,
            removed.bid.id,
            removed.bid.amount,
            reason,
        );
        let user_id = removed.bid.user_id;
        if let Err(err) = self
            .notifications
            .enqueue_internal(user_id, templates::BID_REMOVED, payload.clone())
            .await
        {
            warn!(user_id, error = %err, "removed-bid notification enqueue failed");
        }
        if let Err(err) = self
            .notifications
            .enqueue_email(user_id, templates::BID_REMOVED, payload)
            .await
        {
            warn!(user_id, error = %err, "removed-bid email enqueue failed");
        }
    }

    /// Price-changed fan-out: bidders who bid after the removed bid, plus
    /// recent watchers. The current top bidder keeps their standing and is
    /// not notified.
    async fn notify_price_change(&self, removed: &RemovedBid) {
        let auction_id = removed.bid.auction_id;
        let payload =
            notify::price_changed_payload(auction_id, removed.current_price, "bid_removed");

        let later = match self
            .store
            .bidder_ids_after(auction_id, removed.bid.created_at, removed.bid.user_id)
            .await
        {
            Ok(user_ids) => user_ids,
            Err(err) => {
                warn!(auction_id, error = %err, "later-bidder query failed");
                return;
            }
        };

        let since = self.clock.now() - Duration::hours(WATCHER_WINDOW_HOURS);
        let watchers = match self.store.recent_participant_ids(auction_id, since).await {
            Ok(user_ids) => user_ids,
            Err(err) => {
                warn!(auction_id, error = %err, "recent-watcher query failed");
                Vec::new()
            }
        };

        let mut targets = later.clone();
        for watcher in watchers {
            if watcher != removed.bid.user_id
                && Some(watcher) != removed.top_bidder_id
                && !targets.contains(&watcher)
            {
                targets.push(watcher);
            }
        }

        for target in targets {
            if let Err(err) = self
                .notifications
                .enqueue_internal(target, templates::AUCTION_PRICE_CHANGED, payload.clone())
                .await
            {
                warn!(user_id = target, error = %err, "price-change notification enqueue failed");
            }
        }
    }

    async fn require_admin(&self, actor_id: i64) -> CoreResult<()> {
        let actor = self
            .users
            .find(actor_id)
            .await?
            .ok_or_else(CoreError::unauthenticated)?;
        if !actor.is_admin() {
            return Err(CoreError::forbidden("Administrator role required"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn removal_rolls_back_extension_time() {
        // S5: one extension of 10 minutes was applied; removing its bid
        // returns end_at to the scheduled base.
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap();
        let old_end = base + Duration::minutes(10);
        assert_eq!(recomputed_end(old_end, 1, 0, Duration::minutes(10)), base);
    }

    #[test]
    fn removal_keeps_surviving_extensions() {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap();
        let old_end = base + Duration::minutes(30);
        assert_eq!(
            recomputed_end(old_end, 3, 2, Duration::minutes(10)),
            base + Duration::minutes(20)
        );
    }

    #[test]
    fn no_extensions_is_identity() {
        let end = Utc.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap();
        assert_eq!(recomputed_end(end, 0, 0, Duration::minutes(10)), end);
    }
}
