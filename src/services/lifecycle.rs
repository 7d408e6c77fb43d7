//! Lifecycle Tick
//!
//! Periodic reconciler: starts scheduled auctions, closes expired ones,
//! decides the outcome reserve-aware, creates the winner order, and fans out
//! notifications. The tick is a singleton per process via an atomic guard
//! and globally via a database advisory lock; both are kept because the
//! in-process guard is cheap and the database lock is the correctness
//! boundary across replicas.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::errors::CoreResult;
use crate::external::notify::{self, templates};
use crate::external::{
    AuditSink, NotificationSink, OrderManager, ProductCatalog, UserDirectory, WinnerOrderRequest,
};
use crate::models::audit::actions;
use crate::models::{Auction, AuctionStatus, AuditEntry, ProductStatus};
use crate::realtime::{AuctionEvent, AuctionOutcome, Broadcaster};
use crate::services::reserve;
use crate::settings::SettingsCache;
use crate::store::{AuctionStore, HighestBid};

/// Advisory lock key for the tick. Must stay distinct from every other
/// advisory lock in the deployment.
pub const TICK_ADVISORY_LOCK_KEY: i64 = 0x41_5543_5449_434b; // "AUCTICK"

/// What one tick did.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickReport {
    pub started: usize,
    pub ended: usize,
    /// True when another tick held the lock and this one did nothing.
    pub skipped: bool,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Decide the outcome of an expired auction.
pub fn decide_outcome(
    bids_count: i64,
    highest_amount: Option<Decimal>,
    reserve_price: Option<Decimal>,
) -> AuctionOutcome {
    if bids_count == 0 {
        return AuctionOutcome::NoBids;
    }
    let current = highest_amount.unwrap_or(Decimal::ZERO);
    if reserve::evaluate(reserve_price, current).met {
        AuctionOutcome::Winner
    } else {
        AuctionOutcome::ReserveNotMet
    }
}

pub struct LifecycleService {
    store: Arc<AuctionStore>,
    catalog: Arc<dyn ProductCatalog>,
    orders: Arc<dyn OrderManager>,
    users: Arc<dyn UserDirectory>,
    notifications: Arc<dyn NotificationSink>,
    audit: Arc<dyn AuditSink>,
    broadcaster: Arc<dyn Broadcaster>,
    settings: Arc<SettingsCache>,
    clock: Arc<dyn Clock>,
    tick_running: AtomicBool,
}

impl LifecycleService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<AuctionStore>,
        catalog: Arc<dyn ProductCatalog>,
        orders: Arc<dyn OrderManager>,
        users: Arc<dyn UserDirectory>,
        notifications: Arc<dyn NotificationSink>,
        audit: Arc<dyn AuditSink>,
        broadcaster: Arc<dyn Broadcaster>,
        settings: Arc<SettingsCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            catalog,
            orders,
            users,
            notifications,
            audit,
            broadcaster,
            settings,
            clock,
            tick_running: AtomicBool::new(false),
        }
    }

    /// One reconciliation pass. Returns without action when another tick is
    /// running in this process or holds the database lock.
    pub async fn tick(&self) -> CoreResult<TickReport> {
        if self.tick_running.swap(true, Ordering::SeqCst) {
            debug!("tick already running in-process, skipping");
            return Ok(TickReport::skipped());
        }
        let result = self.tick_locked().await;
        self.tick_running.store(false, Ordering::SeqCst);
        result
    }

    async fn tick_locked(&self) -> CoreResult<TickReport> {
        let Some(lock) = self.store.try_advisory_lock(TICK_ADVISORY_LOCK_KEY).await? else {
            debug!("tick advisory lock held elsewhere, skipping");
            return Ok(TickReport::skipped());
        };
        let result = self.sweep().await;
        if let Err(err) = lock.release().await {
            warn!(error = %err, "tick advisory unlock failed");
        }
        result
    }

    /// Start everything due, then close everything expired. Per-auction
    /// failures are logged and do not abort the sweep.
    async fn sweep(&self) -> CoreResult<TickReport> {
        let now = self.clock.now();
        let mut report = TickReport::default();

        for auction_id in self.store.due_scheduled(now).await? {
            match self.start_auction(auction_id, now).await {
                Ok(true) => report.started += 1,
                Ok(false) => {}
                Err(err) => error!(auction_id, error = %err, "failed to start auction"),
            }
        }

        for auction_id in self.store.due_live(now).await? {
            match self.close_auction(auction_id, now).await {
                Ok(true) => report.ended += 1,
                Ok(false) => {}
                Err(err) => error!(auction_id, error = %err, "failed to close auction"),
            }
        }

        if report.started > 0 || report.ended > 0 {
            info!(started = report.started, ended = report.ended, "tick finished");
        }
        Ok(report)
    }

    async fn start_auction(&self, auction_id: i64, now: DateTime<Utc>) -> CoreResult<bool> {
        let mut tx = self.store.begin().await?;
        let Some(auction) = self.store.lock_auction(&mut tx, auction_id).await? else {
            return Ok(false);
        };
        // Re-check under the lock; another replica may have won the race.
        if auction.status != AuctionStatus::Scheduled || auction.start_at > now {
            return Ok(false);
        }

        self.store
            .transition_status(&mut tx, auction_id, AuctionStatus::Scheduled, AuctionStatus::Live, now)
            .await?;
        self.catalog
            .set_status(&mut tx, auction.product_id, ProductStatus::InAuction, now)
            .await?;
        let entry = AuditEntry::auction(auction_id, actions::AUCTION_STARTED, None, now);
        self.store.insert_audit_tx(&mut tx, &entry).await?;
        tx.commit().await?;

        info!(auction_id, "auction started");
        Ok(true)
    }

    async fn close_auction(&self, auction_id: i64, now: DateTime<Utc>) -> CoreResult<bool> {
        let mut tx = self.store.begin().await?;
        let Some(auction) = self.store.lock_auction(&mut tx, auction_id).await? else {
            return Ok(false);
        };
        // A bid may have extended the deadline after the scan; re-check
        // under the lock so an extended auction is left running.
        if auction.status != AuctionStatus::Live || auction.end_at > now {
            return Ok(false);
        }

        let snapshot = self.store.close_snapshot(&mut tx, auction_id).await?;
        let outcome = decide_outcome(
            snapshot.bids_count,
            snapshot.highest.map(|highest| highest.amount),
            auction.reserve_price,
        );
        let product_title = self
            .catalog
            .get(&mut tx, auction.product_id)
            .await?
            .map(|product| product.title)
            .unwrap_or_default();

        let product_status = match outcome {
            AuctionOutcome::Winner => ProductStatus::AuctionHold,
            _ => ProductStatus::Available,
        };
        self.store
            .transition_status(&mut tx, auction_id, AuctionStatus::Live, AuctionStatus::Ended, now)
            .await?;
        self.catalog
            .set_status(&mut tx, auction.product_id, product_status, now)
            .await?;
        tx.commit().await?;

        match (outcome, snapshot.highest) {
            (AuctionOutcome::Winner, Some(highest)) => {
                self.finish_winner(&auction, highest, &product_title, now).await;
            }
            (AuctionOutcome::Winner, None) => {
                // decide_outcome only picks a winner when bids exist.
                error!(auction_id, "winner outcome without a highest bid");
            }
            (outcome, highest) => {
                self.finish_no_winner(&auction, outcome, highest, &product_title, now)
                    .await;
            }
        }

        info!(auction_id, outcome = outcome.as_str(), "auction closed");
        Ok(true)
    }

    /// Winner path: order creation, audit, winner notifications, broadcast.
    /// The live-to-ended transition already committed, which is what makes
    /// the order call at-most-once per auction.
    async fn finish_winner(
        &self,
        auction: &Auction,
        highest: HighestBid,
        product_title: &str,
        now: DateTime<Utc>,
    ) {
        let order = self
            .orders
            .create_auction_winner_order(WinnerOrderRequest {
                auction_id: auction.id,
                product_id: auction.product_id,
                winner_user_id: highest.user_id,
                winning_amount: highest.amount,
            })
            .await;

        match order {
            Ok(order) => {
                let entry =
                    AuditEntry::auction(auction.id, actions::AUCTION_ENDED_WINNER, None, now)
                        .with_meta(json!({
                            "winner_user_id": highest.user_id,
                            "winning_amount": highest.amount,
                            "order_id": order.order_id,
                            "invoice_id": order.invoice_id,
                        }));
                if let Err(err) = self.audit.append(entry).await {
                    warn!(auction_id = auction.id, error = %err, "winner audit append failed");
                }

                let settings = self.settings.current();
                let payment_url = format!(
                    "{}/pay/{}?invoice={}",
                    settings.payment_base_url.trim_end_matches('/'),
                    order.order_id,
                    urlencoding::encode(&order.invoice_number),
                );

                match self.users.find(highest.user_id).await {
                    Ok(Some(winner)) => {
                        let payload = notify::winner_payload(
                            auction.id,
                            product_title,
                            highest.amount,
                            order.order_id,
                            order.invoice_id,
                            &order.invoice_number,
                            &payment_url,
                            &winner,
                        );
                        for (kind, result) in [
                            (
                                "internal",
                                self.notifications
                                    .enqueue_internal(
                                        highest.user_id,
                                        templates::AUCTION_ENDED_WINNER,
                                        payload.clone(),
                                    )
                                    .await,
                            ),
                            (
                                "email",
                                self.notifications
                                    .enqueue_email(
                                        highest.user_id,
                                        templates::AUCTION_ENDED_WINNER,
                                        payload.clone(),
                                    )
                                    .await,
                            ),
                        ] {
                            if let Err(err) = result {
                                warn!(
                                    user_id = highest.user_id,
                                    kind,
                                    error = %err,
                                    "winner notification enqueue failed"
                                );
                            }
                        }
                    }
                    Ok(None) => {
                        warn!(user_id = highest.user_id, "winner profile missing, notification skipped")
                    }
                    Err(err) => {
                        warn!(user_id = highest.user_id, error = %err, "winner lookup failed")
                    }
                }
            }
            Err(err) => {
                // The auction is already ended; order creation will not be
                // retried by the tick. Flagged for operator remediation.
                error!(auction_id = auction.id, error = %err, "winner order creation failed");
            }
        }

        self.broadcaster.broadcast_to_auction(
            auction.id,
            AuctionEvent::Ended {
                auction_id: auction.id,
                ts: now.timestamp(),
                outcome: AuctionOutcome::Winner,
                final_price: Some(highest.amount),
                winner_user_id: Some(highest.user_id),
            },
        );
    }

    async fn finish_no_winner(
        &self,
        auction: &Auction,
        outcome: AuctionOutcome,
        highest: Option<HighestBid>,
        product_title: &str,
        now: DateTime<Utc>,
    ) {
        let entry = AuditEntry::auction(auction.id, actions::AUCTION_ENDED_NO_WINNER, None, now)
            .with_meta(json!({ "outcome": outcome.as_str() }));
        if let Err(err) = self.audit.append(entry).await {
            warn!(auction_id = auction.id, error = %err, "no-winner audit append failed");
        }

        if outcome == AuctionOutcome::ReserveNotMet {
            if let Some(highest) = highest {
                let status = reserve::evaluate(auction.reserve_price, highest.amount);
                let payload = notify::reserve_not_met_payload(
                    auction.id,
                    product_title,
                    highest.amount,
                    status.amount_to_reserve,
                );
                if let Err(err) = self
                    .notifications
                    .enqueue_internal(
                        highest.user_id,
                        templates::AUCTION_RESERVE_NOT_MET,
                        payload,
                    )
                    .await
                {
                    warn!(
                        user_id = highest.user_id,
                        error = %err,
                        "reserve-not-met notification enqueue failed"
                    );
                }
            }
        }

        self.broadcaster.broadcast_to_auction(
            auction.id,
            AuctionEvent::Ended {
                auction_id: auction.id,
                ts: now.timestamp(),
                outcome,
                final_price: highest.map(|highest| highest.amount),
                winner_user_id: None,
            },
        );
    }

    /// Tick on an interval until cancelled.
    pub async fn run(self: Arc<Self>, every: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("lifecycle tick stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        // Transient tick errors surface nowhere else.
                        error!(error = %err, "tick failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn winner_when_reserve_met() {
        // S6: reserve 5000, highest bid 5100.
        assert_eq!(
            decide_outcome(3, Some(dec!(5100)), Some(dec!(5000))),
            AuctionOutcome::Winner
        );
    }

    #[test]
    fn reserve_not_met_when_below() {
        // S7: reserve 5000, highest bid 4900.
        assert_eq!(
            decide_outcome(3, Some(dec!(4900)), Some(dec!(5000))),
            AuctionOutcome::ReserveNotMet
        );
    }

    #[test]
    fn winner_without_reserve() {
        assert_eq!(
            decide_outcome(1, Some(dec!(1050)), None),
            AuctionOutcome::Winner
        );
    }

    #[test]
    fn no_bids_beats_reserve_logic() {
        assert_eq!(
            decide_outcome(0, None, Some(dec!(5000))),
            AuctionOutcome::NoBids
        );
        assert_eq!(decide_outcome(0, None, None), AuctionOutcome::NoBids);
    }

    #[test]
    fn reserve_met_exactly_wins() {
        assert_eq!(
            decide_outcome(1, Some(dec!(5000)), Some(dec!(5000))),
            AuctionOutcome::Winner
        );
    }
}
