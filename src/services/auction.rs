//! Auction Service
//!
//! Admin-facing auction management: creation, listing, detail, cancellation,
//! and the winner-unpaid transition. Lifecycle progression (scheduled to
//! live to ended) belongs to the tick.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::errors::{CoreError, CoreResult, ErrorCode};
use crate::external::notify::{self, templates};
use crate::external::{NotificationSink, ProductCatalog, UserDirectory};
use crate::models::audit::actions;
use crate::models::{
    Auction, AuctionDetail, AuctionStatus, AuditEntry, Bid, ProductStatus,
};
use crate::realtime::{AuctionEvent, AuctionOutcome, Broadcaster};
use crate::services::rate_limit::{RateAction, RateLimiter};
use crate::services::reserve::{self, ReserveStatus};
use crate::settings::SettingsCache;
use crate::store::{AuctionFilter, AuctionStore, NewAuction};

/// Creation input. The initial status is derived from the time window
/// unless `draft` is set.
#[derive(Debug, Clone)]
pub struct CreateAuction {
    pub product_id: i64,
    pub start_price: Decimal,
    pub bid_step: Decimal,
    pub reserve_price: Option<Decimal>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub anti_sniping_minutes: Option<i32>,
    pub max_extensions_override: Option<i32>,
    pub draft: bool,
}

pub struct AuctionService {
    store: Arc<AuctionStore>,
    catalog: Arc<dyn ProductCatalog>,
    users: Arc<dyn UserDirectory>,
    notifications: Arc<dyn NotificationSink>,
    broadcaster: Arc<dyn Broadcaster>,
    rate_limiter: Arc<RateLimiter>,
    settings: Arc<SettingsCache>,
    clock: Arc<dyn Clock>,
}

impl AuctionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<AuctionStore>,
        catalog: Arc<dyn ProductCatalog>,
        users: Arc<dyn UserDirectory>,
        notifications: Arc<dyn NotificationSink>,
        broadcaster: Arc<dyn Broadcaster>,
        rate_limiter: Arc<RateLimiter>,
        settings: Arc<SettingsCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            catalog,
            users,
            notifications,
            broadcaster,
            rate_limiter,
            settings,
            clock,
        }
    }

    pub async fn create_auction(&self, request: CreateAuction, actor_id: i64) -> CoreResult<Auction> {
        self.require_admin(actor_id).await?;

        let settings = self.settings.current();
        let now = self.clock.now();

        if request.start_price < Decimal::ZERO {
            return Err(CoreError::new(
                ErrorCode::InvalidArgument,
                "Start price must not be negative",
            ));
        }
        if request.bid_step <= Decimal::ZERO || !request.bid_step.fract().is_zero() {
            return Err(CoreError::new(
                ErrorCode::InvalidArgument,
                "Bid step must be a positive integer",
            ));
        }
        if request.bid_step < settings.min_bid_step {
            return Err(CoreError::new(
                ErrorCode::AucBidStepTooLow,
                format!("Bid step must be at least {}", settings.min_bid_step),
            ));
        }
        if request.end_at <= request.start_at || request.end_at <= now {
            return Err(CoreError::new(
                ErrorCode::AucInvalidTimeWindow,
                "Auction must end after it starts and in the future",
            ));
        }
        if let Some(reserve) = request.reserve_price {
            if reserve < request.start_price {
                return Err(CoreError::new(
                    ErrorCode::InvalidArgument,
                    "Reserve price must not be below the start price",
                ));
            }
        }
        if let Some(minutes) = request.anti_sniping_minutes {
            if minutes < 0 {
                return Err(CoreError::new(
                    ErrorCode::InvalidArgument,
                    "Anti-sniping minutes must not be negative",
                ));
            }
        }

        let status = if request.draft {
            AuctionStatus::Draft
        } else if request.start_at <= now {
            AuctionStatus::Live
        } else {
            AuctionStatus::Scheduled
        };

        let mut tx = self.store.begin().await?;

        let product = self
            .catalog
            .get(&mut tx, request.product_id)
            .await?
            .ok_or_else(|| {
                CoreError::new(
                    ErrorCode::AucProductNotAvailable,
                    format!("Product {} not found", request.product_id),
                )
            })?;
        if !product.kind.is_auctionable() || product.status != ProductStatus::Available {
            return Err(CoreError::new(
                ErrorCode::AucProductNotAvailable,
                "Product is not available for auction",
            ));
        }

        if status.is_active()
            && self
                .store
                .has_active_auction_for_product(&mut tx, request.product_id)
                .await?
        {
            return Err(CoreError::new(
                ErrorCode::Conflict,
                "Product already has an active auction",
            ));
        }

        let auction = self
            .store
            .insert_auction(
                &mut tx,
                NewAuction {
                    product_id: request.product_id,
                    start_price: request.start_price,
                    bid_step: request.bid_step,
                    reserve_price: request.reserve_price,
                    start_at: request.start_at,
                    end_at: request.end_at,
                    anti_sniping_minutes: request
                        .anti_sniping_minutes
                        .unwrap_or(settings.anti_sniping_minutes as i32),
                    status,
                    max_extensions_override: request.max_extensions_override,
                    created_at: now,
                },
            )
            .await?;

        if status == AuctionStatus::Live {
            self.catalog
                .set_status(&mut tx, product.id, ProductStatus::InAuction, now)
                .await?;
        }

        let entry = AuditEntry::auction(auction.id, actions::AUCTION_CREATED, Some(actor_id), now)
            .with_meta(json!({
                "product_id": product.id,
                "status": status.as_str(),
            }));
        self.store.insert_audit_tx(&mut tx, &entry).await?;

        tx.commit().await?;
        info!(auction_id = auction.id, product_id = product.id, status = status.as_str(), "auction created");
        Ok(auction)
    }

    pub async fn list_auctions(&self, filter: &AuctionFilter) -> CoreResult<Vec<Auction>> {
        self.store.list_auctions(filter).await
    }

    pub async fn auction_detail(&self, auction_id: i64) -> CoreResult<(AuctionDetail, ReserveStatus)> {
        let detail = self
            .store
            .auction_detail(auction_id)
            .await?
            .ok_or_else(|| CoreError::auction_not_found(auction_id))?;
        let status = reserve::evaluate(detail.auction.reserve_price, detail.current_price);
        Ok((detail, status))
    }

    pub async fn reserve_status(&self, auction_id: i64) -> CoreResult<ReserveStatus> {
        let (_, status) = self.auction_detail(auction_id).await?;
        Ok(status)
    }

    /// Bids for an auction, highest first.
    pub async fn bid_history(&self, auction_id: i64) -> CoreResult<Vec<Bid>> {
        if self.store.get_auction(auction_id).await?.is_none() {
            return Err(CoreError::auction_not_found(auction_id));
        }
        self.store.bids_for_auction(auction_id).await
    }

    /// Cancel a scheduled or live auction and release its product.
    pub async fn cancel_auction(
        &self,
        auction_id: i64,
        actor_id: i64,
        reason: Option<String>,
    ) -> CoreResult<Auction> {
        self.require_admin(actor_id).await?;
        self.rate_limiter.check(
            actor_id,
            RateAction::CancelAuction,
            self.settings.current().admin_cancel_rate,
        )?;

        let mut tx = self.store.begin().await?;
        let auction = self
            .store
            .lock_auction(&mut tx, auction_id)
            .await?
            .ok_or_else(|| CoreError::auction_not_found(auction_id))?;
        if !auction.status.is_active() {
            return Err(CoreError::new(
                ErrorCode::AucNewForbiddenState,
                format!("Cannot cancel a {} auction", auction.status.as_str()),
            ));
        }

        let now = self.clock.now();
        self.store
            .transition_status(&mut tx, auction_id, auction.status, AuctionStatus::Cancelled, now)
            .await?;
        self.catalog
            .set_status(&mut tx, auction.product_id, ProductStatus::Available, now)
            .await?;
        let product_title = self
            .catalog
            .get(&mut tx, auction.product_id)
            .await?
            .map(|product| product.title)
            .unwrap_or_default();
        let entry = AuditEntry::auction(auction_id, actions::AUCTION_CANCELLED, Some(actor_id), now)
            .with_reason(reason.clone());
        self.store.insert_audit_tx(&mut tx, &entry).await?;
        tx.commit().await?;

        self.broadcaster.broadcast_to_auction(
            auction_id,
            AuctionEvent::Ended {
                auction_id,
                ts: now.timestamp(),
                outcome: AuctionOutcome::Cancelled,
                final_price: None,
                winner_user_id: None,
            },
        );

        let participants = self
            .store
            .recent_participant_ids(auction_id, auction.created_at)
            .await
            .unwrap_or_else(|err| {
                warn!(auction_id, error = %err, "participant query failed");
                Vec::new()
            });
        let payload =
            notify::cancelled_payload(auction_id, &product_title, reason.as_deref());
        for participant in participants {
            if let Err(err) = self
                .notifications
                .enqueue_internal(participant, templates::AUCTION_CANCELLED, payload.clone())
                .await
            {
                warn!(user_id = participant, error = %err, "cancel notification enqueue failed");
            }
        }

        info!(auction_id, actor_id, "auction cancelled");
        self.store
            .get_auction(auction_id)
            .await?
            .ok_or_else(|| CoreError::auction_not_found(auction_id))
    }

    /// Mark an ended auction's winner as unpaid and release the product.
    pub async fn mark_winner_unpaid(
        &self,
        auction_id: i64,
        actor_id: i64,
        reason: Option<String>,
    ) -> CoreResult<Auction> {
        self.require_admin(actor_id).await?;

        let mut tx = self.store.begin().await?;
        let auction = self
            .store
            .lock_auction(&mut tx, auction_id)
            .await?
            .ok_or_else(|| CoreError::auction_not_found(auction_id))?;
        if auction.status != AuctionStatus::Ended {
            return Err(CoreError::new(
                ErrorCode::AucNewForbiddenState,
                format!(
                    "Only ended auctions can be marked winner-unpaid, not {}",
                    auction.status.as_str()
                ),
            ));
        }

        let now = self.clock.now();
        let snapshot = self.store.close_snapshot(&mut tx, auction_id).await?;
        self.store
            .transition_status(&mut tx, auction_id, AuctionStatus::Ended, AuctionStatus::WinnerUnpaid, now)
            .await?;
        self.catalog
            .set_status(&mut tx, auction.product_id, ProductStatus::Available, now)
            .await?;
        let product_title = self
            .catalog
            .get(&mut tx, auction.product_id)
            .await?
            .map(|product| product.title)
            .unwrap_or_default();
        let entry =
            AuditEntry::auction(auction_id, actions::AUCTION_WINNER_UNPAID, Some(actor_id), now)
                .with_reason(reason);
        self.store.insert_audit_tx(&mut tx, &entry).await?;
        tx.commit().await?;

        if let Some(winner) = snapshot.highest {
            let payload = notify::winner_unpaid_payload(auction_id, &product_title);
            for (kind, result) in [
                (
                    "internal",
                    self.notifications
                        .enqueue_internal(winner.user_id, templates::AUCTION_WINNER_UNPAID, payload.clone())
                        .await,
                ),
                (
                    "email",
                    self.notifications
                        .enqueue_email(winner.user_id, templates::AUCTION_WINNER_UNPAID, payload.clone())
                        .await,
                ),
            ] {
                if let Err(err) = result {
                    warn!(user_id = winner.user_id, kind, error = %err, "winner-unpaid notification enqueue failed");
                }
            }
        }

        info!(auction_id, actor_id, "auction marked winner-unpaid");
        self.store
            .get_auction(auction_id)
            .await?
            .ok_or_else(|| CoreError::auction_not_found(auction_id))
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
