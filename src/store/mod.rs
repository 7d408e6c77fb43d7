//! Auction Store
//!
//! Persistence over PostgreSQL. The store owns the auction, bid, extension,
//! and audit entities. The auction row is the serialization point for the
//! bid path: callers lock it with `lock_auction` as the first statement of
//! their transaction and perform every dependent read and write under that
//! lock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::errors::{CoreError, CoreResult, ErrorCode};
use crate::models::{Auction, AuctionDetail, AuctionExtension, AuctionStatus, AuditEntry, Bid, NewBid};

/// Engine transaction alias.
pub type PgTx = Transaction<'static, Postgres>;

const AUCTION_COLUMNS: &str = "id, product_id, start_price, bid_step, reserve_price, start_at, \
     end_at, anti_sniping_minutes, status, extensions_count, max_extensions_override, \
     created_at, updated_at";

const BID_COLUMNS: &str = "id, auction_id, user_id, amount, bidder_name, bidder_city, created_at";

const INSERT_AUDIT_SQL: &str = "INSERT INTO audit_logs \
     (entity_type, entity_id, action, actor_id, reason, meta, created_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7)";

/// Insert payload for an auction.
#[derive(Debug, Clone)]
pub struct NewAuction {
    pub product_id: i64,
    pub start_price: Decimal,
    pub bid_step: Decimal,
    pub reserve_price: Option<Decimal>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub anti_sniping_minutes: i32,
    pub status: AuctionStatus,
    pub max_extensions_override: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Listing filter for auctions.
#[derive(Debug, Clone, Default)]
pub struct AuctionFilter {
    pub status: Option<AuctionStatus>,
    pub product_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Close-decision snapshot read under the auction row lock.
#[derive(Debug, Clone, Copy)]
pub struct CloseSnapshot {
    pub bids_count: i64,
    pub highest: Option<HighestBid>,
}

#[derive(Debug, Clone, Copy)]
pub struct HighestBid {
    pub user_id: i64,
    pub amount: Decimal,
}

pub struct AuctionStore {
    pool: PgPool,
}

impl AuctionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> CoreResult<PgTx> {
        Ok(self.pool.begin().await?)
    }

    // ---- auctions ----

    pub async fn insert_auction(&self, tx: &mut PgTx, new: NewAuction) -> CoreResult<Auction> {
        let sql = format!(
            "INSERT INTO auctions (product_id, start_price, bid_step, reserve_price, start_at, \
             end_at, anti_sniping_minutes, status, max_extensions_override, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {AUCTION_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(new.product_id)
            .bind(new.start_price)
            .bind(new.bid_step)
            .bind(new.reserve_price)
            .bind(new.start_at)
            .bind(new.end_at)
            .bind(new.anti_sniping_minutes)
            .bind(new.status.as_str())
            .bind(new.max_extensions_override)
            .bind(new.created_at)
            .fetch_one(&mut **tx)
            .await?;
        auction_from_row(&row)
    }

    pub async fn get_auction(&self, auction_id: i64) -> CoreResult<Option<Auction>> {
        let sql = format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(auction_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(auction_from_row).transpose()
    }

    pub async fn list_auctions(&self, filter: &AuctionFilter) -> CoreResult<Vec<Auction>> {
        let mut sql = format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE TRUE");
        let mut idx = 0u32;
        if filter.status.is_some() {
            idx += 1;
            sql.push_str(&format!(" AND status = ${idx}"));
        }
        if filter.product_id.is_some() {
            idx += 1;
            sql.push_str(&format!(" AND product_id = ${idx}"));
        }
        sql.push_str(&format!(
            " ORDER BY end_at ASC, id ASC LIMIT ${} OFFSET ${}",
            idx + 1,
            idx + 2
        ));

        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(product_id) = filter.product_id {
            query = query.bind(product_id);
        }
        let rows = query
            .bind(filter.limit.unwrap_or(50))
            .bind(filter.offset.unwrap_or(0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(auction_from_row).collect()
    }

    /// Detail read model: the auction plus bid count, current price, and the
    /// highest bidder.
    pub async fn auction_detail(&self, auction_id: i64) -> CoreResult<Option<AuctionDetail>> {
        let Some(auction) = self.get_auction(auction_id).await? else {
            return Ok(None);
        };

        let stats = sqlx::query(
            "SELECT COUNT(*) AS bids_count, MAX(amount) AS max_amount FROM bids \
             WHERE auction_id = $1",
        )
        .bind(auction_id)
        .fetch_one(&self.pool)
        .await?;
        let bids_count: i64 = stats.try_get("bids_count")?;
        let max_amount: Option<Decimal> = stats.try_get("max_amount")?;

        let highest_bidder_id: Option<i64> = sqlx::query_scalar(
            "SELECT user_id FROM bids WHERE auction_id = $1 \
             ORDER BY amount DESC, created_at ASC LIMIT 1",
        )
        .bind(auction_id)
        .fetch_optional(&self.pool)
        .await?;

        let current_price = max_amount.unwrap_or(auction.start_price);
        Ok(Some(AuctionDetail {
            auction,
            bids_count,
            current_price,
            highest_bidder_id,
        }))
    }

    /// Exclusive row lock on the auction; first statement of the bid path.
    pub async fn lock_auction(
        &self,
        tx: &mut PgTx,
        auction_id: i64,
    ) -> CoreResult<Option<Auction>> {
        let sql = format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(auction_id)
            .fetch_optional(&mut **tx)
            .await?;
        row.as_ref().map(auction_from_row).transpose()
    }

    /// Guarded status transition; returns false when the row was not in
    /// `from` anymore.
    pub async fn transition_status(
        &self,
        tx: &mut PgTx,
        auction_id: i64,
        from: AuctionStatus,
        to: AuctionStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let result =
            sqlx::query("UPDATE auctions SET status = $3, updated_at = $4 WHERE id = $1 AND status = $2")
                .bind(auction_id)
                .bind(from.as_str())
                .bind(to.as_str())
                .bind(now)
                .execute(&mut **tx)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Rewrite the extension-derived schedule after a bid removal.
    pub async fn set_auction_schedule(
        &self,
        tx: &mut PgTx,
        auction_id: i64,
        end_at: DateTime<Utc>,
        extensions_count: i32,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        sqlx::query(
            "UPDATE auctions SET end_at = $2, extensions_count = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(auction_id)
        .bind(end_at)
        .bind(extensions_count)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Auctions due to go live.
    pub async fn due_scheduled(&self, now: DateTime<Utc>) -> CoreResult<Vec<i64>> {
        Ok(sqlx::query_scalar(
            "SELECT id FROM auctions WHERE status = 'scheduled' AND start_at <= $1 ORDER BY start_at",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Live auctions past their deadline.
    pub async fn due_live(&self, now: DateTime<Utc>) -> CoreResult<Vec<i64>> {
        Ok(sqlx::query_scalar(
            "SELECT id FROM auctions WHERE status = 'live' AND end_at <= $1 ORDER BY end_at",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Whether the product already has a scheduled or live auction. The
    /// partial unique index is the authoritative guard; this read serves the
    /// friendlier error.
    pub async fn has_active_auction_for_product(
        &self,
        tx: &mut PgTx,
        product_id: i64,
    ) -> CoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM auctions WHERE product_id = $1 \
             AND status IN ('scheduled', 'live'))",
        )
        .bind(product_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(exists)
    }

    // ---- bids ----

    pub async fn max_bid_amount(
        &self,
        tx: &mut PgTx,
        auction_id: i64,
    ) -> CoreResult<Option<Decimal>> {
        Ok(
            sqlx::query_scalar("SELECT MAX(amount) FROM bids WHERE auction_id = $1")
                .bind(auction_id)
                .fetch_one(&mut **tx)
                .await?,
        )
    }

    pub async fn insert_bid(&self, tx: &mut PgTx, new: NewBid) -> CoreResult<Bid> {
        let sql = format!(
            "INSERT INTO bids (auction_id, user_id, amount, bidder_name, bidder_city, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {BID_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Bid>(&sql)
            .bind(new.auction_id)
            .bind(new.user_id)
            .bind(new.amount)
            .bind(new.bidder_name)
            .bind(new.bidder_city)
            .bind(new.created_at)
            .fetch_one(&mut **tx)
            .await?)
    }

    pub async fn get_bid(&self, tx: &mut PgTx, bid_id: i64) -> CoreResult<Option<Bid>> {
        let sql = format!("SELECT {BID_COLUMNS} FROM bids WHERE id = $1");
        Ok(sqlx::query_as::<_, Bid>(&sql)
            .bind(bid_id)
            .fetch_optional(&mut **tx)
            .await?)
    }

    pub async fn bids_for_auction(&self, auction_id: i64) -> CoreResult<Vec<Bid>> {
        let sql = format!(
            "SELECT {BID_COLUMNS} FROM bids WHERE auction_id = $1 \
             ORDER BY amount DESC, created_at DESC"
        );
        Ok(sqlx::query_as::<_, Bid>(&sql)
            .bind(auction_id)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn delete_bid(&self, tx: &mut PgTx, bid_id: i64) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM bids WHERE id = $1")
            .bind(bid_id)
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() != 1 {
            return Err(CoreError::new(
                ErrorCode::BidNotFound,
                format!("Bid {bid_id} not found"),
            ));
        }
        Ok(())
    }

    /// Distinct prior bidders strictly below `amount`, excluding the placer.
    pub async fn outbid_user_ids(
        &self,
        auction_id: i64,
        amount: Decimal,
        exclude_user_id: i64,
    ) -> CoreResult<Vec<i64>> {
        Ok(sqlx::query_scalar(
            "SELECT DISTINCT user_id FROM bids WHERE auction_id = $1 \
             AND amount < $2 AND user_id <> $3",
        )
        .bind(auction_id)
        .bind(amount)
        .bind(exclude_user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Distinct bidders whose bids landed after the given instant.
    pub async fn bidder_ids_after(
        &self,
        auction_id: i64,
        after: DateTime<Utc>,
        exclude_user_id: i64,
    ) -> CoreResult<Vec<i64>> {
        Ok(sqlx::query_scalar(
            "SELECT DISTINCT user_id FROM bids WHERE auction_id = $1 \
             AND created_at > $2 AND user_id <> $3",
        )
        .bind(auction_id)
        .bind(after)
        .bind(exclude_user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Distinct bidders active since the given instant.
    pub async fn recent_participant_ids(
        &self,
        auction_id: i64,
        since: DateTime<Utc>,
    ) -> CoreResult<Vec<i64>> {
        Ok(sqlx::query_scalar(
            "SELECT DISTINCT user_id FROM bids WHERE auction_id = $1 AND created_at >= $2",
        )
        .bind(auction_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Bid count and highest bid, read under the caller's lock.
    pub async fn close_snapshot(
        &self,
        tx: &mut PgTx,
        auction_id: i64,
    ) -> CoreResult<CloseSnapshot> {
        let bids_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM bids WHERE auction_id = $1")
                .bind(auction_id)
                .fetch_one(&mut **tx)
                .await?;

        let highest = sqlx::query(
            "SELECT user_id, amount FROM bids WHERE auction_id = $1 \
             ORDER BY amount DESC, created_at ASC LIMIT 1",
        )
        .bind(auction_id)
        .fetch_optional(&mut **tx)
        .await?
        .map(|row| -> CoreResult<HighestBid> {
            Ok(HighestBid {
                user_id: row.try_get("user_id")?,
                amount: row.try_get("amount")?,
            })
        })
        .transpose()?;

        Ok(CloseSnapshot {
            bids_count,
            highest,
        })
    }

    // ---- extensions ----

    /// Conditionally push `end_at` out and record the extension. The
    /// `WHERE end_at = $expected` guard detects concurrent modification;
    /// under the row lock it only fails if the snapshot went stale, in which
    /// case nothing is written and `None` is returned.
    pub async fn apply_extension(
        &self,
        tx: &mut PgTx,
        auction_id: i64,
        expected_end_at: DateTime<Utc>,
        new_end_at: DateTime<Utc>,
        extended_by_bid_id: i64,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<AuctionExtension>> {
        let result = sqlx::query(
            "UPDATE auctions SET end_at = $3, extensions_count = extensions_count + 1, \
             updated_at = $4 WHERE id = $1 AND end_at = $2",
        )
        .bind(auction_id)
        .bind(expected_end_at)
        .bind(new_end_at)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() != 1 {
            return Ok(None);
        }

        let extension = sqlx::query_as::<_, AuctionExtension>(
            "INSERT INTO auction_extensions \
             (auction_id, extended_by_bid_id, old_end_at, new_end_at, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, auction_id, extended_by_bid_id, old_end_at, new_end_at, created_at",
        )
        .bind(auction_id)
        .bind(extended_by_bid_id)
        .bind(expected_end_at)
        .bind(new_end_at)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;
        Ok(Some(extension))
    }

    pub async fn delete_extensions_for_bid(
        &self,
        tx: &mut PgTx,
        bid_id: i64,
    ) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM auction_extensions WHERE extended_by_bid_id = $1")
            .bind(bid_id)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_extensions(&self, tx: &mut PgTx, auction_id: i64) -> CoreResult<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM auction_extensions WHERE auction_id = $1")
                .bind(auction_id)
                .fetch_one(&mut **tx)
                .await?,
        )
    }

    // ---- audit ----

    pub async fn insert_audit(&self, entry: &AuditEntry) -> CoreResult<()> {
        sqlx::query(INSERT_AUDIT_SQL)
            .bind(&entry.entity_type)
            .bind(entry.entity_id)
            .bind(&entry.action)
            .bind(entry.actor_id)
            .bind(&entry.reason)
            .bind(&entry.meta)
            .bind(entry.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_audit_tx(&self, tx: &mut PgTx, entry: &AuditEntry) -> CoreResult<()> {
        sqlx::query(INSERT_AUDIT_SQL)
            .bind(&entry.entity_type)
            .bind(entry.entity_id)
            .bind(&entry.action)
            .bind(entry.actor_id)
            .bind(&entry.reason)
            .bind(&entry.meta)
            .bind(entry.created_at)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    // ---- advisory locks ----

    /// Non-blocking session advisory lock; the cross-replica guard for the
    /// lifecycle tick. The lock is session-scoped, so the guard pins the
    /// pool connection it was taken on until released.
    pub async fn try_advisory_lock(&self, key: i64) -> CoreResult<Option<AdvisoryLock>> {
        let mut conn = self.pool.acquire().await?;
        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(key)
            .fetch_one(&mut *conn)
            .await?;
        if locked {
            Ok(Some(AdvisoryLock {
                conn: Some(conn),
                key,
            }))
        } else {
            Ok(None)
        }
    }
}

/// Held advisory lock. Call [`AdvisoryLock::release`] when done; if the
/// guard is dropped instead, the underlying connection is closed rather than
/// returned to the pool, so the server releases the lock either way.
pub struct AdvisoryLock {
    conn: Option<sqlx::pool::PoolConnection<Postgres>>,
    key: i64,
}

impl AdvisoryLock {
    pub async fn release(mut self) -> CoreResult<()> {
        if let Some(mut conn) = self.conn.take() {
            sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1)")
                .bind(self.key)
                .fetch_one(&mut *conn)
                .await?;
        }
        Ok(())
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            // Detaching closes the connection on drop instead of recycling
            // it with the lock still held.
            drop(conn.detach());
        }
    }
}

fn auction_from_row(row: &PgRow) -> CoreResult<Auction> {
    let status_raw: String = row.try_get("status")?;
    let status = AuctionStatus::parse(&status_raw).ok_or_else(|| {
        CoreError::new(
            ErrorCode::Internal,
            format!("Unknown auction status {status_raw:?}"),
        )
    })?;

    Ok(Auction {
        id: row.try_get("id")?,
        product_id: row.try_get("product_id")?,
        start_price: row.try_get("start_price")?,
        bid_step: row.try_get("bid_step")?,
        reserve_price: row.try_get("reserve_price")?,
        start_at: row.try_get("start_at")?,
        end_at: row.try_get("end_at")?,
        anti_sniping_minutes: row.try_get("anti_sniping_minutes")?,
        status,
        extensions_count: row.try_get("extensions_count")?,
        max_extensions_override: row.try_get("max_extensions_override")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
