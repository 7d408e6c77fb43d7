//! System Settings
//!
//! Key/value settings with a timer-refreshed snapshot cache. Services read an
//! `Arc` snapshot and never hold a lock across a suspension point. Settings
//! are the source of truth for rate caps and extension limits.

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::CoreResult;

/// Settings keys consumed by the engine.
pub mod keys {
    pub const MIN_BID_STEP: &str = "auctions.min_bid_step";
    pub const ANTI_SNIPING_MINUTES: &str = "auctions.anti_sniping_minutes";
    pub const MAX_EXTENSIONS: &str = "auctions.max_extensions";
    pub const BID_RATE_ATTEMPTS: &str = "bids.rate_limit_attempts";
    pub const BID_RATE_WINDOW_SECS: &str = "bids.rate_limit_window_secs";
    pub const ADMIN_CANCEL_ATTEMPTS: &str = "admin.cancel_rate_attempts";
    pub const ADMIN_REMOVE_ATTEMPTS: &str = "admin.remove_rate_attempts";
    pub const ADMIN_BULK_REMOVE_ATTEMPTS: &str = "admin.bulk_remove_rate_attempts";
    pub const ADMIN_RATE_WINDOW_SECS: &str = "admin.rate_limit_window_secs";
    pub const PAYMENT_BASE_URL: &str = "payments.base_url";
}

/// A per-action rate cap: at most `max_attempts` per `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateCap {
    pub max_attempts: u32,
    pub window_secs: u64,
}

/// Typed snapshot of the system settings the engine consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionSettings {
    /// Minimum allowed `bid_step` for new auctions.
    pub min_bid_step: Decimal,
    /// Default anti-sniping window for new auctions, minutes.
    pub anti_sniping_minutes: i64,
    /// Extension cap; 0 means unlimited. Per-auction override wins.
    pub max_extensions: i32,
    pub bid_rate: RateCap,
    pub admin_cancel_rate: RateCap,
    pub admin_remove_rate: RateCap,
    pub admin_bulk_remove_rate: RateCap,
    /// Base URL for winner payment links.
    pub payment_base_url: String,
}

impl Default for AuctionSettings {
    fn default() -> Self {
        Self {
            min_bid_step: dec!(1),
            anti_sniping_minutes: 10,
            max_extensions: 3,
            bid_rate: RateCap {
                max_attempts: 10,
                window_secs: 60,
            },
            admin_cancel_rate: RateCap {
                max_attempts: 20,
                window_secs: 60,
            },
            admin_remove_rate: RateCap {
                max_attempts: 30,
                window_secs: 60,
            },
            admin_bulk_remove_rate: RateCap {
                max_attempts: 5,
                window_secs: 60,
            },
            payment_base_url: "https://example.com".to_string(),
        }
    }
}

impl AuctionSettings {
    /// Build a snapshot from raw key/value pairs, falling back to defaults
    /// for missing or malformed values.
    pub fn from_raw(raw: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        let admin_window = parse_or(raw, keys::ADMIN_RATE_WINDOW_SECS, 60u64);

        Self {
            min_bid_step: parse_or(raw, keys::MIN_BID_STEP, defaults.min_bid_step),
            anti_sniping_minutes: parse_or(
                raw,
                keys::ANTI_SNIPING_MINUTES,
                defaults.anti_sniping_minutes,
            ),
            max_extensions: parse_or(raw, keys::MAX_EXTENSIONS, defaults.max_extensions),
            bid_rate: RateCap {
                max_attempts: parse_or(
                    raw,
                    keys::BID_RATE_ATTEMPTS,
                    defaults.bid_rate.max_attempts,
                ),
                window_secs: parse_or(
                    raw,
                    keys::BID_RATE_WINDOW_SECS,
                    defaults.bid_rate.window_secs,
                ),
            },
            admin_cancel_rate: RateCap {
                max_attempts: parse_or(
                    raw,
                    keys::ADMIN_CANCEL_ATTEMPTS,
                    defaults.admin_cancel_rate.max_attempts,
                ),
                window_secs: admin_window,
            },
            admin_remove_rate: RateCap {
                max_attempts: parse_or(
                    raw,
                    keys::ADMIN_REMOVE_ATTEMPTS,
                    defaults.admin_remove_rate.max_attempts,
                ),
                window_secs: admin_window,
            },
            admin_bulk_remove_rate: RateCap {
                max_attempts: parse_or(
                    raw,
                    keys::ADMIN_BULK_REMOVE_ATTEMPTS,
                    defaults.admin_bulk_remove_rate.max_attempts,
                ),
                window_secs: admin_window,
            },
            payment_base_url: raw
                .get(keys::PAYMENT_BASE_URL)
                .cloned()
                .unwrap_or(defaults.payment_base_url),
        }
    }
}

fn parse_or<T: FromStr>(raw: &HashMap<String, String>, key: &str, default: T) -> T {
    match raw.get(key) {
        Some(value) => match value.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(key, value = %value, "malformed setting, using default");
                default
            }
        },
        None => default,
    }
}

/// Raw settings source.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    /// Fetch all settings keys in one round-trip.
    async fn load_all(&self) -> CoreResult<HashMap<String, String>>;
}

/// Settings backed by the `system_settings` table.
pub struct PgSettingsProvider {
    pool: PgPool,
}

impl PgSettingsProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsProvider for PgSettingsProvider {
    async fn load_all(&self) -> CoreResult<HashMap<String, String>> {
        let rows = sqlx::query("SELECT key, value FROM system_settings")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>("key"), row.get::<String, _>("value")))
            .collect())
    }
}

/// Fixed in-memory settings, for tests and embedding.
#[derive(Default)]
pub struct StaticSettingsProvider {
    values: HashMap<String, String>,
}

impl StaticSettingsProvider {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

#[async_trait]
impl SettingsProvider for StaticSettingsProvider {
    async fn load_all(&self) -> CoreResult<HashMap<String, String>> {
        Ok(self.values.clone())
    }
}

/// Snapshot cache over a [`SettingsProvider`].
pub struct SettingsCache {
    provider: Arc<dyn SettingsProvider>,
    snapshot: RwLock<Arc<AuctionSettings>>,
}

impl SettingsCache {
    pub fn new(provider: Arc<dyn SettingsProvider>) -> Self {
        Self {
            provider,
            snapshot: RwLock::new(Arc::new(AuctionSettings::default())),
        }
    }

    /// Current snapshot; the lock is held only for the pointer clone.
    pub fn current(&self) -> Arc<AuctionSettings> {
        self.snapshot.read().clone()
    }

    /// Re-read the provider and swap the snapshot.
    pub async fn refresh(&self) -> CoreResult<()> {
        let raw = self.provider.load_all().await?;
        let next = Arc::new(AuctionSettings::from_raw(&raw));
        *self.snapshot.write() = next;
        debug!("settings snapshot refreshed");
        Ok(())
    }

    /// Periodic refresh until cancelled. Failures keep the last snapshot.
    pub async fn run(self: Arc<Self>, every: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(err) = self.refresh().await {
                        warn!(error = %err, "settings refresh failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_when_empty() {
        let settings = AuctionSettings::from_raw(&HashMap::new());
        assert_eq!(settings, AuctionSettings::default());
        assert_eq!(settings.bid_rate.max_attempts, 10);
        assert_eq!(settings.bid_rate.window_secs, 60);
    }

    #[test]
    fn parses_known_keys() {
        let settings = AuctionSettings::from_raw(&raw(&[
            (keys::MIN_BID_STEP, "25"),
            (keys::ANTI_SNIPING_MINUTES, "5"),
            (keys::MAX_EXTENSIONS, "0"),
            (keys::BID_RATE_ATTEMPTS, "3"),
            (keys::BID_RATE_WINDOW_SECS, "10"),
        ]));
        assert_eq!(settings.min_bid_step, dec!(25));
        assert_eq!(settings.anti_sniping_minutes, 5);
        assert_eq!(settings.max_extensions, 0);
        assert_eq!(
            settings.bid_rate,
            RateCap {
                max_attempts: 3,
                window_secs: 10
            }
        );
    }

    #[test]
    fn malformed_value_falls_back() {
        let settings = AuctionSettings::from_raw(&raw(&[(keys::MAX_EXTENSIONS, "lots")]));
        assert_eq!(
            settings.max_extensions,
            AuctionSettings::default().max_extensions
        );
    }

    #[tokio::test]
    async fn cache_refresh_swaps_snapshot() {
        let provider = Arc::new(StaticSettingsProvider::new(raw(&[(
            keys::MAX_EXTENSIONS,
            "7",
        )])));
        let cache = SettingsCache::new(provider);
        assert_eq!(cache.current().max_extensions, 3);
        cache.refresh().await.unwrap();
        assert_eq!(cache.current().max_extensions, 7);
    }
}
