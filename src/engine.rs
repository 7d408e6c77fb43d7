//! Engine Wiring
//!
//! Explicit construction of the auction engine. The builder wires the
//! realtime hub first and hands it to the services by reference; nothing in
//! the engine is a global. Deployments provide the external collaborators
//! (user directory, order manager, notification sink); store-backed defaults
//! cover the catalog, settings, and audit sink.

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::external::{
    AuditSink, NotificationSink, OrderManager, PgAuditSink, PgProductCatalog, ProductCatalog,
    UserDirectory,
};
use crate::realtime::{Broadcaster, HubConfig, RealtimeHub};
use crate::services::{
    AuctionService, BidManagementService, BidService, ExtensionEngine, LifecycleService,
    RateLimiter,
};
use crate::settings::{PgSettingsProvider, SettingsCache, SettingsProvider};
use crate::store::AuctionStore;

/// Background cadences and hub tuning.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub hub: HubConfig,
    pub tick_interval: Duration,
    pub settings_refresh_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hub: HubConfig::default(),
            tick_interval: Duration::from_secs(60),
            settings_refresh_interval: Duration::from_secs(60),
        }
    }
}

pub struct AuctionEngineBuilder {
    pool: PgPool,
    users: Arc<dyn UserDirectory>,
    orders: Arc<dyn OrderManager>,
    notifications: Arc<dyn NotificationSink>,
    catalog: Option<Arc<dyn ProductCatalog>>,
    settings_provider: Option<Arc<dyn SettingsProvider>>,
    clock: Option<Arc<dyn Clock>>,
    config: EngineConfig,
}

impl AuctionEngineBuilder {
    pub fn new(
        pool: PgPool,
        users: Arc<dyn UserDirectory>,
        orders: Arc<dyn OrderManager>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            pool,
            users,
            orders,
            notifications,
            catalog: None,
            settings_provider: None,
            clock: None,
            config: EngineConfig::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ProductCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_settings_provider(mut self, provider: Arc<dyn SettingsProvider>) -> Self {
        self.settings_provider = Some(provider);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> AuctionEngine {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = Arc::new(AuctionStore::new(self.pool.clone()));
        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(PgProductCatalog));
        let settings_provider = self
            .settings_provider
            .unwrap_or_else(|| Arc::new(PgSettingsProvider::new(self.pool)));
        let settings = Arc::new(SettingsCache::new(settings_provider));
        let audit: Arc<dyn AuditSink> = Arc::new(PgAuditSink::new(store.clone()));

        // The hub comes first so every service can hold it by reference;
        // there is no back-reference from the hub into the services.
        let hub = Arc::new(RealtimeHub::new(self.config.hub, clock.clone()));
        let broadcaster: Arc<dyn Broadcaster> = hub.clone();

        let rate_limiter = Arc::new(RateLimiter::new(clock.clone()));
        let extensions = Arc::new(ExtensionEngine::new(store.clone(), clock.clone()));

        let bids = Arc::new(BidService::new(
            store.clone(),
            self.users.clone(),
            catalog.clone(),
            self.notifications.clone(),
            broadcaster.clone(),
            rate_limiter.clone(),
            settings.clone(),
            extensions,
            clock.clone(),
        ));

        let bid_management = Arc::new(BidManagementService::new(
            store.clone(),
            self.users.clone(),
            self.notifications.clone(),
            broadcaster.clone(),
            rate_limiter.clone(),
            settings.clone(),
            clock.clone(),
        ));

        let auctions = Arc::new(AuctionService::new(
            store.clone(),
            catalog.clone(),
            self.users.clone(),
            self.notifications.clone(),
            broadcaster.clone(),
            rate_limiter,
            settings.clone(),
            clock.clone(),
        ));

        let lifecycle = Arc::new(LifecycleService::new(
            store.clone(),
            catalog,
            self.orders,
            self.users,
            self.notifications,
            audit,
            broadcaster,
            settings.clone(),
            clock.clone(),
        ));

        AuctionEngine {
            store,
            settings,
            hub,
            auctions,
            bids,
            bid_management,
            lifecycle,
            clock,
            config: self.config,
        }
    }
}

/// The wired auction engine core.
pub struct AuctionEngine {
    store: Arc<AuctionStore>,
    settings: Arc<SettingsCache>,
    hub: Arc<RealtimeHub>,
    auctions: Arc<AuctionService>,
    bids: Arc<BidService>,
    bid_management: Arc<BidManagementService>,
    lifecycle: Arc<LifecycleService>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl AuctionEngine {
    pub fn builder(
        pool: PgPool,
        users: Arc<dyn UserDirectory>,
        orders: Arc<dyn OrderManager>,
        notifications: Arc<dyn NotificationSink>,
    ) -> AuctionEngineBuilder {
        AuctionEngineBuilder::new(pool, users, orders, notifications)
    }

    pub fn store(&self) -> &Arc<AuctionStore> {
        &self.store
    }

    pub fn settings(&self) -> &Arc<SettingsCache> {
        &self.settings
    }

    pub fn hub(&self) -> &Arc<RealtimeHub> {
        &self.hub
    }

    pub fn auctions(&self) -> &AuctionService {
        &self.auctions
    }

    pub fn bids(&self) -> &BidService {
        &self.bids
    }

    pub fn bid_management(&self) -> &BidManagementService {
        &self.bid_management
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleService> {
        &self.lifecycle
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Spawn the background loops: hub heartbeat, settings refresh, and the
    /// lifecycle tick. All stop when `cancel` fires.
    pub fn spawn_background(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        info!("starting auction engine background tasks");
        vec![
            tokio::spawn(self.hub.clone().run(cancel.clone())),
            tokio::spawn(
                self.settings
                    .clone()
                    .run(self.config.settings_refresh_interval, cancel.clone()),
            ),
            tokio::spawn(
                self.lifecycle
                    .clone()
                    .run(self.config.tick_interval, cancel),
            ),
        ]
    }
}
