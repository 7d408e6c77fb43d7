//! Auction Engine Services
//!
//! Business logic layer: bid placement, the anti-sniping extension engine,
//! administrative bid management, auction admin, the lifecycle tick, and the
//! pure reserve/rate-limit helpers.

pub mod auction;
pub mod bid;
pub mod bid_management;
pub mod extension;
pub mod lifecycle;
pub mod rate_limit;
pub mod reserve;

pub use auction::{AuctionService, CreateAuction};
pub use bid::BidService;
pub use bid_management::{BidManagementService, BulkRemovalReport, RemovedBid};
pub use extension::ExtensionEngine;
pub use lifecycle::{LifecycleService, TickReport, TICK_ADVISORY_LOCK_KEY};
pub use rate_limit::{RateAction, RateLimiter};
pub use reserve::ReserveStatus;
