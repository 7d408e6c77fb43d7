//! LoftAuction - Auction Engine Core
//!
//! The engine core of a live English-ascending auction platform:
//! - Bid placement and serialization under per-auction row locks
//! - Anti-sniping deadline extensions with a configurable cap and exact
//!   rollback when bids are removed
//! - A lifecycle tick that starts scheduled auctions, closes expired ones,
//!   picks winners reserve-aware, and creates the winner order
//! - A realtime hub fanning lifecycle and bid events out to SSE and
//!   websocket subscribers
//!
//! # Architecture
//!
//! The crate follows a layered architecture:
//! - **Models**: Data structures and database entities
//! - **Store**: PostgreSQL persistence, transactions, and locks
//! - **Services**: Business logic layer
//! - **Realtime**: Event schema and broadcast hub
//! - **External**: Interfaces consumed from the rest of the platform
//! - **Handlers**: HTTP request handlers for the REST API and subscriptions
//!
//! Everything is wired explicitly through [`engine::AuctionEngineBuilder`];
//! there are no globals.

pub mod clock;
pub mod engine;
pub mod errors;
pub mod external;
pub mod handlers;
pub mod models;
pub mod realtime;
pub mod services;
pub mod settings;
pub mod store;

/// Engine version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export commonly used types
pub use clock::{Clock, SystemClock};
pub use engine::{AuctionEngine, AuctionEngineBuilder, EngineConfig};
pub use errors::{CoreError, CoreResult, ErrorCode};
pub use models::{Auction, AuctionStatus, Bid, PlacedBid};
pub use realtime::{AuctionEvent, Broadcaster, RealtimeHub};
pub use services::{
    AuctionService, BidManagementService, BidService, LifecycleService, TickReport,
};
pub use settings::{AuctionSettings, SettingsCache};
pub use store::AuctionStore;
