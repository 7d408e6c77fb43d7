//! Auction Engine Data Models
//!
//! Entities owned by the auction store (auctions, bids, extensions, audit)
//! and the read-only slices of external data the core consumes (products,
//! users).

pub mod auction;
pub mod audit;
pub mod bid;
pub mod extension;
pub mod product;
pub mod user;

pub use auction::{Auction, AuctionDetail, AuctionStatus};
pub use audit::AuditEntry;
pub use bid::{Bid, NewBid, PlacedBid};
pub use extension::AuctionExtension;
pub use product::{ProductInfo, ProductKind, ProductStatus};
pub use user::{UserProfile, UserRole, UserState};
