//! Consumed Interfaces
//!
//! The external collaborators the auction core talks to. Each is an async
//! trait so deployments wire their own implementations and tests substitute
//! mocks.

pub mod audit;
pub mod catalog;
pub mod notify;
pub mod orders;
pub mod users;

pub use audit::{AuditSink, PgAuditSink};
pub use catalog::{PgProductCatalog, ProductCatalog};
pub use notify::NotificationSink;
pub use orders::{OrderManager, WinnerOrder, WinnerOrderRequest};
pub use users::UserDirectory;
