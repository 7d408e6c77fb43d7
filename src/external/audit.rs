//! Audit Sink
//!
//! Append-only structured event log. Transactional writers (bid removal)
//! append through the store inside their transaction; post-commit writers
//! (lifecycle, admin operations) go through this sink.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;

use crate::errors::CoreResult;
use crate::models::AuditEntry;
use crate::store::AuctionStore;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> CoreResult<()>;
}

/// Sink over the engine's `audit_logs` table.
pub struct PgAuditSink {
    store: Arc<AuctionStore>,
}

impl PgAuditSink {
    pub fn new(store: Arc<AuctionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, entry: AuditEntry) -> CoreResult<()> {
        self.store.insert_audit(&entry).await
    }
}
