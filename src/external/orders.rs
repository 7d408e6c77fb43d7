//! Order Manager
//!
//! Creates the winner order and invoice when an auction closes with a
//! winner. The order manager owns order rows and invoice numbering; the call
//! is idempotent across retries with the same auction id.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::CoreResult;

#[derive(Debug, Clone, Serialize)]
pub struct WinnerOrderRequest {
    pub auction_id: i64,
    pub product_id: i64,
    pub winner_user_id: i64,
    pub winning_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinnerOrder {
    pub order_id: i64,
    pub invoice_id: i64,
    pub invoice_number: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait OrderManager: Send + Sync {
    async fn create_auction_winner_order(
        &self,
        request: WinnerOrderRequest,
    ) -> CoreResult<WinnerOrder>;
}
