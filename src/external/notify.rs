//! Notification Sink
//!
//! Fire-and-forget enqueue of internal and email notifications. Template
//! rendering and delivery live outside the engine; the engine commits to a
//! stable payload shape per template id.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::errors::CoreResult;
use crate::models::UserProfile;

/// Template ids the engine enqueues.
pub mod templates {
    pub const BID_OUTBID: &str = "bid_outbid";
    pub const BID_REMOVED: &str = "bid_removed";
    pub const AUCTION_PRICE_CHANGED: &str = "auction_price_changed";
    pub const AUCTION_ENDED_WINNER: &str = "auction_ended_winner";
    pub const AUCTION_RESERVE_NOT_MET: &str = "auction_reserve_not_met";
    pub const AUCTION_CANCELLED: &str = "auction_cancelled";
    pub const AUCTION_WINNER_UNPAID: &str = "auction_winner_unpaid";
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn enqueue_internal(&self, user_id: i64, template_id: &str, payload: Value)
        -> CoreResult<()>;

    async fn enqueue_email(&self, user_id: i64, template_id: &str, payload: Value)
        -> CoreResult<()>;
}

/// Payload for `bid_outbid`.
pub fn outbid_payload(auction_id: i64, product_title: &str, current_price: Decimal) -> Value {
    json!({
        "auction_id": auction_id,
        "product_title": product_title,
        "current_price": current_price,
    })
}

/// Payload for `bid_removed`.
pub fn bid_removed_payload(
    auction_id: i64,
    bid_id: i64,
    amount: Decimal,
    reason: Option<&str>,
) -> Value {
    json!({
        "auction_id": auction_id,
        "bid_id": bid_id,
        "amount": amount,
        "reason": reason,
    })
}

/// Payload for `auction_price_changed`.
pub fn price_changed_payload(auction_id: i64, current_price: Decimal, reason: &str) -> Value {
    json!({
        "auction_id": auction_id,
        "current_price": current_price,
        "reason": reason,
    })
}

/// Payload for `auction_ended_winner`. Every field here is required by the
/// template; adding is safe, removing is a contract break.
#[allow(clippy::too_many_arguments)]
pub fn winner_payload(
    auction_id: i64,
    product_title: &str,
    winning_amount: Decimal,
    order_id: i64,
    invoice_id: i64,
    invoice_number: &str,
    payment_url: &str,
    winner: &UserProfile,
) -> Value {
    json!({
        "auction_id": auction_id,
        "product_title": product_title,
        "winning_amount": winning_amount,
        "order_id": order_id,
        "invoice_id": invoice_id,
        "invoice_number": invoice_number,
        "payment_url": payment_url,
        "name": winner.name,
        "email": winner.email,
        "language": winner.language,
    })
}

/// Payload for `auction_reserve_not_met`.
pub fn reserve_not_met_payload(
    auction_id: i64,
    product_title: &str,
    highest_amount: Decimal,
    amount_to_reserve: Decimal,
) -> Value {
    json!({
        "auction_id": auction_id,
        "product_title": product_title,
        "highest_amount": highest_amount,
        "amount_to_reserve": amount_to_reserve,
    })
}

/// Payload for `auction_cancelled`.
pub fn cancelled_payload(auction_id: i64, product_title: &str, reason: Option<&str>) -> Value {
    json!({
        "auction_id": auction_id,
        "product_title": product_title,
        "reason": reason,
    })
}

/// Payload for `auction_winner_unpaid`.
pub fn winner_unpaid_payload(auction_id: i64, product_title: &str) -> Value {
    json!({
        "auction_id": auction_id,
        "product_title": product_title,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{UserRole, UserState};
    use rust_decimal_macros::dec;

    #[test]
    fn winner_payload_carries_contract_fields() {
        let winner = UserProfile {
            id: 4,
            name: "Salem".to_string(),
            email: "salem@example.com".to_string(),
            phone: None,
            role: UserRole::Verified,
            state: UserState::Active,
            email_verified: true,
            city_id: Some(2),
            city: Some("Riyadh".to_string()),
            language: "ar".to_string(),
        };
        let payload = winner_payload(
            12,
            "Blue Checker Hen",
            dec!(5100),
            88,
            301,
            "INV-2024-000301",
            "https://example.com/pay/88",
            &winner,
        );
        for key in [
            "auction_id",
            "product_title",
            "winning_amount",
            "order_id",
            "invoice_id",
            "invoice_number",
            "payment_url",
            "name",
            "email",
            "language",
        ] {
            assert!(payload.get(key).is_some(), "missing {key}");
        }
    }
}
