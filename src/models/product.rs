//! Product Models
//!
//! The slice of the product catalog the auction core reads and transitions.
//! The catalog owns product data; the core only moves status.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Available,
    InAuction,
    AuctionHold,
    Sold,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::InAuction => "in_auction",
            Self::AuctionHold => "auction_hold",
            Self::Sold => "sold",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "available" => Some(Self::Available),
            "in_auction" => Some(Self::InAuction),
            "auction_hold" => Some(Self::AuctionHold),
            "sold" => Some(Self::Sold),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    Pigeon,
    Supply,
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pigeon => "pigeon",
            Self::Supply => "supply",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pigeon" => Some(Self::Pigeon),
            "supply" => Some(Self::Supply),
            _ => None,
        }
    }

    /// Only pigeons go to auction.
    pub fn is_auctionable(&self) -> bool {
        matches!(self, Self::Pigeon)
    }
}

/// Product fields the core consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInfo {
    pub id: i64,
    pub title: String,
    pub kind: ProductKind,
    pub status: ProductStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pigeons_auctionable() {
        assert!(ProductKind::Pigeon.is_auctionable());
        assert!(!ProductKind::Supply.is_auctionable());
    }

    #[test]
    fn status_round_trips() {
        for status in [
            ProductStatus::Available,
            ProductStatus::InAuction,
            ProductStatus::AuctionHold,
            ProductStatus::Sold,
        ] {
            assert_eq!(ProductStatus::parse(status.as_str()), Some(status));
        }
    }
}
