//! HTTP Handlers
//!
//! Request handlers for the auction engine API. Authentication is resolved
//! upstream; handlers receive the caller's user id as a request extension
//! and the services enforce roles through the user directory. Server bind
//! and middleware live outside the engine.

use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;

use crate::engine::AuctionEngine;
use crate::errors::CoreError;

pub mod auctions;
pub mod bids;
pub mod events;

pub use auctions::*;
pub use bids::*;
pub use events::*;

/// Shared handler state.
pub type AppState = Arc<AuctionEngine>;

/// Authenticated caller, inserted by the upstream auth middleware.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: i64,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        (self.code.http_status(), Json(self.body())).into_response()
    }
}

/// The engine's routes.
pub fn router(engine: AppState) -> Router {
    Router::new()
        .route("/auctions", post(create_auction).get(list_auctions))
        .route("/auctions/:id", get(get_auction))
        .route("/auctions/:id/cancel", post(cancel_auction))
        .route("/auctions/:id/mark-winner-unpaid", post(mark_winner_unpaid))
        .route("/auctions/:id/bid", post(place_bid))
        .route("/auctions/:id/reserve-status", get(reserve_status))
        .route("/auctions/:id/events", get(subscribe_events))
        .route("/auctions/:id/ws", get(subscribe_ws))
        .route("/bids/:id/remove", post(remove_bid))
        .route("/bids/remove-bulk", post(remove_bids_bulk))
        .with_state(engine)
}
