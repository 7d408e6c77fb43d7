//! Realtime Fan-out
//!
//! Event schema, connection registry, and broadcast hub for per-auction
//! event streams over SSE and websocket transports.

pub mod event;
pub mod hub;

pub use event::{AuctionEvent, AuctionOutcome};
pub use hub::{
    Broadcaster, ClientHandle, HubConfig, NullBroadcaster, RealtimeHub, TransportKind,
};
