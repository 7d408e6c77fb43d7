//! Realtime Hub
//!
//! Connection registry and broadcast fabric for per-auction event streams.
//! The hub is an explicitly constructed value handed to services by
//! reference; services depend only on the [`Broadcaster`] trait so tests can
//! substitute [`NullBroadcaster`].
//!
//! Broadcast never blocks the bid path: events land on a bounded per-client
//! queue, dropping the oldest entry on overflow. The registry map is behind
//! a reader-writer lock with short critical sections; per-client state has
//! its own mutex.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::realtime::event::AuctionEvent;

/// Fan-out surface the services depend on. Enqueue-only and non-blocking.
pub trait Broadcaster: Send + Sync {
    fn broadcast_to_auction(&self, auction_id: i64, event: AuctionEvent);
    fn broadcast_to_users(&self, auction_id: i64, user_ids: &[i64], event: AuctionEvent);
}

/// Discards every event; used where no hub is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBroadcaster;

impl Broadcaster for NullBroadcaster {
    fn broadcast_to_auction(&self, _auction_id: i64, _event: AuctionEvent) {}
    fn broadcast_to_users(&self, _auction_id: i64, _user_ids: &[i64], _event: AuctionEvent) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    EventStream,
    WebSocket,
}

#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Per-client event buffer; overflow drops the oldest event.
    pub buffer_capacity: usize,
    pub heartbeat_interval: Duration,
    /// Clients whose last-seen age exceeds this are reaped.
    pub stale_after: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 64,
            heartbeat_interval: Duration::from_secs(30),
            stale_after: Duration::from_secs(30),
        }
    }
}

struct ClientQueue {
    events: VecDeque<AuctionEvent>,
    dropped: u64,
}

/// One registered subscriber.
pub struct ClientConn {
    id: Uuid,
    auction_id: i64,
    user_id: Option<i64>,
    transport: TransportKind,
    last_seen: Mutex<DateTime<Utc>>,
    queue: Mutex<ClientQueue>,
    notify: Notify,
    cancel: CancellationToken,
}

impl ClientConn {
    fn pop(&self) -> Option<AuctionEvent> {
        self.queue.lock().events.pop_front()
    }
}

/// Subscriber handle owned by the transport task. Dropping it unregisters
/// the client.
pub struct ClientHandle {
    conn: Arc<ClientConn>,
    hub: Arc<RealtimeHub>,
}

impl ClientHandle {
    pub fn id(&self) -> Uuid {
        self.conn.id
    }

    pub fn auction_id(&self) -> i64 {
        self.conn.auction_id
    }

    pub fn transport(&self) -> TransportKind {
        self.conn.transport
    }

    /// Next queued event, in enqueue order. Returns `None` once the client
    /// is unregistered or reaped. Dequeuing marks the client seen.
    pub async fn next_event(&self) -> Option<AuctionEvent> {
        loop {
            if let Some(event) = self.conn.pop() {
                self.mark_seen();
                return Some(event);
            }
            tokio::select! {
                _ = self.conn.cancel.cancelled() => return None,
                _ = self.conn.notify.notified() => {}
            }
        }
    }

    /// Record liveness, e.g. on a client ping.
    pub fn mark_seen(&self) {
        *self.conn.last_seen.lock() = self.hub.clock.now();
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.hub.unregister(self.conn.id);
    }
}

/// Connection registry and broadcast fabric.
pub struct RealtimeHub {
    clients: RwLock<HashMap<Uuid, Arc<ClientConn>>>,
    config: HubConfig,
    clock: Arc<dyn Clock>,
    dropped_events: AtomicU64,
}

impl RealtimeHub {
    pub fn new(config: HubConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            config,
            clock,
            dropped_events: AtomicU64::new(0),
        }
    }

    /// Register a subscriber for an auction's event stream.
    pub fn register(
        self: &Arc<Self>,
        auction_id: i64,
        user_id: Option<i64>,
        transport: TransportKind,
    ) -> ClientHandle {
        let conn = Arc::new(ClientConn {
            id: Uuid::new_v4(),
            auction_id,
            user_id,
            transport,
            last_seen: Mutex::new(self.clock.now()),
            queue: Mutex::new(ClientQueue {
                events: VecDeque::new(),
                dropped: 0,
            }),
            notify: Notify::new(),
            cancel: CancellationToken::new(),
        });
        self.clients.write().insert(conn.id, conn.clone());
        debug!(client_id = %conn.id, auction_id, "realtime client registered");
        ClientHandle {
            conn,
            hub: self.clone(),
        }
    }

    /// Remove a client and signal its transport to finish.
    pub fn unregister(&self, client_id: Uuid) {
        if let Some(conn) = self.clients.write().remove(&client_id) {
            conn.cancel.cancel();
            debug!(client_id = %client_id, "realtime client unregistered");
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Total events dropped to overflow, across all clients.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    fn enqueue(&self, conn: &ClientConn, event: AuctionEvent) {
        {
            let mut queue = conn.queue.lock();
            if queue.events.len() >= self.config.buffer_capacity {
                queue.events.pop_front();
                queue.dropped += 1;
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                warn!(client_id = %conn.id, "client buffer full, dropped oldest event");
            }
            queue.events.push_back(event);
        }
        conn.notify.notify_one();
    }

    fn targets<F>(&self, select: F) -> Vec<Arc<ClientConn>>
    where
        F: Fn(&ClientConn) -> bool,
    {
        self.clients
            .read()
            .values()
            .filter(|conn| select(conn))
            .cloned()
            .collect()
    }

    /// Emit a heartbeat to every client, then reap stale ones. Runs until
    /// cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("realtime hub stopping");
                    return;
                }
                _ = ticker.tick() => {
                    self.reap_stale();
                    let heartbeat = AuctionEvent::heartbeat(self.clock.now());
                    for conn in self.targets(|_| true) {
                        self.enqueue(&conn, heartbeat.clone());
                    }
                }
            }
        }
    }

    /// Drop clients whose last-seen age exceeds the stale threshold.
    pub fn reap_stale(&self) {
        let now = self.clock.now();
        let stale_after = chrono::Duration::from_std(self.config.stale_after)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let stale: Vec<Uuid> = self
            .clients
            .read()
            .values()
            .filter(|conn| now - *conn.last_seen.lock() > stale_after)
            .map(|conn| conn.id)
            .collect();
        for client_id in stale {
            info!(client_id = %client_id, "reaping stale realtime client");
            self.unregister(client_id);
        }
    }
}

impl Broadcaster for RealtimeHub {
    fn broadcast_to_auction(&self, auction_id: i64, event: AuctionEvent) {
        for conn in self.targets(|conn| conn.auction_id == auction_id) {
            self.enqueue(&conn, event.clone());
        }
    }

    fn broadcast_to_users(&self, auction_id: i64, user_ids: &[i64], event: AuctionEvent) {
        for conn in self.targets(|conn| {
            conn.auction_id == auction_id
                && conn
                    .user_id
                    .map(|user_id| user_ids.contains(&user_id))
                    .unwrap_or(false)
        }) {
            self.enqueue(&conn, event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn hub_with_clock() -> (Arc<RealtimeHub>, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap());
        let hub = Arc::new(RealtimeHub::new(
            HubConfig {
                buffer_capacity: 2,
                heartbeat_interval: Duration::from_secs(30),
                stale_after: Duration::from_secs(30),
            },
            Arc::new(clock.clone()),
        ));
        (hub, clock)
    }

    fn outbid(auction_id: i64, price: i64) -> AuctionEvent {
        AuctionEvent::Outbid {
            auction_id,
            ts: 0,
            current_price: Decimal::from(price),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_matching_auction_only() {
        let (hub, _clock) = hub_with_clock();
        let a = hub.register(1, Some(10), TransportKind::EventStream);
        let b = hub.register(2, Some(20), TransportKind::EventStream);

        hub.broadcast_to_auction(1, outbid(1, 1100));

        let event = a.next_event().await.unwrap();
        assert_eq!(event.kind(), "outbid");
        assert!(b.conn.pop().is_none());
    }

    #[tokio::test]
    async fn targeted_broadcast_hits_user_set() {
        let (hub, _clock) = hub_with_clock();
        let alice = hub.register(1, Some(10), TransportKind::WebSocket);
        let bob = hub.register(1, Some(20), TransportKind::WebSocket);
        let anon = hub.register(1, None, TransportKind::EventStream);

        hub.broadcast_to_users(1, &[10], outbid(1, 1100));

        assert!(alice.conn.pop().is_some());
        assert!(bob.conn.pop().is_none());
        assert!(anon.conn.pop().is_none());
    }

    #[tokio::test]
    async fn overflow_drops_oldest() {
        let (hub, _clock) = hub_with_clock();
        let client = hub.register(1, None, TransportKind::EventStream);

        hub.broadcast_to_auction(1, outbid(1, 1100));
        hub.broadcast_to_auction(1, outbid(1, 1150));
        hub.broadcast_to_auction(1, outbid(1, 1200));

        // Capacity 2: the 1100 event is gone, order preserved for the rest.
        let first = client.next_event().await.unwrap();
        match first {
            AuctionEvent::Outbid { current_price, .. } => {
                assert_eq!(current_price, dec!(1150));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(hub.dropped_events(), 1);
    }

    #[tokio::test]
    async fn unregister_finishes_stream() {
        let (hub, _clock) = hub_with_clock();
        let client = hub.register(1, None, TransportKind::EventStream);
        hub.unregister(client.id());
        assert!(client.next_event().await.is_none());
        assert_eq!(hub.client_count(), 0);
    }

    #[tokio::test]
    async fn stale_clients_are_reaped() {
        let (hub, clock) = hub_with_clock();
        let _client = hub.register(1, None, TransportKind::EventStream);
        assert_eq!(hub.client_count(), 1);

        clock.advance(chrono::Duration::seconds(29));
        hub.reap_stale();
        assert_eq!(hub.client_count(), 1);

        clock.advance(chrono::Duration::seconds(2));
        hub.reap_stale();
        assert_eq!(hub.client_count(), 0);
    }

    #[tokio::test]
    async fn dropping_handle_unregisters() {
        let (hub, _clock) = hub_with_clock();
        {
            let _client = hub.register(1, None, TransportKind::EventStream);
            assert_eq!(hub.client_count(), 1);
        }
        assert_eq!(hub.client_count(), 0);
    }
}
