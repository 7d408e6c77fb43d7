//! Subscription Handlers
//!
//! Two transports over the same registry and event schema: a one-way
//! `text/event-stream` push and a bidirectional websocket. Each event is an
//! `event:` line plus a compact JSON `data:` block on the stream transport,
//! and a single JSON message on the socket transport.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Extension, Path, State};
use axum::response::sse::{Event, Sse};
use axum::response::Response;
use futures::stream::{self, Stream};
use serde::Deserialize;
use std::convert::Infallible;
use tracing::{debug, warn};

use crate::errors::{CoreError, CoreResult};
use crate::handlers::{AppState, AuthUser};
use crate::realtime::{AuctionEvent, ClientHandle, TransportKind};

/// Client-to-server messages accepted on the socket transport.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Ping,
    Subscribe,
}

/// GET /auctions/:id/events
pub async fn subscribe_events(
    State(engine): State<AppState>,
    auth: Option<Extension<AuthUser>>,
    Path(auction_id): Path<i64>,
) -> CoreResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // 404 before holding a registration open.
    if engine.store().get_auction(auction_id).await?.is_none() {
        return Err(CoreError::auction_not_found(auction_id));
    }

    let handle = engine.hub().register(
        auction_id,
        auth.map(|Extension(user)| user.user_id),
        TransportKind::EventStream,
    );

    let stream = stream::unfold(handle, |handle| async move {
        let event = handle.next_event().await?;
        let frame = Event::default().event(event.kind()).data(event.data_json());
        Some((Ok(frame), handle))
    });

    Ok(Sse::new(stream))
}

/// GET /auctions/:id/ws
pub async fn subscribe_ws(
    State(engine): State<AppState>,
    auth: Option<Extension<AuthUser>>,
    Path(auction_id): Path<i64>,
    ws: WebSocketUpgrade,
) -> CoreResult<Response> {
    if engine.store().get_auction(auction_id).await?.is_none() {
        return Err(CoreError::auction_not_found(auction_id));
    }

    let handle = engine.hub().register(
        auction_id,
        auth.map(|Extension(user)| user.user_id),
        TransportKind::WebSocket,
    );
    let engine = engine.clone();

    Ok(ws.on_upgrade(move |socket| drive_socket(engine, socket, handle)))
}

/// Pump hub events to the socket and handle client messages until either
/// side goes away. Dropping the handle unregisters the client.
async fn drive_socket(engine: AppState, mut socket: WebSocket, handle: ClientHandle) {
    loop {
        tokio::select! {
            event = handle.next_event() => {
                let Some(event) = event else { break };
                if socket
                    .send(Message::Text(event.message_json()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_client_message(&engine, &mut socket, &handle, &text).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(client_id = %handle.id(), error = %err, "websocket read failed");
                        break;
                    }
                }
            }
        }
    }
}

/// Returns false when the socket should be torn down.
async fn handle_client_message(
    engine: &AppState,
    socket: &mut WebSocket,
    handle: &ClientHandle,
    text: &str,
) -> bool {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Ping) => {
            handle.mark_seen();
            let heartbeat = AuctionEvent::heartbeat(engine.clock().now());
            socket
                .send(Message::Text(heartbeat.message_json()))
                .await
                .is_ok()
        }
        Ok(ClientMessage::Subscribe) => {
            debug!(
                client_id = %handle.id(),
                auction_id = handle.auction_id(),
                "subscribe message acknowledged"
            );
            true
        }
        Err(err) => {
            warn!(client_id = %handle.id(), error = %err, "unparseable client message");
            true
        }
    }
}
