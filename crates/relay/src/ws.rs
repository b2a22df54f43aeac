// WebSocket endpoint: upgrade handling and the per-connection socket
// loop.
//
// Each connection is one tokio task selecting between its outbound fan-out
// channel and inbound frames, so events from a single connection are
// processed and broadcast in arrival order. Malformed frames are dropped
// without closing the socket; closing the socket is the only cancellation
// signal and hands off to the lifecycle reconciler.

use crate::dispatch;
use crate::error::{request_id_from_headers_or_generate, with_request_id_scope};
use crate::lifecycle;
use crate::membership::MembershipTable;
use crate::metrics;
use crate::registry::{ConnectionHandle, ConnectionRegistry, Outbound};
use crate::store::PlatformStore;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use pairlab_common::protocol::event::{decode_event, encode_event, RelayEvent};
use tokio::sync::mpsc;
use tracing::warn;

/// Fixed path the relay socket is served on.
pub(crate) const RELAY_WS_PATH: &str = "/ws";

/// Shared relay state, owned by the service instance and injected into the
/// router.
#[derive(Clone)]
pub(crate) struct RelayState {
    pub(crate) registry: ConnectionRegistry,
    pub(crate) membership: MembershipTable,
    pub(crate) store: PlatformStore,
}

/// Per-connection state owned by the socket task.
pub(crate) struct ConnectionState {
    pub(crate) handle: ConnectionHandle,
    /// Bound from the first inbound envelope's `senderId`.
    pub(crate) participant_id: Option<i64>,
    /// The session this connection joined, if any.
    pub(crate) session_id: Option<i64>,
    /// Set when a newer connection took over this participant identity.
    pub(crate) evicted: bool,
}

pub(crate) fn router(
    registry: ConnectionRegistry,
    membership: MembershipTable,
    store: PlatformStore,
) -> Router {
    let state = RelayState { registry, membership, store };
    Router::new().route(RELAY_WS_PATH, get(ws_upgrade)).with_state(state)
}

async fn ws_upgrade(
    State(state): State<RelayState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let request_id = request_id_from_headers_or_generate(&headers);
    ws.on_upgrade(move |socket| async move {
        with_request_id_scope(request_id, handle_socket(state, socket)).await;
    })
}

async fn handle_socket(state: RelayState, mut socket: WebSocket) {
    metrics::connection_opened();

    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<Outbound>();
    let mut conn = ConnectionState {
        handle: outbound_sender,
        participant_id: None,
        session_id: None,
        evicted: false,
    };

    loop {
        tokio::select! {
            maybe_outbound = outbound_receiver.recv() => {
                match maybe_outbound {
                    Some(Outbound::Deliver(event)) => {
                        if send_event(&mut socket, &event).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Evicted) => {
                        conn.evicted = true;
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                    None => break,
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };

                match message {
                    Ok(Message::Text(raw_message)) => {
                        match decode_event(&raw_message) {
                            Ok(event) => {
                                dispatch::dispatch_event(&state, &mut conn, event).await;
                            }
                            Err(error) => {
                                metrics::record_dropped_frame();
                                warn!(%error, "dropping malformed relay envelope");
                            }
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }
    }

    lifecycle::reconcile_disconnect(&state, &conn).await;
    metrics::connection_closed();
}

async fn send_event(socket: &mut WebSocket, event: &RelayEvent) -> Result<(), ()> {
    let encoded = encode_event(event).map_err(|_| ())?;
    socket.send(Message::Text(encoded.into())).await.map_err(|_| ())
}
