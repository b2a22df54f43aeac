// Relay dispatcher: the per-event protocol applied to every inbound
// envelope.
//
// Order matters and is fixed: identity binding, join bookkeeping, verbatim
// fan-out to the other session members, then storage side effects. Side
// effects run after the broadcast and are fire-and-forget; a storage
// failure never retracts an already-sent broadcast.

use crate::lifecycle::{self, Announce};
use crate::metrics;
use crate::registry::{Outbound, RegisteredConnection};
use crate::ws::{ConnectionState, RelayState};
use pairlab_common::protocol::event::{
    CodeChangePayload, EventKind, FileCreatePayload, RelayEvent,
};
use tracing::{error, info, warn};

pub(crate) async fn dispatch_event(
    state: &RelayState,
    conn: &mut ConnectionState,
    event: RelayEvent,
) {
    metrics::record_event(event.kind.as_str());

    if event.kind == EventKind::SessionJoin {
        handle_session_join(state, conn, &event).await;
    } else if conn.participant_id.is_none() {
        // The first envelope binds the connection's identity, join or not.
        conn.participant_id = Some(event.sender_id);
        register_identity(state, conn, event.sender_id, None).await;
    }

    broadcast_to_session(state, &event).await;

    apply_side_effects(state, conn, &event).await;
}

/// Fan the envelope out, verbatim, to every member of its session except
/// the sender. Members without a live registered connection are skipped
/// silently.
pub(crate) async fn broadcast_to_session(state: &RelayState, event: &RelayEvent) -> usize {
    let members = state.membership.members(event.session_id).await;
    let mut delivered = 0;
    for participant_id in members {
        if participant_id == event.sender_id {
            continue;
        }
        let Some(handle) = state.registry.lookup(participant_id).await else {
            continue;
        };
        if handle.send(Outbound::Deliver(event.clone())).is_ok() {
            delivered += 1;
        }
    }

    metrics::record_deliveries(delivered);
    delivered
}

async fn handle_session_join(state: &RelayState, conn: &mut ConnectionState, event: &RelayEvent) {
    let participant_id = event.sender_id;
    let session_id = event.session_id;

    if conn.participant_id.is_none() {
        conn.participant_id = Some(participant_id);
    }

    // One active session per connection: joining another one migrates,
    // with the full leave effects for the previous session.
    if let Some(previous) = conn.session_id {
        if previous != session_id {
            lifecycle::depart_session(state, previous, participant_id, Announce::Synthesize).await;
        }
    }

    register_identity(state, conn, participant_id, Some(session_id)).await;

    let newly_joined = state.membership.join(session_id, participant_id).await;
    conn.session_id = Some(session_id);

    if newly_joined {
        info!(session_id, participant_id, "participant joined session");

        // Presence bookkeeping runs off the dispatch path.
        let store = state.store.clone();
        tokio::spawn(async move {
            match store.get_user(participant_id).await {
                Ok(Some(user)) => {
                    if let Err(error) = store.set_user_online(participant_id, true).await {
                        error!(%error, participant_id, "failed to mark participant online");
                    } else {
                        info!(participant_id, username = %user.username, "participant online");
                    }
                }
                Ok(None) => warn!(participant_id, "session-join from unknown participant"),
                Err(error) => {
                    error!(%error, participant_id, "failed to load participant record");
                }
            }
        });
    }
}

/// Install this connection in the registry. If a stale connection held the
/// identity, it is told to close; if it was joined through a different
/// session than `session_id`, the participant is migrated out of it.
async fn register_identity(
    state: &RelayState,
    conn: &ConnectionState,
    participant_id: i64,
    session_id: Option<i64>,
) {
    let replaced = state
        .registry
        .register(
            participant_id,
            RegisteredConnection { handle: conn.handle.clone(), session_id },
        )
        .await;

    let Some(previous) = replaced else {
        return;
    };
    if previous.handle.same_channel(&conn.handle) {
        return;
    }

    info!(participant_id, "closing stale connection replaced by a newer one");
    let _ = previous.handle.send(Outbound::Evicted);

    if let Some(stale_session) = previous.session_id {
        if Some(stale_session) != session_id {
            lifecycle::depart_session(state, stale_session, participant_id, Announce::Synthesize)
                .await;
        }
    }
}

async fn apply_side_effects(state: &RelayState, conn: &mut ConnectionState, event: &RelayEvent) {
    match event.kind {
        EventKind::CodeChange => {
            let payload = match event.payload_as::<CodeChangePayload>() {
                Ok(payload) => payload,
                Err(error) => {
                    warn!(
                        %error,
                        session_id = event.session_id,
                        "ignoring code-change with malformed payload"
                    );
                    return;
                }
            };
            // Edits without a file id target an unsaved buffer and are
            // fan-out only.
            let Some(file_id) = payload.file_id else {
                return;
            };

            let store = state.store.clone();
            tokio::spawn(async move {
                if let Err(error) = store.update_file_content(file_id, &payload.content).await {
                    error!(%error, file_id, "failed to persist file content");
                }
            });
        }
        EventKind::FileCreate => {
            let payload = match event.payload_as::<FileCreatePayload>() {
                Ok(payload) => payload,
                Err(error) => {
                    warn!(
                        %error,
                        session_id = event.session_id,
                        "ignoring file-create with malformed payload"
                    );
                    return;
                }
            };

            let session_id = event.session_id;
            let store = state.store.clone();
            tokio::spawn(async move {
                match store
                    .create_file(
                        session_id,
                        &payload.name,
                        &payload.content,
                        payload.language.as_deref(),
                    )
                    .await
                {
                    Ok(file_id) => info!(session_id, file_id, name = %payload.name, "file created"),
                    Err(error) => {
                        error!(%error, session_id, name = %payload.name, "failed to persist new file");
                    }
                }
            });
        }
        EventKind::SessionLeave => {
            lifecycle::depart_session(
                state,
                event.session_id,
                event.sender_id,
                Announce::AlreadyBroadcast,
            )
            .await;

            if conn.session_id == Some(event.session_id) {
                conn.session_id = None;
            }
        }
        _ => {}
    }
}
