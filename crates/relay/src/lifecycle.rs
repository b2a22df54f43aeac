// Session lifecycle reconciliation, shared by the explicit-leave and
// transport-disconnect paths so both converge on identical membership and
// broadcast effects.

use crate::dispatch;
use crate::metrics;
use crate::ws::{ConnectionState, RelayState};
use pairlab_common::protocol::event::RelayEvent;
use tracing::{error, info};

/// Whether `depart_session` still needs to announce the departure to the
/// remaining members, or the explicit `session-leave` envelope was already
/// fanned out by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Announce {
    AlreadyBroadcast,
    Synthesize,
}

/// Remove a participant from a session and run the end-of-session check.
///
/// The membership table reports the empty transition exactly once per
/// session, so the session-end side effect cannot fire twice even when
/// explicit leaves and disconnects race.
pub(crate) async fn depart_session(
    state: &RelayState,
    session_id: i64,
    participant_id: i64,
    announce: Announce,
) {
    let outcome = state.membership.leave(session_id, participant_id).await;

    if announce == Announce::Synthesize && outcome.removed {
        let leave = RelayEvent::synthesized_leave(session_id, participant_id);
        dispatch::broadcast_to_session(state, &leave).await;
    }

    if outcome.session_ended {
        metrics::record_session_end();
        info!(session_id, "last participant left, ending session");

        let store = state.store.clone();
        tokio::spawn(async move {
            if let Err(error) = store.end_session(session_id).await {
                error!(%error, session_id, "failed to end session in storage");
            }
        });
    }
}

/// Transport-level disconnect: the counterpart of an explicit leave,
/// driven by the socket closing instead of an application message.
pub(crate) async fn reconcile_disconnect(state: &RelayState, conn: &ConnectionState) {
    let Some(participant_id) = conn.participant_id else {
        return;
    };

    if conn.evicted {
        // A newer connection owns this identity now. Its join already
        // migrated membership, so tearing anything down here would undo
        // that takeover.
        return;
    }

    state.registry.unregister_exact(participant_id, &conn.handle).await;

    if let Some(session_id) = conn.session_id {
        depart_session(state, session_id, participant_id, Announce::Synthesize).await;
    }

    let store = state.store.clone();
    tokio::spawn(async move {
        if let Err(error) = store.set_user_online(participant_id, false).await {
            error!(%error, participant_id, "failed to mark participant offline");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::MembershipTable;
    use crate::registry::{ConnectionRegistry, Outbound, RegisteredConnection};
    use crate::store::PlatformStore;
    use pairlab_common::protocol::event::EventKind;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout, Duration};

    fn test_state() -> RelayState {
        RelayState {
            registry: ConnectionRegistry::default(),
            membership: MembershipTable::default(),
            store: PlatformStore::in_memory(),
        }
    }

    async fn wait_until<F, Fut>(what: &str, mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if condition().await {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[tokio::test]
    async fn synthesized_departure_reaches_remaining_members() {
        let state = test_state();
        let (remaining_handle, mut remaining_rx) = mpsc::unbounded_channel();
        state.membership.join(7, 1).await;
        state.membership.join(7, 2).await;
        state
            .registry
            .register(2, RegisteredConnection { handle: remaining_handle, session_id: Some(7) })
            .await;

        depart_session(&state, 7, 1, Announce::Synthesize).await;

        let outbound = timeout(Duration::from_secs(1), remaining_rx.recv())
            .await
            .expect("timed out waiting for the synthesized leave")
            .expect("channel should stay open");
        let Outbound::Deliver(event) = outbound else {
            panic!("expected a delivery");
        };
        assert_eq!(event.kind, EventKind::SessionLeave);
        assert_eq!(event.session_id, 7);
        assert_eq!(event.sender_id, 1);
    }

    #[tokio::test]
    async fn already_broadcast_departure_stays_silent() {
        let state = test_state();
        let (remaining_handle, mut remaining_rx) = mpsc::unbounded_channel();
        state.membership.join(7, 1).await;
        state.membership.join(7, 2).await;
        state
            .registry
            .register(2, RegisteredConnection { handle: remaining_handle, session_id: Some(7) })
            .await;

        depart_session(&state, 7, 1, Announce::AlreadyBroadcast).await;

        assert!(remaining_rx.try_recv().is_err());
        assert_eq!(state.membership.members(7).await.len(), 1);
    }

    #[tokio::test]
    async fn departing_a_session_never_in_is_a_noop() {
        let state = test_state();
        depart_session(&state, 42, 1, Announce::Synthesize).await;

        sleep(Duration::from_millis(20)).await;
        assert!(state.store.ended_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn mixed_leave_paths_end_the_session_exactly_once() {
        let state = test_state();
        for participant_id in [1, 2, 3] {
            state.membership.join(9, participant_id).await;
        }

        depart_session(&state, 9, 2, Announce::AlreadyBroadcast).await;
        depart_session(&state, 9, 3, Announce::Synthesize).await;
        depart_session(&state, 9, 1, Announce::Synthesize).await;
        // Stragglers after the end change nothing.
        depart_session(&state, 9, 1, Announce::Synthesize).await;

        let store = state.store.clone();
        wait_until("the session to end", || {
            let store = store.clone();
            async move { !store.ended_sessions().await.is_empty() }
        })
        .await;
        sleep(Duration::from_millis(20)).await;
        assert_eq!(state.store.ended_sessions().await, vec![9]);
    }

    #[tokio::test]
    async fn disconnect_reconciles_registry_membership_and_presence() {
        let state = test_state();
        state.store.seed_user(1, "alice").await;
        let (handle, _rx) = mpsc::unbounded_channel();
        let conn = ConnectionState {
            handle: handle.clone(),
            participant_id: Some(1),
            session_id: Some(7),
            evicted: false,
        };
        state
            .registry
            .register(1, RegisteredConnection { handle, session_id: Some(7) })
            .await;
        state.membership.join(7, 1).await;

        reconcile_disconnect(&state, &conn).await;

        assert!(state.registry.lookup(1).await.is_none());
        assert!(state.membership.is_empty(7).await);
        let store = state.store.clone();
        wait_until("disconnect effects to persist", || {
            let store = store.clone();
            async move {
                store.ended_sessions().await == vec![7]
                    && store.presence_calls().await.contains(&(1, false))
            }
        })
        .await;
    }

    #[tokio::test]
    async fn disconnect_of_an_unbound_connection_is_a_noop() {
        let state = test_state();
        let (handle, _rx) = mpsc::unbounded_channel();
        let conn =
            ConnectionState { handle, participant_id: None, session_id: None, evicted: false };

        reconcile_disconnect(&state, &conn).await;

        sleep(Duration::from_millis(20)).await;
        assert!(state.store.presence_calls().await.is_empty());
    }

    #[tokio::test]
    async fn evicted_connections_skip_reconciliation() {
        let state = test_state();
        state.membership.join(7, 1).await;
        let (stale_handle, _stale_rx) = mpsc::unbounded_channel();
        let (current_handle, _current_rx) = mpsc::unbounded_channel();
        state
            .registry
            .register(1, RegisteredConnection { handle: current_handle, session_id: Some(7) })
            .await;

        let stale = ConnectionState {
            handle: stale_handle,
            participant_id: Some(1),
            session_id: Some(7),
            evicted: true,
        };
        reconcile_disconnect(&state, &stale).await;

        // The takeover's state survives the stale socket's close.
        assert!(state.registry.lookup(1).await.is_some());
        assert!(state.membership.members(7).await.contains(&1));
        sleep(Duration::from_millis(20)).await;
        assert!(state.store.ended_sessions().await.is_empty());
        assert!(state.store.presence_calls().await.is_empty());
    }
}
