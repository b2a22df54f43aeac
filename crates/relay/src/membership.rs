// Session membership: which participants are currently joined to which
// collaborative session.
//
// Membership is mutated only by explicit join/leave events and by
// connection close; it is never derived from the persisted session
// records.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Result of a [`MembershipTable::leave`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LeaveOutcome {
    /// The participant was actually a member and has been removed.
    pub(crate) removed: bool,
    /// The membership set reached zero for the first time. The caller owns
    /// the single session-end side effect.
    pub(crate) session_ended: bool,
}

#[derive(Debug, Default)]
struct TableState {
    sessions: HashMap<i64, HashSet<i64>>,
    ended: HashSet<i64>,
}

/// Live membership table, one set of participant ids per session id.
#[derive(Debug, Clone, Default)]
pub(crate) struct MembershipTable {
    state: Arc<RwLock<TableState>>,
}

impl MembershipTable {
    /// Add a participant to a session. Re-joining is a no-op. Returns
    /// whether the participant was newly added.
    pub(crate) async fn join(&self, session_id: i64, participant_id: i64) -> bool {
        let mut guard = self.state.write().await;
        guard.sessions.entry(session_id).or_default().insert(participant_id)
    }

    /// Remove a participant from a session. An unknown session or absent
    /// participant is a no-op. `session_ended` is reported exactly once
    /// per session id: the first time its set transitions to empty, and
    /// never again even if the session is later rejoined and re-emptied.
    pub(crate) async fn leave(&self, session_id: i64, participant_id: i64) -> LeaveOutcome {
        let mut guard = self.state.write().await;
        let Some(members) = guard.sessions.get_mut(&session_id) else {
            return LeaveOutcome { removed: false, session_ended: false };
        };

        let removed = members.remove(&participant_id);
        if !members.is_empty() {
            return LeaveOutcome { removed, session_ended: false };
        }

        guard.sessions.remove(&session_id);
        let session_ended = removed && guard.ended.insert(session_id);
        LeaveOutcome { removed, session_ended }
    }

    /// Snapshot of a session's members; empty set if the session is
    /// unknown.
    pub(crate) async fn members(&self, session_id: i64) -> HashSet<i64> {
        self.state.read().await.sessions.get(&session_id).cloned().unwrap_or_default()
    }

    pub(crate) async fn is_empty(&self, session_id: i64) -> bool {
        self.members(session_id).await.is_empty()
    }
}
