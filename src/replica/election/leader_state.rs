use crate::logstore::LogIndex;
use crate::replica::ReplicaId;
use std::cmp;
use std::collections::HashMap;

pub(crate) struct LeaderStateTracker {
    peer_state: HashMap<ReplicaId, PeerState>,
}

impl LeaderStateTracker {
    pub(super) fn new(peer_ids: Vec<ReplicaId>, last_index: LogIndex) -> Self {
        let peer_state = peer_ids
            .into_iter()
            .map(|id| (id, PeerState::new(last_index)))
            .collect();

        LeaderStateTracker { peer_state }
    }

    pub(crate) fn peer_state(&self, peer_id: &ReplicaId) -> Option<&PeerState> {
        self.peer_state.get(peer_id)
    }

    pub(crate) fn peer_state_mut(&mut self, peer_id: &ReplicaId) -> Option<&mut PeerState> {
        self.peer_state.get_mut(peer_id)
    }

    pub(crate) fn peer_ids(&self) -> Vec<ReplicaId> {
        let mut ids: Vec<ReplicaId> = self.peer_state.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub(crate) fn peers_iter(&self) -> impl Iterator<Item = &PeerState> {
        self.peer_state.values()
    }

    /// Follow a configuration change: start tracking new peers, forget removed ones.
    pub(crate) fn sync_peers(&mut self, peer_ids: Vec<ReplicaId>, last_index: LogIndex) {
        self.peer_state.retain(|id, _| peer_ids.contains(id));
        for id in peer_ids {
            self.peer_state.entry(id).or_insert_with(|| PeerState::new(last_index));
        }
    }
}

#[derive(Debug, PartialEq)]
pub(crate) struct PeerState {
    // > index of the next log entry to send to that server
    // > (initialized to leader last log index + 1)
    next: LogIndex,
    // > index of highest log entry known to be replicated on server
    // > (initialized to 0, increases monotonically)
    matched: LogIndex,
}

impl PeerState {
    fn new(last_index: LogIndex) -> Self {
        PeerState {
            next: last_index.plus(1),
            matched: LogIndex::NONE,
        }
    }

    pub(crate) fn next(&self) -> LogIndex {
        self.next
    }

    pub(crate) fn matched(&self) -> LogIndex {
        self.matched
    }

    /// The peer confirmed its log matches ours up to `match_index`. Returns true if `matched`
    /// moved forward. Replies are clamped to our own log, since a peer can send garbage.
    pub(crate) fn record_match(&mut self, match_index: LogIndex, leader_last_index: LogIndex) -> bool {
        let match_index = cmp::min(match_index, leader_last_index);
        let advanced = match_index > self.matched;
        if advanced {
            self.matched = match_index;
        }
        self.next = cmp::max(self.next, self.matched.plus(1));

        advanced
    }

    /// The peer rejected AppendEntries. `hint` is the highest index it suggests as the next
    /// `prev_log_index`. Returns true if `next` moved back; stale rejections don't move it.
    pub(crate) fn rewind(&mut self, hint: LogIndex) -> bool {
        let candidate = hint.plus(1);
        if candidate >= self.next {
            return false;
        }

        // Never go below what the peer already confirmed.
        let new_next = cmp::max(candidate, self.matched.plus(1));
        let moved = new_next != self.next;
        self.next = new_next;

        moved
    }
}
