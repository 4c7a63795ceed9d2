use crate::logstore::{LogIndex, LogStore};
use crate::message::{AppendEntries, AppendEntriesReply, SyncMessage};
use crate::replica::election::Role;
use crate::replica::replica::Replica;
use crate::replica::{PersistentLocalState, ProposeError, ReplicaId, StateMachine};
use std::cmp;
use std::io;

impl<L, S, M> Replica<L, S, M>
where
    L: LogStore,
    S: PersistentLocalState,
    M: StateMachine,
{
    /// Leader just appended to its own log: push it out, and commit right away if we're alone.
    pub(super) fn replicate_new_entries(&mut self) -> io::Result<()> {
        self.broadcast_append_entries()?;
        self.advance_commit_index()
    }

    pub(super) fn broadcast_append_entries(&mut self) -> io::Result<()> {
        let peer_ids = match self.election_state.leader_state() {
            Some(leader_state) => leader_state.peer_ids(),
            None => return Ok(()),
        };
        for peer_id in peer_ids.iter() {
            self.send_append_entries(peer_id)?;
        }
        self.election_state.postpone_heartbeat_if_leader();

        Ok(())
    }

    /// > If last log index ≥ nextIndex for a follower: send
    /// > AppendEntries RPC with log entries starting at nextIndex
    ///
    /// With nothing new for the peer this is a heartbeat.
    pub(super) fn send_append_entries(&mut self, peer_id: &ReplicaId) -> io::Result<()> {
        let next_index = match self
            .election_state
            .leader_state()
            .and_then(|leader_state| leader_state.peer_state(peer_id))
        {
            Some(peer_state) => peer_state.next(),
            None => return Ok(()),
        };
        let prev_log_index = next_index.prev();

        if prev_log_index < self.wal.begin_index().prev() {
            // What the peer needs next has been compacted away.
            return self.send_install_snapshot(peer_id);
        }
        let prev_log_term = self.wal.term_at(prev_log_index)?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Missing log entry {:?} tracked for {}", prev_log_index, peer_id),
            )
        })?;
        let entries = self.wal.read_from(next_index, self.max_entries_per_append)?;

        let rpc = AppendEntries {
            term: self.current_term(),
            prev_log_index,
            prev_log_term,
            commit_index: self.wal.commit_index(),
            entries,
        };
        self.send(peer_id, SyncMessage::AppendEntries(rpc));

        Ok(())
    }

    pub(super) fn handle_append_entries(&mut self, leader: &ReplicaId, rpc: AppendEntries) -> io::Result<()> {
        let current_term = self.current_term();

        // 1. Reply false if term < currentTerm (§5.1)
        if rpc.term < current_term {
            self.reply_append_entries(leader, false, LogIndex::NONE);
            return Ok(());
        }

        if rpc.term > current_term {
            self.observe_higher_term(rpc.term, Some(leader.clone()))?;
        } else {
            match self.election_state.role() {
                // > If AppendEntries RPC received from new leader: convert to follower
                Role::Candidate => self.election_state.transition_to_follower(rpc.term, Some(leader.clone())),
                Role::Follower => self.election_state.set_leader_if_unknown(leader),
                Role::Leader | Role::Error => {
                    slog::error!(
                        self.logger,
                        "Received AppendEntries from {} in my own term {:?} while {:?}",
                        leader,
                        rpc.term,
                        self.election_state
                    );
                    return Ok(());
                }
            }
        }
        self.election_state.reset_timeout_if_follower();

        let leader_last_index = rpc.prev_log_index.plus(rpc.entries.len() as u64);
        let mut prev_log_index = rpc.prev_log_index;
        let mut entries = rpc.entries;

        // Everything up to our log boundary is committed, so it matches the leader already.
        let boundary = self.wal.begin_index().prev();
        if prev_log_index < boundary {
            let covered = (boundary.as_u64() - prev_log_index.as_u64()) as usize;
            if covered >= entries.len() {
                self.reply_append_entries(leader, true, leader_last_index);
                return Ok(());
            }
            entries.drain(..covered);
            prev_log_index = boundary;
        } else {
            // 2. Reply false if [my] log doesn't contain an entry at [leader's]
            // prevLogIndex whose term matches [leader's] prevLogTerm (§5.3)
            if self.wal.term_at(prev_log_index)? != Some(rpc.prev_log_term) {
                let hint = cmp::min(prev_log_index.prev(), self.wal.last_index());
                slog::info!(
                    self.logger,
                    "Log mismatch at {:?}. Hinting {:?} to {}",
                    prev_log_index,
                    hint,
                    leader
                );
                self.reply_append_entries(leader, false, hint);
                return Ok(());
            }
        }

        // 3. If [my] existing entry conflicts with [leader's new entries]
        // (same index but different terms), delete [my] existing entry and
        // all that follow it (§5.3)
        // 4. Append any new entries not already in the log
        let mut expected_index = prev_log_index.plus(1);
        for entry in entries {
            if entry.index != expected_index {
                slog::warn!(
                    self.logger,
                    "Dropping AppendEntries from {} with non-contiguous entry {:?}, expected {:?}",
                    leader,
                    entry.index,
                    expected_index
                );
                self.reply_append_entries(leader, false, expected_index.prev());
                return Ok(());
            }

            match self.wal.term_at(entry.index)? {
                Some(existing_term) if existing_term == entry.term => {
                    expected_index = expected_index.plus(1);
                    continue;
                }
                Some(_) => {
                    if entry.index <= self.wal.commit_index() {
                        slog::error!(
                            self.logger,
                            "Leader {} conflicts with my committed entry {:?}. Ignoring.",
                            leader,
                            entry.index
                        );
                        self.reply_append_entries(leader, false, LogIndex::NONE);
                        return Ok(());
                    }
                    self.truncate_from(entry.index, leader)?;
                }
                None => {}
            }

            self.wal.append(entry, Role::Follower)?;
            expected_index = expected_index.plus(1);
        }

        // 5. If leaderCommit > commitIndex, set commitIndex =
        // min(leaderCommit, index of last new entry)
        let new_commit_index = cmp::min(rpc.commit_index, leader_last_index);
        if self.wal.ratchet_fwd_commit_index(new_commit_index)? {
            // > If commitIndex > lastApplied: increment lastApplied, apply
            // > log[lastApplied] to state machine (§5.3)
            self.apply_committed()?;
        }

        self.reply_append_entries(leader, true, leader_last_index);
        Ok(())
    }

    fn truncate_from(&mut self, index: LogIndex, leader: &ReplicaId) -> io::Result<()> {
        slog::info!(self.logger, "Truncating divergent suffix from {:?}", index);
        self.wal.truncate_from(index, self.election_state.role())?;
        self.pending.fail_from(
            index,
            ProposeError::NotLeader {
                leader_hint: Some(leader.clone()),
            },
        );

        Ok(())
    }

    fn reply_append_entries(&self, leader: &ReplicaId, success: bool, match_index: LogIndex) {
        self.send(
            leader,
            SyncMessage::AppendEntriesReply(AppendEntriesReply {
                term: self.current_term(),
                success,
                match_index,
            }),
        );
    }

    pub(super) fn handle_append_entries_reply(&mut self, peer_id: &ReplicaId, reply: AppendEntriesReply) -> io::Result<()> {
        let current_term = self.current_term();
        if reply.term > current_term {
            return self.observe_higher_term(reply.term, None);
        }
        if reply.term < current_term {
            slog::debug!(
                self.logger,
                "Received AE reply from {} for outdated term {:?}, but we're on term {:?}",
                peer_id,
                reply.term,
                current_term
            );
            return Ok(());
        }

        let leader_last_index = self.wal.last_index();
        let begin_index = self.wal.begin_index();
        let peer_state = match self
            .election_state
            .leader_state_mut()
            .and_then(|leader_state| leader_state.peer_state_mut(peer_id))
        {
            Some(peer_state) => peer_state,
            None => {
                slog::debug!(self.logger, "Dropping AE reply from {}, not tracking it as leader", peer_id);
                return Ok(());
            }
        };

        if reply.success {
            peer_state.record_match(reply.match_index, leader_last_index);
            let more_to_send = peer_state.next() <= leader_last_index;

            self.advance_commit_index()?;
            if more_to_send {
                self.send_append_entries(peer_id)?;
            }
        } else if peer_state.rewind(reply.match_index) {
            slog::info!(
                self.logger,
                "{} is missing entries. Retrying from {:?}",
                peer_id,
                peer_state.next()
            );
            self.send_append_entries(peer_id)?;
        } else if peer_state.next() < begin_index {
            // Nothing to rewind, but what it needs is compacted. Ship the snapshot now rather than
            // on the next heartbeat.
            self.send_append_entries(peer_id)?;
        }

        Ok(())
    }

    pub(super) fn advance_commit_index(&mut self) -> io::Result<()> {
        let matched: Vec<LogIndex> = match self.election_state.leader_state() {
            Some(leader_state) => leader_state.peers_iter().map(|peer_state| peer_state.matched()).collect(),
            None => return Ok(()),
        };

        // > If there exists an N such that N > commitIndex, a majority
        // > of matchIndex[i] ≥ N, and log[N].term == currentTerm:
        // > set commitIndex = N (§5.3, §5.4).
        // See also:
        // > Figure 8: A time sequence showing why a leader cannot determine
        // > commitment using log entries from older terms.
        let tentative_new_commit_index = get_cluster_commit_index(matched, self.wal.last_index());
        if self
            .wal
            .ratchet_fwd_commit_index_if_valid(tentative_new_commit_index, self.current_term())?
        {
            self.apply_committed()?;
        }

        Ok(())
    }
}

/// Highest index replicated on a majority, counting ourselves with `my_last_index`.
pub(super) fn get_cluster_commit_index(mut peers_matched_indexes: Vec<LogIndex>, my_last_index: LogIndex) -> LogIndex {
    if peers_matched_indexes.is_empty() {
        return my_last_index;
    }
    peers_matched_indexes.sort();

    // Overview of why algo is correct:
    // We are always at the tail of the array, because our log is same/longest.
    // 1. add "me"
    //let cluster_size = peers_matched_indexes.len() + 1;
    // 2. calculate majority
    //let majority = (cluster_size / 2) + 1;
    // 3. subtract "me"
    //let num_peers_to_achieve_majority = majority - 1;
    // 4. take `i`th index from the right
    //let quorum_idx = peers_matched_indexes.len() - num_peers_to_achieve_majority;

    // Or just use this simplified equation which is harder to understand at a glance why it
    // works. When in doubt, just read the unit tests.
    let quorum_idx = peers_matched_indexes.len() / 2;

    peers_matched_indexes[quorum_idx]
}

#[cfg(test)]
mod tests {
    use super::get_cluster_commit_index;
    use crate::logstore::LogIndex;
    use crate::message::{AppendEntries, SyncMessage};
    use crate::replica::test_support::{ae_reply, append_entries, entry, harness, three_nodes};
    use crate::replica::{ProposeInput, Role, Term};

    #[test]
    fn test_commit_checker_logic() {
        fn run(expected: u64, matches: Vec<u64>) {
            let matches = matches.into_iter().map(LogIndex::new).collect();
            assert_eq!(
                LogIndex::new(expected),
                get_cluster_commit_index(matches, LogIndex::new(9))
            );
        }

        // 1-cluster
        run(9, vec![]);

        // 3-cluster
        run(0, vec![0, 0]);
        run(9, vec![0, 9]);
        run(9, vec![8, 9]);

        // 4-cluster
        run(0, vec![0, 0, 0]);
        run(0, vec![0, 0, 9]);
        run(8, vec![0, 8, 9]);
        run(8, vec![7, 8, 9]);

        // 5-cluster
        run(0, vec![0, 0, 0, 0]);
        run(0, vec![0, 0, 0, 9]);
        run(8, vec![0, 0, 8, 9]);
        run(8, vec![0, 7, 8, 9]);
        run(8, vec![6, 7, 8, 9]);

        // 6-cluster
        run(0, vec![0, 0, 0, 0, 0]);
        run(0, vec![0, 0, 0, 0, 9]);
        run(0, vec![0, 0, 0, 8, 9]);
        run(7, vec![0, 0, 7, 8, 9]);
        run(7, vec![0, 6, 7, 8, 9]);
        run(7, vec![5, 6, 7, 8, 9]);

        // 7-cluster
        run(0, vec![0, 0, 0, 0, 0, 0]);
        run(0, vec![0, 0, 0, 0, 8, 9]);
        run(7, vec![0, 0, 0, 7, 8, 9]);
        run(7, vec![4, 5, 6, 7, 8, 9]);

        // Ordering doesn't matter
        run(9, vec![9, 8]);
        run(8, vec![7, 9, 8]);
        run(8, vec![6, 0, 8, 9]);
        run(7, vec![9, 8, 0, 0, 7]);
    }

    #[tokio::test]
    async fn follower_rejects_mismatched_prev_term() {
        let mut h = harness(three_nodes());
        h.append_local(vec![entry(1, 1, "a"), entry(2, 1, "b")]);
        h.replica.start();
        let leader = h.peer(1);

        // We have index 2 at term 1, not term 2.
        h.deliver_from(&leader, append_entries(3, 2, 2, 0, vec![entry(3, 3, "c")]));
        // Past the end of our log.
        h.deliver_from(&leader, append_entries(3, 7, 3, 0, vec![]));

        let sent = h.transport.take_sent();
        assert_eq!(sent[0].message, ae_reply(3, false, 1));
        assert_eq!(sent[1].message, ae_reply(3, false, 2));
        assert_eq!(h.replica.status().leader, Some(leader));
        assert_eq!(h.replica.status().last_log_index, LogIndex::new(2));
    }

    #[tokio::test]
    async fn follower_truncates_divergent_suffix_and_commits() {
        let mut h = harness(three_nodes());
        h.append_local(vec![entry(1, 1, "a"), entry(2, 1, "stale-1"), entry(3, 1, "stale-2")]);
        h.replica.start();
        let leader = h.peer(2);

        h.deliver_from(
            &leader,
            append_entries(2, 1, 1, 2, vec![entry(2, 2, "b"), entry(3, 2, "c")]),
        );

        assert_eq!(h.transport.take_sent()[0].message, ae_reply(2, true, 3));
        assert_eq!(h.state_machine.rolled_back_data(), vec!["stale-2", "stale-1"]);
        // Commit is capped by the leader's commit index.
        assert_eq!(h.state_machine.committed_data(), vec!["a", "b"]);
        assert_eq!(h.replica.status().commit_index, LogIndex::new(2));

        // A replayed, older AppendEntries doesn't truncate anything.
        h.deliver_from(&leader, append_entries(2, 1, 1, 2, vec![entry(2, 2, "b")]));
        assert_eq!(h.transport.take_sent()[0].message, ae_reply(2, true, 2));
        assert_eq!(h.replica.status().last_log_index, LogIndex::new(3));
    }

    #[tokio::test]
    async fn stale_leader_is_told_the_new_term() {
        let mut h = harness(three_nodes());
        h.replica.start();
        let peer = h.peer(1);
        h.deliver_from(&peer, append_entries(4, 0, 0, 0, vec![]));
        h.transport.take_sent();

        let old_leader = h.peer(2);
        h.deliver_from(&old_leader, append_entries(3, 0, 0, 0, vec![]));

        assert_eq!(h.transport.take_sent()[0].message, ae_reply(4, false, 0));
        assert_eq!(h.replica.status().leader, Some(peer));
    }

    #[tokio::test]
    async fn leader_backs_off_next_index_until_logs_converge() {
        let mut h = harness(three_nodes());
        h.append_local(vec![entry(1, 1, "a"), entry(2, 1, "b"), entry(3, 1, "c")]);
        h.replica.start();
        h.elect();
        let peer = h.peer(1);

        // The peer only has index 1.
        h.deliver_from(&peer, ae_reply(2, false, 1));
        let retry = h.transport.take_sent();
        assert_eq!(retry.len(), 1);
        match &retry[0].message {
            SyncMessage::AppendEntries(AppendEntries {
                prev_log_index,
                prev_log_term,
                entries,
                ..
            }) => {
                assert_eq!(*prev_log_index, LogIndex::new(1));
                assert_eq!(*prev_log_term, Term::new(1));
                // b, c and the no-op.
                assert_eq!(entries.len(), 3);
            }
            other => panic!("Expected AppendEntries, got {:?}", other),
        }

        // A stale rejection doesn't move next back again.
        h.deliver_from(&peer, ae_reply(2, false, 2));
        assert!(h.transport.take_sent().is_empty());

        // Old-term entries commit along with the no-op.
        h.deliver_from(&peer, ae_reply(2, true, 4));
        assert_eq!(h.replica.status().commit_index, LogIndex::new(4));
        assert_eq!(h.state_machine.committed_data(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn old_term_entries_dont_commit_by_counting() {
        let mut h = harness(three_nodes());
        h.append_local(vec![entry(1, 1, "a")]);
        h.replica.start();
        h.elect();
        assert_eq!(h.replica.status().term, Term::new(2));
        let peer = h.peer(1);

        // Majority has index 1 (term 1), but not the term 2 no-op.
        h.deliver_from(&peer, ae_reply(2, true, 1));
        assert_eq!(h.replica.status().commit_index, LogIndex::NONE);
        assert!(h.state_machine.committed_data().is_empty());
    }

    #[tokio::test]
    async fn batches_are_bounded() {
        let mut h = harness(three_nodes());
        h.replica.max_entries_per_append = 2;
        h.replica.start();
        h.elect();
        for i in 0..4 {
            let _ = h.propose(ProposeInput::new(format!("e{}", i)));
        }
        h.transport.take_sent();

        h.replica.broadcast_append_entries().unwrap();
        for envelope in h.transport.take_sent() {
            match envelope.message {
                SyncMessage::AppendEntries(ae) => assert_eq!(ae.entries.len(), 2),
                other => panic!("Expected AppendEntries, got {:?}", other),
            }
        }
        assert_eq!(h.replica.status().role, Role::Leader);
    }
}
