use crate::logstore::{LogIndex, LogStore};
use crate::message::{InstallSnapshot, InstallSnapshotReply, SyncMessage};
use crate::replica::election::Role;
use crate::replica::replica::Replica;
use crate::replica::write_ahead_log::StoredSnapshot;
use crate::replica::{PersistentLocalState, ReplicaId, Snapshot, StateMachine};
use std::io;

impl<L, S, M> Replica<L, S, M>
where
    L: LogStore,
    S: PersistentLocalState,
    M: StateMachine,
{
    /// The peer is so far behind that our log no longer has what it needs. Ship the state machine
    /// instead; regular AppendEntries resume after its reply.
    pub(super) fn send_install_snapshot(&mut self, peer_id: &ReplicaId) -> io::Result<()> {
        let stored = self.wal.snapshot_for_peer()?;
        slog::info!(
            self.logger,
            "Sending snapshot through {:?} to {}",
            stored.snapshot.last_included_index,
            peer_id
        );

        let rpc = InstallSnapshot {
            term: self.current_term(),
            last_included_index: stored.snapshot.last_included_index,
            last_included_term: stored.last_included_term,
            data: stored.snapshot.data,
            sessions: stored.sessions,
        };
        self.send(peer_id, SyncMessage::InstallSnapshot(rpc));

        Ok(())
    }

    pub(super) fn handle_install_snapshot(&mut self, leader: &ReplicaId, rpc: InstallSnapshot) -> io::Result<()> {
        let current_term = self.current_term();

        // > Reply immediately if term < currentTerm
        if rpc.term < current_term {
            self.reply_install_snapshot(leader, false, rpc.last_included_index);
            return Ok(());
        }

        if rpc.term > current_term {
            self.observe_higher_term(rpc.term, Some(leader.clone()))?;
        } else {
            match self.election_state.role() {
                Role::Candidate => self.election_state.transition_to_follower(rpc.term, Some(leader.clone())),
                Role::Follower => self.election_state.set_leader_if_unknown(leader),
                Role::Leader | Role::Error => {
                    slog::error!(
                        self.logger,
                        "Received InstallSnapshot from {} in my own term {:?} while {:?}",
                        leader,
                        rpc.term,
                        self.election_state
                    );
                    return Ok(());
                }
            }
        }
        self.election_state.reset_timeout_if_follower();

        let last_included_index = rpc.last_included_index;
        let stored = StoredSnapshot {
            snapshot: Snapshot {
                data: rpc.data,
                last_included_index,
            },
            last_included_term: rpc.last_included_term,
            sessions: rpc.sessions,
        };
        if self.wal.install_snapshot(stored, self.election_state.role())? {
            self.apply_committed()?;
        }

        self.reply_install_snapshot(leader, true, last_included_index);
        Ok(())
    }

    fn reply_install_snapshot(&self, leader: &ReplicaId, success: bool, last_included_index: LogIndex) {
        self.send(
            leader,
            SyncMessage::InstallSnapshotReply(InstallSnapshotReply {
                term: self.current_term(),
                success,
                last_included_index,
            }),
        );
    }

    pub(super) fn handle_install_snapshot_reply(
        &mut self,
        peer_id: &ReplicaId,
        reply: InstallSnapshotReply,
    ) -> io::Result<()> {
        let current_term = self.current_term();
        if reply.term > current_term {
            return self.observe_higher_term(reply.term, None);
        }
        if reply.term < current_term || !reply.success {
            return Ok(());
        }

        let leader_last_index = self.wal.last_index();
        let more_to_send = match self
            .election_state
            .leader_state_mut()
            .and_then(|leader_state| leader_state.peer_state_mut(peer_id))
        {
            Some(peer_state) => {
                peer_state.record_match(reply.last_included_index, leader_last_index);
                peer_state.next() <= leader_last_index
            }
            None => return Ok(()),
        };

        self.advance_commit_index()?;
        if more_to_send {
            self.send_append_entries(peer_id)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::logstore::{ClientSession, LogIndex};
    use crate::message::{InstallSnapshot, InstallSnapshotReply, SyncMessage};
    use crate::replica::test_support::{ae_reply, append_entries, bytes_of, entry, harness, three_nodes, Harness};
    use crate::replica::{ProposeInput, Term};

    #[tokio::test]
    async fn leader_ships_snapshot_to_peer_behind_compaction() {
        let mut h = Harness::with_snapshot_threshold(three_nodes(), 2);
        h.replica.start();
        h.elect();
        for i in 0..3 {
            let _ = h.propose(ProposeInput::new(format!("e{}", i)));
        }
        // Peer 1 has everything, peer 2 nothing. Commit compacts the log.
        let fast = h.peer(1);
        h.deliver_from(&fast, ae_reply(1, true, 4));
        assert_eq!(h.replica.status().commit_index, LogIndex::new(4));
        assert!(h.replica.wal.begin_index() > LogIndex::new(1));
        h.transport.take_sent();

        let slow = h.peer(2);
        h.deliver_from(&slow, ae_reply(1, false, 0));
        let sent = h.transport.take_sent();
        assert_eq!(sent.len(), 1);
        let rpc = match &sent[0].message {
            SyncMessage::InstallSnapshot(rpc) => rpc.clone(),
            other => panic!("Expected InstallSnapshot, got {:?}", other),
        };
        assert_eq!(rpc.term, Term::new(1));
        assert_eq!(rpc.last_included_index, LogIndex::new(4));
        assert_eq!(rpc.last_included_term, Term::new(1));

        // Once installed, AppendEntries take over again.
        h.deliver_from(
            &slow,
            SyncMessage::InstallSnapshotReply(InstallSnapshotReply {
                term: Term::new(1),
                success: true,
                last_included_index: LogIndex::new(4),
            }),
        );
        let peer_state_next = h
            .replica
            .election_state
            .leader_state()
            .unwrap()
            .peer_state(&slow)
            .unwrap()
            .next();
        assert_eq!(peer_state_next, LogIndex::new(5));
    }

    #[tokio::test]
    async fn follower_installs_snapshot_with_sessions() {
        let mut h = harness(three_nodes());
        h.append_local(vec![entry(1, 1, "uncommitted")]);
        h.replica.start();
        let leader = h.peer(1);

        h.deliver_from(
            &leader,
            SyncMessage::InstallSnapshot(InstallSnapshot {
                term: Term::new(2),
                last_included_index: LogIndex::new(10),
                last_included_term: Term::new(2),
                data: bytes_of("x\ny"),
                sessions: vec![ClientSession {
                    client_id: 7,
                    seq_num: 3,
                }],
            }),
        );

        assert_eq!(
            h.transport.take_sent()[0].message,
            SyncMessage::InstallSnapshotReply(InstallSnapshotReply {
                term: Term::new(2),
                success: true,
                last_included_index: LogIndex::new(10),
            })
        );
        let status = h.replica.status();
        assert_eq!(status.commit_index, LogIndex::new(10));
        assert_eq!(status.last_applied, LogIndex::new(10));
        assert_eq!(status.last_log_index, LogIndex::new(10));
        assert_eq!(h.state_machine.rolled_back_data(), vec!["uncommitted"]);
        assert_eq!(h.state_machine.committed_data(), vec!["x", "y"]);
        assert!(h
            .replica
            .wal
            .sessions()
            .duplicate_of(&ClientSession {
                client_id: 7,
                seq_num: 3
            })
            .is_some());

        // Normal replication continues right after the boundary.
        h.deliver_from(
            &leader,
            append_entries(2, 10, 2, 11, vec![entry(11, 2, "z")]),
        );
        assert_eq!(h.transport.take_sent()[0].message, ae_reply(2, true, 11));
        assert_eq!(h.state_machine.committed_data(), vec!["x", "y", "z"]);
    }
}
