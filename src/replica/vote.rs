use crate::logstore::{LogIndex, LogStore, RaftEntry};
use crate::message::{RequestVote, RequestVoteReply, SyncMessage};
use crate::replica::election::Role;
use crate::replica::replica::Replica;
use crate::replica::{PersistentLocalState, ReplicaId, StateMachine, Term, Vote};
use std::io;

impl<L, S, M> Replica<L, S, M>
where
    L: LogStore,
    S: PersistentLocalState,
    M: StateMachine,
{
    /// > On conversion to candidate, start election:
    /// > • Increment currentTerm
    /// > • Vote for self
    /// > • Reset election timer
    /// > • Send RequestVote RPCs to all other servers
    pub(super) fn start_election(&mut self) -> io::Result<()> {
        let new_term = self.current_term().next();

        // Write-ahead: the term and our vote are durable before anyone hears about them.
        self.local_state.persist_term(new_term)?;
        self.local_state.persist_vote(Vote {
            term: new_term,
            candidate: self.my_replica_id().clone(),
        })?;
        self.election_state.transition_to_candidate(new_term);
        slog::info!(self.logger, "Starting election. Election state: {:?}", self.election_state);

        if self.cluster_tracker.majority() <= 1 {
            return self.become_leader();
        }

        let (last_log_index, last_log_term) = self.wal.latest_entry();
        let rpc = RequestVote {
            term: new_term,
            last_log_index,
            last_log_term,
        };
        for peer_id in self.cluster_tracker.peer_ids() {
            self.send(&peer_id, SyncMessage::RequestVote(rpc.clone()));
        }

        Ok(())
    }

    pub(super) fn handle_request_vote(&mut self, candidate: &ReplicaId, rpc: RequestVote) -> io::Result<()> {
        let current_term = self.current_term();

        // 1. Reply false if term < currentTerm (§5.1)
        if rpc.term < current_term {
            slog::info!(
                self.logger,
                "Not granting vote to {}. Its term {:?} is out of date.",
                candidate,
                rpc.term
            );
            self.reply_vote(candidate, current_term, false);
            return Ok(());
        }

        if rpc.term > current_term {
            self.observe_higher_term(rpc.term, None)?;
        }

        // 2. If votedFor is null or candidateId, and candidate’s log is at
        // least as up-to-date as receiver’s log, grant vote (§5.2, §5.4).
        let voted_for = self.local_state.voted_for(rpc.term);
        if let Some(voted_for) = &voted_for {
            if voted_for != candidate {
                slog::info!(self.logger, "Not granting vote to {}. Already voted for {}.", candidate, voted_for);
                self.reply_vote(candidate, rpc.term, false);
                return Ok(());
            }
        }

        if !self.is_candidate_log_gte_mine(rpc.last_log_term, rpc.last_log_index) {
            slog::info!(
                self.logger,
                "Not granting vote to {}. Its log ({:?}, {:?}) is behind mine {:?}.",
                candidate,
                rpc.last_log_term,
                rpc.last_log_index,
                self.wal.latest_entry()
            );
            self.reply_vote(candidate, rpc.term, false);
            return Ok(());
        }

        if voted_for.is_none() {
            self.local_state.persist_vote(Vote {
                term: rpc.term,
                candidate: candidate.clone(),
            })?;
        }
        // > If election timeout elapses without receiving AppendEntries
        // > RPC from current leader or granting vote to candidate:
        // > convert to candidate
        self.election_state.reset_timeout_if_follower();
        slog::info!(self.logger, "Voting for {} in term {:?}", candidate, rpc.term);
        self.reply_vote(candidate, rpc.term, true);

        Ok(())
    }

    fn reply_vote(&self, candidate: &ReplicaId, term: Term, vote_granted: bool) {
        self.send(
            candidate,
            SyncMessage::RequestVoteReply(RequestVoteReply { term, vote_granted }),
        );
    }

    fn is_candidate_log_gte_mine(&self, candidate_last_term: Term, candidate_last_index: LogIndex) -> bool {
        // > Raft determines which of two logs is more up-to-date
        // > by comparing the index and term of the last entries in the
        // > logs. If the logs have last entries with different terms, then
        // > the log with the later term is more up-to-date. If the logs
        // > end with the same term, then whichever log is longer is
        // > more up-to-date.
        let (my_last_index, my_last_term) = self.wal.latest_entry();
        (candidate_last_term, candidate_last_index) >= (my_last_term, my_last_index)
    }

    pub(super) fn handle_request_vote_reply(&mut self, voter: &ReplicaId, reply: RequestVoteReply) -> io::Result<()> {
        let current_term = self.current_term();
        if reply.term > current_term {
            return self.observe_higher_term(reply.term, None);
        }
        if reply.term < current_term {
            slog::debug!(
                self.logger,
                "Received vote for outdated term {:?}, current term: {:?}.",
                reply.term,
                current_term
            );
            return Ok(());
        }
        if !reply.vote_granted {
            slog::info!(self.logger, "Vote not granted from {} for term {:?}", voter, reply.term);
            return Ok(());
        }

        let num_votes_received = match self.election_state.add_vote_if_candidate(voter.clone()) {
            Some(v) => v,
            None => {
                slog::debug!(
                    self.logger,
                    "Received vote for term {:?} after moving on. Election state: {:?}",
                    reply.term,
                    self.election_state
                );
                return Ok(());
            }
        };

        let majority = self.cluster_tracker.majority();
        slog::info!(
            self.logger,
            "Received {}/{} votes for term {:?}",
            num_votes_received,
            majority,
            reply.term
        );
        if num_votes_received >= majority {
            self.become_leader()?;
        }

        Ok(())
    }

    fn become_leader(&mut self) -> io::Result<()> {
        let term = self.current_term();
        let (last_index, _) = self.wal.latest_entry();
        self.election_state
            .transition_to_leader(self.cluster_tracker.peer_ids(), last_index);
        slog::info!(self.logger, "Became leader. Election state: {:?}", self.election_state);

        // A no-op from our own term lets everything before it commit, and announces leadership
        // on the first broadcast.
        self.wal.append(RaftEntry::noop(last_index.plus(1), term), Role::Leader)?;
        self.replicate_new_entries()
    }
}
