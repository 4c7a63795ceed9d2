use crate::actor::{Callback, WeakActorClient};
use crate::logstore::{ClientSession, EntryKind, LogIndex, LogStore, RaftEntry};
use crate::message::{self, Envelope, Ping, PingReply, SyncMessage, SyncTimeout, TimeoutKind};
use crate::replica::election::{ElectionState, PeriodicTimerHandle, Role, StatusListener};
use crate::replica::peers::ClusterTracker;
use crate::replica::pending::PendingProposals;
use crate::replica::sessions::Admission;
use crate::replica::write_ahead_log::WriteAheadLog;
use crate::replica::{
    NodeStatus, PersistentLocalState, ProposeError, ProposeInput, ProposeOutcome, ProposeOutput, ReconfigError,
    ReplicaId, StateMachine, StateMachineOutput, SyncConfig, Term, TimerSettings, TimerUpdate, TimerUpdateError,
    VgroupId,
};
use crate::transport::Transport;
use bytes::Bytes;
use std::io;
use std::sync::Arc;

pub(crate) struct ReplicaConfig<L, S, M>
where
    L: LogStore,
    S: PersistentLocalState,
    M: StateMachine,
{
    pub(crate) logger: slog::Logger,
    pub(crate) vgroup_id: VgroupId,
    pub(crate) sync_config: SyncConfig,
    pub(crate) log_store: L,
    pub(crate) local_state: S,
    pub(crate) state_machine: M,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) timer_settings: TimerSettings,
    pub(crate) max_entries_per_append: usize,
    pub(crate) weak_commit_enabled: bool,
    pub(crate) snapshot_threshold: Option<u64>,
    pub(crate) actor_client: WeakActorClient,
}

/// Replica owns every piece of a node's consensus state. It is only ever touched from the node's
/// event loop, one event at a time.
///
/// Handlers that touch storage return `io::Result`. Any error they return moves the node into the
/// terminal Error role.
pub(crate) struct Replica<L, S, M>
where
    L: LogStore,
    S: PersistentLocalState,
    M: StateMachine,
{
    pub(super) logger: slog::Logger,
    pub(super) cluster_tracker: ClusterTracker,
    pub(super) local_state: S,
    pub(super) election_state: ElectionState,
    pub(super) wal: WriteAheadLog<L, M>,
    pub(super) pending: PendingProposals,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) ping_timer: Option<PeriodicTimerHandle>,
    pub(super) ping_epoch: u64,
    pub(super) max_entries_per_append: usize,
    pub(super) weak_commit_enabled: bool,
    pub(super) actor_client: WeakActorClient,
}

impl<L, S, M> Replica<L, S, M>
where
    L: LogStore,
    S: PersistentLocalState,
    M: StateMachine,
{
    /// A persisted configuration (from an earlier reconfiguration) wins over the supplied one.
    /// `sync_config` must already be validated.
    pub(crate) fn new(config: ReplicaConfig<L, S, M>) -> io::Result<(Self, StatusListener)> {
        let ReplicaConfig {
            logger,
            vgroup_id,
            sync_config,
            log_store,
            mut local_state,
            state_machine,
            transport,
            timer_settings,
            max_entries_per_append,
            weak_commit_enabled,
            snapshot_threshold,
            actor_client,
        } = config;

        let sync_config = match local_state.config() {
            Some(persisted) => {
                slog::info!(logger, "Using persisted configuration: {:?}", persisted);
                persisted
            }
            None => {
                local_state.persist_config(&sync_config)?;
                sync_config
            }
        };
        let cluster_tracker = ClusterTracker::new(vgroup_id, sync_config);

        let (election_state, listener) = ElectionState::new_follower(
            local_state.current_term(),
            cluster_tracker.my_replica_id().clone(),
            timer_settings,
            actor_client.clone(),
        );
        let wal = WriteAheadLog::new(logger.clone(), log_store, state_machine, snapshot_threshold)?;

        let replica = Replica {
            logger,
            cluster_tracker,
            local_state,
            election_state,
            wal,
            pending: PendingProposals::default(),
            transport,
            ping_timer: None,
            ping_epoch: 0,
            max_entries_per_append,
            weak_commit_enabled,
            actor_client,
        };

        Ok((replica, listener))
    }

    /// Arm timers and catch the state machine up with what's already committed. Runs on the event
    /// loop, before the first event.
    pub(crate) fn start(&mut self) {
        slog::info!(
            self.logger,
            "Starting. Term: {:?}, last log entry: {:?}, commit index: {:?}",
            self.current_term(),
            self.wal.latest_entry(),
            self.wal.commit_index()
        );
        self.election_state.start_timers();
        self.restart_ping_timer();

        let mut result = self.apply_committed();
        if result.is_ok() && self.cluster_tracker.peer_ids().is_empty() {
            // Nobody to wait for.
            result = self.start_election();
        }
        if let Err(e) = result {
            self.enter_error_state(e);
        }
    }

    pub(crate) fn shutdown(&mut self) {
        slog::info!(self.logger, "Stopping. Election state: {:?}", self.election_state);
        self.ping_timer = None;
        self.pending.fail_all(ProposeError::NodeStopped);
    }

    pub(crate) fn handle_network_message(&mut self, bytes: &Bytes) {
        if self.election_state.is_error() {
            slog::debug!(self.logger, "Dropping network message in Error role");
            return;
        }

        let envelope = match message::decode(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                slog::warn!(self.logger, "Dropping malformed envelope: {}", e);
                return;
            }
        };
        if envelope.vgroup_id != self.cluster_tracker.vgroup_id() || envelope.dest != *self.my_replica_id() {
            slog::warn!(
                self.logger,
                "Dropping {} addressed to {} of vgroup {}",
                envelope.message.name(),
                envelope.dest,
                envelope.vgroup_id
            );
            return;
        }
        if !self.cluster_tracker.contains_member(&envelope.src) {
            slog::warn!(
                self.logger,
                "Dropping {} from {}, which is not a member",
                envelope.message.name(),
                envelope.src
            );
            return;
        }

        let src = envelope.src;
        let result = match envelope.message {
            SyncMessage::Ping(ping) => {
                self.send(&src, SyncMessage::PingReply(PingReply { data: ping.data }));
                Ok(())
            }
            SyncMessage::PingReply(_) => {
                self.cluster_tracker.record_ping_reply(&src);
                Ok(())
            }
            SyncMessage::Timeout(_) => {
                slog::warn!(self.logger, "Dropping Timeout received from {}", src);
                Ok(())
            }
            SyncMessage::ClientRequest(request) => self.handle_client_request(&src, request),
            SyncMessage::RequestVote(rpc) => self.handle_request_vote(&src, rpc),
            SyncMessage::RequestVoteReply(reply) => self.handle_request_vote_reply(&src, reply),
            SyncMessage::AppendEntries(rpc) => self.handle_append_entries(&src, rpc),
            SyncMessage::AppendEntriesReply(reply) => self.handle_append_entries_reply(&src, reply),
            SyncMessage::InstallSnapshot(rpc) => self.handle_install_snapshot(&src, rpc),
            SyncMessage::InstallSnapshotReply(reply) => self.handle_install_snapshot_reply(&src, reply),
        };

        if let Err(e) = result {
            self.enter_error_state(e);
        }
    }

    pub(crate) fn handle_timeout(&mut self, timeout: SyncTimeout) {
        if self.election_state.is_error() {
            return;
        }

        let result = match timeout.kind {
            TimeoutKind::Ping => {
                if timeout.logic_clock == self.ping_epoch {
                    self.broadcast_ping();
                }
                Ok(())
            }
            TimeoutKind::Election => {
                if !self.election_state.is_current_epoch(timeout.logic_clock) {
                    slog::debug!(self.logger, "Stale election timeout: {:?}", timeout);
                    Ok(())
                } else if !self.election_state.election_timer_expired() {
                    // Raced with a reset.
                    Ok(())
                } else {
                    self.start_election()
                }
            }
            TimeoutKind::Heartbeat => {
                if self.election_state.is_current_epoch(timeout.logic_clock) && self.election_state.is_leader() {
                    self.broadcast_append_entries()
                } else {
                    Ok(())
                }
            }
        };

        if let Err(e) = result {
            self.enter_error_state(e);
        }
    }

    pub(crate) fn handle_propose(&mut self, input: ProposeInput, callback: Callback<ProposeOutput, ProposeError>) {
        if self.election_state.is_error() {
            callback.send(Err(ProposeError::StorageUnavailable));
            return;
        }
        if !self.election_state.is_leader() {
            callback.send(Err(ProposeError::NotLeader {
                leader_hint: self.election_state.leader_hint(),
            }));
            return;
        }

        if let Some(session) = input.session {
            match self.wal.sessions().check_admission(&session) {
                Admission::Applied(cached) => {
                    let output = match cached {
                        Some(cached) => ProposeOutput {
                            index: cached.index,
                            term: cached.term,
                            outcome: ProposeOutcome::Duplicate(cached.output),
                        },
                        None => ProposeOutput {
                            index: LogIndex::NONE,
                            term: Term::default(),
                            outcome: ProposeOutcome::Duplicate(StateMachineOutput::NoData),
                        },
                    };
                    callback.send(Ok(output));
                    return;
                }
                Admission::InFlight(index, term) => {
                    slog::debug!(self.logger, "Proposal is already in flight at {:?}", index);
                    self.pending.register(index, term, callback);
                    return;
                }
                Admission::Fresh => {}
            }
        }

        // Weak mode is opt-in. Without it, weak proposals wait for commit like any other.
        let is_weak = input.is_weak && self.weak_commit_enabled;
        let (index, term) = match self.append_client_entry(input.msg_type, is_weak, input.session, input.data) {
            Ok(appended) => appended,
            Err(e) => {
                callback.send(Err(ProposeError::StorageUnavailable));
                self.enter_error_state(e);
                return;
            }
        };

        if is_weak {
            callback.send(Ok(ProposeOutput {
                index,
                term,
                outcome: ProposeOutcome::PreCommitted,
            }));
        } else {
            self.pending.register(index, term, callback);
        }

        if let Err(e) = self.replicate_new_entries() {
            self.enter_error_state(e);
        }
    }

    /// A write forwarded by another member. Nobody waits on it here.
    fn handle_client_request(&mut self, src: &ReplicaId, request: message::ClientRequest) -> io::Result<()> {
        if !self.election_state.is_leader() {
            slog::debug!(self.logger, "Dropping ClientRequest from {}, not leader", src);
            return Ok(());
        }
        if let Some(session) = request.session {
            if self.wal.sessions().check_admission(&session) != Admission::Fresh {
                return Ok(());
            }
        }

        let is_weak = request.is_weak && self.weak_commit_enabled;
        self.append_client_entry(request.msg_type, is_weak, request.session, request.data)?;
        self.replicate_new_entries()
    }

    // > If command received from client: append entry to local log,
    // > respond after entry applied to state machine (§5.3)
    fn append_client_entry(
        &mut self,
        msg_type: u32,
        is_weak: bool,
        session: Option<ClientSession>,
        data: Bytes,
    ) -> io::Result<(LogIndex, Term)> {
        let term = self.current_term();
        let index = self.wal.last_index().plus(1);
        self.wal.append(
            RaftEntry {
                index,
                term,
                kind: EntryKind::Normal,
                msg_type,
                is_weak,
                session,
                data,
            },
            Role::Leader,
        )?;
        if let Some(session) = session {
            self.wal.sessions_mut().mark_in_flight(session, index, term);
        }

        Ok((index, term))
    }

    pub(crate) fn status(&self) -> NodeStatus {
        let snapshot = self.election_state.current_state();
        NodeStatus {
            role: snapshot.role,
            term: snapshot.term,
            leader: snapshot.leader,
            commit_index: self.wal.commit_index(),
            last_applied: self.wal.last_applied(),
            last_log_index: self.wal.last_index(),
            peers: self
                .cluster_tracker
                .peer_statuses(self.election_state.timer_settings().ping_interval),
        }
    }

    pub(crate) fn handle_reconfig(&mut self, config: SyncConfig) -> Result<(), ReconfigError> {
        match self.election_state.role() {
            Role::Error => return Err(ReconfigError::StorageUnavailable),
            Role::Candidate => return Err(ReconfigError::ElectionInProgress),
            Role::Follower | Role::Leader => {}
        }
        config.validate()?;
        if config.my_addr() != Some(&self.my_replica_id().addr) {
            return Err(ReconfigError::NotInConfig);
        }

        if let Err(e) = self.local_state.persist_config(&config) {
            self.enter_error_state(e);
            return Err(ReconfigError::StorageUnavailable);
        }
        slog::info!(self.logger, "Reconfigured: {:?}", config);
        self.cluster_tracker.replace_config(config);

        let peer_ids = self.cluster_tracker.peer_ids();
        let last_index = self.wal.last_index();
        if let Some(leader_state) = self.election_state.leader_state_mut() {
            leader_state.sync_peers(peer_ids, last_index);
            // The quorum may have shrunk.
            let result = self
                .broadcast_append_entries()
                .and_then(|_| self.advance_commit_index());
            if let Err(e) = result {
                self.enter_error_state(e);
                return Err(ReconfigError::StorageUnavailable);
            }
        }

        Ok(())
    }

    pub(crate) fn handle_timer_update(&mut self, update: TimerUpdate) -> Result<(), TimerUpdateError> {
        let settings = self.election_state.timer_settings().apply(update)?;
        slog::info!(self.logger, "New timer settings: {:?}", settings);

        self.election_state.update_timer_settings(settings);
        if self.ping_timer.is_some() {
            self.restart_ping_timer();
        }
        Ok(())
    }

    fn restart_ping_timer(&mut self) {
        if self.election_state.is_error() {
            return;
        }
        self.ping_epoch += 1;
        self.ping_timer.replace(PeriodicTimerHandle::spawn_timer_task(
            TimeoutKind::Ping,
            self.election_state.timer_settings().ping_interval,
            self.ping_epoch,
            false,
            self.actor_client.clone(),
        ));
    }

    fn broadcast_ping(&self) {
        for peer_id in self.cluster_tracker.peer_ids() {
            self.send(&peer_id, SyncMessage::Ping(Ping { data: Bytes::new() }));
        }
    }

    /// > If RPC request or response contains term T > currentTerm:
    /// > set currentTerm = T, convert to follower (§5.1)
    ///
    /// The term is durable before anything else observes it.
    pub(super) fn observe_higher_term(&mut self, term: Term, leader: Option<ReplicaId>) -> io::Result<()> {
        self.local_state.persist_term(term)?;

        let was_leader = self.election_state.is_leader();
        self.election_state.transition_to_follower(term, leader.clone());
        slog::info!(
            self.logger,
            "Observed term {:?}. Election state: {:?}",
            term,
            self.election_state
        );

        if was_leader {
            // Their entries may still commit under the next leader. Callers retry with the same
            // session to find out.
            self.pending.fail_all(ProposeError::NotLeader { leader_hint: leader });
            self.wal.sessions_mut().clear_in_flight();
        }
        Ok(())
    }

    pub(super) fn enter_error_state(&mut self, error: io::Error) {
        slog::error!(
            self.logger,
            "Storage failure, entering Error role. Election state: {:?}. Error: {:?}",
            self.election_state,
            error
        );
        self.election_state.transition_to_error();
        self.ping_timer = None;
        self.pending.fail_all(ProposeError::StorageUnavailable);
        self.wal.sessions_mut().clear_in_flight();
    }

    /// Apply whatever has committed since the last call and release its waiters.
    pub(super) fn apply_committed(&mut self) -> io::Result<()> {
        let role = self.election_state.role();
        for applied in self.wal.apply_all_committed_entries(role)? {
            self.pending.resolve_applied(applied.index, applied.term, &applied.outcome);
        }
        Ok(())
    }

    pub(super) fn send(&self, dest: &ReplicaId, message: SyncMessage) {
        let envelope = Envelope {
            vgroup_id: self.cluster_tracker.vgroup_id(),
            src: self.my_replica_id().clone(),
            dest: dest.clone(),
            message,
        };
        match message::encode(&envelope) {
            Ok(bytes) => self.transport.send(dest, bytes),
            Err(e) => slog::error!(
                self.logger,
                "Failed to encode {} for {}: {}",
                envelope.message.name(),
                dest,
                e
            ),
        }
    }

    pub(super) fn current_term(&self) -> Term {
        self.local_state.current_term()
    }

    pub(super) fn my_replica_id(&self) -> &ReplicaId {
        self.cluster_tracker.my_replica_id()
    }
}
