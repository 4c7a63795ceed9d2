use crate::actor::{ActorClient, Callback, Event};
use crate::logstore::{EntryKind, InMemoryLogStore, LogIndex, RaftEntry};
use crate::message::{
    self, AppendEntries, AppendEntriesReply, Envelope, RequestVote, RequestVoteReply, SyncMessage,
};
use crate::replica::replica::{Replica, ReplicaConfig};
use crate::replica::{
    EntryContext, NodeAddr, PersistentLocalState, ProposeError, ProposeOutput, ReplicaId, Role, Snapshot,
    StateMachine, StateMachineOutput, SyncConfig, Term, TimerSettings, VgroupId, VolatileLocalState, Vote,
};
use crate::transport::Transport;
use bytes::Bytes;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub(crate) fn bytes_of(s: &str) -> Bytes {
    Bytes::from(s.to_string())
}

pub(crate) fn entry(index: u64, term: u64, data: &str) -> RaftEntry {
    RaftEntry {
        index: LogIndex::new(index),
        term: Term::new(term),
        kind: EntryKind::Normal,
        msg_type: 0,
        is_weak: false,
        session: None,
        data: bytes_of(data),
    }
}

pub(crate) fn three_nodes() -> SyncConfig {
    SyncConfig {
        replicas: (9001..=9003).map(|port| NodeAddr::new("localhost", port)).collect(),
        my_index: 0,
    }
}

pub(crate) fn request_vote(term: u64, last_log_index: u64, last_log_term: u64) -> SyncMessage {
    SyncMessage::RequestVote(RequestVote {
        term: Term::new(term),
        last_log_index: LogIndex::new(last_log_index),
        last_log_term: Term::new(last_log_term),
    })
}

pub(crate) fn vote_reply(term: u64, vote_granted: bool) -> SyncMessage {
    SyncMessage::RequestVoteReply(RequestVoteReply {
        term: Term::new(term),
        vote_granted,
    })
}

pub(crate) fn append_entries(
    term: u64,
    prev_log_index: u64,
    prev_log_term: u64,
    commit_index: u64,
    entries: Vec<RaftEntry>,
) -> SyncMessage {
    SyncMessage::AppendEntries(AppendEntries {
        term: Term::new(term),
        prev_log_index: LogIndex::new(prev_log_index),
        prev_log_term: Term::new(prev_log_term),
        commit_index: LogIndex::new(commit_index),
        entries,
    })
}

pub(crate) fn ae_reply(term: u64, success: bool, match_index: u64) -> SyncMessage {
    SyncMessage::AppendEntriesReply(AppendEntriesReply {
        term: Term::new(term),
        success,
        match_index: LogIndex::new(match_index),
    })
}

/// Records every callback. Snapshots are the committed payloads joined by newlines.
#[derive(Clone, Default)]
pub(crate) struct RecordingStateMachine {
    inner: Arc<Mutex<Recorded>>,
}

#[derive(Default)]
struct Recorded {
    committed: Vec<String>,
    pre_committed: Vec<String>,
    rolled_back: Vec<String>,
    applied: LogIndex,
}

impl RecordingStateMachine {
    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.inner.lock().expect("RecordingStateMachine mutex poisoned")
    }

    pub(crate) fn committed_data(&self) -> Vec<String> {
        self.lock().committed.clone()
    }

    pub(crate) fn pre_committed_data(&self) -> Vec<String> {
        self.lock().pre_committed.clone()
    }

    pub(crate) fn rolled_back_data(&self) -> Vec<String> {
        self.lock().rolled_back.clone()
    }
}

impl StateMachine for RecordingStateMachine {
    fn on_commit(&mut self, ctx: &EntryContext, data: &Bytes) -> StateMachineOutput {
        let mut recorded = self.lock();
        recorded.committed.push(String::from_utf8_lossy(data).into_owned());
        recorded.applied = ctx.index;
        StateMachineOutput::Data(data.clone())
    }

    fn on_pre_commit(&mut self, _: &EntryContext, data: &Bytes) {
        self.lock().pre_committed.push(String::from_utf8_lossy(data).into_owned());
    }

    fn on_rollback(&mut self, _: &EntryContext, data: &Bytes) {
        self.lock().rolled_back.push(String::from_utf8_lossy(data).into_owned());
    }

    fn take_snapshot(&mut self) -> io::Result<Snapshot> {
        let recorded = self.lock();
        Ok(Snapshot {
            data: Bytes::from(recorded.committed.join("\n")),
            last_included_index: recorded.applied,
        })
    }

    fn restore_snapshot(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        let mut recorded = self.lock();
        recorded.committed = if snapshot.data.is_empty() {
            Vec::new()
        } else {
            String::from_utf8_lossy(&snapshot.data)
                .split('\n')
                .map(String::from)
                .collect()
        };
        recorded.applied = snapshot.last_included_index;
        Ok(())
    }

    fn applied_index(&self) -> LogIndex {
        self.lock().applied
    }
}

/// Keeps every envelope handed to it, decoded.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<Envelope>>,
}

impl RecordingTransport {
    pub(crate) fn take_sent(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.sent.lock().expect("RecordingTransport mutex poisoned"))
    }
}

impl Transport for RecordingTransport {
    fn send(&self, _: &ReplicaId, envelope: Bytes) {
        let envelope = message::decode(&envelope).expect("Replica sent an undecodable envelope");
        self.sent.lock().expect("RecordingTransport mutex poisoned").push(envelope);
    }
}

/// VolatileLocalState that can be told to start failing writes.
#[derive(Clone)]
pub(crate) struct FailingLocalState {
    inner: VolatileLocalState,
    fail: Arc<AtomicBool>,
}

impl FailingLocalState {
    pub(crate) fn wrap(inner: VolatileLocalState) -> Self {
        FailingLocalState {
            inner,
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn fail_writes(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub(crate) fn current_term_now(&self) -> Term {
        self.inner.current_term()
    }

    pub(crate) fn voted_for_now(&self, term: Term) -> Option<ReplicaId> {
        self.inner.voted_for(term)
    }

    pub(crate) fn config_now(&self) -> Option<SyncConfig> {
        self.inner.config()
    }

    fn check(&self) -> io::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "disk on fire"));
        }
        Ok(())
    }
}

impl PersistentLocalState for FailingLocalState {
    fn current_term(&self) -> Term {
        self.inner.current_term()
    }

    fn vote(&self) -> Option<Vote> {
        self.inner.vote()
    }

    fn config(&self) -> Option<SyncConfig> {
        self.inner.config()
    }

    fn persist_term(&mut self, term: Term) -> io::Result<()> {
        self.check()?;
        self.inner.persist_term(term)
    }

    fn persist_vote(&mut self, vote: Vote) -> io::Result<()> {
        self.check()?;
        self.inner.persist_vote(vote)
    }

    fn persist_config(&mut self, config: &SyncConfig) -> io::Result<()> {
        self.check()?;
        self.inner.persist_config(config)
    }
}

/// One replica wired to recording collaborators, driven by calling its handlers directly. Timers
/// are long enough to never fire during a test.
pub(crate) struct Harness {
    pub(crate) replica: Replica<InMemoryLogStore, FailingLocalState, RecordingStateMachine>,
    pub(crate) state_machine: RecordingStateMachine,
    pub(crate) transport: Arc<RecordingTransport>,
    pub(crate) local_state: FailingLocalState,
    config: SyncConfig,
    _actor_client: ActorClient,
    _receiver: mpsc::Receiver<Event>,
}

pub(crate) fn harness(config: SyncConfig) -> Harness {
    Harness::build(
        config,
        FailingLocalState::wrap(VolatileLocalState::new()),
        false,
        None,
    )
}

impl Harness {
    pub(crate) fn with_weak_commit(config: SyncConfig, weak_commit_enabled: bool) -> Self {
        Self::build(
            config,
            FailingLocalState::wrap(VolatileLocalState::new()),
            weak_commit_enabled,
            None,
        )
    }

    pub(crate) fn with_local_state(config: SyncConfig, local_state: FailingLocalState) -> Self {
        Self::build(config, local_state, false, None)
    }

    pub(crate) fn with_snapshot_threshold(config: SyncConfig, threshold: u64) -> Self {
        Self::build(
            config,
            FailingLocalState::wrap(VolatileLocalState::new()),
            false,
            Some(threshold),
        )
    }

    fn build(
        config: SyncConfig,
        local_state: FailingLocalState,
        weak_commit_enabled: bool,
        snapshot_threshold: Option<u64>,
    ) -> Self {
        let (actor_client, receiver) = ActorClient::new(16);
        let state_machine = RecordingStateMachine::default();
        let transport = Arc::new(RecordingTransport::default());

        let (replica, _listener) = Replica::new(ReplicaConfig {
            logger: slog::Logger::root(slog::Discard, slog::o!()),
            vgroup_id: VgroupId::new(1),
            sync_config: config,
            log_store: InMemoryLogStore::new(),
            local_state: local_state.clone(),
            state_machine: state_machine.clone(),
            transport: transport.clone(),
            timer_settings: TimerSettings {
                ping_interval: Duration::from_secs(60),
                heartbeat_interval: Duration::from_secs(30),
                election_timeout_min: Duration::from_secs(60),
                election_timeout_max: Duration::from_secs(120),
            },
            max_entries_per_append: 64,
            weak_commit_enabled,
            snapshot_threshold,
            actor_client: actor_client.weak(),
        })
        .expect("Failed to build replica");
        let config = replica.cluster_tracker.config().clone();

        Harness {
            replica,
            state_machine,
            transport,
            local_state,
            config,
            _actor_client: actor_client,
            _receiver: receiver,
        }
    }

    pub(crate) fn me(&self) -> ReplicaId {
        self.peer(self.config.my_index)
    }

    pub(crate) fn peer(&self, i: usize) -> ReplicaId {
        ReplicaId::new(self.config.replicas[i].clone(), VgroupId::new(1))
    }

    pub(crate) fn peer_at(&self, port: u16) -> ReplicaId {
        ReplicaId::new(NodeAddr::new("localhost", port), VgroupId::new(1))
    }

    /// Entries already in the local log before the test starts. Also adopts their term, as a real
    /// node would have.
    pub(crate) fn append_local(&mut self, entries: Vec<RaftEntry>) {
        for entry in entries {
            if entry.term > self.local_state.current_term_now() {
                self.local_state.clone().persist_term(entry.term).unwrap();
            }
            self.replica.wal.append(entry, Role::Follower).unwrap();
        }
    }

    pub(crate) fn deliver_from(&mut self, src: &ReplicaId, message: SyncMessage) {
        let envelope = Envelope {
            vgroup_id: VgroupId::new(1),
            src: src.clone(),
            dest: self.me(),
            message,
        };
        let bytes = message::encode(&envelope).unwrap();
        self.replica.handle_network_message(&bytes);
    }

    pub(crate) fn propose(
        &mut self,
        input: crate::replica::ProposeInput,
    ) -> oneshot::Receiver<Result<ProposeOutput, ProposeError>> {
        let (callback, rx) = Callback::new();
        self.replica.handle_propose(input, callback);
        rx
    }

    /// Win an election with a single vote from peer 1, then forget what was sent.
    pub(crate) fn elect(&mut self) {
        self.replica.start_election().unwrap();
        let term = self.replica.current_term().as_u64();
        let voter = self.peer(1);
        self.deliver_from(&voter, vote_reply(term, true));
        assert!(self.replica.election_state.is_leader());
        self.transport.take_sent();
    }
}
