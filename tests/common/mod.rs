#![allow(dead_code)]

use bytes::Bytes;
use chrono::Utc;
use slog::Drain;
use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io;
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant};
use vgroup_sync::{
    EntryContext, InMemoryLogStore, LogIndex, LogStore, NodeAddr, ReplicaId, Role, Snapshot, StateMachine,
    StateMachineOutput, StatusListener, SyncNode, Transport,
};

/// KvMachine remembers every payload it applied, in order.
#[derive(Clone, Default)]
pub struct KvMachine {
    inner: Arc<Mutex<KvInner>>,
}

#[derive(Default)]
struct KvInner {
    applied: Vec<String>,
    applied_index: LogIndex,
    rolled_back: Vec<String>,
}

impl KvMachine {
    pub fn new() -> Self {
        KvMachine::default()
    }

    pub fn applied(&self) -> Vec<String> {
        self.inner.lock().unwrap().applied.clone()
    }

    pub fn rolled_back(&self) -> Vec<String> {
        self.inner.lock().unwrap().rolled_back.clone()
    }
}

impl StateMachine for KvMachine {
    fn on_commit(&mut self, ctx: &EntryContext, data: &Bytes) -> StateMachineOutput {
        let mut inner = self.inner.lock().unwrap();
        inner.applied.push(String::from_utf8_lossy(data).into_owned());
        inner.applied_index = ctx.index;
        StateMachineOutput::Data(Bytes::from(format!("applied-{}", inner.applied.len())))
    }

    fn on_rollback(&mut self, _ctx: &EntryContext, data: &Bytes) {
        let mut inner = self.inner.lock().unwrap();
        inner.rolled_back.push(String::from_utf8_lossy(data).into_owned());
    }

    fn take_snapshot(&mut self) -> io::Result<Snapshot> {
        let inner = self.inner.lock().unwrap();
        Ok(Snapshot {
            data: Bytes::from(inner.applied.join("\n")),
            last_included_index: inner.applied_index,
        })
    }

    fn restore_snapshot(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.applied = if snapshot.data.is_empty() {
            Vec::new()
        } else {
            String::from_utf8_lossy(&snapshot.data)
                .split('\n')
                .map(str::to_string)
                .collect()
        };
        inner.applied_index = snapshot.last_included_index;
        Ok(())
    }

    fn applied_index(&self) -> LogIndex {
        self.inner.lock().unwrap().applied_index
    }
}

/// LocalNetwork connects nodes in this process. Links can be cut in one direction at a time.
#[derive(Default)]
pub struct LocalNetwork {
    nodes: Mutex<HashMap<ReplicaId, Arc<SyncNode>>>,
    cut: Mutex<HashSet<(NodeAddr, NodeAddr)>>,
}

impl LocalNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(LocalNetwork::default())
    }

    pub fn transport(self: &Arc<Self>, me: NodeAddr) -> Arc<dyn Transport> {
        Arc::new(LocalTransport {
            me,
            network: self.clone(),
        })
    }

    pub fn attach(&self, node: Arc<SyncNode>) {
        self.nodes.lock().unwrap().insert(node.replica_id().clone(), node);
    }

    pub fn cut_one_way(&self, from: &NodeAddr, to: &NodeAddr) {
        self.cut.lock().unwrap().insert((from.clone(), to.clone()));
    }

    pub fn cut_both_ways(&self, a: &NodeAddr, b: &NodeAddr) {
        self.cut_one_way(a, b);
        self.cut_one_way(b, a);
    }

    pub fn isolate(&self, me: &NodeAddr, everyone: &[NodeAddr]) {
        for other in everyone.iter().filter(|addr| *addr != me) {
            self.cut_both_ways(me, other);
        }
    }

    pub fn heal(&self) {
        self.cut.lock().unwrap().clear();
    }
}

struct LocalTransport {
    me: NodeAddr,
    network: Arc<LocalNetwork>,
}

impl Transport for LocalTransport {
    fn send(&self, destination: &ReplicaId, envelope: Bytes) {
        if self
            .network
            .cut
            .lock()
            .unwrap()
            .contains(&(self.me.clone(), destination.addr.clone()))
        {
            return;
        }

        let node = self.network.nodes.lock().unwrap().get(destination).cloned();
        if let Some(node) = node {
            let _ = node.try_enqueue_msg(envelope);
        }
    }
}

/// LeaderLedger records every (term, leader) claim any node ever published.
#[derive(Clone, Default)]
pub struct LeaderLedger {
    claims: Arc<Mutex<HashMap<u64, HashSet<ReplicaId>>>>,
}

impl LeaderLedger {
    pub fn watch(&self, replica_id: ReplicaId, mut listener: StatusListener) {
        let claims = self.claims.clone();
        tokio::spawn(async move {
            loop {
                let snapshot = listener.current();
                if snapshot.role == Role::Leader {
                    claims
                        .lock()
                        .unwrap()
                        .entry(snapshot.term.as_u64())
                        .or_default()
                        .insert(replica_id.clone());
                }
                if listener.next().await.is_none() {
                    return;
                }
            }
        });
    }

    pub fn assert_at_most_one_leader_per_term(&self) {
        for (term, leaders) in self.claims.lock().unwrap().iter() {
            assert!(leaders.len() <= 1, "Term {} had leaders {:?}", term, leaders);
        }
    }
}

/// CommitWatch samples every node's commit index and flags any that moves backwards.
pub struct CommitWatch {
    regressed: Arc<Mutex<Vec<String>>>,
    _stop: tokio::sync::oneshot::Sender<()>,
}

impl CommitWatch {
    pub fn start(nodes: Vec<Arc<SyncNode>>) -> Self {
        let regressed = Arc::new(Mutex::new(Vec::new()));
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();
        let regressed_clone = regressed.clone();
        tokio::spawn(async move {
            let mut highest = vec![LogIndex::default(); nodes.len()];
            loop {
                for (i, node) in nodes.iter().enumerate() {
                    if let Some(status) = node.status().await {
                        if status.commit_index < highest[i] {
                            regressed_clone.lock().unwrap().push(format!(
                                "{} went from {:?} to {:?}",
                                node.replica_id(),
                                highest[i],
                                status.commit_index
                            ));
                        }
                        highest[i] = status.commit_index;
                    }
                }
                tokio::select! {
                    _ = &mut stop_rx => return,
                    _ = tokio::time::sleep(Duration::from_millis(10)) => {}
                }
            }
        });

        CommitWatch {
            regressed,
            _stop: stop_tx,
        }
    }

    pub fn assert_monotonic(&self) {
        let regressed = self.regressed.lock().unwrap();
        assert!(regressed.is_empty(), "Commit index regressed: {:?}", *regressed);
    }
}

/// Every index present in both logs holds the same entry.
pub fn assert_logs_match(a: &InMemoryLogStore, b: &InMemoryLogStore) {
    let start = std::cmp::max(a.begin_index(), b.begin_index());
    let end = std::cmp::min(a.last_index(), b.last_index());
    let mut index = start;
    while index <= end {
        let left = a.get(index).unwrap();
        let right = b.get(index).unwrap();
        assert_eq!(left, right, "Logs differ at {:?}", index);
        index = index.plus(1);
    }
}

/// Poll until `condition` holds, or panic after `timeout`.
pub async fn eventually<F>(timeout: Duration, what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() >= deadline {
            panic!("Timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Wait for a leader that every given node agrees on, and return its position.
pub async fn wait_for_leader(nodes: &[Arc<SyncNode>], timeout: Duration) -> usize {
    let deadline = Instant::now() + timeout;
    loop {
        let leaders: Vec<usize> = (0..nodes.len()).filter(|i| nodes[*i].role() == Role::Leader).collect();
        if leaders.len() == 1 {
            let leader = leaders[0];
            let leader_term = nodes[leader].term();
            let agreed = nodes.iter().all(|node| {
                let snapshot = node.subscribe().current();
                snapshot.term == leader_term && snapshot.leader.as_ref() == Some(nodes[leader].replica_id())
            });
            if agreed {
                return leader;
            }
        }
        if Instant::now() >= deadline {
            panic!("Timed out waiting for leader election");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn localhost(port: u16) -> NodeAddr {
    NodeAddr::new("127.0.0.1", port)
}

pub fn create_root_logger_for_file(directory_prefix: String, replica_id: String) -> slog::Logger {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let log_path = format!("{}/info_log_{}/{}_info.log", directory_prefix, replica_id, now);
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path)
        .unwrap();

    let decorator = slog_term::PlainDecorator::new(file);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}

pub fn create_root_logger_for_stdout(test_name: &str) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog::LevelFilter::new(drain, slog::Level::Info).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("test" => test_name.to_string()))
}
