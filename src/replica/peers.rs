use crate::replica::PeerStatus;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tokio::time::{Duration, Instant};

/// A peer is unreachable once this many ping intervals pass without a reply.
const MISSED_PINGS_UNTIL_UNREACHABLE: u32 = 3;

/// NodeAddr is the network endpoint of a dnode. Many vgroups can share one.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct NodeAddr {
    pub host: String,
    pub port: u16,
}

impl NodeAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        NodeAddr {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct VgroupId(i32);

impl VgroupId {
    pub fn new(id: i32) -> Self {
        VgroupId(id)
    }

    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for VgroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ReplicaId is one member of one replica group: the (node address, vgroup) pair.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ReplicaId {
    pub addr: NodeAddr,
    pub vgroup_id: VgroupId,
}

impl ReplicaId {
    pub fn new(addr: NodeAddr, vgroup_id: VgroupId) -> Self {
        ReplicaId { addr, vgroup_id }
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/vg{}", self.addr, self.vgroup_id)
    }
}

/// SyncConfig is the replica set of a group. `my_index` points at this node's own entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    pub replicas: Vec<NodeAddr>,
    pub my_index: usize,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Replica set is empty")]
    Empty,
    #[error("my_index {my_index} is out of range for {num_replicas} replicas")]
    MyIndexOutOfRange { my_index: usize, num_replicas: usize },
    #[error("Replica {0} appears more than once")]
    DuplicateReplica(NodeAddr),
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.replicas.is_empty() {
            return Err(ConfigError::Empty);
        }
        if self.my_index >= self.replicas.len() {
            return Err(ConfigError::MyIndexOutOfRange {
                my_index: self.my_index,
                num_replicas: self.replicas.len(),
            });
        }

        let mut seen = HashSet::with_capacity(self.replicas.len());
        for addr in self.replicas.iter() {
            if !seen.insert(addr) {
                return Err(ConfigError::DuplicateReplica(addr.clone()));
            }
        }

        Ok(())
    }

    pub fn my_addr(&self) -> Option<&NodeAddr> {
        self.replicas.get(self.my_index)
    }

    /// floor(N/2) + 1
    pub fn majority(&self) -> usize {
        self.replicas.len() / 2 + 1
    }
}

/// ClusterTracker knows who is in the group. It is the only owner of the current configuration
/// inside a replica.
pub(crate) struct ClusterTracker {
    my_replica_id: ReplicaId,
    config: SyncConfig,
    peers: HashMap<ReplicaId, PeerLiveness>,
}

#[derive(Default)]
struct PeerLiveness {
    last_ping_reply: Option<Instant>,
}

impl ClusterTracker {
    /// `config` must already be validated.
    pub(crate) fn new(vgroup_id: VgroupId, config: SyncConfig) -> Self {
        let my_addr = config.replicas[config.my_index].clone();
        let mut tracker = ClusterTracker {
            my_replica_id: ReplicaId::new(my_addr, vgroup_id),
            config: config.clone(),
            peers: HashMap::new(),
        };
        tracker.replace_config(config);

        tracker
    }

    pub(crate) fn my_replica_id(&self) -> &ReplicaId {
        &self.my_replica_id
    }

    pub(crate) fn vgroup_id(&self) -> VgroupId {
        self.my_replica_id.vgroup_id
    }

    /// Every member except ourselves, in configuration order.
    pub(crate) fn peer_ids(&self) -> Vec<ReplicaId> {
        let vgroup_id = self.vgroup_id();
        self.config
            .replicas
            .iter()
            .filter(|addr| **addr != self.my_replica_id.addr)
            .map(|addr| ReplicaId::new(addr.clone(), vgroup_id))
            .collect()
    }

    pub(crate) fn contains_member(&self, replica_id: &ReplicaId) -> bool {
        replica_id == &self.my_replica_id || self.peers.contains_key(replica_id)
    }

    pub(crate) fn majority(&self) -> usize {
        self.config.majority()
    }

    pub(crate) fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Install a new configuration. `config` must be validated and still contain our address.
    pub(crate) fn replace_config(&mut self, config: SyncConfig) {
        let vgroup_id = self.vgroup_id();
        let my_addr = self.my_replica_id.addr.clone();
        let mut peers = HashMap::with_capacity(config.replicas.len());
        for addr in config.replicas.iter().filter(|a| **a != my_addr) {
            let id = ReplicaId::new(addr.clone(), vgroup_id);
            let liveness = self.peers.remove(&id).unwrap_or_default();
            peers.insert(id, liveness);
        }

        self.peers = peers;
        self.config = config;
    }

    pub(crate) fn record_ping_reply(&mut self, peer_id: &ReplicaId) {
        if let Some(liveness) = self.peers.get_mut(peer_id) {
            liveness.last_ping_reply.replace(Instant::now());
        }
    }

    /// Reachability of every peer, in configuration order.
    pub(crate) fn peer_statuses(&self, ping_interval: Duration) -> Vec<PeerStatus> {
        let now = Instant::now();
        let unreachable_after = ping_interval * MISSED_PINGS_UNTIL_UNREACHABLE;
        self.peer_ids()
            .into_iter()
            .map(|replica_id| {
                let since_last_ping_reply = self
                    .peers
                    .get(&replica_id)
                    .and_then(|p| p.last_ping_reply)
                    .map(|at| now.saturating_duration_since(at));
                PeerStatus {
                    replica_id,
                    since_last_ping_reply,
                    reachable: since_last_ping_reply.map_or(false, |since| since <= unreachable_after),
                }
            })
            .collect()
    }
}
