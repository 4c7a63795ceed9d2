use crate::api::node::SyncNode;
use crate::api::wiring::{create_node, OpenError, SyncNodeConfig};
use crate::logstore::LogStore;
use crate::replica::{PersistentLocalState, StateMachine, VgroupId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Rid names an opened node within its registry. Never reused.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Rid(i64);

impl Rid {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RegistryError {
    #[error("No node is registered under rid {0}")]
    UnknownRid(Rid),
}

/// SyncRegistry owns every node opened in this process. `acquire` hands out shared handles;
/// dropping the handle releases it.
#[derive(Default)]
pub struct SyncRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_rid: i64,
    nodes: HashMap<Rid, Arc<SyncNode>>,
    by_vgroup: HashMap<VgroupId, Rid>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        SyncRegistry::default()
    }

    /// Build a node and register it. It doesn't run until `start`, but it already accepts
    /// inbound envelopes into its queue.
    pub fn open<L, S, M>(&self, config: SyncNodeConfig<L, S, M>) -> Result<Rid, OpenError>
    where
        L: LogStore,
        S: PersistentLocalState,
        M: StateMachine,
    {
        let vgroup_id = config.vgroup_id;
        if self.is_open(vgroup_id) {
            return Err(OpenError::VgroupAlreadyOpen(vgroup_id));
        }

        // Building a node touches storage. Don't hold up routing for every other vgroup meanwhile.
        let node = create_node(config)?;

        let mut inner = self.inner.lock().expect("SyncRegistry mutex poisoned");
        if inner.by_vgroup.contains_key(&vgroup_id) {
            // Lost a race with another open of the same vgroup. Our node never ran.
            return Err(OpenError::VgroupAlreadyOpen(vgroup_id));
        }
        inner.next_rid += 1;
        let rid = Rid(inner.next_rid);
        inner.by_vgroup.insert(node.vgroup_id(), rid);
        inner.nodes.insert(rid, Arc::new(node));

        Ok(rid)
    }

    fn is_open(&self, vgroup_id: VgroupId) -> bool {
        let inner = self.inner.lock().expect("SyncRegistry mutex poisoned");
        inner.by_vgroup.contains_key(&vgroup_id)
    }

    /// Spawn the node's event loop. Starting twice is a no-op.
    pub fn start(&self, rid: Rid) -> Result<(), RegistryError> {
        let node = self.acquire(rid).ok_or(RegistryError::UnknownRid(rid))?;
        node.start();

        Ok(())
    }

    /// Unregister the node and wait for its event loop to exit.
    pub async fn stop(&self, rid: Rid) -> Result<(), RegistryError> {
        let node = {
            let mut inner = self.inner.lock().expect("SyncRegistry mutex poisoned");
            let node = inner.nodes.remove(&rid).ok_or(RegistryError::UnknownRid(rid))?;
            inner.by_vgroup.remove(&node.vgroup_id());
            node
        };

        node.stop().await;

        Ok(())
    }

    pub fn acquire(&self, rid: Rid) -> Option<Arc<SyncNode>> {
        let inner = self.inner.lock().expect("SyncRegistry mutex poisoned");
        inner.nodes.get(&rid).cloned()
    }

    /// Find the node hosting `vgroup_id`. Used to route inbound envelopes.
    pub fn route(&self, vgroup_id: VgroupId) -> Option<Arc<SyncNode>> {
        let inner = self.inner.lock().expect("SyncRegistry mutex poisoned");
        let rid = inner.by_vgroup.get(&vgroup_id)?;
        inner.nodes.get(rid).cloned()
    }
}
