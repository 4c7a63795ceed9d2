use crate::actor::{ActorClient, ReplicaActor};
use crate::api::node::SyncNode;
use crate::api::options::SyncOptionsValidated;
use crate::logstore::LogStore;
use crate::replica::{
    ConfigError, PersistentLocalState, Replica, ReplicaConfig, ReplicaId, StateMachine, SyncConfig, VgroupId,
};
use crate::transport::Transport;
use crate::SyncOptions;
use std::convert::TryFrom;
use std::io;
use std::sync::Arc;

/// Everything needed to open one replica of one vgroup.
pub struct SyncNodeConfig<L, S, M>
where
    L: LogStore,
    S: PersistentLocalState,
    M: StateMachine,
{
    pub logger: slog::Logger,
    pub vgroup_id: VgroupId,
    /// Used when `local_state` holds no configuration yet. A persisted one takes precedence.
    pub sync_config: SyncConfig,
    pub log_store: L,
    pub local_state: S,
    pub state_machine: M,
    pub transport: Arc<dyn Transport>,
    pub options: SyncOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("Invalid sync config: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("Illegal options for configuring node: {0}")]
    IllegalOptions(String),
    #[error("Storage initialization failure")]
    Storage(#[from] io::Error),
    #[error("Vgroup {0} is already open in this registry")]
    VgroupAlreadyOpen(VgroupId),
}

/// Build the replica and its actor. The event loop is returned inside the node, not spawned.
pub(super) fn create_node<L, S, M>(config: SyncNodeConfig<L, S, M>) -> Result<SyncNode, OpenError>
where
    L: LogStore,
    S: PersistentLocalState,
    M: StateMachine,
{
    config.sync_config.validate()?;
    let options = SyncOptionsValidated::try_from(config.options)
        .map_err(|e| OpenError::IllegalOptions(e.to_string()))?;

    let my_replica_id = match config.sync_config.my_addr() {
        Some(addr) => ReplicaId::new(addr.clone(), config.vgroup_id),
        None => {
            return Err(OpenError::InvalidConfig(ConfigError::MyIndexOutOfRange {
                my_index: config.sync_config.my_index,
                num_replicas: config.sync_config.replicas.len(),
            }))
        }
    };
    let logger = config.logger.new(slog::o!(
        "vgroup" => config.vgroup_id.as_i32(),
        "replica" => my_replica_id.addr.to_string(),
    ));

    let (actor_client, actor_queue_rx) = ActorClient::new(options.queue_capacity);

    let (replica, listener) = Replica::new(ReplicaConfig {
        logger: logger.clone(),
        vgroup_id: config.vgroup_id,
        sync_config: config.sync_config,
        log_store: config.log_store,
        local_state: config.local_state,
        state_machine: config.state_machine,
        transport: config.transport,
        timer_settings: options.timer_settings,
        max_entries_per_append: options.max_entries_per_append,
        weak_commit_enabled: options.weak_commit_enabled,
        snapshot_threshold: options.snapshot_threshold,
        actor_client: actor_client.weak(),
    })?;

    let replica_actor = ReplicaActor::new(actor_queue_rx, replica);

    Ok(SyncNode::new(
        logger,
        my_replica_id,
        actor_client,
        listener,
        options.propose_timeout,
        Box::pin(replica_actor.run_event_loop()),
    ))
}
