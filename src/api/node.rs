use crate::actor::ActorClient;
use crate::replica::{
    EnqueueError, NodeStatus, ProposeError, ProposeInput, ProposeOutput, ReconfigError, ReplicaId, Role,
    StatusListener, SyncConfig, Term, TimerUpdate, TimerUpdateError, VgroupId,
};
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Duration;

pub(super) type EventLoop = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

enum EventLoopState {
    Opened(EventLoop),
    Running(JoinHandle<()>),
    Stopped,
}

/// SyncNode is the handle to one replica of one vgroup. Cloning the `Arc` it is handed out in is
/// the only way to share it; the event loop keeps running until `stop` or until the last handle
/// is dropped.
pub struct SyncNode {
    logger: slog::Logger,
    replica_id: ReplicaId,
    actor_client: ActorClient,
    listener: StatusListener,
    propose_timeout: Duration,
    event_loop: Mutex<EventLoopState>,
}

impl SyncNode {
    pub(super) fn new(
        logger: slog::Logger,
        replica_id: ReplicaId,
        actor_client: ActorClient,
        listener: StatusListener,
        propose_timeout: Duration,
        event_loop: EventLoop,
    ) -> Self {
        SyncNode {
            logger,
            replica_id,
            actor_client,
            listener,
            propose_timeout,
            event_loop: Mutex::new(EventLoopState::Opened(event_loop)),
        }
    }

    pub fn vgroup_id(&self) -> VgroupId {
        self.replica_id.vgroup_id
    }

    pub fn replica_id(&self) -> &ReplicaId {
        &self.replica_id
    }

    /// Spawn the event loop. Returns false if it was already started or has been stopped.
    pub(super) fn start(&self) -> bool {
        let mut state = self.event_loop.lock().expect("SyncNode event loop mutex poisoned");
        match std::mem::replace(&mut *state, EventLoopState::Stopped) {
            EventLoopState::Opened(event_loop) => {
                slog::info!(self.logger, "Starting event loop");
                *state = EventLoopState::Running(tokio::spawn(event_loop));
                true
            }
            other => {
                *state = other;
                false
            }
        }
    }

    /// Replicate `input`. Resolves once the entry is committed and applied, or once it is
    /// durable locally for weak proposals on a node that allows them.
    pub async fn propose(&self, input: ProposeInput) -> Result<ProposeOutput, ProposeError> {
        match tokio::time::timeout(self.propose_timeout, self.actor_client.propose(input)).await {
            Ok(result) => result,
            Err(_) => Err(ProposeError::TimedOut),
        }
    }

    /// Same as `propose`. Non-leaders answer with a redirect rather than relaying.
    pub async fn forward_to_peer(&self, input: ProposeInput) -> Result<ProposeOutput, ProposeError> {
        self.propose(input).await
    }

    pub fn role(&self) -> Role {
        self.listener.current().role
    }

    pub fn role_str(&self) -> &'static str {
        self.role().as_str()
    }

    pub fn term(&self) -> Term {
        self.listener.current().term
    }

    /// Full status, read through the event loop. `None` once the node has stopped.
    pub async fn status(&self) -> Option<NodeStatus> {
        self.actor_client.status().await
    }

    pub fn subscribe(&self) -> StatusListener {
        self.listener.clone()
    }

    pub async fn reconfig(&self, config: SyncConfig) -> Result<(), ReconfigError> {
        self.actor_client.reconfig(config).await
    }

    pub async fn set_ping_interval(&self, interval: Duration) -> Result<(), TimerUpdateError> {
        self.actor_client.update_timers(TimerUpdate::Ping(interval)).await
    }

    pub async fn set_heartbeat_interval(&self, interval: Duration) -> Result<(), TimerUpdateError> {
        self.actor_client.update_timers(TimerUpdate::Heartbeat(interval)).await
    }

    pub async fn set_election_timeout(&self, min: Duration, max: Duration) -> Result<(), TimerUpdateError> {
        self.actor_client.update_timers(TimerUpdate::Election { min, max }).await
    }

    /// Hand an encoded envelope to the node, waiting for room in the inbound queue.
    pub async fn enqueue_msg(&self, envelope: Bytes) -> Result<(), EnqueueError> {
        self.actor_client.network(envelope).await
    }

    pub fn try_enqueue_msg(&self, envelope: Bytes) -> Result<(), EnqueueError> {
        self.actor_client.try_network(envelope)
    }

    /// Stop the event loop and wait for it to exit. Pending proposals fail with `NodeStopped`.
    pub async fn stop(&self) {
        let previous = {
            let mut state = self.event_loop.lock().expect("SyncNode event loop mutex poisoned");
            std::mem::replace(&mut *state, EventLoopState::Stopped)
        };

        match previous {
            EventLoopState::Running(join_handle) => {
                self.actor_client.stop().await;
                if let Err(e) = join_handle.await {
                    slog::error!(self.logger, "Event loop exited abnormally: {:?}", e);
                }
                slog::info!(self.logger, "Stopped");
            }
            EventLoopState::Opened(_) => {
                slog::info!(self.logger, "Stopped before it was started");
            }
            EventLoopState::Stopped => {}
        }
    }
}
