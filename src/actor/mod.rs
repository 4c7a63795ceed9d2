use crate::logstore::LogStore;
use crate::message::SyncTimeout;
use crate::replica::{
    EnqueueError, NodeStatus, PersistentLocalState, ProposeError, ProposeInput, ProposeOutput, ReconfigError,
    Replica, StateMachine, SyncConfig, TimerUpdate, TimerUpdateError,
};
use bytes::Bytes;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};

// Disk interaction is synchronous on the event loop. Log store and local state calls are expected
// to be bounded; a failure moves the node into the Error role instead of being retried.
#[derive(Debug)]
pub(crate) enum Event {
    // Encoded envelope from a peer. Decoded and dispatched by the replica.
    Network(Bytes),

    // Leader: send heartbeat AppendEntries. Others: discard.
    // Follower/Candidate: start a new election. Leader: discard.
    // Any: ping peers.
    Timeout(SyncTimeout),

    // Leader: append and replicate, reply on commit (or pre-commit when weak).
    // Others: redirect.
    Propose(ProposeInput, Callback<ProposeOutput, ProposeError>),

    Status(oneshot::Sender<NodeStatus>),

    Reconfig(SyncConfig, Callback<(), ReconfigError>),

    UpdateTimers(TimerUpdate, Callback<(), TimerUpdateError>),

    Stop,
}

#[derive(Debug)]
pub(crate) struct Callback<O, E>(oneshot::Sender<Result<O, E>>);

impl<O, E> Callback<O, E> {
    pub(crate) fn send(self, message: Result<O, E>) {
        let _ = self.0.send(message);
    }
}

#[cfg(test)]
impl<O, E> Callback<O, E> {
    pub(crate) fn new() -> (Self, oneshot::Receiver<Result<O, E>>) {
        let (tx, rx) = oneshot::channel();
        (Callback(tx), rx)
    }
}

/// ActorClient is the strong handle to a node's event loop. When every strong handle is dropped,
/// the event loop exits.
#[derive(Clone)]
pub(crate) struct ActorClient {
    sender: Arc<mpsc::Sender<Event>>,
}

impl ActorClient {
    pub(crate) fn new(buffer_size: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer_size);
        (ActorClient { sender: Arc::new(tx) }, rx)
    }

    pub(crate) fn weak(&self) -> WeakActorClient {
        WeakActorClient {
            sender: Arc::downgrade(&self.sender),
        }
    }

    pub(crate) async fn propose(&self, input: ProposeInput) -> Result<ProposeOutput, ProposeError> {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Event::Propose(input, Callback(tx))).await.is_err() {
            return Err(ProposeError::NodeStopped);
        }

        rx.await.unwrap_or(Err(ProposeError::NodeStopped))
    }

    pub(crate) async fn status(&self) -> Option<NodeStatus> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(Event::Status(tx)).await.ok()?;
        rx.await.ok()
    }

    pub(crate) async fn reconfig(&self, config: SyncConfig) -> Result<(), ReconfigError> {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Event::Reconfig(config, Callback(tx))).await.is_err() {
            return Err(ReconfigError::NodeStopped);
        }

        rx.await.unwrap_or(Err(ReconfigError::NodeStopped))
    }

    pub(crate) async fn update_timers(&self, update: TimerUpdate) -> Result<(), TimerUpdateError> {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Event::UpdateTimers(update, Callback(tx))).await.is_err() {
            return Err(TimerUpdateError::NodeStopped);
        }

        rx.await.unwrap_or(Err(TimerUpdateError::NodeStopped))
    }

    pub(crate) async fn network(&self, envelope: Bytes) -> Result<(), EnqueueError> {
        self.sender
            .send(Event::Network(envelope))
            .await
            .map_err(|_| EnqueueError::NodeStopped)
    }

    pub(crate) fn try_network(&self, envelope: Bytes) -> Result<(), EnqueueError> {
        self.sender.try_send(Event::Network(envelope)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::NodeStopped,
        })
    }

    pub(crate) async fn stop(&self) {
        let _ = self.sender.send(Event::Stop).await;
    }
}

/// WeakActorClient is held by anything the replica owns (e.g. timer tasks), so that the replica
/// doesn't keep its own event loop alive.
#[derive(Clone)]
pub(crate) struct WeakActorClient {
    sender: Weak<mpsc::Sender<Event>>,
}

impl WeakActorClient {
    pub(crate) async fn timeout(&self, timeout: SyncTimeout) {
        if let Some(sender) = self.sender.upgrade() {
            let _ = sender.send(Event::Timeout(timeout)).await;
        }
    }
}

/// ReplicaActor is replica logic in actor model.
pub(crate) struct ReplicaActor<L, S, M>
where
    L: LogStore,
    S: PersistentLocalState,
    M: StateMachine,
{
    receiver: mpsc::Receiver<Event>,
    replica: Replica<L, S, M>,
}

impl<L, S, M> ReplicaActor<L, S, M>
where
    L: LogStore,
    S: PersistentLocalState,
    M: StateMachine,
{
    pub(crate) fn new(receiver: mpsc::Receiver<Event>, replica: Replica<L, S, M>) -> Self {
        ReplicaActor { receiver, replica }
    }

    pub(crate) async fn run_event_loop(mut self) {
        self.replica.start();

        while let Some(event) = self.receiver.recv().await {
            if let Event::Stop = event {
                break;
            }
            self.handle_event(event);
        }

        self.replica.shutdown();
    }

    // This must NOT be async. Any long running work must be spawned on another task and/or come
    // back to this actor as an event.
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Network(bytes) => {
                self.replica.handle_network_message(&bytes);
            }
            Event::Timeout(timeout) => {
                self.replica.handle_timeout(timeout);
            }
            Event::Propose(input, callback) => {
                self.replica.handle_propose(input, callback);
            }
            Event::Status(tx) => {
                let _ = tx.send(self.replica.status());
            }
            Event::Reconfig(config, callback) => {
                callback.send(self.replica.handle_reconfig(config));
            }
            Event::UpdateTimers(update, callback) => {
                callback.send(self.replica.handle_timer_update(update));
            }
            Event::Stop => {}
        }
    }
}
