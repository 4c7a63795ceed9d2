use crate::replica::{ReplicaId, Term};
use tokio::sync::watch;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
    /// Terminal. Reached when durable state can no longer be written.
    Error,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Follower => "follower",
            Role::Candidate => "candidate",
            Role::Leader => "leader",
            Role::Error => "error",
        }
    }
}

/// What a node believes about the group right now.
#[derive(Clone, Debug, PartialEq)]
pub struct RoleSnapshot {
    pub role: Role,
    pub term: Term,
    /// The current leader, when known. Ourselves when we are leader.
    pub leader: Option<ReplicaId>,
}

pub(super) fn new(initial: RoleSnapshot) -> (StatusNotifier, StatusListener) {
    let (snd, rcv) = watch::channel(initial);

    (StatusNotifier { snd }, StatusListener { rcv })
}

pub(super) struct StatusNotifier {
    snd: watch::Sender<RoleSnapshot>,
}

impl StatusNotifier {
    pub(super) fn notify(&self, snapshot: RoleSnapshot) {
        if *self.snd.borrow() != snapshot {
            let _ = self.snd.send(snapshot);
        }
    }
}

/// StatusListener follows a node's role and term without going through its event loop.
#[derive(Clone)]
pub struct StatusListener {
    rcv: watch::Receiver<RoleSnapshot>,
}

impl StatusListener {
    pub fn current(&self) -> RoleSnapshot {
        self.rcv.borrow().clone()
    }

    /// Wait for the next change. `None` once the node has shut down.
    pub async fn next(&mut self) -> Option<RoleSnapshot> {
        match self.rcv.changed().await {
            Ok(_) => Some(self.rcv.borrow().clone()),
            Err(_) => None,
        }
    }

    /// Wait until `predicate` holds, checking the current value first.
    pub async fn wait_for<F>(&mut self, predicate: F) -> Option<RoleSnapshot>
    where
        F: Fn(&RoleSnapshot) -> bool,
    {
        loop {
            let current = self.current();
            if predicate(&current) {
                return Some(current);
            }
            if self.rcv.changed().await.is_err() {
                return None;
            }
        }
    }
}
