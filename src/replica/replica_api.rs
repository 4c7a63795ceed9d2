use crate::logstore::{ClientSession, LogIndex};
use crate::replica::peers::{ConfigError, ReplicaId};
use crate::replica::{Role, StateMachineOutput, Term};
use bytes::Bytes;
use std::time::Duration;

/// ProposeInput is one client write.
#[derive(Clone, Debug, PartialEq)]
pub struct ProposeInput {
    pub msg_type: u32,
    pub data: Bytes,
    /// Acknowledge after the local durable append instead of after majority commit. Only honored
    /// when weak commit is enabled for the node.
    pub is_weak: bool,
    /// Makes the proposal idempotent: a `(client_id, seq_num)` pair is applied at most once.
    pub session: Option<ClientSession>,
}

impl ProposeInput {
    pub fn new(data: impl Into<Bytes>) -> Self {
        ProposeInput {
            msg_type: 0,
            data: data.into(),
            is_weak: false,
            session: None,
        }
    }

    pub fn with_msg_type(mut self, msg_type: u32) -> Self {
        self.msg_type = msg_type;
        self
    }

    pub fn weak(mut self) -> Self {
        self.is_weak = true;
        self
    }

    pub fn with_session(mut self, client_id: u64, seq_num: u64) -> Self {
        self.session.replace(ClientSession { client_id, seq_num });
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProposeOutput {
    pub index: LogIndex,
    pub term: Term,
    pub outcome: ProposeOutcome,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProposeOutcome {
    /// Durably in the leader's log, not yet known to be committed.
    PreCommitted,
    Committed(StateMachineOutput),
    /// The session had already been applied. Carries the cached output when still available.
    Duplicate(StateMachineOutput),
}

#[derive(Clone, Debug, thiserror::Error, PartialEq)]
pub enum ProposeError {
    // Retry against the leader.
    #[error("I'm not leader. Leader hint: {leader_hint:?}")]
    NotLeader { leader_hint: Option<ReplicaId> },

    // Fatal for this node. Retry against another member.
    #[error("Storage is unavailable on this node")]
    StorageUnavailable,

    // Retryable. The entry may still commit later; re-propose with the same session to avoid
    // applying it twice.
    #[error("Timed out waiting for commit")]
    TimedOut,

    #[error("Node is stopped")]
    NodeStopped,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ReconfigError {
    #[error("Can't reconfigure while an election is in progress")]
    ElectionInProgress,
    #[error("This node is not a member of the new configuration")]
    NotInConfig,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("Storage is unavailable on this node")]
    StorageUnavailable,
    #[error("Node is stopped")]
    NodeStopped,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TimerUpdate {
    Ping(Duration),
    Heartbeat(Duration),
    Election { min: Duration, max: Duration },
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TimerUpdateError {
    #[error("Invalid timer settings: {0}")]
    Invalid(&'static str),
    #[error("Node is stopped")]
    NodeStopped,
}

/// The durations that drive a node's timers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimerSettings {
    pub ping_interval: Duration,
    pub heartbeat_interval: Duration,
    pub election_timeout_min: Duration,
    pub election_timeout_max: Duration,
}

impl TimerSettings {
    pub fn validate(&self) -> Result<(), TimerUpdateError> {
        if self.ping_interval == Duration::from_millis(0) {
            return Err(TimerUpdateError::Invalid("ping interval must be non-zero"));
        }
        if self.heartbeat_interval == Duration::from_millis(0) {
            return Err(TimerUpdateError::Invalid("heartbeat interval must be non-zero"));
        }
        if self.election_timeout_min >= self.election_timeout_max {
            return Err(TimerUpdateError::Invalid("election timeout min must be less than max"));
        }
        if self.heartbeat_interval >= self.election_timeout_min {
            return Err(TimerUpdateError::Invalid(
                "heartbeat interval must be less than election timeout min",
            ));
        }

        Ok(())
    }

    /// Return the settings with `update` applied, if the result is valid.
    pub(crate) fn apply(&self, update: TimerUpdate) -> Result<TimerSettings, TimerUpdateError> {
        let mut new = *self;
        match update {
            TimerUpdate::Ping(d) => new.ping_interval = d,
            TimerUpdate::Heartbeat(d) => new.heartbeat_interval = d,
            TimerUpdate::Election { min, max } => {
                new.election_timeout_min = min;
                new.election_timeout_max = max;
            }
        }
        new.validate()?;

        Ok(new)
    }
}

/// Point in time view of a node.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeStatus {
    pub role: Role,
    pub term: Term,
    pub leader: Option<ReplicaId>,
    pub commit_index: LogIndex,
    pub last_applied: LogIndex,
    pub last_log_index: LogIndex,
    /// Every other member, in configuration order.
    pub peers: Vec<PeerStatus>,
}

/// What ping replies tell us about one peer.
#[derive(Clone, Debug, PartialEq)]
pub struct PeerStatus {
    pub replica_id: ReplicaId,
    /// Time since the peer last answered a ping. `None` if it never has.
    pub since_last_ping_reply: Option<Duration>,
    /// The peer answered a ping within the last few ping intervals.
    pub reachable: bool,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EnqueueError {
    #[error("Inbound queue is full")]
    QueueFull,
    #[error("Node is stopped")]
    NodeStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> TimerSettings {
        TimerSettings {
            ping_interval: Duration::from_millis(1000),
            heartbeat_interval: Duration::from_millis(100),
            election_timeout_min: Duration::from_millis(500),
            election_timeout_max: Duration::from_millis(1500),
        }
    }

    #[test]
    fn apply_timer_update() {
        let s = settings().apply(TimerUpdate::Heartbeat(Duration::from_millis(50))).unwrap();
        assert_eq!(s.heartbeat_interval, Duration::from_millis(50));

        let s = settings()
            .apply(TimerUpdate::Election {
                min: Duration::from_millis(300),
                max: Duration::from_millis(301),
            })
            .unwrap();
        assert_eq!(s.election_timeout_min, Duration::from_millis(300));
    }

    #[test]
    fn reject_invalid_timer_update() {
        assert!(settings().apply(TimerUpdate::Heartbeat(Duration::from_millis(500))).is_err());
        assert!(settings().apply(TimerUpdate::Ping(Duration::from_millis(0))).is_err());
        assert!(settings()
            .apply(TimerUpdate::Election {
                min: Duration::from_millis(800),
                max: Duration::from_millis(800),
            })
            .is_err());
    }
}
