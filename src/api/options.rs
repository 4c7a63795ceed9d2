use crate::replica::{TimerSettings, TimerUpdateError};
use std::convert::TryFrom;
use tokio::time::Duration;

/// SyncOptions tunes one node. Every field is optional; unset fields take the defaults below.
#[derive(Clone, Debug, Default)]
pub struct SyncOptions {
    pub ping_interval: Option<Duration>,
    pub heartbeat_interval: Option<Duration>,
    pub election_timeout_min: Option<Duration>,
    pub election_timeout_max: Option<Duration>,
    /// How long `propose` waits for its entry to commit.
    pub propose_timeout: Option<Duration>,
    pub max_entries_per_append: Option<usize>,
    /// Capacity of the inbound event queue.
    pub queue_capacity: Option<usize>,
    pub weak_commit_enabled: Option<bool>,
    /// Take a snapshot once this many applied entries sit in the log. Unset disables snapshots.
    pub snapshot_threshold: Option<u64>,
}

#[derive(Clone, Debug)]
pub(super) struct SyncOptionsValidated {
    pub timer_settings: TimerSettings,
    pub propose_timeout: Duration,
    pub max_entries_per_append: usize,
    pub queue_capacity: usize,
    pub weak_commit_enabled: bool,
    pub snapshot_threshold: Option<u64>,
}

impl SyncOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        self.timer_settings.validate().map_err(|e| match e {
            TimerUpdateError::Invalid(reason) => reason,
            TimerUpdateError::NodeStopped => "Node is stopped",
        })?;
        if self.propose_timeout == Duration::from_millis(0) {
            return Err("Propose timeout must be non-zero");
        }
        if self.max_entries_per_append == 0 {
            return Err("Max entries per append must be non-zero");
        }
        if self.queue_capacity == 0 {
            return Err("Queue capacity must be non-zero");
        }
        if self.snapshot_threshold == Some(0) {
            return Err("Snapshot threshold must be non-zero");
        }

        Ok(())
    }
}

impl TryFrom<SyncOptions> for SyncOptionsValidated {
    type Error = &'static str;

    fn try_from(options: SyncOptions) -> Result<Self, Self::Error> {
        let values = SyncOptionsValidated {
            timer_settings: TimerSettings {
                ping_interval: options.ping_interval.unwrap_or(Duration::from_millis(1000)),
                heartbeat_interval: options.heartbeat_interval.unwrap_or(Duration::from_millis(100)),
                election_timeout_min: options.election_timeout_min.unwrap_or(Duration::from_millis(500)),
                election_timeout_max: options.election_timeout_max.unwrap_or(Duration::from_millis(1500)),
            },
            propose_timeout: options.propose_timeout.unwrap_or(Duration::from_secs(5)),
            max_entries_per_append: options.max_entries_per_append.unwrap_or(64),
            queue_capacity: options.queue_capacity.unwrap_or(1024),
            weak_commit_enabled: options.weak_commit_enabled.unwrap_or(false),
            snapshot_threshold: options.snapshot_threshold,
        };

        values.validate()?;
        Ok(values)
    }
}
