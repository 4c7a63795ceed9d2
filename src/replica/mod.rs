mod election;
mod local_state;
mod peers;
mod pending;
mod replica;
mod replica_api;
mod replication;
mod sessions;
mod snapshot;
mod state_machine;
#[cfg(test)]
mod test_support;
mod vote;
mod write_ahead_log;

pub use election::Role;
pub use election::RoleSnapshot;
pub use election::StatusListener;
pub use local_state::FileLocalState;
pub use local_state::PersistentLocalState;
pub use local_state::Term;
pub use local_state::Vote;
pub use local_state::VolatileLocalState;
pub use peers::ConfigError;
pub use peers::NodeAddr;
pub use peers::ReplicaId;
pub use peers::SyncConfig;
pub use peers::VgroupId;
pub(crate) use replica::Replica;
pub(crate) use replica::ReplicaConfig;
pub use replica_api::EnqueueError;
pub use replica_api::NodeStatus;
pub use replica_api::PeerStatus;
pub use replica_api::ProposeError;
pub use replica_api::ProposeInput;
pub use replica_api::ProposeOutcome;
pub use replica_api::ProposeOutput;
pub use replica_api::ReconfigError;
pub use replica_api::TimerSettings;
pub use replica_api::TimerUpdate;
pub use replica_api::TimerUpdateError;
pub use state_machine::EntryContext;
pub use state_machine::NoOpStateMachine;
pub use state_machine::Snapshot;
pub use state_machine::StateMachine;
pub use state_machine::StateMachineOutput;
