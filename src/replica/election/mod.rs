mod election_state;
mod leader_state;
mod state_change_listener;
mod timers;

pub(crate) use election_state::ElectionState;
pub(crate) use leader_state::LeaderStateTracker;
pub(crate) use leader_state::PeerState;
pub(crate) use timers::PeriodicTimerHandle;
pub use state_change_listener::Role;
pub use state_change_listener::RoleSnapshot;
pub use state_change_listener::StatusListener;
