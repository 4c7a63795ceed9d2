use crate::actor::WeakActorClient;
use crate::logstore::LogIndex;
use crate::message::TimeoutKind;
use crate::replica::election::state_change_listener::{self, StatusNotifier};
use crate::replica::election::timers::{ElectionTimerHandle, PeriodicTimerHandle};
use crate::replica::election::{LeaderStateTracker, Role, RoleSnapshot, StatusListener};
use crate::replica::{ReplicaId, Term, TimerSettings};
use std::collections::HashSet;
use std::fmt;

/// ElectionState is responsible for holding state specific to the stage in an election. Its
/// methods are responsible for "what" to do. It is NOT responsible for validating anything
/// specific to logs, terms, peers, etc. or knowing "when" to do something.
///
/// Every transition bumps `epoch`. Timers stamp their timeouts with the epoch they were created in,
/// so a timeout from a previous role or term is recognizably stale.
pub(crate) struct ElectionState {
    state: State,
    term: Term,
    epoch: u64,
    timers_running: bool,
    timer_settings: TimerSettings,
    my_replica_id: ReplicaId,
    actor_client: WeakActorClient,
    notifier: StatusNotifier,
}

impl ElectionState {
    /// A new follower in `term`. Its election timer isn't armed until `start_timers()`, so this
    /// can be built outside of a runtime.
    pub(crate) fn new_follower(
        term: Term,
        my_replica_id: ReplicaId,
        timer_settings: TimerSettings,
        actor_client: WeakActorClient,
    ) -> (Self, StatusListener) {
        let state = State::Follower(FollowerState {
            leader: None,
            election_timer: None,
        });
        let (notifier, listener) = state_change_listener::new(Self::snapshot_of(&state, term, &my_replica_id));

        let election_state = ElectionState {
            state,
            term,
            epoch: 0,
            timers_running: false,
            timer_settings,
            my_replica_id,
            actor_client,
            notifier,
        };

        (election_state, listener)
    }

    pub(crate) fn start_timers(&mut self) {
        self.timers_running = true;
        if let State::Follower(fs) = &mut self.state {
            if fs.election_timer.is_none() {
                fs.election_timer.replace(ElectionTimerHandle::spawn_timer_task(
                    self.timer_settings.election_timeout_min,
                    self.timer_settings.election_timeout_max,
                    self.epoch,
                    self.actor_client.clone(),
                ));
            }
        }
    }

    pub(crate) fn transition_to_follower(&mut self, term: Term, leader: Option<ReplicaId>) {
        self.epoch += 1;
        self.term = term;
        self.state = State::Follower(FollowerState {
            leader,
            election_timer: self.new_election_timer(),
        });
        self.notify_new_state();
    }

    pub(crate) fn transition_to_candidate(&mut self, term: Term) {
        self.epoch += 1;
        self.term = term;

        let mut received_votes_from = HashSet::with_capacity(3);
        // > vote for self
        received_votes_from.insert(self.my_replica_id.clone());

        self.state = State::Candidate(CandidateState {
            received_votes_from,
            election_timer: self.new_election_timer(),
        });
        self.notify_new_state();
    }

    pub(crate) fn transition_to_leader(&mut self, peer_ids: Vec<ReplicaId>, last_index: LogIndex) {
        self.epoch += 1;
        self.state = State::Leader(LeaderState {
            tracker: LeaderStateTracker::new(peer_ids, last_index),
            heartbeat_timer: self.new_heartbeat_timer(),
        });
        self.notify_new_state();
    }

    /// Terminal. Drops every timer.
    pub(crate) fn transition_to_error(&mut self) {
        self.epoch += 1;
        self.state = State::Error;
        self.notify_new_state();
    }

    /// New durations apply immediately: running timers are replaced, which also bumps the epoch so
    /// ticks from the old ones are dropped.
    pub(crate) fn update_timer_settings(&mut self, timer_settings: TimerSettings) {
        self.timer_settings = timer_settings;
        if !self.timers_running {
            return;
        }

        self.epoch += 1;
        let election_timer = self.new_election_timer();
        let heartbeat_timer = self.new_heartbeat_timer();
        match &mut self.state {
            State::Follower(fs) => fs.election_timer = election_timer,
            State::Candidate(cs) => cs.election_timer = election_timer,
            State::Leader(ls) => ls.heartbeat_timer = heartbeat_timer,
            State::Error => {}
        }
    }

    fn new_election_timer(&self) -> Option<ElectionTimerHandle> {
        if !self.timers_running {
            return None;
        }
        Some(ElectionTimerHandle::spawn_timer_task(
            self.timer_settings.election_timeout_min,
            self.timer_settings.election_timeout_max,
            self.epoch,
            self.actor_client.clone(),
        ))
    }

    fn new_heartbeat_timer(&self) -> Option<PeriodicTimerHandle> {
        if !self.timers_running {
            return None;
        }
        // Becoming leader broadcasts right away, so the first heartbeat can wait an interval.
        Some(PeriodicTimerHandle::spawn_timer_task(
            TimeoutKind::Heartbeat,
            self.timer_settings.heartbeat_interval,
            self.epoch,
            false,
            self.actor_client.clone(),
        ))
    }

    pub(crate) fn term(&self) -> Term {
        self.term
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn is_current_epoch(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    pub(crate) fn timer_settings(&self) -> &TimerSettings {
        &self.timer_settings
    }

    pub(crate) fn role(&self) -> Role {
        match self.state {
            State::Leader(_) => Role::Leader,
            State::Candidate(_) => Role::Candidate,
            State::Follower(_) => Role::Follower,
            State::Error => Role::Error,
        }
    }

    pub(crate) fn is_leader(&self) -> bool {
        self.role() == Role::Leader
    }

    pub(crate) fn is_error(&self) -> bool {
        self.role() == Role::Error
    }

    pub(crate) fn leader_hint(&self) -> Option<ReplicaId> {
        match &self.state {
            State::Leader(_) => Some(self.my_replica_id.clone()),
            State::Follower(fs) => fs.leader.clone(),
            State::Candidate(_) | State::Error => None,
        }
    }

    pub(crate) fn current_state(&self) -> RoleSnapshot {
        Self::snapshot_of(&self.state, self.term, &self.my_replica_id)
    }

    fn snapshot_of(state: &State, term: Term, my_replica_id: &ReplicaId) -> RoleSnapshot {
        let (role, leader) = match state {
            State::Leader(_) => (Role::Leader, Some(my_replica_id.clone())),
            State::Candidate(_) => (Role::Candidate, None),
            State::Follower(fs) => (Role::Follower, fs.leader.clone()),
            State::Error => (Role::Error, None),
        };

        RoleSnapshot { role, term, leader }
    }

    fn notify_new_state(&self) {
        self.notifier.notify(self.current_state());
    }

    pub(crate) fn reset_timeout_if_follower(&mut self) {
        if let State::Follower(FollowerState {
            election_timer: Some(timer),
            ..
        }) = &mut self.state
        {
            timer.reset_timeout();
        }
    }

    /// Whether an election timeout is still meaningful: the election timer of the current
    /// Follower or Candidate state has actually run out.
    pub(crate) fn election_timer_expired(&self) -> bool {
        match &self.state {
            State::Follower(FollowerState {
                election_timer: Some(timer),
                ..
            }) => timer.is_expired(),
            State::Candidate(cs) => cs.election_timer.as_ref().map(|t| t.is_expired()).unwrap_or(false),
            _ => false,
        }
    }

    pub(crate) fn postpone_heartbeat_if_leader(&self) {
        if let State::Leader(LeaderState {
            heartbeat_timer: Some(timer),
            ..
        }) = &self.state
        {
            timer.postpone();
        }
    }

    pub(crate) fn set_leader_if_unknown(&mut self, leader: &ReplicaId) {
        if let State::Follower(fs) = &mut self.state {
            if fs.leader.is_none() {
                fs.leader.replace(leader.clone());
                self.notify_new_state();
            }
        }
    }

    /// Return number of votes received if candidate, or None if no longer Candidate.
    pub(crate) fn add_vote_if_candidate(&mut self, vote_from: ReplicaId) -> Option<usize> {
        if let State::Candidate(cs) = &mut self.state {
            cs.received_votes_from.insert(vote_from);
            Some(cs.received_votes_from.len())
        } else {
            None
        }
    }

    pub(crate) fn leader_state(&self) -> Option<&LeaderStateTracker> {
        if let State::Leader(ls) = &self.state {
            Some(&ls.tracker)
        } else {
            None
        }
    }

    pub(crate) fn leader_state_mut(&mut self) -> Option<&mut LeaderStateTracker> {
        if let State::Leader(ls) = &mut self.state {
            Some(&mut ls.tracker)
        } else {
            None
        }
    }
}

impl fmt::Debug for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Leader(_) => write!(f, "Leader(Term={:?})", self.term),
            State::Candidate(_) => write!(f, "Candidate(Term={:?})", self.term),
            State::Follower(FollowerState { leader: Some(l), .. }) => {
                write!(f, "Follower(Term={:?}, Leader={})", self.term, l)
            }
            State::Follower(FollowerState { leader: None, .. }) => {
                write!(f, "Follower(Term={:?}, Leader=None)", self.term)
            }
            State::Error => write!(f, "Error(Term={:?})", self.term),
        }
    }
}

enum State {
    Leader(LeaderState),
    Candidate(CandidateState),
    Follower(FollowerState),
    Error,
}

struct LeaderState {
    tracker: LeaderStateTracker,
    heartbeat_timer: Option<PeriodicTimerHandle>,
}

struct CandidateState {
    received_votes_from: HashSet<ReplicaId>,
    election_timer: Option<ElectionTimerHandle>,
}

struct FollowerState {
    leader: Option<ReplicaId>,
    election_timer: Option<ElectionTimerHandle>,
}
