use crate::actor::WeakActorClient;
use crate::message::{SyncTimeout, TimeoutKind};
use crate::replica::election::timers::shared::{self, SharedDeadline};
use crate::replica::election::timers::time::{Clock, TokioClock};
use rand::Rng;
use std::ops::RangeInclusive;
use tokio::time::{Duration, Instant};

/// ElectionTimerHandle owns a task that enqueues an Election timeout once the randomized
/// deadline passes without a reset. Dropping the handle stops the task.
pub(crate) struct ElectionTimerHandle<C: Clock = TokioClock> {
    next_wake_time: SharedDeadline,
    timeout_range: RangeInclusive<Duration>,
    deadline: Instant,
    clock: C,
    _stopper: shared::Stopper,
}

struct ElectionTimerTask<C: Clock> {
    next_wake_time: SharedDeadline,
    actor_client: WeakActorClient,
    clock: C,
    stop_check: shared::StopCheck,
    event: SyncTimeout,
    // Not from the paper. If the actor ignored our timeout (e.g. it raced with a heartbeat), wait
    // this long before nagging it again.
    retry_backoff: Duration,
}

impl ElectionTimerHandle {
    pub(crate) fn spawn_timer_task(
        min_timeout: Duration,
        max_timeout: Duration,
        logic_clock: u64,
        actor_client: WeakActorClient,
    ) -> Self {
        let (task, handle) = ElectionTimerTask::new(min_timeout, max_timeout, logic_clock, actor_client, TokioClock);
        tokio::task::spawn(task.run());

        handle
    }
}

impl<C: Clock> ElectionTimerHandle<C> {
    pub(crate) fn reset_timeout(&mut self) {
        // > Raft uses randomized election timeouts to ensure that split votes are rare
        let timeout = rand::thread_rng().gen_range(self.timeout_range.clone());
        self.deadline = self.clock.now() + timeout;
        self.next_wake_time.replace(self.deadline);
    }

    /// True once the current deadline has passed. A timeout that raced with a reset is not.
    pub(crate) fn is_expired(&self) -> bool {
        self.clock.now() >= self.deadline
    }
}

impl<C: Clock> ElectionTimerTask<C> {
    fn new(
        min_timeout: Duration,
        max_timeout: Duration,
        logic_clock: u64,
        actor_client: WeakActorClient,
        clock: C,
    ) -> (Self, ElectionTimerHandle<C>) {
        let next_wake_time = SharedDeadline::default();
        let (stopper, stop_check) = shared::stop_pair();

        let task = ElectionTimerTask {
            next_wake_time: next_wake_time.clone(),
            actor_client,
            clock: clock.clone(),
            stop_check,
            event: SyncTimeout {
                kind: TimeoutKind::Election,
                logic_clock,
                timer_ms: max_timeout.as_millis() as u64,
            },
            retry_backoff: min_timeout,
        };
        let mut handle = ElectionTimerHandle {
            next_wake_time,
            timeout_range: RangeInclusive::new(min_timeout, max_timeout),
            deadline: clock.now(),
            clock,
            _stopper: stopper,
        };

        // The task must have a deadline when it starts, otherwise it would fire immediately.
        handle.reset_timeout();

        (task, handle)
    }

    async fn run(mut self) {
        loop {
            match self.next_wake_time.take() {
                Some(wake_time) => {
                    self.clock.sleep_until(wake_time).await;
                }
                None => {
                    // Slept until the deadline and nobody pushed it back: we haven't heard from a
                    // leader. Keep running after notifying, in case the actor stays in the same
                    // role (e.g. it concurrently received an AppendEntries).
                    if self.stop_check.should_stop() {
                        return;
                    }
                    self.actor_client.timeout(self.event).await;
                    self.clock.sleep(self.retry_backoff).await;
                }
            }

            if self.stop_check.should_stop() {
                return;
            }
        }
    }
}
