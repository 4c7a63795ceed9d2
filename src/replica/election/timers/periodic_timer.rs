use crate::actor::WeakActorClient;
use crate::message::{SyncTimeout, TimeoutKind};
use crate::replica::election::timers::shared::SharedDeadline;
use crate::replica::election::timers::time::{Clock, TokioClock};
use std::sync::{Arc, Weak};
use tokio::time::Duration;

/// PeriodicTimerHandle owns a task that enqueues a timeout of one kind every `interval`. Used for
/// the leader heartbeat and for pings. Dropping the handle stops the task.
pub(crate) struct PeriodicTimerHandle<C: Clock = TokioClock> {
    shared: Arc<Shared<C>>,
}

struct Shared<C: Clock> {
    interval: Duration,
    next_tick: SharedDeadline,
    clock: C,
}

struct PeriodicTimerTask<C: Clock> {
    weak_shared: Weak<Shared<C>>,
    next_tick: SharedDeadline,
    actor_client: WeakActorClient,
    event: SyncTimeout,
    clock: C,
}

impl PeriodicTimerHandle {
    /// With `fire_immediately`, the first tick is enqueued right away instead of after one
    /// interval.
    pub(crate) fn spawn_timer_task(
        kind: TimeoutKind,
        interval: Duration,
        logic_clock: u64,
        fire_immediately: bool,
        actor_client: WeakActorClient,
    ) -> Self {
        let (task, handle) = PeriodicTimerTask::new(kind, interval, logic_clock, actor_client, TokioClock);
        if !fire_immediately {
            handle.postpone();
        }
        tokio::task::spawn(task.run());

        handle
    }
}

impl<C: Clock> PeriodicTimerHandle<C> {
    /// Push the next tick one full interval out. The leader calls this whenever it has just sent
    /// AppendEntries to everyone anyway.
    pub(crate) fn postpone(&self) {
        self.shared.postpone();
    }
}

impl<C: Clock> Shared<C> {
    fn postpone(&self) {
        self.next_tick.replace(self.clock.now() + self.interval);
    }
}

impl<C: Clock> PeriodicTimerTask<C> {
    fn new(
        kind: TimeoutKind,
        interval: Duration,
        logic_clock: u64,
        actor_client: WeakActorClient,
        clock: C,
    ) -> (Self, PeriodicTimerHandle<C>) {
        let next_tick = SharedDeadline::default();
        let shared = Arc::new(Shared {
            interval,
            next_tick: next_tick.clone(),
            clock: clock.clone(),
        });

        let task = PeriodicTimerTask {
            weak_shared: Arc::downgrade(&shared),
            next_tick,
            actor_client,
            event: SyncTimeout {
                kind,
                logic_clock,
                timer_ms: interval.as_millis() as u64,
            },
            clock,
        };

        (task, PeriodicTimerHandle { shared })
    }

    async fn run(mut self) {
        // An empty slot on the first iteration means we tick right away.
        loop {
            match self.next_tick.take() {
                Some(wake_time) => {
                    self.clock.sleep_until(wake_time).await;
                }
                None => match self.weak_shared.upgrade() {
                    Some(shared) => {
                        self.actor_client.timeout(self.event).await;
                        shared.postpone();
                    }
                    None => return,
                },
            }
        }
    }
}
