use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// SharedDeadline is the one slot a timer handle uses to push a new deadline to its task. The task
/// takes the value; an empty slot after waking means nobody pushed the deadline back.
#[derive(Clone, Default)]
pub(super) struct SharedDeadline {
    slot: Arc<Mutex<Option<Instant>>>,
}

impl SharedDeadline {
    pub(super) fn replace(&self, deadline: Instant) {
        self.slot
            .lock()
            .expect("SharedDeadline.replace() mutex guard poison")
            .replace(deadline);
    }

    pub(super) fn take(&self) -> Option<Instant> {
        self.slot.lock().expect("SharedDeadline.take() mutex guard poison").take()
    }
}

/// Dropping the Stopper tells the paired StopCheck's task to exit.
pub(super) struct Stopper {
    stopped: Arc<AtomicBool>,
}

pub(super) struct StopCheck {
    stopped: Arc<AtomicBool>,
}

pub(super) fn stop_pair() -> (Stopper, StopCheck) {
    let stopped = Arc::new(AtomicBool::new(false));
    (
        Stopper {
            stopped: stopped.clone(),
        },
        StopCheck { stopped },
    )
}

impl Drop for Stopper {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::Release);
    }
}

impl StopCheck {
    pub(super) fn should_stop(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
