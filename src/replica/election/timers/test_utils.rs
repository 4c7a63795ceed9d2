use crate::actor::Event;
use crate::message::TimeoutKind;
use std::time::Duration;
use tokio::sync::mpsc;

/// TestUtilActor stands in for a replica's event loop and asserts on what timer tasks enqueue.
pub(super) struct TestUtilActor {
    rx: mpsc::Receiver<Event>,
    quiet_period: Duration,
}

impl TestUtilActor {
    pub(super) fn new(rx: mpsc::Receiver<Event>) -> Self {
        TestUtilActor {
            rx,
            quiet_period: Duration::from_millis(10),
        }
    }

    pub(super) async fn assert_timeout_event(&mut self, kind: TimeoutKind, logic_clock: u64) {
        let event = tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("Unexpected timeout")
            .expect("Expected event");

        match event {
            Event::Timeout(timeout) => {
                assert_eq!(timeout.kind, kind);
                assert_eq!(timeout.logic_clock, logic_clock);
            }
            other => panic!("Unexpected event {:?}", other),
        }
    }

    pub(super) async fn assert_no_event(&mut self) {
        if let Ok(event) = tokio::time::timeout(self.quiet_period, self.rx.recv()).await {
            panic!("Expected no event, got {:?}", event);
        }
    }
}
