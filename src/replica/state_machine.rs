use crate::logstore::LogIndex;
use crate::replica::{Role, Term};
use bytes::Bytes;
use std::io;

/// StateMachine is the application specific view of applying the replicated logs in sequential
/// consistent order. All callbacks run on the node's event loop, one at a time.
pub trait StateMachine: Send + 'static {
    /// on_commit is called only when its guaranteed that the provided entry has been committed
    /// (i.e. replicated to a majority). Because of this guarantee, you will never need to reverse
    /// an entry once you've been asked to apply it. Entries arrive exactly once, in index order.
    ///
    /// The leader will not respond success to the client's request until this method call
    /// completes. You can optionally provide an opaque data blob as a result of applying the state
    /// transition, and it will be returned to the proposer.
    fn on_commit(&mut self, ctx: &EntryContext, data: &Bytes) -> StateMachineOutput;

    /// The entry is durably in the local log but not yet committed. Weak proposals are
    /// acknowledged to their caller right after this.
    fn on_pre_commit(&mut self, _ctx: &EntryContext, _data: &Bytes) {}

    /// A pre-committed entry was removed from the log because a newer leader disagreed with it.
    /// Called newest first.
    fn on_rollback(&mut self, _ctx: &EntryContext, _data: &Bytes) {}

    /// Capture everything applied so far. `last_included_index` must equal `applied_index()`.
    fn take_snapshot(&mut self) -> io::Result<Snapshot>;

    /// Replace all state with `snapshot`. After this, `applied_index()` must return
    /// `snapshot.last_included_index`.
    fn restore_snapshot(&mut self, snapshot: &Snapshot) -> io::Result<()>;

    /// Highest index this state machine has durably applied. Entries after it are replayed from
    /// the log on startup.
    fn applied_index(&self) -> LogIndex;
}

/// EntryContext describes the entry a state machine callback is about.
#[derive(Clone, Debug, PartialEq)]
pub struct EntryContext {
    pub index: LogIndex,
    pub term: Term,
    pub msg_type: u32,
    pub is_weak: bool,
    /// Role of this node at the time of the callback.
    pub role: Role,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StateMachineOutput {
    Data(Bytes),
    NoData,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub data: Bytes,
    pub last_included_index: LogIndex,
}

/// NoOpStateMachine applies nothing. Handy for nodes that only care about ordering.
#[derive(Default)]
pub struct NoOpStateMachine {
    applied: LogIndex,
}

impl NoOpStateMachine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateMachine for NoOpStateMachine {
    fn on_commit(&mut self, ctx: &EntryContext, _: &Bytes) -> StateMachineOutput {
        self.applied = ctx.index;
        StateMachineOutput::NoData
    }

    fn take_snapshot(&mut self) -> io::Result<Snapshot> {
        Ok(Snapshot {
            data: Bytes::new(),
            last_included_index: self.applied,
        })
    }

    fn restore_snapshot(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        self.applied = snapshot.last_included_index;
        Ok(())
    }

    fn applied_index(&self) -> LogIndex {
        self.applied
    }
}
