use crate::logstore::{ClientSession, LogIndex, RaftEntry};
use crate::replica::Term;
use std::io;

/// LogStore is the durable, append-only log that a replica group agrees on. The replication core
/// never keeps entries itself; everything goes through this trait.
///
/// A store covers the contiguous range `[begin_index(), last_index()]`. Entries before
/// `begin_index()` have been compacted into a snapshot; the store still remembers the term of the
/// entry right before `begin_index()` (the boundary) so log matching works across compaction.
pub trait LogStore: Send + 'static {
    /// Append `entry`, which must sit at `last_index() + 1`. The entry must be durable once this
    /// returns `Ok`.
    fn append(&mut self, entry: RaftEntry) -> io::Result<()>;

    /// Read the entry at `index`. Returns `Ok(None)` when the index is compacted or beyond the end.
    fn get(&self, index: LogIndex) -> io::Result<Option<RaftEntry>>;

    /// Delete every entry with an index greater than or equal to `index`.
    fn truncate_from(&mut self, index: LogIndex) -> io::Result<()>;

    /// `begin_index() - 1` when the log is empty.
    fn last_index(&self) -> LogIndex;

    /// Term of the last entry, or the boundary term when the log is empty.
    fn last_term(&self) -> Term;

    fn set_commit_index(&mut self, index: LogIndex) -> io::Result<()>;

    fn commit_index(&self) -> LogIndex;

    fn begin_index(&self) -> LogIndex;

    /// Term of the entry at `begin_index() - 1`. `Term::new(0)` if nothing was ever compacted.
    fn boundary_term(&self) -> Term;

    /// Drop entries up to and including `index`, which must already be in the log. `sessions` is the
    /// client session table covering at least the dropped entries; it must be durable together
    /// with the new boundary.
    fn compact_through(&mut self, index: LogIndex, sessions: &[ClientSession]) -> io::Result<()>;

    /// Drop every entry and restart the log right after an installed snapshot.
    fn reset_to_snapshot(
        &mut self,
        last_included_index: LogIndex,
        last_included_term: Term,
        sessions: &[ClientSession],
    ) -> io::Result<()>;

    /// Session table saved by the last `compact_through` or `reset_to_snapshot`. Empty if the log
    /// was never compacted.
    fn boundary_sessions(&self) -> Vec<ClientSession>;
}
