use crate::logstore::{ClientSession, LogIndex, LogStore, RaftEntry};
use crate::replica::sessions::{CachedResult, ClientSessions};
use crate::replica::{EntryContext, ProposeOutcome, Role, Snapshot, StateMachine, Term};
use std::io;

/// WriteAheadLog is the raft-specific facade over the log store and the state machine.
///
/// Note: A log entry has 3 states (not modeled directly in code):
/// 1. Persisted - written to disk, not yet replicated to majority
/// 2. Committed - written to disk, replicated to majority
/// 3. Applied - a committed entry that has also been applied to the state machine
///
/// A log entry's state has no global truth. Each replica will have their own local view of what
/// state the log entry is in.
pub(crate) struct WriteAheadLog<L, M>
where
    L: LogStore,
    M: StateMachine,
{
    // Application's info/debug log.
    logger: slog::Logger,

    // This is the log that we're replicating.
    log: L,
    state_machine: M,
    // Index of highest log entry applied to the state machine.
    last_applied: LogIndex,
    sessions: ClientSessions,

    // Latest snapshot, whose `last_included_index` is the log's boundary once compacted.
    snapshot: Option<StoredSnapshot>,
    snapshot_threshold: Option<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct StoredSnapshot {
    pub(crate) snapshot: Snapshot,
    pub(crate) last_included_term: Term,
    pub(crate) sessions: Vec<ClientSession>,
}

#[derive(Debug, PartialEq)]
pub(crate) struct AppliedEntry {
    pub(crate) index: LogIndex,
    pub(crate) term: Term,
    pub(crate) outcome: ProposeOutcome,
}

impl<L, M> WriteAheadLog<L, M>
where
    L: LogStore,
    M: StateMachine,
{
    pub(crate) fn new(
        logger: slog::Logger,
        mut log: L,
        state_machine: M,
        snapshot_threshold: Option<u64>,
    ) -> io::Result<Self> {
        let boundary = log.begin_index().prev();
        let mut last_applied = state_machine.applied_index();

        if last_applied < boundary {
            // Either a fresh log created at a non-default base, or a state machine that lost
            // data. Entries before the boundary can't be replayed either way.
            slog::warn!(
                logger,
                "State machine applied index {:?} is behind the log boundary {:?}. Starting from the boundary.",
                last_applied,
                boundary
            );
            last_applied = boundary;
        }
        if last_applied > log.last_index() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "State machine applied index {:?} is past the end of the log {:?}",
                    last_applied,
                    log.last_index()
                ),
            ));
        }
        if last_applied > log.commit_index() {
            // Anything applied was committed.
            log.set_commit_index(last_applied)?;
        }
        let sessions = Self::rebuild_sessions(&log, last_applied)?;

        Ok(WriteAheadLog {
            logger,
            log,
            state_machine,
            last_applied,
            sessions,
            snapshot: None,
            snapshot_threshold,
        })
    }

    /// The session table as of `last_applied`: whatever was saved with the boundary, plus every
    /// session carried by the retained entries the state machine already applied.
    fn rebuild_sessions(log: &L, last_applied: LogIndex) -> io::Result<ClientSessions> {
        let mut sessions = ClientSessions::default();
        sessions.restore(&log.boundary_sessions());

        let mut index = log.begin_index();
        while index <= last_applied {
            if let Some(session) = log.get(index)?.and_then(|entry| entry.session) {
                sessions.record_replayed(session);
            }
            index = index.plus(1);
        }

        Ok(sessions)
    }

    /// (last index, last term). The boundary of an empty log counts as its last entry.
    pub(crate) fn latest_entry(&self) -> (LogIndex, Term) {
        (self.log.last_index(), self.log.last_term())
    }

    pub(crate) fn last_index(&self) -> LogIndex {
        self.log.last_index()
    }

    pub(crate) fn begin_index(&self) -> LogIndex {
        self.log.begin_index()
    }

    /// Term of the entry at `index`. `Ok(None)` if it is compacted away or past the end of the log.
    pub(crate) fn term_at(&self, index: LogIndex) -> io::Result<Option<Term>> {
        if index.is_none() {
            return Ok(Some(Term::new(0)));
        }
        let boundary = self.log.begin_index().prev();
        if index < boundary {
            return Ok(None);
        }
        if index == boundary {
            return Ok(Some(self.log.boundary_term()));
        }

        Ok(self.log.get(index)?.map(|entry| entry.term))
    }

    pub(crate) fn read(&self, index: LogIndex) -> io::Result<Option<RaftEntry>> {
        self.log.get(index)
    }

    /// Up to `max` entries starting at `start`, stopping early at the end of the log.
    pub(crate) fn read_from(&self, start: LogIndex, max: usize) -> io::Result<Vec<RaftEntry>> {
        let mut entries = Vec::new();
        let mut index = start;
        while entries.len() < max {
            match self.log.get(index)? {
                Some(entry) => entries.push(entry),
                None => break,
            }
            index = index.plus(1);
        }

        Ok(entries)
    }

    /// Durably append `entry`, then tell the state machine it is pre-committed.
    pub(crate) fn append(&mut self, entry: RaftEntry, role: Role) -> io::Result<()> {
        self.log.append(entry.clone())?;

        if !entry.is_noop() {
            self.state_machine.on_pre_commit(&Self::context(&entry, role), &entry.data);
        }
        Ok(())
    }

    /// Remove anything starting at `index` and later. Removed entries are rolled back in the
    /// state machine newest first. Committed entries can never be removed.
    pub(crate) fn truncate_from(&mut self, index: LogIndex, role: Role) -> io::Result<()> {
        if index <= self.log.commit_index() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Refusing to truncate from {:?}, commit index is {:?}",
                    index,
                    self.log.commit_index()
                ),
            ));
        }

        // Read what we're about to drop before dropping it.
        let mut removed = Vec::new();
        let mut i = index;
        while i <= self.log.last_index() {
            if let Some(entry) = self.log.get(i)? {
                removed.push(entry);
            }
            i = i.plus(1);
        }

        self.log.truncate_from(index)?;
        self.sessions.forget_in_flight_from(index);

        for entry in removed.iter().rev().filter(|e| !e.is_noop()) {
            self.state_machine.on_rollback(&Self::context(entry, role), &entry.data);
        }
        slog::info!(self.logger, "Truncated {} entries from index {:?}", removed.len(), index);

        Ok(())
    }

    pub(crate) fn commit_index(&self) -> LogIndex {
        self.log.commit_index()
    }

    pub(crate) fn last_applied(&self) -> LogIndex {
        self.last_applied
    }

    /// Leader path. Returns true if the commit index moved.
    pub(crate) fn ratchet_fwd_commit_index_if_valid(
        &mut self,
        tentative_new_commit_index: LogIndex,
        current_term: Term,
    ) -> io::Result<bool> {
        if tentative_new_commit_index <= self.log.commit_index() {
            return Ok(false);
        }

        // > If there exists an N such that N > commitIndex, a majority
        // > of matchIndex[i] ≥ N, and log[N].term == currentTerm:
        // > set commitIndex = N (§5.3, §5.4).
        if self.term_at(tentative_new_commit_index)? != Some(current_term) {
            return Ok(false);
        }

        self.log.set_commit_index(tentative_new_commit_index)?;
        Ok(true)
    }

    /// Follower path. Never moves backwards or past the end of the local log.
    pub(crate) fn ratchet_fwd_commit_index(&mut self, new_commit_index: LogIndex) -> io::Result<bool> {
        let new_commit_index = std::cmp::min(new_commit_index, self.log.last_index());
        if new_commit_index <= self.log.commit_index() {
            return Ok(false);
        }

        self.log.set_commit_index(new_commit_index)?;
        Ok(true)
    }

    pub(crate) fn sessions(&self) -> &ClientSessions {
        &self.sessions
    }

    pub(crate) fn sessions_mut(&mut self) -> &mut ClientSessions {
        &mut self.sessions
    }

    /// apply_all_committed_entries applies all committed but unapplied entries in order, and
    /// returns what happened to each one that a proposer could be waiting on.
    ///
    /// This may be a long running loop, and starve the event loop from handling another event.
    /// It only runs long for a replica catching up on commits, which rarely overlaps with serving
    /// proposals.
    pub(crate) fn apply_all_committed_entries(&mut self, role: Role) -> io::Result<Vec<AppliedEntry>> {
        let mut applied = Vec::new();
        let commit_index = self.log.commit_index();

        while self.last_applied < commit_index {
            let index = self.last_applied.plus(1);
            let entry = self.log.get(index)?.ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Committed entry {:?} is missing from the log", index),
                )
            })?;

            if !entry.is_noop() {
                let outcome = self.apply_single_entry(&entry, role);
                applied.push(AppliedEntry {
                    index,
                    term: entry.term,
                    outcome,
                });
            }
            self.last_applied = index;
        }

        self.maybe_take_snapshot()?;
        Ok(applied)
    }

    fn apply_single_entry(&mut self, entry: &RaftEntry, role: Role) -> ProposeOutcome {
        if let Some(session) = entry.session {
            if let Some(cached) = self.sessions.duplicate_of(&session) {
                slog::debug!(
                    self.logger,
                    "Skipping duplicate of client {} seq {} at index {:?}",
                    session.client_id,
                    session.seq_num,
                    entry.index
                );
                return ProposeOutcome::Duplicate(
                    cached
                        .map(|c| c.output)
                        .unwrap_or(crate::replica::StateMachineOutput::NoData),
                );
            }
        }

        let output = self.state_machine.on_commit(&Self::context(entry, role), &entry.data);
        if let Some(session) = entry.session {
            self.sessions.record_applied(
                session,
                CachedResult {
                    index: entry.index,
                    term: entry.term,
                    output: output.clone(),
                },
            );
        }

        ProposeOutcome::Committed(output)
    }

    fn maybe_take_snapshot(&mut self) -> io::Result<()> {
        let threshold = match self.snapshot_threshold {
            Some(t) => t,
            None => return Ok(()),
        };
        let boundary = self.log.begin_index().prev();
        if self.last_applied.as_u64() - boundary.as_u64() < threshold {
            return Ok(());
        }

        let stored = self.take_snapshot()?;
        let through = stored.snapshot.last_included_index;
        if through > boundary {
            self.log.compact_through(through, &stored.sessions)?;
            slog::info!(self.logger, "Compacted log through {:?}", through);
        }

        Ok(())
    }

    fn take_snapshot(&mut self) -> io::Result<StoredSnapshot> {
        // No-ops never reach the state machine, so it may trail `last_applied` by a few of them.
        let snapshot = self.state_machine.take_snapshot()?;
        let boundary = self.log.begin_index().prev();
        if snapshot.last_included_index > self.last_applied || snapshot.last_included_index < boundary {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Snapshot covers {:?}, outside of [{:?}, {:?}]",
                    snapshot.last_included_index, boundary, self.last_applied
                ),
            ));
        }
        let last_included_term = self.term_at(snapshot.last_included_index)?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("No term for snapshot index {:?}", snapshot.last_included_index),
            )
        })?;

        let stored = StoredSnapshot {
            snapshot,
            last_included_term,
            sessions: self.sessions.snapshot(),
        };
        self.snapshot.replace(stored.clone());

        Ok(stored)
    }

    /// The snapshot to ship to a peer that needs entries we no longer have.
    pub(crate) fn snapshot_for_peer(&mut self) -> io::Result<StoredSnapshot> {
        let boundary = self.log.begin_index().prev();
        match &self.snapshot {
            Some(stored) if stored.snapshot.last_included_index >= boundary => Ok(stored.clone()),
            _ => self.take_snapshot(),
        }
    }

    /// Install a snapshot shipped by the leader. Returns false if it was already covered by our
    /// committed log.
    pub(crate) fn install_snapshot(&mut self, stored: StoredSnapshot, role: Role) -> io::Result<bool> {
        let last_included_index = stored.snapshot.last_included_index;
        if last_included_index <= self.log.commit_index() {
            return Ok(false);
        }

        // > If existing log entry has same index and term as snapshot's
        // > last included entry, retain log entries following it
        if self.term_at(last_included_index)? == Some(stored.last_included_term) {
            self.ratchet_fwd_commit_index(last_included_index)?;
            return Ok(true);
        }

        // > Discard the entire log
        let first_uncommitted = self.log.commit_index().plus(1);
        if first_uncommitted <= self.log.last_index() {
            self.truncate_from(first_uncommitted, role)?;
        }
        self.state_machine.restore_snapshot(&stored.snapshot)?;
        self.log
            .reset_to_snapshot(last_included_index, stored.last_included_term, &stored.sessions)?;

        self.last_applied = last_included_index;
        self.sessions.restore(&stored.sessions);
        self.snapshot.replace(stored);
        slog::info!(self.logger, "Installed snapshot through {:?}", last_included_index);

        Ok(true)
    }

    fn context(entry: &RaftEntry, role: Role) -> EntryContext {
        EntryContext {
            index: entry.index,
            term: entry.term,
            msg_type: entry.msg_type,
            is_weak: entry.is_weak,
            role,
        }
    }
}
