use crate::logstore::{ClientSession, LogIndex, LogStore, RaftEntry};
use crate::replica::Term;
use std::convert::TryFrom;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

/// InMemoryLogStore keeps the log in RAM. Clones share the same log, which lets a test drop a node
/// and reopen a new one over the "same disk".
#[derive(Clone)]
pub struct InMemoryLogStore {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    begin: LogIndex,
    boundary_term: Term,
    boundary_sessions: Vec<ClientSession>,
    // We don't *need* to convert these to bytes, but we want to exercise the conversion logic.
    entries: Vec<StoredEntry>,
    commit_index: LogIndex,
}

struct StoredEntry {
    term: Term,
    bytes: Vec<u8>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::with_base(LogIndex::start_index())
    }

    /// The first appended entry will sit at `base`.
    pub fn with_base(base: LogIndex) -> Self {
        let base = std::cmp::max(base, LogIndex::start_index());
        InMemoryLogStore {
            inner: Arc::new(Mutex::new(Inner {
                begin: base,
                boundary_term: Term::new(0),
                boundary_sessions: Vec::new(),
                entries: Vec::new(),
                commit_index: base.prev(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("InMemoryLogStore mutex guard poison")
    }
}

impl Default for InMemoryLogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn last_index(&self) -> LogIndex {
        self.begin.plus(self.entries.len() as u64).prev()
    }

    fn position(&self, index: LogIndex) -> Option<usize> {
        if index < self.begin || index > self.last_index() {
            return None;
        }
        Some((index.as_u64() - self.begin.as_u64()) as usize)
    }
}

impl LogStore for InMemoryLogStore {
    fn append(&mut self, entry: RaftEntry) -> io::Result<()> {
        let mut inner = self.lock();
        let expected = inner.last_index().plus(1);
        if entry.index != expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Append at index {:?}, expected {:?}", entry.index, expected),
            ));
        }

        inner.entries.push(StoredEntry {
            term: entry.term,
            bytes: (&entry).into(),
        });
        Ok(())
    }

    fn get(&self, index: LogIndex) -> io::Result<Option<RaftEntry>> {
        let inner = self.lock();
        match inner.position(index) {
            None => Ok(None),
            Some(pos) => RaftEntry::try_from(inner.entries[pos].bytes.as_slice())
                .map(Some)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
        }
    }

    fn truncate_from(&mut self, index: LogIndex) -> io::Result<()> {
        let mut inner = self.lock();
        if index < inner.begin {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Can't truncate from compacted index {:?}", index),
            ));
        }
        if index <= inner.commit_index {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Can't truncate committed index {:?}", index),
            ));
        }

        if let Some(pos) = inner.position(index) {
            inner.entries.truncate(pos);
        }
        Ok(())
    }

    fn last_index(&self) -> LogIndex {
        self.lock().last_index()
    }

    fn last_term(&self) -> Term {
        let inner = self.lock();
        inner.entries.last().map(|e| e.term).unwrap_or(inner.boundary_term)
    }

    fn set_commit_index(&mut self, index: LogIndex) -> io::Result<()> {
        let mut inner = self.lock();
        if index > inner.last_index() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Commit index {:?} is past the end of the log", index),
            ));
        }
        inner.commit_index = index;
        Ok(())
    }

    fn commit_index(&self) -> LogIndex {
        self.lock().commit_index
    }

    fn begin_index(&self) -> LogIndex {
        self.lock().begin
    }

    fn boundary_term(&self) -> Term {
        self.lock().boundary_term
    }

    fn compact_through(&mut self, index: LogIndex, sessions: &[ClientSession]) -> io::Result<()> {
        let mut inner = self.lock();
        let pos = match inner.position(index) {
            Some(pos) => pos,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Can't compact through {:?}, not in the log", index),
                ))
            }
        };

        inner.boundary_term = inner.entries[pos].term;
        inner.entries.drain(..=pos);
        inner.begin = index.plus(1);
        inner.boundary_sessions = sessions.to_vec();
        Ok(())
    }

    fn reset_to_snapshot(
        &mut self,
        last_included_index: LogIndex,
        last_included_term: Term,
        sessions: &[ClientSession],
    ) -> io::Result<()> {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.begin = last_included_index.plus(1);
        inner.boundary_term = last_included_term;
        inner.boundary_sessions = sessions.to_vec();
        inner.commit_index = last_included_index;
        Ok(())
    }

    fn boundary_sessions(&self) -> Vec<ClientSession> {
        self.lock().boundary_sessions.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn entry(index: u64, term: u64) -> RaftEntry {
        RaftEntry {
            index: LogIndex::new(index),
            term: Term::new(term),
            kind: crate::logstore::EntryKind::Normal,
            msg_type: 0,
            is_weak: false,
            session: None,
            data: Bytes::from(format!("entry-{}", index)),
        }
    }

    #[test]
    fn append_read_truncate() {
        let mut log = InMemoryLogStore::new();
        assert_eq!(log.last_index(), LogIndex::NONE);
        assert_eq!(log.last_term(), Term::new(0));

        for i in 1..=4 {
            log.append(entry(i, 1)).unwrap();
        }
        log.append(entry(5, 2)).unwrap();
        assert_eq!(log.last_index(), LogIndex::new(5));
        assert_eq!(log.last_term(), Term::new(2));
        assert_eq!(log.get(LogIndex::new(3)).unwrap(), Some(entry(3, 1)));
        assert_eq!(log.get(LogIndex::new(6)).unwrap(), None);

        log.truncate_from(LogIndex::new(4)).unwrap();
        assert_eq!(log.last_index(), LogIndex::new(3));
        assert_eq!(log.get(LogIndex::new(4)).unwrap(), None);

        // Gaps are rejected.
        assert!(log.append(entry(5, 2)).is_err());
    }

    #[test]
    fn refuses_to_truncate_committed_entries() {
        let mut log = InMemoryLogStore::new();
        log.append(entry(1, 1)).unwrap();
        log.append(entry(2, 1)).unwrap();
        log.set_commit_index(LogIndex::new(1)).unwrap();

        assert!(log.truncate_from(LogIndex::new(1)).is_err());
        log.truncate_from(LogIndex::new(2)).unwrap();
        assert_eq!(log.last_index(), LogIndex::new(1));
    }

    #[test]
    fn compaction_keeps_boundary_term() {
        let mut log = InMemoryLogStore::new();
        for i in 1..=3 {
            log.append(entry(i, i)).unwrap();
        }

        let sessions = vec![ClientSession {
            client_id: 1,
            seq_num: 2,
        }];
        log.compact_through(LogIndex::new(2), &sessions).unwrap();
        assert_eq!(log.begin_index(), LogIndex::new(3));
        assert_eq!(log.boundary_sessions(), sessions);
        assert_eq!(log.boundary_term(), Term::new(2));
        assert_eq!(log.get(LogIndex::new(2)).unwrap(), None);
        assert_eq!(log.get(LogIndex::new(3)).unwrap(), Some(entry(3, 3)));

        log.compact_through(LogIndex::new(3), &[]).unwrap();
        assert!(log.boundary_sessions().is_empty());
        assert_eq!(log.last_index(), LogIndex::new(3));
        assert_eq!(log.last_term(), Term::new(3));
        log.append(entry(4, 3)).unwrap();
    }

    #[test]
    fn reset_to_snapshot_restarts_log() {
        let mut log = InMemoryLogStore::new();
        log.append(entry(1, 1)).unwrap();

        log.reset_to_snapshot(LogIndex::new(10), Term::new(4), &[]).unwrap();
        assert_eq!(log.begin_index(), LogIndex::new(11));
        assert_eq!(log.last_index(), LogIndex::new(10));
        assert_eq!(log.last_term(), Term::new(4));
        assert_eq!(log.commit_index(), LogIndex::new(10));
        log.append(entry(11, 4)).unwrap();
    }

    #[test]
    fn configurable_base_and_shared_clones() {
        let mut log = InMemoryLogStore::with_base(LogIndex::new(100));
        let reopened = log.clone();

        assert_eq!(log.last_index(), LogIndex::new(99));
        log.append(entry(100, 1)).unwrap();
        assert_eq!(reopened.last_index(), LogIndex::new(100));
    }
}
