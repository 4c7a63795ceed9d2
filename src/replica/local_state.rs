use crate::grpc;
use crate::replica::peers::{ReplicaId, SyncConfig};
use prost::Message;
use std::convert::TryFrom;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Copy, Clone, Default, PartialOrd, PartialEq, Ord, Eq, Hash)]
pub struct Term(u64);

impl Term {
    pub fn new(term: u64) -> Self {
        Term(term)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Term {
        Term(self.0 + 1)
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A vote is only meaningful for the term it was cast in.
#[derive(Clone, Debug, PartialEq)]
pub struct Vote {
    pub term: Term,
    pub candidate: ReplicaId,
}

/// PersistentLocalState is used whenever the raft paper requires that something is persisted to a
/// durable store to guarantee safety. Not everything that uses disk has to go through this, only
/// algorithm-correctness-critical ones.
///
/// Every `persist_*` method must be durable when it returns `Ok`. A failed write is unrecoverable
/// for the node.
pub trait PersistentLocalState: Send + 'static {
    fn current_term(&self) -> Term;
    fn vote(&self) -> Option<Vote>;
    fn config(&self) -> Option<SyncConfig>;

    fn persist_term(&mut self, term: Term) -> io::Result<()>;
    fn persist_vote(&mut self, vote: Vote) -> io::Result<()>;
    fn persist_config(&mut self, config: &SyncConfig) -> io::Result<()>;

    fn voted_for(&self, term: Term) -> Option<ReplicaId> {
        self.vote().filter(|v| v.term == term).map(|v| v.candidate)
    }
}

#[derive(Clone, Default, Debug, PartialEq)]
struct LocalStateData {
    current_term: Term,
    vote: Option<Vote>,
    config: Option<SyncConfig>,
}

/// VolatileLocalState keeps everything in memory. Clones share the same state, which lets tests
/// restart a node over the "same disk".
#[derive(Clone, Default)]
pub struct VolatileLocalState {
    data: Arc<Mutex<LocalStateData>>,
}

impl VolatileLocalState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LocalStateData> {
        self.data.lock().expect("VolatileLocalState mutex guard poison")
    }
}

impl PersistentLocalState for VolatileLocalState {
    fn current_term(&self) -> Term {
        self.lock().current_term
    }

    fn vote(&self) -> Option<Vote> {
        self.lock().vote.clone()
    }

    fn config(&self) -> Option<SyncConfig> {
        self.lock().config.clone()
    }

    fn persist_term(&mut self, term: Term) -> io::Result<()> {
        self.lock().current_term = term;
        Ok(())
    }

    fn persist_vote(&mut self, vote: Vote) -> io::Result<()> {
        self.lock().vote.replace(vote);
        Ok(())
    }

    fn persist_config(&mut self, config: &SyncConfig) -> io::Result<()> {
        self.lock().config.replace(config.clone());
        Ok(())
    }
}

/// FileLocalState keeps the state in a single protobuf file. Every write goes to a temp file that
/// is fsync'ed and then renamed over the real one, so a crash leaves either the old or the new
/// state on disk, never a torn one.
pub struct FileLocalState {
    path: PathBuf,
    data: LocalStateData,
}

impl FileLocalState {
    /// Load the state at `path`, or start from term 0 with no vote if the file doesn't exist.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let data = match fs::read(&path) {
            Ok(bytes) => decode_local_state(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => LocalStateData::default(),
            Err(e) => return Err(e),
        };

        Ok(FileLocalState { path, data })
    }

    fn write(&mut self, data: LocalStateData) -> io::Result<()> {
        let proto = grpc::ProtoLocalState {
            current_term: data.current_term.as_u64(),
            vote: data.vote.as_ref().map(grpc::ProtoVote::from),
            config: data.config.as_ref().map(grpc::ProtoSyncConfig::from),
        };
        let mut buf = Vec::with_capacity(proto.encoded_len());
        proto
            .encode(&mut buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&buf)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        sync_parent_dir(&self.path)?;

        // Only observable once durable.
        self.data = data;
        Ok(())
    }
}

fn decode_local_state(bytes: &[u8]) -> io::Result<LocalStateData> {
    let invalid = |e: Box<dyn std::error::Error + Send + Sync>| io::Error::new(io::ErrorKind::InvalidData, e);

    let proto = grpc::ProtoLocalState::decode(bytes).map_err(|e| invalid(e.into()))?;
    let vote = match proto.vote {
        Some(v) => Some(Vote::try_from(v).map_err(|e| invalid(e.into()))?),
        None => None,
    };
    let config = match proto.config {
        Some(c) => Some(SyncConfig::try_from(c).map_err(|e| invalid(e.into()))?),
        None => None,
    };

    Ok(LocalStateData {
        current_term: Term::new(proto.current_term),
        vote,
        config,
    })
}

fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::File::open(dir)?.sync_all(),
        _ => Ok(()),
    }
}

impl PersistentLocalState for FileLocalState {
    fn current_term(&self) -> Term {
        self.data.current_term
    }

    fn vote(&self) -> Option<Vote> {
        self.data.vote.clone()
    }

    fn config(&self) -> Option<SyncConfig> {
        self.data.config.clone()
    }

    fn persist_term(&mut self, term: Term) -> io::Result<()> {
        let mut data = self.data.clone();
        data.current_term = term;
        self.write(data)
    }

    fn persist_vote(&mut self, vote: Vote) -> io::Result<()> {
        let mut data = self.data.clone();
        data.vote.replace(vote);
        self.write(data)
    }

    fn persist_config(&mut self, config: &SyncConfig) -> io::Result<()> {
        let mut data = self.data.clone();
        data.config.replace(config.clone());
        self.write(data)
    }
}
