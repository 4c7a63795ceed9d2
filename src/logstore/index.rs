use std::fmt;

/// LogIndex is the position of an entry in the replicated log.
///
/// `LogIndex::NONE` sits before the first entry of any log and never names a real entry. Real
/// entries start at the log store's base index, which is `LogIndex::start_index()` unless the store
/// was created with a different base.
#[derive(Copy, Clone, Default, PartialOrd, PartialEq, Ord, Eq, Hash)]
pub struct LogIndex(u64);

impl LogIndex {
    pub const NONE: LogIndex = LogIndex(0);

    pub fn new(index: u64) -> Self {
        LogIndex(index)
    }

    pub fn start_index() -> Self {
        LogIndex(1)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    pub fn plus(&self, delta: u64) -> LogIndex {
        LogIndex(self.0 + delta)
    }

    /// The index right before this one. Saturates at `NONE`.
    pub fn prev(&self) -> LogIndex {
        LogIndex(self.0.saturating_sub(1))
    }

    pub fn checked_minus(&self, delta: u64) -> Option<LogIndex> {
        self.0.checked_sub(delta).map(LogIndex)
    }
}

impl fmt::Debug for LogIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LogIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
