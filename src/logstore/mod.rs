mod entry;
mod in_memory;
mod index;
mod store;

pub use entry::ClientSession;
pub use entry::EntryDecodeError;
pub use entry::EntryKind;
pub use entry::RaftEntry;
pub use in_memory::InMemoryLogStore;
pub use index::LogIndex;
pub use store::LogStore;
