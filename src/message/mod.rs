mod codec;
mod types;

pub use codec::decode;
pub use codec::encode;
pub use codec::CodecError;
pub use types::AppendEntries;
pub use types::AppendEntriesReply;
pub use types::ClientRequest;
pub use types::Envelope;
pub use types::InstallSnapshot;
pub use types::InstallSnapshotReply;
pub use types::Ping;
pub use types::PingReply;
pub use types::RequestVote;
pub use types::RequestVoteReply;
pub use types::SyncMessage;
pub use types::SyncTimeout;
pub use types::TimeoutKind;
