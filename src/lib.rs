mod actor;
mod api;
mod logstore;
mod message;
mod replica;
mod server;
mod transport;
mod grpc {
    include!("../generated/vsync.rs");
}

pub use api::OpenError;
pub use api::RegistryError;
pub use api::Rid;
pub use api::SyncNode;
pub use api::SyncNodeConfig;
pub use api::SyncOptions;
pub use api::SyncRegistry;
pub use logstore::ClientSession;
pub use logstore::EntryDecodeError;
pub use logstore::EntryKind;
pub use logstore::InMemoryLogStore;
pub use logstore::LogIndex;
pub use logstore::LogStore;
pub use logstore::RaftEntry;
pub use message::decode;
pub use message::encode;
pub use message::AppendEntries;
pub use message::AppendEntriesReply;
pub use message::ClientRequest;
pub use message::CodecError;
pub use message::Envelope;
pub use message::InstallSnapshot;
pub use message::InstallSnapshotReply;
pub use message::Ping;
pub use message::PingReply;
pub use message::RequestVote;
pub use message::RequestVoteReply;
pub use message::SyncMessage;
pub use message::SyncTimeout;
pub use message::TimeoutKind;
pub use replica::ConfigError;
pub use replica::EnqueueError;
pub use replica::EntryContext;
pub use replica::FileLocalState;
pub use replica::NoOpStateMachine;
pub use replica::NodeAddr;
pub use replica::NodeStatus;
pub use replica::PeerStatus;
pub use replica::PersistentLocalState;
pub use replica::ProposeError;
pub use replica::ProposeInput;
pub use replica::ProposeOutcome;
pub use replica::ProposeOutput;
pub use replica::ReconfigError;
pub use replica::ReplicaId;
pub use replica::Role;
pub use replica::RoleSnapshot;
pub use replica::Snapshot;
pub use replica::StateMachine;
pub use replica::StateMachineOutput;
pub use replica::StatusListener;
pub use replica::SyncConfig;
pub use replica::Term;
pub use replica::TimerSettings;
pub use replica::TimerUpdate;
pub use replica::TimerUpdateError;
pub use replica::VgroupId;
pub use replica::Vote;
pub use replica::VolatileLocalState;
pub use server::shutdown_signal;
pub use server::RpcServer;
pub use server::RpcServerShutdownHandle;
pub use server::RpcServerShutdownSignal;
pub use transport::GrpcTransport;
pub use transport::Transport;

// `crate::{root_mod}` holds no code, only `mod` and `pub use` statements. No `mod` is `pub`; types
// are exported one by one so each root_mod is free to organize its internals.
