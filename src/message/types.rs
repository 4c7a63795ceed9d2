use crate::logstore::{ClientSession, LogIndex, RaftEntry};
use crate::replica::{ReplicaId, Term, VgroupId};
use bytes::Bytes;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TimeoutKind {
    Ping,
    Election,
    Heartbeat,
}

/// SyncTimeout is the synthetic message a timer task feeds into a node's event loop. `logic_clock`
/// is the epoch of the timer that fired. A timeout with an epoch older than the node's current
/// epoch for that timer is stale and gets dropped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SyncTimeout {
    pub kind: TimeoutKind,
    pub logic_clock: u64,
    pub timer_ms: u64,
}

/// Liveness check. The receiver echoes `data` back in a `PingReply`.
#[derive(Clone, Debug, PartialEq)]
pub struct Ping {
    pub data: Bytes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PingReply {
    pub data: Bytes,
}

/// A write forwarded from another member of the group. Only the leader admits it.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientRequest {
    pub msg_type: u32,
    pub session: Option<ClientSession>,
    pub is_weak: bool,
    pub data: Bytes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RequestVote {
    pub term: Term,
    pub last_log_index: LogIndex,
    pub last_log_term: Term,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RequestVoteReply {
    pub term: Term,
    pub vote_granted: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppendEntries {
    pub term: Term,
    pub prev_log_index: LogIndex,
    pub prev_log_term: Term,
    pub commit_index: LogIndex,
    pub entries: Vec<RaftEntry>,
}

/// On success, `match_index` is the last index known to match the leader's log. On failure, it
/// is a hint: the highest index the leader should try as `prev_log_index` next.
#[derive(Clone, Debug, PartialEq)]
pub struct AppendEntriesReply {
    pub term: Term,
    pub success: bool,
    pub match_index: LogIndex,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InstallSnapshot {
    pub term: Term,
    pub last_included_index: LogIndex,
    pub last_included_term: Term,
    pub data: Bytes,
    /// Last applied `seq_num` per client, as of `last_included_index`.
    pub sessions: Vec<ClientSession>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InstallSnapshotReply {
    pub term: Term,
    pub success: bool,
    pub last_included_index: LogIndex,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SyncMessage {
    Ping(Ping),
    PingReply(PingReply),
    Timeout(SyncTimeout),
    ClientRequest(ClientRequest),
    RequestVote(RequestVote),
    RequestVoteReply(RequestVoteReply),
    AppendEntries(AppendEntries),
    AppendEntriesReply(AppendEntriesReply),
    InstallSnapshot(InstallSnapshot),
    InstallSnapshotReply(InstallSnapshotReply),
}

impl SyncMessage {
    pub fn name(&self) -> &'static str {
        match self {
            SyncMessage::Ping(_) => "Ping",
            SyncMessage::PingReply(_) => "PingReply",
            SyncMessage::Timeout(_) => "Timeout",
            SyncMessage::ClientRequest(_) => "ClientRequest",
            SyncMessage::RequestVote(_) => "RequestVote",
            SyncMessage::RequestVoteReply(_) => "RequestVoteReply",
            SyncMessage::AppendEntries(_) => "AppendEntries",
            SyncMessage::AppendEntriesReply(_) => "AppendEntriesReply",
            SyncMessage::InstallSnapshot(_) => "InstallSnapshot",
            SyncMessage::InstallSnapshotReply(_) => "InstallSnapshotReply",
        }
    }
}

/// Envelope is the unit handed to the transport: a message plus the routing header.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub vgroup_id: VgroupId,
    pub src: ReplicaId,
    pub dest: ReplicaId,
    pub message: SyncMessage,
}
