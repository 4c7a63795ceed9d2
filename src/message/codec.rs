use crate::grpc;
use crate::grpc::proto_envelope::Payload;
use crate::logstore::{ClientSession, EntryKind, LogIndex, RaftEntry};
use crate::message::types::*;
use crate::replica::{NodeAddr, ReplicaId, SyncConfig, Term, VgroupId, Vote};
use bytes::Bytes;
use prost::Message;
use std::convert::TryFrom;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed envelope")]
    Decode(#[from] prost::DecodeError),
    #[error("Failed to encode envelope")]
    Encode(#[from] prost::EncodeError),
    #[error("Envelope is missing required field '{0}'")]
    MissingField(&'static str),
    #[error("Unknown timeout kind {0}")]
    UnknownTimeoutKind(i32),
    #[error("Port {0} is out of range")]
    InvalidPort(u32),
}

pub fn encode(envelope: &Envelope) -> Result<Bytes, CodecError> {
    let proto = grpc::ProtoEnvelope::from(envelope);
    let mut buf = Vec::with_capacity(proto.encoded_len());
    proto.encode(&mut buf)?;

    Ok(Bytes::from(buf))
}

pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
    let proto = grpc::ProtoEnvelope::decode(bytes)?;
    Envelope::try_from(proto)
}

// ------- Envelope -------

impl From<&Envelope> for grpc::ProtoEnvelope {
    fn from(envelope: &Envelope) -> Self {
        let payload = match &envelope.message {
            SyncMessage::Ping(m) => Payload::Ping(grpc::ProtoPing { data: m.data.to_vec() }),
            SyncMessage::PingReply(m) => Payload::PingReply(grpc::ProtoPingReply { data: m.data.to_vec() }),
            SyncMessage::Timeout(m) => Payload::Timeout(grpc::ProtoTimeout {
                kind: grpc::ProtoTimeoutKind::from(m.kind) as i32,
                logic_clock: m.logic_clock,
                timer_ms: m.timer_ms,
            }),
            SyncMessage::ClientRequest(m) => Payload::ClientRequest(grpc::ProtoClientRequest {
                msg_type: m.msg_type,
                session: m.session.as_ref().map(grpc::ProtoClientSession::from),
                is_weak: m.is_weak,
                data: m.data.to_vec(),
            }),
            SyncMessage::RequestVote(m) => Payload::RequestVote(grpc::ProtoRequestVote {
                term: m.term.as_u64(),
                last_log_index: m.last_log_index.as_u64(),
                last_log_term: m.last_log_term.as_u64(),
            }),
            SyncMessage::RequestVoteReply(m) => Payload::RequestVoteReply(grpc::ProtoRequestVoteReply {
                term: m.term.as_u64(),
                vote_granted: m.vote_granted,
            }),
            SyncMessage::AppendEntries(m) => Payload::AppendEntries(grpc::ProtoAppendEntries {
                term: m.term.as_u64(),
                prev_log_index: m.prev_log_index.as_u64(),
                prev_log_term: m.prev_log_term.as_u64(),
                commit_index: m.commit_index.as_u64(),
                entries: m.entries.iter().map(grpc::ProtoLogEntry::from).collect(),
            }),
            SyncMessage::AppendEntriesReply(m) => Payload::AppendEntriesReply(grpc::ProtoAppendEntriesReply {
                term: m.term.as_u64(),
                success: m.success,
                match_index: m.match_index.as_u64(),
            }),
            SyncMessage::InstallSnapshot(m) => Payload::InstallSnapshot(grpc::ProtoInstallSnapshot {
                term: m.term.as_u64(),
                last_included_index: m.last_included_index.as_u64(),
                last_included_term: m.last_included_term.as_u64(),
                data: m.data.to_vec(),
                sessions: m.sessions.iter().map(grpc::ProtoClientSession::from).collect(),
            }),
            SyncMessage::InstallSnapshotReply(m) => {
                Payload::InstallSnapshotReply(grpc::ProtoInstallSnapshotReply {
                    term: m.term.as_u64(),
                    success: m.success,
                    last_included_index: m.last_included_index.as_u64(),
                })
            }
        };

        grpc::ProtoEnvelope {
            vgroup_id: envelope.vgroup_id.as_i32(),
            src: Some(grpc::ProtoReplicaId::from(&envelope.src)),
            dest: Some(grpc::ProtoReplicaId::from(&envelope.dest)),
            payload: Some(payload),
        }
    }
}

impl TryFrom<grpc::ProtoEnvelope> for Envelope {
    type Error = CodecError;

    fn try_from(proto: grpc::ProtoEnvelope) -> Result<Self, Self::Error> {
        let src = ReplicaId::try_from(proto.src.ok_or(CodecError::MissingField("src"))?)?;
        let dest = ReplicaId::try_from(proto.dest.ok_or(CodecError::MissingField("dest"))?)?;

        let message = match proto.payload.ok_or(CodecError::MissingField("payload"))? {
            Payload::Ping(m) => SyncMessage::Ping(Ping { data: Bytes::from(m.data) }),
            Payload::PingReply(m) => SyncMessage::PingReply(PingReply { data: Bytes::from(m.data) }),
            Payload::Timeout(m) => SyncMessage::Timeout(SyncTimeout {
                kind: timeout_kind_from_i32(m.kind)?,
                logic_clock: m.logic_clock,
                timer_ms: m.timer_ms,
            }),
            Payload::ClientRequest(m) => SyncMessage::ClientRequest(ClientRequest {
                msg_type: m.msg_type,
                session: m.session.map(ClientSession::from),
                is_weak: m.is_weak,
                data: Bytes::from(m.data),
            }),
            Payload::RequestVote(m) => SyncMessage::RequestVote(RequestVote {
                term: Term::new(m.term),
                last_log_index: LogIndex::new(m.last_log_index),
                last_log_term: Term::new(m.last_log_term),
            }),
            Payload::RequestVoteReply(m) => SyncMessage::RequestVoteReply(RequestVoteReply {
                term: Term::new(m.term),
                vote_granted: m.vote_granted,
            }),
            Payload::AppendEntries(m) => SyncMessage::AppendEntries(AppendEntries {
                term: Term::new(m.term),
                prev_log_index: LogIndex::new(m.prev_log_index),
                prev_log_term: Term::new(m.prev_log_term),
                commit_index: LogIndex::new(m.commit_index),
                entries: m.entries.into_iter().map(RaftEntry::from).collect(),
            }),
            Payload::AppendEntriesReply(m) => SyncMessage::AppendEntriesReply(AppendEntriesReply {
                term: Term::new(m.term),
                success: m.success,
                match_index: LogIndex::new(m.match_index),
            }),
            Payload::InstallSnapshot(m) => SyncMessage::InstallSnapshot(InstallSnapshot {
                term: Term::new(m.term),
                last_included_index: LogIndex::new(m.last_included_index),
                last_included_term: Term::new(m.last_included_term),
                data: Bytes::from(m.data),
                sessions: m.sessions.into_iter().map(ClientSession::from).collect(),
            }),
            Payload::InstallSnapshotReply(m) => SyncMessage::InstallSnapshotReply(InstallSnapshotReply {
                term: Term::new(m.term),
                success: m.success,
                last_included_index: LogIndex::new(m.last_included_index),
            }),
        };

        Ok(Envelope {
            vgroup_id: VgroupId::new(proto.vgroup_id),
            src,
            dest,
            message,
        })
    }
}

// ------- Leaf types -------

impl From<TimeoutKind> for grpc::ProtoTimeoutKind {
    fn from(kind: TimeoutKind) -> Self {
        match kind {
            TimeoutKind::Ping => grpc::ProtoTimeoutKind::TimeoutKindPing,
            TimeoutKind::Election => grpc::ProtoTimeoutKind::TimeoutKindElection,
            TimeoutKind::Heartbeat => grpc::ProtoTimeoutKind::TimeoutKindHeartbeat,
        }
    }
}

fn timeout_kind_from_i32(kind: i32) -> Result<TimeoutKind, CodecError> {
    match grpc::ProtoTimeoutKind::from_i32(kind) {
        Some(grpc::ProtoTimeoutKind::TimeoutKindPing) => Ok(TimeoutKind::Ping),
        Some(grpc::ProtoTimeoutKind::TimeoutKindElection) => Ok(TimeoutKind::Election),
        Some(grpc::ProtoTimeoutKind::TimeoutKindHeartbeat) => Ok(TimeoutKind::Heartbeat),
        Some(grpc::ProtoTimeoutKind::TimeoutKindUnspecified) | None => Err(CodecError::UnknownTimeoutKind(kind)),
    }
}

impl From<&ClientSession> for grpc::ProtoClientSession {
    fn from(session: &ClientSession) -> Self {
        grpc::ProtoClientSession {
            client_id: session.client_id,
            seq_num: session.seq_num,
        }
    }
}

impl From<grpc::ProtoClientSession> for ClientSession {
    fn from(proto: grpc::ProtoClientSession) -> Self {
        ClientSession {
            client_id: proto.client_id,
            seq_num: proto.seq_num,
        }
    }
}

impl From<&RaftEntry> for grpc::ProtoLogEntry {
    fn from(entry: &RaftEntry) -> Self {
        grpc::ProtoLogEntry {
            index: entry.index.as_u64(),
            term: entry.term.as_u64(),
            is_noop: entry.is_noop(),
            msg_type: entry.msg_type,
            is_weak: entry.is_weak,
            session: entry.session.as_ref().map(grpc::ProtoClientSession::from),
            data: entry.data.to_vec(),
        }
    }
}

impl From<grpc::ProtoLogEntry> for RaftEntry {
    fn from(proto: grpc::ProtoLogEntry) -> Self {
        RaftEntry {
            index: LogIndex::new(proto.index),
            term: Term::new(proto.term),
            kind: if proto.is_noop { EntryKind::NoOp } else { EntryKind::Normal },
            msg_type: proto.msg_type,
            is_weak: proto.is_weak,
            session: proto.session.map(ClientSession::from),
            data: Bytes::from(proto.data),
        }
    }
}

impl From<&NodeAddr> for grpc::ProtoNodeAddr {
    fn from(addr: &NodeAddr) -> Self {
        grpc::ProtoNodeAddr {
            host: addr.host.clone(),
            port: u32::from(addr.port),
        }
    }
}

impl TryFrom<grpc::ProtoNodeAddr> for NodeAddr {
    type Error = CodecError;

    fn try_from(proto: grpc::ProtoNodeAddr) -> Result<Self, Self::Error> {
        let port = u16::try_from(proto.port).map_err(|_| CodecError::InvalidPort(proto.port))?;
        Ok(NodeAddr::new(proto.host, port))
    }
}

impl From<&ReplicaId> for grpc::ProtoReplicaId {
    fn from(id: &ReplicaId) -> Self {
        grpc::ProtoReplicaId {
            addr: Some(grpc::ProtoNodeAddr::from(&id.addr)),
            vgroup_id: id.vgroup_id.as_i32(),
        }
    }
}

impl TryFrom<grpc::ProtoReplicaId> for ReplicaId {
    type Error = CodecError;

    fn try_from(proto: grpc::ProtoReplicaId) -> Result<Self, Self::Error> {
        let addr = NodeAddr::try_from(proto.addr.ok_or(CodecError::MissingField("addr"))?)?;
        Ok(ReplicaId::new(addr, VgroupId::new(proto.vgroup_id)))
    }
}

// ------- Durable local state -------

impl From<&SyncConfig> for grpc::ProtoSyncConfig {
    fn from(config: &SyncConfig) -> Self {
        grpc::ProtoSyncConfig {
            replicas: config.replicas.iter().map(grpc::ProtoNodeAddr::from).collect(),
            my_index: config.my_index as u32,
        }
    }
}

impl TryFrom<grpc::ProtoSyncConfig> for SyncConfig {
    type Error = CodecError;

    fn try_from(proto: grpc::ProtoSyncConfig) -> Result<Self, Self::Error> {
        let replicas = proto
            .replicas
            .into_iter()
            .map(NodeAddr::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SyncConfig {
            replicas,
            my_index: proto.my_index as usize,
        })
    }
}

impl From<&Vote> for grpc::ProtoVote {
    fn from(vote: &Vote) -> Self {
        grpc::ProtoVote {
            term: vote.term.as_u64(),
            candidate: Some(grpc::ProtoReplicaId::from(&vote.candidate)),
        }
    }
}

impl TryFrom<grpc::ProtoVote> for Vote {
    type Error = CodecError;

    fn try_from(proto: grpc::ProtoVote) -> Result<Self, Self::Error> {
        let candidate = proto.candidate.ok_or(CodecError::MissingField("candidate"))?;
        Ok(Vote {
            term: Term::new(proto.term),
            candidate: ReplicaId::try_from(candidate)?,
        })
    }
}
