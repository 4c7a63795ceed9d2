use crate::logstore::LogIndex;
use crate::replica::Term;
use bytes::{Buf, BufMut, Bytes};
use std::convert::TryFrom;

/// ClientSession tags a proposal for linearizable admission. `seq_num` must increase
/// monotonically per `client_id`; a repeated pair is applied at most once.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct ClientSession {
    pub client_id: u64,
    pub seq_num: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// Application payload, surfaced to the state machine.
    Normal,
    /// Appended by a newly elected leader. Never surfaced to the state machine.
    NoOp,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RaftEntry {
    pub index: LogIndex,
    pub term: Term,
    pub kind: EntryKind,
    pub msg_type: u32,
    pub is_weak: bool,
    pub session: Option<ClientSession>,
    pub data: Bytes,
}

impl RaftEntry {
    pub(crate) fn noop(index: LogIndex, term: Term) -> Self {
        RaftEntry {
            index,
            term,
            kind: EntryKind::NoOp,
            msg_type: 0,
            is_weak: false,
            session: None,
            data: Bytes::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.kind == EntryKind::NoOp
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EntryDecodeError {
    #[error("Entry is {0} bytes, shorter than the fixed header")]
    Truncated(usize),
    #[error("Unknown entry format version {0}")]
    UnknownVersion(u8),
}

/// Byte representation:
///
/// ```text
/// | 0 | 1 | 2..10 | 10..18 | 18..22 | 22..30  | 30..38 | 38..
/// +---+---+-------+--------+--------+---------+--------+-----...
/// |Vrs|Flg| Term  | Index  |MsgType |ClientId | SeqNum | Data ...
/// +---+---+-------+--------+--------+---------+--------+-----...
/// ```
///
/// * `Vrs` - version of the serialized payload
/// * `Flg` - bit flags: weak, no-op, has-session
/// * `ClientId`/`SeqNum` - zero unless the has-session flag is set
/// * Integers are little endian. `Data` runs to the end of the buffer.
const RAFT_ENTRY_FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 1 + 1 + 8 + 8 + 4 + 8 + 8;

const FLAG_WEAK: u8 = 0b001;
const FLAG_NOOP: u8 = 0b010;
const FLAG_SESSION: u8 = 0b100;

impl From<&RaftEntry> for Vec<u8> {
    fn from(entry: &RaftEntry) -> Self {
        let mut flags = 0;
        if entry.is_weak {
            flags |= FLAG_WEAK;
        }
        if entry.is_noop() {
            flags |= FLAG_NOOP;
        }
        if entry.session.is_some() {
            flags |= FLAG_SESSION;
        }
        let session = entry.session.unwrap_or(ClientSession {
            client_id: 0,
            seq_num: 0,
        });

        let mut bytes = Vec::with_capacity(HEADER_LEN + entry.data.len());
        bytes.put_u8(RAFT_ENTRY_FORMAT_VERSION);
        bytes.put_u8(flags);
        bytes.put_u64_le(entry.term.as_u64());
        bytes.put_u64_le(entry.index.as_u64());
        bytes.put_u32_le(entry.msg_type);
        bytes.put_u64_le(session.client_id);
        bytes.put_u64_le(session.seq_num);
        bytes.put_slice(&entry.data);

        bytes
    }
}

impl TryFrom<&[u8]> for RaftEntry {
    type Error = EntryDecodeError;

    fn try_from(mut bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() < HEADER_LEN {
            return Err(EntryDecodeError::Truncated(bytes.len()));
        }

        let version = bytes.get_u8();
        if version != RAFT_ENTRY_FORMAT_VERSION {
            return Err(EntryDecodeError::UnknownVersion(version));
        }
        let flags = bytes.get_u8();
        let term = Term::new(bytes.get_u64_le());
        let index = LogIndex::new(bytes.get_u64_le());
        let msg_type = bytes.get_u32_le();
        let client_id = bytes.get_u64_le();
        let seq_num = bytes.get_u64_le();

        let session = if flags & FLAG_SESSION != 0 {
            Some(ClientSession { client_id, seq_num })
        } else {
            None
        };
        let kind = if flags & FLAG_NOOP != 0 {
            EntryKind::NoOp
        } else {
            EntryKind::Normal
        };

        Ok(RaftEntry {
            index,
            term,
            kind,
            msg_type,
            is_weak: flags & FLAG_WEAK != 0,
            session,
            data: Bytes::copy_from_slice(bytes),
        })
    }
}
