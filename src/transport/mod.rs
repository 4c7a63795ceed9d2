mod grpc;

pub use grpc::GrpcTransport;

use crate::replica::ReplicaId;
use bytes::Bytes;

/// Transport carries encoded envelopes to peers. Delivery is best effort: a lost envelope is
/// recovered by the protocol's own retries, so `send` never reports failure and must not block.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, destination: &ReplicaId, envelope: Bytes);
}
