use crate::grpc::grpc_sync_client::GrpcSyncClient;
use crate::grpc::ProtoDeliverReq;
use crate::replica::{NodeAddr, ReplicaId};
use crate::transport::Transport;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::Duration;
use tonic::codegen::http::uri;
use tonic::transport::{Channel, Endpoint};

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConnectError {
    #[error("Invalid peer uri: {0}")]
    InvalidUri(#[from] uri::InvalidUri),
    #[error("Can't create channel: {0}")]
    ConnectFailure(#[from] tonic::transport::Error),
}

/// GrpcTransport delivers envelopes through the `Deliver` RPC. One channel is cached per dnode
/// and shared by every vgroup hosted there.
#[derive(Clone)]
pub struct GrpcTransport {
    logger: slog::Logger,
    send_timeout: Duration,
    clients: Arc<Mutex<HashMap<NodeAddr, GrpcSyncClient<Channel>>>>,
}

impl GrpcTransport {
    pub fn new(logger: slog::Logger, send_timeout: Duration) -> Self {
        GrpcTransport {
            logger,
            send_timeout,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn client(&self, addr: &NodeAddr) -> Result<GrpcSyncClient<Channel>, ConnectError> {
        let mut clients = self.clients.lock().expect("GrpcTransport clients mutex poisoned");
        if let Some(client) = clients.get(addr) {
            return Ok(client.clone());
        }

        // Lazy so that a dead peer doesn't hold up the caller. The connection is made on first use.
        let endpoint = Endpoint::from_shared(format!("http://{}", addr))?.timeout(self.send_timeout);
        let client = GrpcSyncClient::new(endpoint.connect_lazy()?);
        clients.insert(addr.clone(), client.clone());

        Ok(client)
    }
}

impl Transport for GrpcTransport {
    fn send(&self, destination: &ReplicaId, envelope: Bytes) {
        let mut client = match self.client(&destination.addr) {
            Ok(client) => client,
            Err(e) => {
                slog::warn!(self.logger, "Can't build channel to {}: {}", destination.addr, e);
                return;
            }
        };

        let logger = self.logger.new(slog::o!("peer" => destination.to_string()));
        let clients = self.clients.clone();
        let addr = destination.addr.clone();
        let send_timeout = self.send_timeout;
        let request = ProtoDeliverReq {
            vgroup_id: destination.vgroup_id.as_i32(),
            envelope: envelope.to_vec(),
        };

        tokio::spawn(async move {
            match tokio::time::timeout(send_timeout, client.deliver(request)).await {
                Ok(Ok(reply)) => {
                    if !reply.into_inner().accepted {
                        slog::debug!(logger, "Envelope not accepted by peer");
                    }
                }
                Ok(Err(status)) => {
                    slog::debug!(logger, "Deliver failed: {:?}", status);
                    clients
                        .lock()
                        .expect("GrpcTransport clients mutex poisoned")
                        .remove(&addr);
                }
                Err(_) => {
                    slog::debug!(logger, "Deliver timed out after {:?}", send_timeout);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> GrpcTransport {
        GrpcTransport::new(slog::Logger::root(slog::Discard, slog::o!()), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn channels_are_cached_per_dnode() {
        let transport = transport();
        let addr = NodeAddr::new("127.0.0.1", 18999);

        assert!(transport.client(&addr).is_ok());
        assert!(transport.client(&addr).is_ok());
        assert_eq!(transport.clients.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unusable_address_is_dropped_not_cached() {
        let transport = transport();
        let addr = NodeAddr::new("bad host", 1);

        assert!(matches!(transport.client(&addr), Err(ConnectError::InvalidUri(_))));
        // Sending there is a silent drop.
        transport.send(&ReplicaId::new(addr, crate::replica::VgroupId::new(1)), Bytes::from("x"));
        assert!(transport.clients.lock().unwrap().is_empty());
    }
}
