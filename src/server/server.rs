use crate::api::SyncRegistry;
use crate::grpc::grpc_sync_server::{GrpcSync, GrpcSyncServer};
use crate::grpc::{ProtoDeliverAck, ProtoDeliverReq};
use crate::replica::VgroupId;
use crate::server::RpcServerShutdownSignal;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

/// RpcServer is the type that implements the sync gRPC interface. One server serves every vgroup
/// in the registry.
pub struct RpcServer {
    logger: slog::Logger,
    registry: Arc<SyncRegistry>,
}

impl RpcServer {
    pub fn new(logger: slog::Logger, registry: Arc<SyncRegistry>) -> Self {
        RpcServer { logger, registry }
    }

    pub async fn run(self, socket_addr: SocketAddr, shutdown_signal: RpcServerShutdownSignal) {
        let logger = self.logger.clone();
        slog::info!(logger, "Listening on '{:?}'", socket_addr);

        let result = Server::builder()
            .add_service(GrpcSyncServer::new(self))
            .serve_with_shutdown(socket_addr, shutdown_signal)
            .await;

        slog::info!(logger, "Server run() has exited: {:?}", result);
    }

    fn handle_deliver(&self, rpc_request: ProtoDeliverReq) -> ProtoDeliverAck {
        let vgroup_id = VgroupId::new(rpc_request.vgroup_id);
        let node = match self.registry.route(vgroup_id) {
            Some(node) => node,
            None => {
                slog::debug!(self.logger, "No node for vgroup {}", vgroup_id);
                return ProtoDeliverAck { accepted: false };
            }
        };

        match node.try_enqueue_msg(Bytes::from(rpc_request.envelope)) {
            Ok(()) => ProtoDeliverAck { accepted: true },
            Err(e) => {
                slog::debug!(self.logger, "Dropping envelope for vgroup {}: {}", vgroup_id, e);
                ProtoDeliverAck { accepted: false }
            }
        }
    }
}

#[async_trait::async_trait]
impl GrpcSync for RpcServer {
    async fn deliver(&self, rpc_request_wrapped: Request<ProtoDeliverReq>) -> Result<Response<ProtoDeliverAck>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        let rpc_reply = self.handle_deliver(rpc_request);
        slog::trace!(self.logger, "ServerWire - {:?}", rpc_reply);

        Ok(Response::new(rpc_reply))
    }
}
