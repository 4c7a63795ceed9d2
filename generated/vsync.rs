#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoDeliverReq {
    #[prost(int32, tag = "1")]
    pub vgroup_id: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub envelope: ::prost::alloc::vec::Vec<u8>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoDeliverAck {
    #[prost(bool, tag = "1")]
    pub accepted: bool,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoNodeAddr {
    #[prost(string, tag = "1")]
    pub host: ::prost::alloc::string::String,
    #[prost(uint32, tag = "2")]
    pub port: u32,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoReplicaId {
    #[prost(message, optional, tag = "1")]
    pub addr: ::core::option::Option<ProtoNodeAddr>,
    #[prost(int32, tag = "2")]
    pub vgroup_id: i32,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoEnvelope {
    #[prost(int32, tag = "1")]
    pub vgroup_id: i32,
    #[prost(message, optional, tag = "2")]
    pub src: ::core::option::Option<ProtoReplicaId>,
    #[prost(message, optional, tag = "3")]
    pub dest: ::core::option::Option<ProtoReplicaId>,
    #[prost(
        oneof = "proto_envelope::Payload",
        tags = "10, 11, 12, 13, 14, 15, 16, 17, 18, 19"
    )]
    pub payload: ::core::option::Option<proto_envelope::Payload>,
}
/// Nested message and enum types in `ProtoEnvelope`.
pub mod proto_envelope {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "10")]
        Ping(super::ProtoPing),
        #[prost(message, tag = "11")]
        PingReply(super::ProtoPingReply),
        #[prost(message, tag = "12")]
        Timeout(super::ProtoTimeout),
        #[prost(message, tag = "13")]
        ClientRequest(super::ProtoClientRequest),
        #[prost(message, tag = "14")]
        RequestVote(super::ProtoRequestVote),
        #[prost(message, tag = "15")]
        RequestVoteReply(super::ProtoRequestVoteReply),
        #[prost(message, tag = "16")]
        AppendEntries(super::ProtoAppendEntries),
        #[prost(message, tag = "17")]
        AppendEntriesReply(super::ProtoAppendEntriesReply),
        #[prost(message, tag = "18")]
        InstallSnapshot(super::ProtoInstallSnapshot),
        #[prost(message, tag = "19")]
        InstallSnapshotReply(super::ProtoInstallSnapshotReply),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoPing {
    #[prost(bytes = "vec", tag = "1")]
    pub data: ::prost::alloc::vec::Vec<u8>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoPingReply {
    #[prost(bytes = "vec", tag = "1")]
    pub data: ::prost::alloc::vec::Vec<u8>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoTimeout {
    #[prost(enumeration = "ProtoTimeoutKind", tag = "1")]
    pub kind: i32,
    #[prost(uint64, tag = "2")]
    pub logic_clock: u64,
    #[prost(uint64, tag = "3")]
    pub timer_ms: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoClientSession {
    #[prost(uint64, tag = "1")]
    pub client_id: u64,
    #[prost(uint64, tag = "2")]
    pub seq_num: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoClientRequest {
    #[prost(uint32, tag = "1")]
    pub msg_type: u32,
    #[prost(message, optional, tag = "2")]
    pub session: ::core::option::Option<ProtoClientSession>,
    #[prost(bool, tag = "3")]
    pub is_weak: bool,
    #[prost(bytes = "vec", tag = "4")]
    pub data: ::prost::alloc::vec::Vec<u8>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoRequestVote {
    #[prost(uint64, tag = "1")]
    pub term: u64,
    #[prost(uint64, tag = "2")]
    pub last_log_index: u64,
    #[prost(uint64, tag = "3")]
    pub last_log_term: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoRequestVoteReply {
    #[prost(uint64, tag = "1")]
    pub term: u64,
    #[prost(bool, tag = "2")]
    pub vote_granted: bool,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoLogEntry {
    #[prost(uint64, tag = "1")]
    pub index: u64,
    #[prost(uint64, tag = "2")]
    pub term: u64,
    #[prost(bool, tag = "3")]
    pub is_noop: bool,
    #[prost(uint32, tag = "4")]
    pub msg_type: u32,
    #[prost(bool, tag = "5")]
    pub is_weak: bool,
    #[prost(message, optional, tag = "6")]
    pub session: ::core::option::Option<ProtoClientSession>,
    #[prost(bytes = "vec", tag = "7")]
    pub data: ::prost::alloc::vec::Vec<u8>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoAppendEntries {
    #[prost(uint64, tag = "1")]
    pub term: u64,
    #[prost(uint64, tag = "2")]
    pub prev_log_index: u64,
    #[prost(uint64, tag = "3")]
    pub prev_log_term: u64,
    #[prost(uint64, tag = "4")]
    pub commit_index: u64,
    #[prost(message, repeated, tag = "5")]
    pub entries: ::prost::alloc::vec::Vec<ProtoLogEntry>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoAppendEntriesReply {
    #[prost(uint64, tag = "1")]
    pub term: u64,
    #[prost(bool, tag = "2")]
    pub success: bool,
    #[prost(uint64, tag = "3")]
    pub match_index: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoInstallSnapshot {
    #[prost(uint64, tag = "1")]
    pub term: u64,
    #[prost(uint64, tag = "2")]
    pub last_included_index: u64,
    #[prost(uint64, tag = "3")]
    pub last_included_term: u64,
    #[prost(bytes = "vec", tag = "4")]
    pub data: ::prost::alloc::vec::Vec<u8>,
    #[prost(message, repeated, tag = "5")]
    pub sessions: ::prost::alloc::vec::Vec<ProtoClientSession>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoInstallSnapshotReply {
    #[prost(uint64, tag = "1")]
    pub term: u64,
    #[prost(bool, tag = "2")]
    pub success: bool,
    #[prost(uint64, tag = "3")]
    pub last_included_index: u64,
}
/// Durable node metadata written by FileLocalState.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoVote {
    #[prost(uint64, tag = "1")]
    pub term: u64,
    #[prost(message, optional, tag = "2")]
    pub candidate: ::core::option::Option<ProtoReplicaId>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoSyncConfig {
    #[prost(message, repeated, tag = "1")]
    pub replicas: ::prost::alloc::vec::Vec<ProtoNodeAddr>,
    #[prost(uint32, tag = "2")]
    pub my_index: u32,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoLocalState {
    #[prost(uint64, tag = "1")]
    pub current_term: u64,
    #[prost(message, optional, tag = "2")]
    pub vote: ::core::option::Option<ProtoVote>,
    #[prost(message, optional, tag = "3")]
    pub config: ::core::option::Option<ProtoSyncConfig>,
}
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ProtoTimeoutKind {
    TimeoutKindUnspecified = 0,
    TimeoutKindPing = 1,
    TimeoutKindElection = 2,
    TimeoutKindHeartbeat = 3,
}
#[doc = r" Generated client implementations."]
pub mod grpc_sync_client {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    #[doc = " Peer-to-peer delivery of encoded envelopes. Replies travel as their own envelopes."]
    pub struct GrpcSyncClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl GrpcSyncClient<tonic::transport::Channel> {
        #[doc = r" Attempt to create a new client by connecting to a given endpoint."]
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: std::convert::TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> GrpcSyncClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::ResponseBody: Body + HttpBody + Send + 'static,
        T::Error: Into<StdError>,
        <T::ResponseBody as HttpBody>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = tonic::client::Grpc::with_interceptor(inner, interceptor);
            Self { inner }
        }
        pub async fn deliver(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoDeliverReq>,
        ) -> Result<tonic::Response<super::ProtoDeliverAck>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/vsync.GrpcSync/Deliver");
            self.inner.unary(request.into_request(), path, codec).await
        }
    }
    impl<T: Clone> Clone for GrpcSyncClient<T> {
        fn clone(&self) -> Self {
            Self {
                inner: self.inner.clone(),
            }
        }
    }
    impl<T> std::fmt::Debug for GrpcSyncClient<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "GrpcSyncClient {{ ... }}")
        }
    }
}
#[doc = r" Generated server implementations."]
pub mod grpc_sync_server {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    #[doc = "Generated trait containing gRPC methods that should be implemented for use with GrpcSyncServer."]
    #[async_trait]
    pub trait GrpcSync: Send + Sync + 'static {
        async fn deliver(
            &self,
            request: tonic::Request<super::ProtoDeliverReq>,
        ) -> Result<tonic::Response<super::ProtoDeliverAck>, tonic::Status>;
    }
    #[doc = " Peer-to-peer delivery of encoded envelopes. Replies travel as their own envelopes."]
    #[derive(Debug)]
    pub struct GrpcSyncServer<T: GrpcSync> {
        inner: _Inner<T>,
    }
    struct _Inner<T>(Arc<T>, Option<tonic::Interceptor>);
    impl<T: GrpcSync> GrpcSyncServer<T> {
        pub fn new(inner: T) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, None);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, Some(interceptor.into()));
            Self { inner }
        }
    }
    impl<T, B> Service<http::Request<B>> for GrpcSyncServer<T>
    where
        T: GrpcSync,
        B: HttpBody + Send + Sync + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = Never;
        type Future = BoxFuture<Self::Response, Self::Error>;
        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = self.inner.clone();
            match req.uri().path() {
                "/vsync.GrpcSync/Deliver" => {
                    #[allow(non_camel_case_types)]
                    struct DeliverSvc<T: GrpcSync>(pub Arc<T>);
                    impl<T: GrpcSync> tonic::server::UnaryService<super::ProtoDeliverReq> for DeliverSvc<T> {
                        type Response = super::ProtoDeliverAck;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoDeliverReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).deliver(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = DeliverSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                _ => Box::pin(async move {
                    Ok(http::Response::builder()
                        .status(200)
                        .header("grpc-status", "12")
                        .header("content-type", "application/grpc")
                        .body(tonic::body::BoxBody::empty())
                        .unwrap())
                }),
            }
        }
    }
    impl<T: GrpcSync> Clone for GrpcSyncServer<T> {
        fn clone(&self) -> Self {
            let inner = self.inner.clone();
            Self { inner }
        }
    }
    impl<T: GrpcSync> Clone for _Inner<T> {
        fn clone(&self) -> Self {
            Self(self.0.clone(), self.1.clone())
        }
    }
    impl<T: std::fmt::Debug> std::fmt::Debug for _Inner<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }
    impl<T: GrpcSync> tonic::transport::NamedService for GrpcSyncServer<T> {
        const NAME: &'static str = "vsync.GrpcSync";
    }
}
