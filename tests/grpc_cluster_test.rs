mod common;

use common::{create_root_logger_for_stdout, eventually, localhost, wait_for_leader, KvMachine};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::Duration;
use vgroup_sync::{
    GrpcTransport, InMemoryLogStore, ProposeInput, ProposeOutcome, RpcServer, SyncConfig, SyncNodeConfig,
    SyncOptions, SyncRegistry, VgroupId, VolatileLocalState,
};

#[tokio::test]
async fn three_dnodes_over_grpc() {
    let logger = create_root_logger_for_stdout("three_dnodes_over_grpc");
    let addrs: Vec<_> = (0..3).map(|i| localhost(18101 + i)).collect();
    let vgroups = [VgroupId::new(1), VgroupId::new(2)];

    let mut registries = Vec::new();
    let mut shutdown_handles = Vec::new();
    let mut machines = Vec::new();
    for (i, addr) in addrs.iter().enumerate() {
        let registry = Arc::new(SyncRegistry::new());
        let transport = Arc::new(GrpcTransport::new(logger.clone(), Duration::from_millis(500)));
        let mut node_machines = Vec::new();

        // Two vgroups share each dnode, its server and its channels.
        for vgroup_id in vgroups.iter() {
            let machine = KvMachine::new();
            let rid = registry
                .open(SyncNodeConfig {
                    logger: logger.clone(),
                    vgroup_id: *vgroup_id,
                    sync_config: SyncConfig {
                        replicas: addrs.clone(),
                        my_index: i,
                    },
                    log_store: InMemoryLogStore::new(),
                    local_state: VolatileLocalState::new(),
                    state_machine: machine.clone(),
                    transport: transport.clone(),
                    options: SyncOptions {
                        heartbeat_interval: Some(Duration::from_millis(100)),
                        election_timeout_min: Some(Duration::from_millis(500)),
                        election_timeout_max: Some(Duration::from_millis(1000)),
                        ..SyncOptions::default()
                    },
                })
                .unwrap();
            registry.start(rid).unwrap();
            node_machines.push(machine);
        }

        let (shutdown_handle, shutdown_signal) = vgroup_sync::shutdown_signal();
        let socket_addr: SocketAddr = addr.to_string().parse().unwrap();
        tokio::spawn(RpcServer::new(logger.clone(), registry.clone()).run(socket_addr, shutdown_signal));

        registries.push(registry);
        shutdown_handles.push(shutdown_handle);
        machines.push(node_machines);
    }

    for (g, vgroup_id) in vgroups.iter().enumerate() {
        let nodes: Vec<_> = registries.iter().map(|r| r.route(*vgroup_id).unwrap()).collect();
        let leader = wait_for_leader(&nodes, Duration::from_secs(20)).await;

        let data = format!("hello vgroup {}", vgroup_id);
        let output = nodes[leader].propose(ProposeInput::new(data.clone())).await.unwrap();
        assert!(matches!(output.outcome, ProposeOutcome::Committed(_)));

        for node_machines in machines.iter() {
            let machine = node_machines[g].clone();
            let expected = vec![data.clone()];
            eventually(Duration::from_secs(10), "entry applied on every dnode", || {
                machine.applied() == expected
            })
            .await;
        }
    }

    for handle in shutdown_handles {
        handle.shutdown();
    }
}
