#![allow(clippy::uninlined_format_args)]
#![deny(unused_qualifications)]

use std::collections::BTreeMap;
use std::io;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::Logger;
use actix_web::web::Data;
use actix_web::HttpServer;
use openraft::error::InitializeError;
use openraft::error::RaftError;
use openraft::BasicNode;

use crate::app::App;
use crate::client::PrintFarmClient;
use crate::command::CommandLogEntry;
use crate::config::NodeConfig;
use crate::engine::RaftEngine;
use crate::network::management;
use crate::network::raft;
use crate::network::Network;
use crate::store::ApplyOutcome;
use crate::store::StateMachineStore;

pub mod app;
pub mod client;
pub mod command;
pub mod config;
pub mod engine;
pub mod gateway;
pub mod membership;
pub mod model;
pub mod network;
pub mod store;

pub type NodeId = u64;

openraft::declare_raft_types!(
    /// Type configuration of the print-farm cluster.
    pub TypeConfig:
        D = CommandLogEntry,
        R = ApplyOutcome,
        NodeId = NodeId,
        Node = BasicNode,
);

pub type Raft = openraft::Raft<TypeConfig>;

pub mod typ {
    use openraft::BasicNode;

    use crate::NodeId;

    pub type RaftError<E = openraft::error::Infallible> = openraft::error::RaftError<NodeId, E>;
    pub type RPCError<E = openraft::error::Infallible> = openraft::error::RPCError<NodeId, BasicNode, RaftError<E>>;

    pub type ClientWriteError = openraft::error::ClientWriteError<NodeId, BasicNode>;
    pub type InitializeError = openraft::error::InitializeError<NodeId, BasicNode>;
    pub type InstallSnapshotError = openraft::error::InstallSnapshotError;
}

const JOIN_ATTEMPTS: usize = 20;
const JOIN_RETRY_INTERVAL: Duration = Duration::from_millis(500);

fn io_error(e: impl ToString) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

/// Open the storage under `config.data_dir` and start the Raft instance of a node, bootstrapping
/// it if asked to.
///
/// No HTTP server is started: peers cannot reach the node until [`start_raft_node`] serves it.
pub async fn open_raft(config: &NodeConfig) -> io::Result<(Raft, Arc<StateMachineStore>)> {
    let raft_config = Arc::new(config.raft_config().map_err(io_error)?);

    let (log_store, state_machine_store) = store::open(&config.data_dir).await?;

    let raft = openraft::Raft::new(
        config.id,
        raft_config,
        Network::default(),
        log_store,
        state_machine_store.clone(),
    )
    .await
    .map_err(io_error)?;

    if config.bootstrap {
        bootstrap(&raft, config.id, &config.http_addr).await?;
    }

    Ok((raft, state_machine_store))
}

/// Run one print-farm node until its HTTP server stops.
pub async fn start_raft_node(config: NodeConfig) -> io::Result<()> {
    let (raft, state_machine_store) = open_raft(&config).await?;

    let engine = Arc::new(RaftEngine::new(config.id, raft.clone(), config.join_timeout()));
    let app_data = Data::new(App::new(
        config.http_addr.clone(),
        engine,
        state_machine_store,
        config.write_timeout(),
    ));
    let raft_data = Data::new(raft);

    let server = HttpServer::new(move || {
        actix_web::App::new()
            .wrap(Logger::default())
            .wrap(Logger::new("%a %{User-Agent}i"))
            .app_data(app_data.clone())
            .app_data(raft_data.clone())
            .app_data(network::json_config())
            // raft internal RPC
            .service(raft::append)
            .service(raft::snapshot)
            .service(raft::vote)
            // admin API
            .service(management::init)
            .service(management::metrics)
            // application API
            .configure(network::configure)
    });

    let server = server.bind(&config.http_addr)?.run();

    if let Some(target) = config.join.clone() {
        tokio::spawn(join_cluster(target, config.id, config.http_addr.clone()));
    }

    server.await
}

/// Initialize a single-voter cluster made of this node.
///
/// A node restarted with `--bootstrap` finds its vote and log on disk and is left as is.
async fn bootstrap(raft: &Raft, id: NodeId, addr: &str) -> io::Result<()> {
    let nodes = BTreeMap::from([(id, BasicNode::new(addr))]);

    match raft.initialize(nodes).await {
        Ok(()) => {
            tracing::info!(id, addr, "bootstrapped single-node cluster");
            Ok(())
        }
        Err(RaftError::APIError(InitializeError::NotAllowed(e))) => {
            tracing::info!(id, "skip bootstrap: {}", e);
            Ok(())
        }
        Err(e) => Err(io_error(e)),
    }
}

/// Ask an existing member to add this node as a voter.
///
/// The request is redirected to the leader once it is known, and retried while the cluster is
/// still electing one.
async fn join_cluster(target: String, id: NodeId, addr: String) {
    let mut client = PrintFarmClient::new(&target);

    for attempt in 1..=JOIN_ATTEMPTS {
        match client.join(id, &addr).await {
            Ok(()) => {
                tracing::info!(id, leader = client.addr(), "joined cluster");
                return;
            }
            Err(e) => {
                tracing::warn!(id, attempt, peer = client.addr(), "join failed: {}", e);
            }
        }

        if let Ok(Some(leader)) = client.leader().await {
            if leader != client.addr() {
                client = PrintFarmClient::new(&leader);
            }
        }

        tokio::time::sleep(JOIN_RETRY_INTERVAL).await;
    }

    tracing::error!(id, peer = %target, "giving up joining the cluster after {} attempts", JOIN_ATTEMPTS);
}
