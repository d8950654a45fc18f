//! The boundary between the print-farm state machine and the consensus engine.
//!
//! Everything above this module (write gateway, membership, HTTP handlers) talks to consensus
//! only through [`ConsensusEngine`]. Election, replication and log storage stay behind it.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::command::CommandLogEntry;
use crate::store::ApplyOutcome;
use crate::NodeId;

mod local;
mod raft;

pub use local::LocalEngine;
pub use raft::RaftEngine;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suffrage {
    Voter,
    Learner,
}

/// One server in the current cluster configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub node_id: NodeId,
    pub address: String,
    pub suffrage: Suffrage,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("node is not the leader; current leader: {}", leader_addr.as_deref().unwrap_or("unknown"))]
    NotLeader {
        leader_id: Option<NodeId>,
        leader_addr: Option<String>,
    },

    #[error("no commit within {0:?}")]
    Timeout(Duration),

    #[error("consensus failure: {0}")]
    Raft(String),
}

#[async_trait]
pub trait ConsensusEngine: Send + Sync + 'static {
    fn node_id(&self) -> NodeId;

    /// Whether this node currently holds leadership.
    fn is_leader(&self) -> bool;

    /// Address of the current leader, if one is known.
    fn leader_address(&self) -> Option<String>;

    /// Replicate `entry` and wait until it is committed and applied, or `timeout` elapses.
    ///
    /// On [`EngineError::Timeout`] the entry may still be committed later.
    async fn submit(&self, entry: CommandLogEntry, timeout: Duration) -> Result<ApplyOutcome, EngineError>;

    /// Add `node_id` at `addr` as a voting member.
    async fn add_voter(&self, node_id: NodeId, addr: String) -> Result<(), EngineError>;

    async fn configuration(&self) -> Result<Vec<ServerInfo>, EngineError>;
}
