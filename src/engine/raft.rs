use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use openraft::error::ClientWriteError;
use openraft::error::RaftError;
use openraft::metrics::WaitError;
use openraft::BasicNode;
use openraft::ChangeMembers;
use openraft::RaftMetrics;

use crate::command::CommandLogEntry;
use crate::engine::ConsensusEngine;
use crate::engine::EngineError;
use crate::engine::ServerInfo;
use crate::engine::Suffrage;
use crate::store::ApplyOutcome;
use crate::typ;
use crate::NodeId;
use crate::Raft;

/// [`ConsensusEngine`] backed by an openraft [`Raft`] instance.
///
/// Leadership and membership are read from the Raft metrics channel, so they reflect what this
/// node last observed and may lag the cluster by a heartbeat.
#[derive(Clone)]
pub struct RaftEngine {
    id: NodeId,
    raft: Raft,

    /// Upper bound of one `add_voter` call, learner catch-up included.
    join_timeout: Duration,
}

impl RaftEngine {
    pub fn new(id: NodeId, raft: Raft, join_timeout: Duration) -> Self {
        Self { id, raft, join_timeout }
    }

    fn metrics(&self) -> RaftMetrics<NodeId, BasicNode> {
        self.raft.metrics().borrow().clone()
    }

    fn is_voter_at(&self, node_id: NodeId, addr: &str) -> bool {
        let metrics = self.metrics();
        let is_voter = metrics.membership_config.membership().voter_ids().any(|id| id == node_id);
        let same_addr = metrics.membership_config.nodes().any(|(id, node)| *id == node_id && node.addr == addr);
        is_voter && same_addr
    }

    fn is_member(&self, node_id: NodeId) -> bool {
        self.metrics().membership_config.nodes().any(|(id, _)| *id == node_id)
    }

    /// Add `node_id` as a learner, wait until it has replicated the log up to its own addition,
    /// then make it a voter.
    async fn promote(&self, node_id: NodeId, addr: &str) -> Result<(), EngineError> {
        let resp = self.raft.add_learner(node_id, BasicNode::new(addr), false).await.map_err(from_write_error)?;
        let want = resp.log_id.index;

        tracing::debug!(node_id, want, "wait for learner to catch up");

        self.raft
            .wait(Some(self.join_timeout))
            .metrics(
                |m| {
                    let matched = m.replication.as_ref().and_then(|r| r.get(&node_id).copied().flatten());
                    matched.map(|log_id| log_id.index) >= Some(want)
                },
                format!("learner {} replicated up to {}", node_id, want),
            )
            .await
            .map_err(|e| match e {
                WaitError::Timeout(..) => EngineError::Timeout(self.join_timeout),
                other => EngineError::Raft(other.to_string()),
            })?;

        let voters = BTreeSet::from([node_id]);
        self.raft.change_membership(ChangeMembers::AddVoterIds(voters), false).await.map_err(from_write_error)?;
        Ok(())
    }

    /// Drop a learner that never caught up, so it is not promoted later and leaves no trace in
    /// the configuration.
    async fn remove_learner(&self, node_id: NodeId) {
        let nodes = BTreeSet::from([node_id]);
        let remove = self.raft.change_membership(ChangeMembers::RemoveNodes(nodes), false);

        match tokio::time::timeout(self.join_timeout, remove).await {
            Ok(Ok(_)) => tracing::info!(node_id, "removed learner that failed to join"),
            Ok(Err(e)) => tracing::warn!(node_id, error = %e, "failed to remove learner"),
            Err(_elapsed) => tracing::warn!(node_id, "timeout removing learner"),
        }
    }
}

fn from_write_error(e: typ::RaftError<typ::ClientWriteError>) -> EngineError {
    match e {
        RaftError::APIError(ClientWriteError::ForwardToLeader(fwd)) => EngineError::NotLeader {
            leader_id: fwd.leader_id,
            leader_addr: fwd.leader_node.map(|n| n.addr),
        },
        other => EngineError::Raft(other.to_string()),
    }
}

#[async_trait]
impl ConsensusEngine for RaftEngine {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn is_leader(&self) -> bool {
        self.raft.metrics().borrow().current_leader == Some(self.id)
    }

    fn leader_address(&self) -> Option<String> {
        let metrics = self.metrics();
        let leader = metrics.current_leader?;
        let addr = metrics.membership_config.nodes().find(|(id, _)| **id == leader).map(|(_, node)| node.addr.clone());
        addr
    }

    #[tracing::instrument(level = "debug", skip(self, entry), fields(entry = %entry))]
    async fn submit(&self, entry: CommandLogEntry, timeout: Duration) -> Result<ApplyOutcome, EngineError> {
        match tokio::time::timeout(timeout, self.raft.client_write(entry)).await {
            Ok(Ok(resp)) => {
                tracing::debug!(log_id = %resp.log_id, "entry committed");
                Ok(resp.data)
            }
            Ok(Err(e)) => Err(from_write_error(e)),
            Err(_elapsed) => Err(EngineError::Timeout(timeout)),
        }
    }

    async fn add_voter(&self, node_id: NodeId, addr: String) -> Result<(), EngineError> {
        if self.is_voter_at(node_id, &addr) {
            tracing::info!(node_id, %addr, "node is already a voter");
            return Ok(());
        }

        let was_member = self.is_member(node_id);

        // A voter that cannot replicate would stall every later commit, so it is promoted only
        // after catching up, and only within `join_timeout`.
        let res = match tokio::time::timeout(self.join_timeout, self.promote(node_id, &addr)).await {
            Ok(res) => res,
            Err(_elapsed) => Err(EngineError::Timeout(self.join_timeout)),
        };

        match res {
            Ok(()) => {
                tracing::info!(node_id, %addr, "node joined as voter");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(node_id, %addr, error = %e, "node failed to join");
                if !was_member && !matches!(e, EngineError::NotLeader { .. }) {
                    self.remove_learner(node_id).await;
                }
                Err(e)
            }
        }
    }

    async fn configuration(&self) -> Result<Vec<ServerInfo>, EngineError> {
        let metrics = self.metrics();
        if let Err(fatal) = &metrics.running_state {
            return Err(EngineError::Raft(fatal.to_string()));
        }

        let voters = metrics.membership_config.membership().voter_ids().collect::<BTreeSet<_>>();

        let servers = metrics
            .membership_config
            .nodes()
            .map(|(id, node)| ServerInfo {
                node_id: *id,
                address: node.addr.clone(),
                suffrage: if voters.contains(id) {
                    Suffrage::Voter
                } else {
                    Suffrage::Learner
                },
            })
            .collect();

        Ok(servers)
    }
}
