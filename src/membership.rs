use std::sync::Arc;

use crate::engine::ConsensusEngine;
use crate::engine::EngineError;
use crate::engine::ServerInfo;
use crate::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("failed to add node {node_id} at {addr}: {source}")]
    AddNode {
        node_id: NodeId,
        addr: String,
        #[source]
        source: EngineError,
    },

    #[error("failed to read cluster configuration: {0}")]
    Configuration(#[source] EngineError),
}

/// Adds nodes to the cluster and reports who is in it.
#[derive(Clone)]
pub struct MembershipController {
    engine: Arc<dyn ConsensusEngine>,
}

impl MembershipController {
    pub fn new(engine: Arc<dyn ConsensusEngine>) -> Self {
        Self { engine }
    }

    /// Make `node_id` at `addr` a voting member. Adding a node that is already a voter at the same
    /// address succeeds without changing anything.
    pub async fn add_node(&self, node_id: NodeId, addr: String) -> Result<(), MembershipError> {
        tracing::info!(node_id, %addr, "add node");

        self.engine.add_voter(node_id, addr.clone()).await.map_err(|source| MembershipError::AddNode {
            node_id,
            addr,
            source,
        })
    }

    pub async fn configuration(&self) -> Result<Vec<ServerInfo>, MembershipError> {
        self.engine.configuration().await.map_err(MembershipError::Configuration)
    }

    pub fn leader_address(&self) -> Option<String> {
        self.engine.leader_address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LocalEngine;
    use crate::engine::Suffrage;
    use crate::store::StateMachineStore;

    fn controller() -> (MembershipController, Arc<LocalEngine>) {
        let engine = Arc::new(LocalEngine::new(1, "127.0.0.1:21001", Arc::new(StateMachineStore::default())));
        (MembershipController::new(engine.clone()), engine)
    }

    #[tokio::test]
    async fn test_add_node_twice() -> anyhow::Result<()> {
        let (membership, _engine) = controller();

        membership.add_node(2, "127.0.0.1:21002".to_string()).await?;
        membership.add_node(2, "127.0.0.1:21002".to_string()).await?;

        let servers = membership.configuration().await?;
        assert_eq!(
            vec![
                ServerInfo {
                    node_id: 1,
                    address: "127.0.0.1:21001".to_string(),
                    suffrage: Suffrage::Voter,
                },
                ServerInfo {
                    node_id: 2,
                    address: "127.0.0.1:21002".to_string(),
                    suffrage: Suffrage::Voter,
                },
            ],
            servers
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_add_node_with_conflicting_addr() -> anyhow::Result<()> {
        let (membership, _engine) = controller();

        membership.add_node(2, "127.0.0.1:21002".to_string()).await?;
        let res = membership.add_node(2, "127.0.0.1:29999".to_string()).await;

        assert!(matches!(res, Err(MembershipError::AddNode { node_id: 2, .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_leader_address() {
        let (membership, engine) = controller();
        assert_eq!(Some("127.0.0.1:21001".to_string()), membership.leader_address());

        engine.set_leader(false);
        assert_eq!(None, membership.leader_address());
    }
}
