use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::command::CommandLogEntry;
use crate::engine::ConsensusEngine;
use crate::engine::EngineError;
use crate::engine::ServerInfo;
use crate::engine::Suffrage;
use crate::store::ApplyOutcome;
use crate::store::StateMachineStore;
use crate::NodeId;

/// A single-process [`ConsensusEngine`]: an entry is committed as soon as it is applied to the
/// local [`StateMachineStore`].
///
/// Leadership is a flag that the owner flips with [`LocalEngine::set_leader`]. Submissions are
/// applied one at a time, in the order they acquire the internal lock.
pub struct LocalEngine {
    id: NodeId,
    addr: String,
    leader: AtomicBool,
    store: Arc<StateMachineStore>,
    members: Mutex<BTreeMap<NodeId, String>>,
}

impl LocalEngine {
    pub fn new(id: NodeId, addr: impl ToString, store: Arc<StateMachineStore>) -> Self {
        let addr = addr.to_string();
        Self {
            id,
            addr: addr.clone(),
            leader: AtomicBool::new(true),
            store,
            members: Mutex::new(BTreeMap::from([(id, addr)])),
        }
    }

    pub fn set_leader(&self, leader: bool) {
        self.leader.store(leader, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConsensusEngine for LocalEngine {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }

    fn leader_address(&self) -> Option<String> {
        self.is_leader().then(|| self.addr.clone())
    }

    async fn submit(&self, entry: CommandLogEntry, timeout: Duration) -> Result<ApplyOutcome, EngineError> {
        if !self.is_leader() {
            return Err(EngineError::NotLeader {
                leader_id: None,
                leader_addr: None,
            });
        }

        // Holding the member lock serializes apply calls.
        let apply = async {
            let _members = self.members.lock().await;
            self.store.apply_command(&entry).await
        };

        tokio::time::timeout(timeout, apply).await.map_err(|_| EngineError::Timeout(timeout))
    }

    async fn add_voter(&self, node_id: NodeId, addr: String) -> Result<(), EngineError> {
        let mut members = self.members.lock().await;
        match members.get(&node_id) {
            Some(existing) if existing != &addr => Err(EngineError::Raft(format!(
                "node {} is already a member at {}",
                node_id, existing
            ))),
            _ => {
                members.insert(node_id, addr);
                Ok(())
            }
        }
    }

    async fn configuration(&self) -> Result<Vec<ServerInfo>, EngineError> {
        let members = self.members.lock().await;
        Ok(members
            .iter()
            .map(|(id, addr)| ServerInfo {
                node_id: *id,
                address: addr.clone(),
                suffrage: Suffrage::Voter,
            })
            .collect())
    }
}
