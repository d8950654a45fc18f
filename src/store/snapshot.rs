//! Snapshot encoding of the state machine.
//!
//! A snapshot is the JSON encoding of [`StateMachineData`]: the resource maps plus the Raft
//! bookkeeping needed to resume replication after it.

use openraft::BasicNode;
use openraft::LogId;
use openraft::SnapshotMeta;
use openraft::StoredMembership;
use serde::Deserialize;
use serde::Serialize;

use crate::store::state::ResourceState;
use crate::NodeId;

/// Everything owned by the state machine at one point in the log.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct StateMachineData {
    pub last_applied_log: Option<LogId<NodeId>>,

    pub last_membership: StoredMembership<NodeId, BasicNode>,

    /// Application data.
    pub resources: ResourceState,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct StoredSnapshot {
    pub meta: SnapshotMeta<NodeId, BasicNode>,

    /// The data of the state machine at the time of this snapshot.
    pub data: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("malformed snapshot: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("malformed snapshot: {kind} stored under key {key:?} has id {id:?}")]
    KeyMismatch { kind: &'static str, key: String, id: String },
}

pub fn encode(data: &StateMachineData) -> Result<Vec<u8>, SnapshotError> {
    serde_json::to_vec(data).map_err(SnapshotError::Encode)
}

pub fn decode(bytes: &[u8]) -> Result<StateMachineData, SnapshotError> {
    let data: StateMachineData = serde_json::from_slice(bytes).map_err(SnapshotError::Decode)?;

    if let Some((kind, key, id)) = data.resources.find_mismatched_key() {
        return Err(SnapshotError::KeyMismatch {
            kind,
            key: key.to_string(),
            id: id.to_string(),
        });
    }

    Ok(data)
}

/// Snapshot id in the form `{leader_id}-{index}-{seq}`, or `--{seq}` for an empty state machine.
pub(crate) fn snapshot_id(last_applied_log: Option<LogId<NodeId>>, seq: u64) -> String {
    match last_applied_log {
        Some(last) => format!("{}-{}-{}", last.leader_id, last.index, seq),
        None => format!("--{}", seq),
    }
}
