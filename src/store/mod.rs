//! The replicated state machine and its Raft log store.
//!
//! [`StateMachineStore`] owns the resource maps. openraft drives it through
//! [`RaftStateMachine`], calling `apply` from a single task in log order; HTTP handlers read it
//! concurrently through the `list_*` accessors.
//!
//! [`open`] backs both stores with one RocksDB instance. The resource maps stay in memory and are
//! rebuilt on start from the last persisted snapshot plus the committed log after it.

use std::collections::BTreeMap;
use std::io;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use openraft::storage::RaftStateMachine;
use openraft::storage::Snapshot;
use openraft::BasicNode;
use openraft::Entry;
use openraft::EntryPayload;
use openraft::LogId;
use openraft::OptionalSend;
use openraft::RaftSnapshotBuilder;
use openraft::RaftTypeConfig;
use openraft::SnapshotMeta;
use openraft::StorageError;
use openraft::StorageIOError;
use openraft::StoredMembership;
use rocksdb::DB;
use tokio::sync::RwLock;

use crate::command::CommandLogEntry;
use crate::model::Filament;
use crate::model::PrintJob;
use crate::model::Printer;
use crate::NodeId;
use crate::TypeConfig;

mod db;
pub mod log_store;
pub mod snapshot;
pub mod state;


pub use log_store::LogStore;
pub use snapshot::SnapshotError;
pub use snapshot::StateMachineData;
pub use snapshot::StoredSnapshot;
pub use state::ApplyOutcome;
pub use state::ResourceState;

/// Open the log store and the state machine store of a node, both backed by the database at `path`.
pub async fn open(path: impl AsRef<Path>) -> io::Result<(LogStore, Arc<StateMachineStore>)> {
    let path = path.as_ref();
    let db = db::open(path)?;

    let state_machine_store = StateMachineStore::load(db.clone()).await?;
    tracing::info!(
        path = %path.display(),
        last_applied_log = ?state_machine_store.last_applied_log().await,
        "opened storage"
    );

    Ok((LogStore::new(db), Arc::new(state_machine_store)))
}

/// Defines a state machine for the Raft cluster. This state machine represents a copy of the
/// resources for this node. Additionally, it is responsible for storing the last snapshot.
///
/// The default value keeps its snapshot in memory only.
#[derive(Debug, Default)]
pub struct StateMachineStore {
    state_machine: RwLock<StateMachineData>,

    snapshot_idx: AtomicU64,

    /// The last built or received snapshot.
    current_snapshot: RwLock<Option<StoredSnapshot>>,

    /// Where the current snapshot is persisted, if anywhere.
    db: Option<Arc<DB>>,
}

impl StateMachineStore {
    /// Restore from the snapshot persisted in `db`, or start empty.
    async fn load(db: Arc<DB>) -> io::Result<Self> {
        let snapshot = db::get_meta::<db::meta::Snapshot>(&db).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let store = Self {
            db: Some(db),
            ..Default::default()
        };

        if let Some(snapshot) = snapshot {
            store.restore(&snapshot.data).await.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

            tracing::info!(snapshot_id = %snapshot.meta.snapshot_id, "restored state machine from snapshot");
            *store.current_snapshot.write().await = Some(snapshot);
        }

        Ok(store)
    }

    async fn save_snapshot(&self, snapshot: StoredSnapshot) -> Result<(), StorageError<NodeId>> {
        if let Some(db) = &self.db {
            db::put_meta::<db::meta::Snapshot>(db, &snapshot)?;
        }

        let mut current_snapshot = self.current_snapshot.write().await;
        *current_snapshot = Some(snapshot);
        Ok(())
    }

    pub async fn list_printers(&self) -> BTreeMap<String, Printer> {
        self.state_machine.read().await.resources.printers().clone()
    }

    pub async fn list_filaments(&self) -> BTreeMap<String, Filament> {
        self.state_machine.read().await.resources.filaments().clone()
    }

    pub async fn list_print_jobs(&self) -> BTreeMap<String, PrintJob> {
        self.state_machine.read().await.resources.print_jobs().clone()
    }

    pub async fn print_job(&self, id: &str) -> Option<PrintJob> {
        self.state_machine.read().await.resources.print_jobs().get(id).cloned()
    }

    /// A copy of all resource maps, taken at one point in time.
    pub async fn resources(&self) -> ResourceState {
        self.state_machine.read().await.resources.clone()
    }

    pub async fn last_applied_log(&self) -> Option<LogId<NodeId>> {
        self.state_machine.read().await.last_applied_log
    }

    /// Apply a command entry that did not come through the Raft log.
    ///
    /// Callers must serialize their calls the same way openraft serializes `apply`.
    pub async fn apply_command(&self, entry: &CommandLogEntry) -> ApplyOutcome {
        let mut sm = self.state_machine.write().await;
        sm.resources.apply(entry)
    }

    /// Serialize the whole state machine under a single read lock.
    pub async fn snapshot(&self) -> Result<Vec<u8>, SnapshotError> {
        let sm = self.state_machine.read().await;
        snapshot::encode(&sm)
    }

    /// Replace the whole state machine with a decoded snapshot.
    ///
    /// The bytes are fully decoded before the write lock is taken; malformed input leaves the
    /// current state as it was.
    pub async fn restore(&self, bytes: &[u8]) -> Result<(), SnapshotError> {
        let restored = snapshot::decode(bytes)?;

        let mut sm = self.state_machine.write().await;
        *sm = restored;
        Ok(())
    }
}

impl RaftSnapshotBuilder<TypeConfig> for Arc<StateMachineStore> {
    #[tracing::instrument(level = "trace", skip(self))]
    async fn build_snapshot(&mut self) -> Result<Snapshot<TypeConfig>, StorageError<NodeId>> {
        let data;
        let last_applied_log;
        let last_membership;

        {
            let state_machine = self.state_machine.read().await;
            data = snapshot::encode(&state_machine).map_err(|e| StorageIOError::read_state_machine(&e))?;

            last_applied_log = state_machine.last_applied_log;
            last_membership = state_machine.last_membership.clone();
        }

        let seq = self.snapshot_idx.fetch_add(1, Ordering::Relaxed) + 1;

        let meta = SnapshotMeta {
            last_log_id: last_applied_log,
            last_membership,
            snapshot_id: snapshot::snapshot_id(last_applied_log, seq),
        };

        tracing::info!(snapshot_id = %meta.snapshot_id, size = data.len(), "built snapshot");

        let snapshot = StoredSnapshot {
            meta: meta.clone(),
            data: data.clone(),
        };

        self.save_snapshot(snapshot).await?;

        Ok(Snapshot {
            meta,
            snapshot: Box::new(Cursor::new(data)),
        })
    }
}

impl RaftStateMachine<TypeConfig> for Arc<StateMachineStore> {
    type SnapshotBuilder = Self;

    async fn applied_state(
        &mut self,
    ) -> Result<(Option<LogId<NodeId>>, StoredMembership<NodeId, BasicNode>), StorageError<NodeId>> {
        let state_machine = self.state_machine.read().await;
        Ok((state_machine.last_applied_log, state_machine.last_membership.clone()))
    }

    #[tracing::instrument(level = "trace", skip(self, entries))]
    async fn apply<I>(&mut self, entries: I) -> Result<Vec<ApplyOutcome>, StorageError<NodeId>>
    where I: IntoIterator<Item = Entry<TypeConfig>> + OptionalSend {
        let entries_iter = entries.into_iter();
        let mut res = Vec::with_capacity(entries_iter.size_hint().0);

        let mut sm = self.state_machine.write().await;

        for entry in entries_iter {
            tracing::debug!(%entry.log_id, "replicate to sm");

            sm.last_applied_log = Some(entry.log_id);

            match entry.payload {
                EntryPayload::Blank => res.push(ApplyOutcome::Noop),
                EntryPayload::Normal(ref cmd) => res.push(sm.resources.apply(cmd)),
                EntryPayload::Membership(ref mem) => {
                    sm.last_membership = StoredMembership::new(Some(entry.log_id), mem.clone());
                    res.push(ApplyOutcome::Noop)
                }
            };
        }
        Ok(res)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<Box<<TypeConfig as RaftTypeConfig>::SnapshotData>, StorageError<NodeId>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    #[tracing::instrument(level = "trace", skip(self, snapshot))]
    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<NodeId, BasicNode>,
        snapshot: Box<<TypeConfig as RaftTypeConfig>::SnapshotData>,
    ) -> Result<(), StorageError<NodeId>> {
        tracing::info!(
            { snapshot_size = snapshot.get_ref().len() },
            "decoding snapshot for installation"
        );

        let new_snapshot = StoredSnapshot {
            meta: meta.clone(),
            data: snapshot.into_inner(),
        };

        self.restore(&new_snapshot.data)
            .await
            .map_err(|e| StorageIOError::read_snapshot(Some(new_snapshot.meta.signature()), &e))?;

        self.save_snapshot(new_snapshot).await
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn get_current_snapshot(&mut self) -> Result<Option<Snapshot<TypeConfig>>, StorageError<NodeId>> {
        match &*self.current_snapshot.read().await {
            Some(snapshot) => {
                let data = snapshot.data.clone();
                Ok(Some(Snapshot {
                    meta: snapshot.meta.clone(),
                    snapshot: Box::new(Cursor::new(data)),
                }))
            }
            None => Ok(None),
        }
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        self.clone()
    }
}
