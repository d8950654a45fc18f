//! RocksDB backed Raft log storage.
//!
//! Entries, the vote and the committed log id survive a restart. A restarted node resumes with its
//! term, its vote and its log, and re-applies committed entries on top of its last snapshot.

use std::fmt::Debug;
use std::ops::Bound;
use std::ops::RangeBounds;
use std::sync::Arc;

use openraft::storage::LogFlushed;
use openraft::storage::LogState;
use openraft::storage::RaftLogStorage;
use openraft::Entry;
use openraft::LogId;
use openraft::OptionalSend;
use openraft::RaftLogReader;
use openraft::StorageError;
use openraft::StorageIOError;
use openraft::Vote;
use rocksdb::Direction;
use rocksdb::IteratorMode;
use rocksdb::DB;

use crate::store::db;
use crate::store::db::meta;
use crate::NodeId;
use crate::TypeConfig;

#[derive(Debug, Clone)]
pub struct LogStore {
    db: Arc<DB>,
}

impl LogStore {
    pub(crate) fn new(db: Arc<DB>) -> Self {
        Self { db }
    }

    fn decode_entry(key: &[u8], val: &[u8]) -> Result<(u64, Entry<TypeConfig>), StorageError<NodeId>> {
        let entry: Entry<TypeConfig> = serde_json::from_slice(val).map_err(|e| StorageIOError::read_logs(&e))?;

        let index = db::bin_to_id(key);
        debug_assert_eq!(Some(entry.log_id.index), index);

        Ok((entry.log_id.index, entry))
    }

    fn last_log_id(&self) -> Result<Option<LogId<NodeId>>, StorageError<NodeId>> {
        let mut it = self.db.iterator_cf(db::cf(&self.db, db::CF_LOGS)?, IteratorMode::End);

        match it.next() {
            None => Ok(None),
            Some(res) => {
                let (key, val) = res.map_err(|e| StorageIOError::read_logs(&e))?;
                let (_, entry) = Self::decode_entry(&key, &val)?;
                Ok(Some(entry.log_id))
            }
        }
    }

    fn delete_logs(&self, from: u64, to: u64) -> Result<(), StorageError<NodeId>> {
        let cf = db::cf(&self.db, db::CF_LOGS)?;
        self.db
            .delete_range_cf(cf, db::id_to_bin(from), db::id_to_bin(to))
            .map_err(|e| StorageIOError::write_logs(&e))?;
        Ok(())
    }
}

impl RaftLogReader<TypeConfig> for LogStore {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug + OptionalSend>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry<TypeConfig>>, StorageError<NodeId>> {
        let start = match range.start_bound() {
            Bound::Included(x) => db::id_to_bin(*x),
            Bound::Excluded(x) => db::id_to_bin(*x + 1),
            Bound::Unbounded => db::id_to_bin(0),
        };

        let cf = db::cf(&self.db, db::CF_LOGS)?;
        let mut res = Vec::new();

        for item in self.db.iterator_cf(cf, IteratorMode::From(&start, Direction::Forward)) {
            let (key, val) = item.map_err(|e| StorageIOError::read_logs(&e))?;
            let (index, entry) = Self::decode_entry(&key, &val)?;
            if !range.contains(&index) {
                break;
            }
            res.push(entry);
        }

        Ok(res)
    }
}

impl RaftLogStorage<TypeConfig> for LogStore {
    type LogReader = Self;

    async fn get_log_state(&mut self) -> Result<LogState<TypeConfig>, StorageError<NodeId>> {
        let last_purged_log_id = db::get_meta::<meta::LastPurged>(&self.db)?;
        let last_log_id = self.last_log_id()?.or(last_purged_log_id);

        Ok(LogState {
            last_purged_log_id,
            last_log_id,
        })
    }

    async fn save_committed(&mut self, committed: Option<LogId<NodeId>>) -> Result<(), StorageError<NodeId>> {
        if let Some(committed) = committed {
            db::put_meta::<meta::Committed>(&self.db, &committed)?;
        }
        Ok(())
    }

    async fn read_committed(&mut self) -> Result<Option<LogId<NodeId>>, StorageError<NodeId>> {
        Ok(db::get_meta::<meta::Committed>(&self.db)?)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn save_vote(&mut self, vote: &Vote<NodeId>) -> Result<(), StorageError<NodeId>> {
        db::put_meta::<meta::Vote>(&self.db, vote)?;
        Ok(())
    }

    async fn read_vote(&mut self) -> Result<Option<Vote<NodeId>>, StorageError<NodeId>> {
        Ok(db::get_meta::<meta::Vote>(&self.db)?)
    }

    #[tracing::instrument(level = "trace", skip(self, entries, callback))]
    async fn append<I>(&mut self, entries: I, callback: LogFlushed<TypeConfig>) -> Result<(), StorageError<NodeId>>
    where I: IntoIterator<Item = Entry<TypeConfig>> + OptionalSend {
        let cf = db::cf(&self.db, db::CF_LOGS)?;

        for entry in entries {
            let value = serde_json::to_vec(&entry).map_err(|e| StorageIOError::write_logs(&e))?;
            self.db
                .put_cf(cf, db::id_to_bin(entry.log_id.index), value)
                .map_err(|e| StorageIOError::write_logs(&e))?;
        }

        self.db.flush_wal(true).map_err(|e| StorageIOError::write_logs(&e))?;

        // On error the callback is dropped and openraft treats the append as failed.
        callback.log_io_completed(Ok(()));
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn truncate(&mut self, log_id: LogId<NodeId>) -> Result<(), StorageError<NodeId>> {
        tracing::debug!("delete_log: [{:?}, +oo)", log_id);

        self.delete_logs(log_id.index, u64::MAX)?;
        self.db.flush_wal(true).map_err(|e| StorageIOError::write_logs(&e))?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn purge(&mut self, log_id: LogId<NodeId>) -> Result<(), StorageError<NodeId>> {
        tracing::debug!("delete_log: [0, {:?}]", log_id);

        // Entries at or before the last purged id are ignored once it is recorded, so the two
        // writes need no transaction.
        db::put_meta::<meta::LastPurged>(&self.db, &log_id)?;
        self.delete_logs(0, log_id.index + 1)?;
        Ok(())
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        self.clone()
    }
}
