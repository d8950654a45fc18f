//! On-disk layout shared by [`LogStore`](super::LogStore) and
//! [`StateMachineStore`](super::StateMachineStore).
//!
//! One RocksDB instance per node with two column families:
//! - `logs`: Raft entries as JSON, keyed by the big-endian log index so iteration follows the log.
//! - `meta`: the vote, the committed and last purged log ids, and the last snapshot.

use std::io;
use std::path::Path;
use std::sync::Arc;

use byteorder::BigEndian;
use byteorder::ByteOrder;
use openraft::AnyError;
use openraft::ErrorSubject;
use openraft::ErrorVerb;
use openraft::StorageIOError;
use rocksdb::ColumnFamily;
use rocksdb::ColumnFamilyDescriptor;
use rocksdb::Options;
use rocksdb::DB;

use crate::NodeId;

pub(crate) const CF_META: &str = "meta";
pub(crate) const CF_LOGS: &str = "logs";

/// Open or create the database at `path`.
pub(crate) fn open(path: &Path) -> io::Result<Arc<DB>> {
    let mut db_opts = Options::default();
    db_opts.create_missing_column_families(true);
    db_opts.create_if_missing(true);

    let meta = ColumnFamilyDescriptor::new(CF_META, Options::default());
    let logs = ColumnFamilyDescriptor::new(CF_LOGS, Options::default());

    let db = DB::open_cf_descriptors(&db_opts, path, vec![meta, logs])
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    Ok(Arc::new(db))
}

pub(crate) fn cf<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily, StorageIOError<NodeId>> {
    db.cf_handle(name).ok_or_else(|| {
        let e = io::Error::new(io::ErrorKind::NotFound, format!("column family `{}` not found", name));
        StorageIOError::new(ErrorSubject::Store, ErrorVerb::Read, AnyError::new(&e))
    })
}

/// Converts a log index to a key. Big endian keeps keys sorted by index.
pub(crate) fn id_to_bin(id: u64) -> [u8; 8] {
    let mut buf = [0; 8];
    BigEndian::write_u64(&mut buf, id);
    buf
}

pub(crate) fn bin_to_id(buf: &[u8]) -> Option<u64> {
    buf.get(0..8).map(BigEndian::read_u64)
}

/// Read a metadata value; `None` if it was never written.
pub(crate) fn get_meta<M: meta::StoreMeta>(db: &DB) -> Result<Option<M::Value>, StorageIOError<NodeId>> {
    let bytes = db.get_cf(cf(db, CF_META)?, M::KEY).map_err(M::read_err)?;

    let Some(bytes) = bytes else {
        return Ok(None);
    };

    let value = serde_json::from_slice(&bytes).map_err(M::read_err)?;
    Ok(Some(value))
}

/// Write a metadata value and flush the WAL.
pub(crate) fn put_meta<M: meta::StoreMeta>(db: &DB, value: &M::Value) -> Result<(), StorageIOError<NodeId>> {
    let json_value = serde_json::to_vec(value).map_err(|e| M::write_err(value, e))?;

    db.put_cf(cf(db, CF_META)?, M::KEY, json_value).map_err(|e| M::write_err(value, e))?;
    db.flush_wal(true).map_err(|e| M::write_err(value, e))?;

    Ok(())
}

/// Metadata stored next to the log.
///
/// Besides logs and the state machine, a Raft node has to keep a few values across restarts.
/// Each one is a key in the `meta` column family with a JSON value.
pub(crate) mod meta {
    use std::error::Error;

    use openraft::AnyError;
    use openraft::ErrorSubject;
    use openraft::ErrorVerb;
    use openraft::LogId;
    use openraft::StorageIOError;
    use serde::de::DeserializeOwned;
    use serde::Serialize;

    use crate::store::StoredSnapshot;
    use crate::NodeId;

    pub(crate) trait StoreMeta {
        const KEY: &'static str;

        type Value: Serialize + DeserializeOwned;

        /// The subject embedded into the returned storage error.
        fn subject(v: Option<&Self::Value>) -> ErrorSubject<NodeId>;

        fn read_err(e: impl Error + 'static) -> StorageIOError<NodeId> {
            StorageIOError::new(Self::subject(None), ErrorVerb::Read, AnyError::new(&e))
        }

        fn write_err(v: &Self::Value, e: impl Error + 'static) -> StorageIOError<NodeId> {
            StorageIOError::new(Self::subject(Some(v)), ErrorVerb::Write, AnyError::new(&e))
        }
    }

    pub(crate) struct Vote {}
    pub(crate) struct Committed {}
    pub(crate) struct LastPurged {}
    pub(crate) struct Snapshot {}

    impl StoreMeta for Vote {
        const KEY: &'static str = "vote";
        type Value = openraft::Vote<NodeId>;

        fn subject(_v: Option<&Self::Value>) -> ErrorSubject<NodeId> {
            ErrorSubject::Vote
        }
    }

    impl StoreMeta for Committed {
        const KEY: &'static str = "committed";
        type Value = LogId<NodeId>;

        fn subject(_v: Option<&Self::Value>) -> ErrorSubject<NodeId> {
            ErrorSubject::Store
        }
    }

    impl StoreMeta for LastPurged {
        const KEY: &'static str = "last_purged_log_id";
        type Value = LogId<NodeId>;

        fn subject(_v: Option<&Self::Value>) -> ErrorSubject<NodeId> {
            ErrorSubject::Store
        }
    }

    impl StoreMeta for Snapshot {
        const KEY: &'static str = "snapshot";
        type Value = StoredSnapshot;

        fn subject(v: Option<&Self::Value>) -> ErrorSubject<NodeId> {
            ErrorSubject::Snapshot(v.map(|s| s.meta.signature()))
        }
    }
}
