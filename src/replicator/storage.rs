use crate::replicator::state_machine::{MetadataState, SharedState};
use crate::types::MetadataCommand;
use anyhow::Result;
use openraft::storage::{Adaptor, LogState, RaftStorage};
use openraft::{
    Entry, EntryPayload, ErrorSubject, ErrorVerb, LogId, OptionalSend, RaftLogReader,
    RaftSnapshotBuilder, Snapshot, SnapshotMeta, StorageError, StoredMembership, Vote,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::io::Cursor;
use std::ops::RangeBounds;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type NodeIdType = u64;

openraft::declare_raft_types!(
    pub TypeConfig:
        D = MetadataCommand,
        R = (),
        Node = MetaNode,
);

/// Raft-level node descriptor: the dialable Raft address plus the string
/// node id it was derived from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MetaNode {
    pub addr: String,
    pub name: String,
}

impl std::fmt::Display for MetaNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.addr)
    }
}

/// Stable numeric Raft id for a string node id (64-bit FNV-1a).
pub fn raft_node_id(name: &str) -> NodeIdType {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    name.bytes()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}

const KEY_VOTE: &[u8] = b"vote";
const KEY_LAST_PURGED: &[u8] = b"last_purged";
const KEY_LAST_APPLIED: &[u8] = b"last_applied";
const KEY_MEMBERSHIP: &[u8] = b"membership";
const KEY_SNAPSHOT_IDX: &[u8] = b"snapshot_idx";
const KEY_STATE_SNAPSHOT: &[u8] = b"state_snapshot";

fn io_err<E>(subject: ErrorSubject<NodeIdType>, verb: ErrorVerb, e: E) -> StorageError<NodeIdType>
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    StorageError::from_io_error(subject, verb, std::io::Error::other(e))
}

fn log_read<E: Into<Box<dyn std::error::Error + Send + Sync>>>(e: E) -> StorageError<NodeIdType> {
    io_err(ErrorSubject::Logs, ErrorVerb::Read, e)
}

fn log_write<E: Into<Box<dyn std::error::Error + Send + Sync>>>(e: E) -> StorageError<NodeIdType> {
    io_err(ErrorSubject::Logs, ErrorVerb::Write, e)
}

fn sm_write<E: Into<Box<dyn std::error::Error + Send + Sync>>>(e: E) -> StorageError<NodeIdType> {
    io_err(ErrorSubject::StateMachine, ErrorVerb::Write, e)
}

pub struct SledStorage {
    db: sled::Db,
    log_tree: sled::Tree,
    meta_tree: sled::Tree,
    state: SharedState,
    snapshot_idx: Arc<AtomicU64>,
}

impl SledStorage {
    pub fn new<P: AsRef<Path>>(path: P, state: SharedState) -> Result<Self> {
        let db = sled::open(path)?;
        let log_tree = db.open_tree("raft_log")?;
        let meta_tree = db.open_tree("raft_meta")?;

        let snapshot_idx = meta_tree
            .get(KEY_SNAPSHOT_IDX)?
            .and_then(|v| bincode::deserialize::<u64>(&v).ok())
            .unwrap_or(0);

        if let Some(data) = meta_tree.get(KEY_STATE_SNAPSHOT)? {
            if let Ok(restored) = serde_json::from_slice::<MetadataState>(&data) {
                state.restore(restored);
                tracing::info!("Restored metadata state from snapshot");
            }
        }

        Ok(Self {
            db,
            log_tree,
            meta_tree,
            state,
            snapshot_idx: Arc::new(AtomicU64::new(snapshot_idx)),
        })
    }

    fn log_key(index: u64) -> [u8; 8] {
        index.to_be_bytes()
    }

    fn shallow_clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            log_tree: self.log_tree.clone(),
            meta_tree: self.meta_tree.clone(),
            state: self.state.clone(),
            snapshot_idx: self.snapshot_idx.clone(),
        }
    }

    fn read_bincode<T: DeserializeOwned>(&self, key: &[u8]) -> Option<T> {
        self.meta_tree
            .get(key)
            .ok()
            .flatten()
            .and_then(|v| bincode::deserialize(&v).ok())
    }

    fn write_bincode<T: Serialize>(&self, key: &[u8], value: &T) -> Result<()> {
        let data = bincode::serialize(value)?;
        self.meta_tree.insert(key, data)?;
        Ok(())
    }

    fn get_membership(&self) -> StoredMembership<NodeIdType, MetaNode> {
        self.meta_tree
            .get(KEY_MEMBERSHIP)
            .ok()
            .flatten()
            .and_then(|v| serde_json::from_slice(&v).ok())
            .unwrap_or_default()
    }

    fn set_membership(&self, membership: &StoredMembership<NodeIdType, MetaNode>) -> Result<()> {
        let data = serde_json::to_vec(membership)?;
        self.meta_tree.insert(KEY_MEMBERSHIP, data)?;
        Ok(())
    }

    fn save_state_snapshot(&self) -> Result<()> {
        let data = serde_json::to_vec(&self.state.snapshot())?;
        self.meta_tree.insert(KEY_STATE_SNAPSHOT, data)?;
        self.meta_tree.flush()?;
        Ok(())
    }

    fn remove_keys(&self, keys: Vec<sled::IVec>) -> Result<(), StorageError<NodeIdType>> {
        for key in keys {
            self.log_tree.remove(key).map_err(log_write)?;
        }
        Ok(())
    }

    pub fn shared_state(&self) -> &SharedState {
        &self.state
    }
}

impl RaftLogReader<TypeConfig> for SledStorage {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug + OptionalSend>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry<TypeConfig>>, StorageError<NodeIdType>> {
        let start = match range.start_bound() {
            std::ops::Bound::Included(&s) => s,
            std::ops::Bound::Excluded(&s) => s + 1,
            std::ops::Bound::Unbounded => 0,
        };

        let mut entries = Vec::new();
        for item in self.log_tree.range(Self::log_key(start)..) {
            let (key, value) = item.map_err(log_read)?;
            let index_bytes: [u8; 8] = key.as_ref().try_into().map_err(log_read)?;
            let index = u64::from_be_bytes(index_bytes);
            if !range.contains(&index) {
                break;
            }
            let entry: Entry<TypeConfig> = serde_json::from_slice(&value).map_err(log_read)?;
            entries.push(entry);
        }

        Ok(entries)
    }
}

impl RaftSnapshotBuilder<TypeConfig> for SledStorage {
    async fn build_snapshot(&mut self) -> Result<Snapshot<TypeConfig>, StorageError<NodeIdType>> {
        let data = serde_json::to_vec(&self.state.snapshot())
            .map_err(|e| io_err(ErrorSubject::StateMachine, ErrorVerb::Read, e))?;

        let last_applied: Option<LogId<NodeIdType>> = self.read_bincode(KEY_LAST_APPLIED);
        let last_membership = self.get_membership();

        let snapshot_idx = self.snapshot_idx.fetch_add(1, Ordering::SeqCst) + 1;
        self.write_bincode(KEY_SNAPSHOT_IDX, &snapshot_idx)
            .map_err(|e| sm_write(e.to_string()))?;

        let snapshot_id = match last_applied {
            Some(log_id) => format!("{}-{}-{}", log_id.leader_id, log_id.index, snapshot_idx),
            None => format!("--{}", snapshot_idx),
        };

        Ok(Snapshot {
            meta: SnapshotMeta {
                last_log_id: last_applied,
                last_membership,
                snapshot_id,
            },
            snapshot: Box::new(Cursor::new(data)),
        })
    }
}

impl RaftStorage<TypeConfig> for SledStorage {
    type LogReader = Self;
    type SnapshotBuilder = Self;

    async fn get_log_state(&mut self) -> Result<LogState<TypeConfig>, StorageError<NodeIdType>> {
        let last_purged_log_id: Option<LogId<NodeIdType>> = self.read_bincode(KEY_LAST_PURGED);

        let last_log_id = self
            .log_tree
            .last()
            .map_err(log_read)?
            .and_then(|(_, v)| serde_json::from_slice::<Entry<TypeConfig>>(&v).ok())
            .map(|e| e.log_id)
            .or(last_purged_log_id);

        Ok(LogState {
            last_purged_log_id,
            last_log_id,
        })
    }

    async fn save_vote(&mut self, vote: &Vote<NodeIdType>) -> Result<(), StorageError<NodeIdType>> {
        let vote_err = |e: String| io_err(ErrorSubject::Vote, ErrorVerb::Write, e);
        self.write_bincode(KEY_VOTE, vote)
            .map_err(|e| vote_err(e.to_string()))?;
        self.meta_tree.flush().map_err(|e| vote_err(e.to_string()))?;
        Ok(())
    }

    async fn read_vote(&mut self) -> Result<Option<Vote<NodeIdType>>, StorageError<NodeIdType>> {
        Ok(self.read_bincode(KEY_VOTE))
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        self.shallow_clone()
    }

    async fn append_to_log<I>(&mut self, entries: I) -> Result<(), StorageError<NodeIdType>>
    where
        I: IntoIterator<Item = Entry<TypeConfig>> + OptionalSend,
    {
        for entry in entries {
            let value = serde_json::to_vec(&entry).map_err(log_write)?;
            self.log_tree
                .insert(Self::log_key(entry.log_id.index), value)
                .map_err(log_write)?;
        }
        self.log_tree.flush().map_err(log_write)?;
        Ok(())
    }

    async fn delete_conflict_logs_since(
        &mut self,
        log_id: LogId<NodeIdType>,
    ) -> Result<(), StorageError<NodeIdType>> {
        let keys: Vec<_> = self
            .log_tree
            .range(Self::log_key(log_id.index)..)
            .filter_map(|r| r.ok().map(|(k, _)| k))
            .collect();
        self.remove_keys(keys)
    }

    async fn purge_logs_upto(
        &mut self,
        log_id: LogId<NodeIdType>,
    ) -> Result<(), StorageError<NodeIdType>> {
        self.write_bincode(KEY_LAST_PURGED, &log_id)
            .map_err(|e| log_write(e.to_string()))?;

        let keys: Vec<_> = self
            .log_tree
            .range(..=Self::log_key(log_id.index))
            .filter_map(|r| r.ok().map(|(k, _)| k))
            .collect();
        self.remove_keys(keys)
    }

    async fn last_applied_state(
        &mut self,
    ) -> Result<
        (
            Option<LogId<NodeIdType>>,
            StoredMembership<NodeIdType, MetaNode>,
        ),
        StorageError<NodeIdType>,
    > {
        Ok((self.read_bincode(KEY_LAST_APPLIED), self.get_membership()))
    }

    async fn apply_to_state_machine(
        &mut self,
        entries: &[Entry<TypeConfig>],
    ) -> Result<Vec<()>, StorageError<NodeIdType>> {
        let mut results = Vec::with_capacity(entries.len());

        for entry in entries {
            self.write_bincode(KEY_LAST_APPLIED, &entry.log_id)
                .map_err(|e| sm_write(e.to_string()))?;

            match &entry.payload {
                EntryPayload::Blank => {}
                EntryPayload::Normal(cmd) => self.state.apply(cmd),
                EntryPayload::Membership(mem) => {
                    let membership = StoredMembership::new(Some(entry.log_id), mem.clone());
                    self.set_membership(&membership)
                        .map_err(|e| sm_write(e.to_string()))?;
                }
            }
            self.state.set_last_applied(entry.log_id.index);
            results.push(());
        }

        self.save_state_snapshot()
            .map_err(|e| sm_write(e.to_string()))?;

        Ok(results)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        self.shallow_clone()
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<Box<Cursor<Vec<u8>>>, StorageError<NodeIdType>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<NodeIdType, MetaNode>,
        snapshot: Box<Cursor<Vec<u8>>>,
    ) -> Result<(), StorageError<NodeIdType>> {
        let restored: MetadataState =
            serde_json::from_slice(&snapshot.into_inner()).map_err(|e| {
                io_err(
                    ErrorSubject::Snapshot(Some(meta.signature())),
                    ErrorVerb::Read,
                    e,
                )
            })?;

        self.state.restore(restored);

        if let Some(log_id) = meta.last_log_id {
            self.write_bincode(KEY_LAST_APPLIED, &log_id)
                .map_err(|e| sm_write(e.to_string()))?;
        }

        self.set_membership(&meta.last_membership)
            .map_err(|e| sm_write(e.to_string()))?;
        self.save_state_snapshot()
            .map_err(|e| sm_write(e.to_string()))?;

        Ok(())
    }

    async fn get_current_snapshot(
        &mut self,
    ) -> Result<Option<Snapshot<TypeConfig>>, StorageError<NodeIdType>> {
        Ok(None)
    }
}

pub type SledAdaptorLogStore = Adaptor<TypeConfig, SledStorage>;
pub type SledAdaptorStateMachine = Adaptor<TypeConfig, SledStorage>;

pub fn create_storage<P: AsRef<Path>>(
    path: P,
    state: SharedState,
) -> Result<(SledAdaptorLogStore, SledAdaptorStateMachine)> {
    let storage = SledStorage::new(path, state)?;
    Ok(Adaptor::new(storage))
}
