use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetadataState {
    pub members: BTreeMap<NodeId, MemberRecord>,
    pub entries: BTreeMap<String, serde_json::Value>,
    pub last_applied_index: u64,
}

impl MetadataState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, command: &MetadataCommand) {
        match command {
            MetadataCommand::RegisterMember(record) => {
                // Keep the original join time when a member re-registers.
                let joined_at = self
                    .members
                    .get(&record.node_id)
                    .map(|m| m.joined_at)
                    .unwrap_or(record.joined_at);
                self.members.insert(
                    record.node_id.clone(),
                    MemberRecord {
                        joined_at,
                        ..record.clone()
                    },
                );
            }
            MetadataCommand::Put { key, value } => {
                self.entries.insert(key.clone(), value.clone());
            }
            MetadataCommand::Delete { key } => {
                self.entries.remove(key);
            }
        }
    }

    pub fn to_cluster_view(
        &self,
        leader_id: Option<NodeId>,
        leader_addr: Option<String>,
        term: u64,
    ) -> ClusterView {
        ClusterView {
            members: self.members.values().cloned().collect(),
            entries: self.entries.clone(),
            leader_id,
            leader_addr,
            term,
        }
    }
}

#[derive(Clone)]
pub struct SharedState {
    inner: Arc<RwLock<MetadataState>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetadataState::new())),
        }
    }

    pub fn apply(&self, command: &MetadataCommand) {
        let mut state = self.inner.write().unwrap();
        state.apply(command);
    }

    pub fn snapshot(&self) -> MetadataState {
        self.inner.read().unwrap().clone()
    }

    pub fn to_cluster_view(
        &self,
        leader_id: Option<NodeId>,
        leader_addr: Option<String>,
        term: u64,
    ) -> ClusterView {
        self.inner
            .read()
            .unwrap()
            .to_cluster_view(leader_id, leader_addr, term)
    }

    pub fn members(&self) -> Vec<MemberRecord> {
        self.inner.read().unwrap().members.values().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.read().unwrap().entries.get(key).cloned()
    }

    pub fn set_last_applied(&self, index: u64) {
        self.inner.write().unwrap().last_applied_index = index;
    }

    pub fn last_applied(&self) -> u64 {
        self.inner.read().unwrap().last_applied_index
    }

    pub fn restore(&self, state: MetadataState) {
        *self.inner.write().unwrap() = state;
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
