use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type NodeId = String;

/// Node id -> dialable Raft address (`host:port`).
///
/// Built fresh for every bootstrap attempt. Iteration order is the key
/// order, which keeps join attempts reproducible.
pub type RemoteNodeMap = BTreeMap<NodeId, String>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinRequest {
    pub id: NodeId,
    pub address: String,
    pub voter: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct JoinResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberRecord {
    pub node_id: NodeId,
    pub address: String,
    pub voter: bool,
    pub joined_at: DateTime<Utc>,
}

impl MemberRecord {
    /// Host part of the Raft address, without the port.
    pub fn host(&self) -> &str {
        match self.address.rsplit_once(':') {
            Some((host, _)) => host,
            None => &self.address,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MetadataCommand {
    RegisterMember(MemberRecord),
    Put { key: String, value: serde_json::Value },
    Delete { key: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterView {
    pub members: Vec<MemberRecord>,
    pub entries: BTreeMap<String, serde_json::Value>,
    pub leader_id: Option<NodeId>,
    pub leader_addr: Option<String>,
    pub term: u64,
}

impl ClusterView {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
            entries: BTreeMap::new(),
            leader_id: None,
            leader_addr: None,
            term: 0,
        }
    }

    pub fn member_by_id(&self, id: &str) -> Option<&MemberRecord> {
        self.members.iter().find(|m| m.node_id == id)
    }

    pub fn voters(&self) -> Vec<&MemberRecord> {
        self.members.iter().filter(|m| m.voter).collect()
    }
}

impl Default for ClusterView {
    fn default() -> Self {
        Self::new()
    }
}
