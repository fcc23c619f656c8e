use crate::bootstrap::ClusterStateReader;
use crate::types::{MemberRecord, NodeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Live, process-wide map of node id -> hostname.
///
/// Seeded from configuration and refreshed from the replicated member list;
/// the bootstrap code only ever reads it through `ClusterStateReader`.
#[derive(Clone)]
pub struct MemberList {
    local_name: NodeId,
    hosts: Arc<RwLock<HashMap<NodeId, String>>>,
}

impl MemberList {
    pub fn new(local_name: impl Into<NodeId>, local_host: impl Into<String>) -> Self {
        let local_name = local_name.into();
        let mut hosts = HashMap::new();
        hosts.insert(local_name.clone(), local_host.into());
        Self {
            local_name,
            hosts: Arc::new(RwLock::new(hosts)),
        }
    }

    pub fn upsert(&self, node_id: impl Into<NodeId>, host: impl Into<String>) {
        self.hosts.write().unwrap().insert(node_id.into(), host.into());
    }

    /// Merge replicated member records. Hosts of known nodes are updated,
    /// nothing is removed: a peer missing from the log may still be joining.
    pub fn sync_from(&self, members: &[MemberRecord]) -> usize {
        let mut hosts = self.hosts.write().unwrap();
        let mut changed = 0;
        for member in members {
            let host = member.host();
            if host.is_empty() {
                continue;
            }
            if hosts.get(&member.node_id).map(String::as_str) != Some(host) {
                hosts.insert(member.node_id.clone(), host.to_string());
                changed += 1;
            }
        }
        changed
    }

    pub fn len(&self) -> usize {
        self.hosts.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ClusterStateReader for MemberList {
    fn node_address(&self, id: &str) -> String {
        self.hosts.read().unwrap().get(id).cloned().unwrap_or_default()
    }

    fn node_hostname(&self, id: &str) -> Option<String> {
        self.hosts.read().unwrap().get(id).cloned()
    }

    fn local_name(&self) -> String {
        self.local_name.clone()
    }

    fn all_cluster_members(&self, port: u16) -> HashMap<String, String> {
        self.hosts
            .read()
            .unwrap()
            .iter()
            .filter(|(_, host)| !host.is_empty())
            .map(|(id, host)| (id.clone(), format!("{}:{}", host, port)))
            .collect()
    }
}
