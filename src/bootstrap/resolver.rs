use crate::bootstrap::ClusterStateReader;
use crate::types::RemoteNodeMap;
use std::collections::HashMap;

/// Resolve every node in `port_by_node` to its Raft address.
///
/// Nodes the reader has no address for are left out; a peer that has not
/// started yet is expected, not an error. Purely local, no network I/O.
pub fn resolve_remote_nodes<R>(reader: &R, port_by_node: &HashMap<String, u16>) -> RemoteNodeMap
where
    R: ClusterStateReader + ?Sized,
{
    port_by_node
        .iter()
        .filter_map(|(name, port)| {
            let addr = reader.node_address(name);
            if addr.is_empty() {
                None
            } else {
                Some((name.clone(), format!("{}:{}", addr, port)))
            }
        })
        .collect()
}
