mod network;
mod raft_node;
mod state_machine;
mod storage;

pub use network::*;
pub use raft_node::*;
pub use state_machine::*;
pub use storage::*;

use crate::types::*;
use async_trait::async_trait;

#[async_trait]
pub trait Replicator: Send + Sync {
    async fn apply(&self, command: MetadataCommand) -> anyhow::Result<()>;
    fn snapshot(&self) -> ClusterView;
    fn is_leader(&self) -> bool;
    fn leader_addr(&self) -> Option<String>;
    /// Admit the node described by `request`. Only valid on the leader.
    async fn add_peer(&self, request: &JoinRequest) -> anyhow::Result<()>;
}
