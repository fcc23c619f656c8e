mod decision;
mod http_joiner;
mod joiner;
mod resolver;

pub use decision::*;
pub use http_joiner::*;
pub use joiner::*;
pub use resolver::*;

use crate::error::PeerJoinError;
use crate::types::{JoinRequest, JoinResponse};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Read-only view of the cluster members this node currently knows about.
pub trait ClusterStateReader: Send + Sync {
    /// Address of `id`, or an empty string when unknown.
    fn node_address(&self, id: &str) -> String;

    fn node_hostname(&self, id: &str) -> Option<String>;

    fn local_name(&self) -> String;

    /// Every member with a known address, as `host:port`.
    fn all_cluster_members(&self, port: u16) -> HashMap<String, String>;
}

/// Sends one join request to one remote address.
///
/// A call is a single logical attempt even if the implementation retries
/// at the transport level. It must return promptly once `cancel` fires.
#[async_trait]
pub trait PeerJoiner: Send + Sync {
    async fn join(
        &self,
        cancel: &CancellationToken,
        address: &str,
        request: &JoinRequest,
    ) -> Result<JoinResponse, PeerJoinError>;
}

/// Entry point into the consensus layer for founding a single-node cluster.
#[async_trait]
pub trait ConsensusBootstrap: Send + Sync {
    /// Make the local node the sole founding member. Must succeed if the
    /// node is already part of an initialized cluster.
    async fn bootstrap_self(&self) -> anyhow::Result<()>;
}
