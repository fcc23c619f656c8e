pub mod api;
pub mod bootstrap;
pub mod config;
pub mod daemon;
pub mod error;
pub mod membership;
pub mod raft_api;
pub mod replicator;
pub mod types;

pub use api::create_router;
pub use bootstrap::{
    decide, resolve_remote_nodes, BootstrapDecision, BootstrapOutcome, Bootstrapper,
    ClusterStateReader, ConsensusBootstrap, HttpPeerJoiner, Joiner, PeerJoiner,
};
pub use config::NodeConfig;
pub use daemon::MetaDaemon;
pub use error::*;
pub use membership::MemberList;
pub use raft_api::{create_join_router, create_raft_router};
pub use replicator::{RaftReplicator, Replicator};
pub use types::*;
