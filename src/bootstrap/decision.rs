use crate::bootstrap::{resolve_remote_nodes, ClusterStateReader, ConsensusBootstrap, Joiner, PeerJoiner};
use crate::error::{BootstrapError, JoinError};
use crate::types::RemoteNodeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapDecision {
    /// Nobody else to talk to: found a single-node cluster locally.
    Bootstrap,
    /// Hand these candidates to the joiner.
    Join(RemoteNodeMap),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Bootstrapped,
    Joined { leader: String },
}

/// Pick between founding a new cluster and joining an existing one.
///
/// An empty candidate set, or one whose only entry is this node, must never
/// reach the join RPC: a lone node asked to join itself cannot apply it.
pub fn decide(local_id: &str, local_addr: &str, remote_nodes: RemoteNodeMap) -> BootstrapDecision {
    if remote_nodes.is_empty() {
        return BootstrapDecision::Bootstrap;
    }

    if remote_nodes.len() == 1 {
        if let Some((id, addr)) = remote_nodes.iter().next() {
            if addr == local_addr || id == local_id {
                return BootstrapDecision::Bootstrap;
            }
        }
    }

    BootstrapDecision::Join(remote_nodes)
}

pub struct Bootstrapper<R, P, C> {
    reader: Arc<R>,
    port_by_node: HashMap<String, u16>,
    joiner: Joiner<P>,
    consensus: Arc<C>,
    max_attempts: u32,
    retry_interval: Duration,
}

impl<R, P, C> Bootstrapper<R, P, C>
where
    R: ClusterStateReader,
    P: PeerJoiner,
    C: ConsensusBootstrap,
{
    pub fn new(
        reader: Arc<R>,
        port_by_node: HashMap<String, u16>,
        joiner: Joiner<P>,
        consensus: Arc<C>,
    ) -> Self {
        Self {
            reader,
            port_by_node,
            joiner,
            consensus,
            max_attempts: 1,
            retry_interval: Duration::from_secs(1),
        }
    }

    pub fn with_retries(mut self, max_attempts: u32, retry_interval: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_interval = retry_interval;
        self
    }

    /// Run the startup protocol until this node is part of a cluster, the
    /// attempts run out, or `cancel` fires.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<BootstrapOutcome, BootstrapError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(cancel).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_cancelled() || attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    warn!(attempt, max_attempts = self.max_attempts, error = %e, "bootstrap attempt failed");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(JoinError::Cancelled.into()),
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }
    }

    async fn attempt(&self, cancel: &CancellationToken) -> Result<BootstrapOutcome, BootstrapError> {
        // Addresses can move between attempts, so resolve every time.
        let remote_nodes = resolve_remote_nodes(self.reader.as_ref(), &self.port_by_node);

        match decide(
            self.joiner.local_node_id(),
            self.joiner.local_raft_addr(),
            remote_nodes,
        ) {
            BootstrapDecision::Bootstrap => {
                info!(
                    node = %self.joiner.local_node_id(),
                    "no remote nodes to join, bootstrapping single-node cluster"
                );
                self.consensus
                    .bootstrap_self()
                    .await
                    .map_err(BootstrapError::Consensus)?;
                Ok(BootstrapOutcome::Bootstrapped)
            }
            BootstrapDecision::Join(remote_nodes) => {
                let leader = self.joiner.run(cancel, &remote_nodes).await?;
                info!(leader = %leader, "joined cluster");
                Ok(BootstrapOutcome::Joined { leader })
            }
        }
    }
}
