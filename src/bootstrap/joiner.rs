use crate::bootstrap::PeerJoiner;
use crate::error::{JoinError, JoinFailure, JoinStatus, PeerJoinError};
use crate::types::{JoinRequest, JoinResponse, NodeId, RemoteNodeMap};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

/// Pause between two candidates. Gives peers that are still starting up,
/// and the transport's own retries, a moment before the next attempt.
pub const DEFAULT_JOIN_BACKOFF: Duration = Duration::from_millis(50);

pub struct Joiner<P> {
    peer_joiner: P,
    local_node_id: NodeId,
    local_raft_addr: String,
    voter: bool,
    backoff: Duration,
}

impl<P: PeerJoiner> Joiner<P> {
    pub fn new(
        peer_joiner: P,
        local_node_id: impl Into<NodeId>,
        local_raft_addr: impl Into<String>,
        voter: bool,
    ) -> Self {
        Self {
            peer_joiner,
            local_node_id: local_node_id.into(),
            local_raft_addr: local_raft_addr.into(),
            voter,
            backoff: DEFAULT_JOIN_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn peer_joiner(&self) -> &P {
        &self.peer_joiner
    }

    pub fn local_node_id(&self) -> &str {
        &self.local_node_id
    }

    pub fn local_raft_addr(&self) -> &str {
        &self.local_raft_addr
    }

    /// Try every node in `remote_nodes` (except this one) until one of them
    /// lets us in, following leader redirects on the way.
    ///
    /// Returns the address of the node that accepted the join.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        remote_nodes: &RemoteNodeMap,
    ) -> Result<String, JoinError> {
        let span = info_span!(
            "raft.bootstrap.join",
            op = "join",
            servers = ?remote_nodes
        );
        self.join_any(cancel, remote_nodes).instrument(span).await
    }

    async fn join_any(
        &self,
        cancel: &CancellationToken,
        remote_nodes: &RemoteNodeMap,
    ) -> Result<String, JoinError> {
        let request = JoinRequest {
            id: self.local_node_id.clone(),
            address: self.local_raft_addr.clone(),
            voter: self.voter,
        };

        let mut failures = Vec::new();
        let mut attempted = 0usize;

        for (name, addr) in remote_nodes {
            if *name == self.local_node_id {
                continue;
            }

            if attempted > 0 {
                self.wait_backoff(cancel).await?;
            }
            attempted += 1;

            info!(node = %name, address = %addr, "attempting to join");

            let err = match self.join_peer(cancel, addr, &request).await {
                Ok(_) => return Ok(addr.clone()),
                Err(err) => err,
            };
            if cancel.is_cancelled() {
                return Err(JoinError::Cancelled);
            }

            match err.redirect().map(str::to_string) {
                Some(leader) if leader != self.local_raft_addr => {
                    info!(leader = %leader, "attempting to join leader");
                    match self.join_peer(cancel, &leader, &request).await {
                        Ok(_) => return Ok(leader),
                        Err(leader_err) => {
                            if cancel.is_cancelled() {
                                return Err(JoinError::Cancelled);
                            }
                            info!(
                                leader = %leader,
                                error = %leader_err,
                                "attempted to follow to leader and failed"
                            );
                            failures.push(JoinFailure::Leader {
                                address: leader,
                                error: leader_err,
                            });
                        }
                    }
                }
                _ => {
                    warn!(node = %name, address = %addr, error = %err, "join attempt failed");
                    failures.push(JoinFailure::Peer {
                        name: name.clone(),
                        address: addr.clone(),
                        error: err,
                    });
                }
            }
        }

        if attempted == 0 {
            return Err(JoinError::NoCandidates {
                candidates: remote_nodes.clone(),
            });
        }

        Err(JoinError::Exhausted {
            candidates: remote_nodes.clone(),
            failures,
        })
    }

    async fn join_peer(
        &self,
        cancel: &CancellationToken,
        address: &str,
        request: &JoinRequest,
    ) -> Result<JoinResponse, PeerJoinError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(PeerJoinError::new(JoinStatus::Cancelled, "join cancelled"))
            }
            result = self.peer_joiner.join(cancel, address, request) => result,
        }
    }

    async fn wait_backoff(&self, cancel: &CancellationToken) -> Result<(), JoinError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(JoinError::Cancelled),
            _ = tokio::time::sleep(self.backoff) => Ok(()),
        }
    }
}
