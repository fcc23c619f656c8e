#![allow(dead_code)]

use async_trait::async_trait;
use metaraft::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct FakeClusterState {
    pub local: String,
    pub addresses: HashMap<String, String>,
}

impl FakeClusterState {
    pub fn new(local: &str, addresses: &[(&str, &str)]) -> Self {
        Self {
            local: local.to_string(),
            addresses: addresses
                .iter()
                .map(|(id, addr)| (id.to_string(), addr.to_string()))
                .collect(),
        }
    }
}

impl ClusterStateReader for FakeClusterState {
    fn node_address(&self, id: &str) -> String {
        self.addresses.get(id).cloned().unwrap_or_default()
    }

    fn node_hostname(&self, id: &str) -> Option<String> {
        self.addresses.get(id).cloned()
    }

    fn local_name(&self) -> String {
        self.local.clone()
    }

    fn all_cluster_members(&self, port: u16) -> HashMap<String, String> {
        self.addresses
            .iter()
            .filter(|(_, addr)| !addr.is_empty())
            .map(|(id, addr)| (id.clone(), format!("{}:{}", addr, port)))
            .collect()
    }
}

/// Replays a fixed outcome per address and records every call.
#[derive(Default)]
pub struct ScriptedPeerJoiner {
    outcomes: HashMap<String, Result<JoinResponse, PeerJoinError>>,
    delays: HashMap<String, Duration>,
    pub calls: Mutex<Vec<(String, JoinRequest)>>,
}

impl ScriptedPeerJoiner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(mut self, address: &str) -> Self {
        self.outcomes
            .insert(address.to_string(), Ok(JoinResponse::default()));
        self
    }

    pub fn reject(mut self, address: &str, err: PeerJoinError) -> Self {
        self.outcomes.insert(address.to_string(), Err(err));
        self
    }

    pub fn delay(mut self, address: &str, delay: Duration) -> Self {
        self.delays.insert(address.to_string(), delay);
        self
    }

    pub fn called_addresses(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(addr, _)| addr.clone())
            .collect()
    }
}

#[async_trait]
impl PeerJoiner for ScriptedPeerJoiner {
    async fn join(
        &self,
        cancel: &CancellationToken,
        address: &str,
        request: &JoinRequest,
    ) -> Result<JoinResponse, PeerJoinError> {
        self.calls
            .lock()
            .unwrap()
            .push((address.to_string(), request.clone()));

        if let Some(delay) = self.delays.get(address) {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(PeerJoinError::new(JoinStatus::Cancelled, "cancelled"));
                }
                _ = tokio::time::sleep(*delay) => {}
            }
        }

        self.outcomes.get(address).cloned().unwrap_or_else(|| {
            Err(PeerJoinError::new(
                JoinStatus::Unavailable,
                format!("connection refused: {}", address),
            ))
        })
    }
}

#[derive(Default)]
pub struct CountingConsensus {
    pub bootstraps: AtomicUsize,
    pub fail: bool,
}

impl CountingConsensus {
    pub fn count(&self) -> usize {
        self.bootstraps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConsensusBootstrap for CountingConsensus {
    async fn bootstrap_self(&self) -> anyhow::Result<()> {
        self.bootstraps.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("storage unavailable");
        }
        Ok(())
    }
}

pub fn plain_error(msg: &str) -> PeerJoinError {
    PeerJoinError::new(JoinStatus::Unavailable, msg)
}

pub fn nodes(entries: &[(&str, &str)]) -> RemoteNodeMap {
    entries
        .iter()
        .map(|(id, addr)| (id.to_string(), addr.to_string()))
        .collect()
}
