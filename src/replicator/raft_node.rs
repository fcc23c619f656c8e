use crate::bootstrap::ConsensusBootstrap;
use crate::error::{JoinStatus, PeerJoinError};
use crate::replicator::network::MetaNetworkFactory;
use crate::replicator::state_machine::SharedState;
use crate::replicator::storage::{create_storage, raft_node_id, MetaNode, NodeIdType, TypeConfig};
use crate::replicator::Replicator;
use crate::types::*;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use openraft::error::{InitializeError, RaftError};
use openraft::{ChangeMembers, Config, Raft};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub type MetaRaft = Raft<TypeConfig>;

pub struct RaftReplicator {
    node_name: NodeId,
    node_id: NodeIdType,
    raft_addr: String,
    voter: bool,
    admit_timeout: Duration,
    raft: MetaRaft,
    state: SharedState,
}

impl RaftReplicator {
    pub async fn new<P: AsRef<Path>>(
        node_name: NodeId,
        raft_addr: String,
        voter: bool,
        data_dir: P,
        rpc_timeout: Duration,
    ) -> Result<Self> {
        let config = Config {
            heartbeat_interval: 500,
            election_timeout_min: 1500,
            election_timeout_max: 3000,
            ..Default::default()
        };
        let config = Arc::new(config.validate()?);

        let node_id = raft_node_id(&node_name);
        let state = SharedState::new();
        let storage_path = data_dir.as_ref().join("raft");
        std::fs::create_dir_all(&storage_path)?;
        let (log_store, sm_store) = create_storage(&storage_path, state.clone())?;
        let network = MetaNetworkFactory::new(rpc_timeout)?;

        let raft = Raft::new(node_id, config, network, log_store, sm_store).await?;

        info!(
            "Raft node {} ({}) initialized at {} with storage at {:?}",
            node_name, node_id, raft_addr, storage_path
        );

        Ok(Self {
            node_name,
            node_id,
            raft_addr,
            voter,
            admit_timeout: rpc_timeout,
            raft,
            state,
        })
    }

    pub fn raft(&self) -> &MetaRaft {
        &self.raft
    }

    pub fn shared_state(&self) -> &SharedState {
        &self.state
    }

    pub fn local_member(&self) -> MemberRecord {
        MemberRecord {
            node_id: self.node_name.clone(),
            address: self.raft_addr.clone(),
            voter: self.voter,
            joined_at: Utc::now(),
        }
    }

    /// Wait until some node is leader. Returns true if it is this one.
    pub async fn wait_for_leader(&self, timeout: Duration) -> Result<bool> {
        let metrics = self
            .raft
            .wait(Some(timeout))
            .metrics(|m| m.current_leader.is_some(), "leader elected")
            .await?;
        Ok(metrics.current_leader == Some(self.node_id))
    }

    /// Raft node info for `name`, and whether it is a voter.
    pub fn membership_entry(&self, name: &str) -> (Option<MetaNode>, bool) {
        let node_id = raft_node_id(name);
        let metrics = self.raft.metrics().borrow().clone();
        let membership = metrics.membership_config.membership();
        (
            membership.get_node(&node_id).cloned(),
            membership.voter_ids().any(|id| id == node_id),
        )
    }

    async fn admit(&self, request: &JoinRequest) -> Result<()> {
        let node_id = raft_node_id(&request.id);
        let node = MetaNode {
            addr: request.address.clone(),
            name: request.id.clone(),
        };
        let (current, is_voter) = self.membership_entry(&request.id);

        match current {
            None => {
                // Don't wait for the learner to catch up.
                self.raft
                    .add_learner(node_id, node, false)
                    .await
                    .map_err(|e| anyhow!("add learner {} failed: {}", request.id, e))?;
            }
            Some(existing) if existing != node => {
                info!("{} moved from {} to {}", request.id, existing.addr, node.addr);
                let mut nodes = BTreeMap::new();
                nodes.insert(node_id, node);
                self.raft
                    .change_membership(ChangeMembers::SetNodes(nodes), true)
                    .await
                    .map_err(|e| anyhow!("update address of {} failed: {}", request.id, e))?;
            }
            Some(_) => {}
        }

        if request.voter && !is_voter {
            let mut voters = BTreeSet::new();
            voters.insert(node_id);
            self.raft
                .change_membership(ChangeMembers::AddVoterIds(voters), false)
                .await
                .map_err(|e| anyhow!("promote {} to voter failed: {}", request.id, e))?;
        }

        self.apply(MetadataCommand::RegisterMember(MemberRecord {
            node_id: request.id.clone(),
            address: request.address.clone(),
            voter: request.voter,
            joined_at: Utc::now(),
        }))
        .await
    }

    fn leader_node(&self) -> Option<MetaNode> {
        let metrics = self.raft.metrics().borrow().clone();
        let leader = metrics.current_leader?;
        metrics
            .membership_config
            .membership()
            .get_node(&leader)
            .cloned()
    }
}

#[async_trait]
impl ConsensusBootstrap for RaftReplicator {
    async fn bootstrap_self(&self) -> Result<()> {
        let mut members = BTreeMap::new();
        members.insert(
            self.node_id,
            MetaNode {
                addr: self.raft_addr.clone(),
                name: self.node_name.clone(),
            },
        );

        match self.raft.initialize(members).await {
            Ok(()) => {
                info!("Initialized single-node cluster with {}", self.node_name);
                Ok(())
            }
            Err(RaftError::APIError(InitializeError::NotAllowed(_))) => {
                info!("Raft state already initialized, skipping bootstrap");
                Ok(())
            }
            Err(e) => Err(anyhow!("Raft initialize failed: {}", e)),
        }
    }
}

#[async_trait]
impl Replicator for RaftReplicator {
    async fn apply(&self, command: MetadataCommand) -> Result<()> {
        self.raft
            .client_write(command)
            .await
            .map_err(|e| anyhow!("Raft write failed: {}", e))?;
        Ok(())
    }

    fn snapshot(&self) -> ClusterView {
        let metrics = self.raft.metrics().borrow().clone();
        let leader = self.leader_node();
        self.state.to_cluster_view(
            leader.as_ref().map(|n| n.name.clone()),
            leader.map(|n| n.addr),
            metrics.current_term,
        )
    }

    fn is_leader(&self) -> bool {
        let metrics = self.raft.metrics().borrow().clone();
        metrics.current_leader == Some(self.node_id)
    }

    fn leader_addr(&self) -> Option<String> {
        self.leader_node().map(|n| n.addr)
    }

    async fn add_peer(&self, request: &JoinRequest) -> Result<()> {
        match tokio::time::timeout(self.admit_timeout, self.admit(request)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(PeerJoinError::new(
                    JoinStatus::DeadlineExceeded,
                    format!("admitting {} timed out after {:?}", request.id, self.admit_timeout),
                )
                .into())
            }
        }

        info!("Admitted {} at {} (voter={})", request.id, request.address, request.voter);
        Ok(())
    }
}
