use crate::bootstrap::{BootstrapOutcome, Bootstrapper, HttpPeerJoiner, Joiner};
use crate::config::NodeConfig;
use crate::membership::MemberList;
use crate::replicator::{RaftReplicator, Replicator};
use crate::types::*;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const LEADER_WAIT: Duration = Duration::from_secs(10);

pub struct MetaDaemon {
    node_id: NodeId,
    config: NodeConfig,
    members: Arc<MemberList>,
    replicator: Arc<RaftReplicator>,
    shutdown: CancellationToken,
}

impl MetaDaemon {
    pub async fn new(config: NodeConfig) -> Result<Self> {
        let node_id = config.effective_node_id();
        let hostname = config.effective_hostname();

        info!("Initializing MetaDaemon node_id={} hostname={}", node_id, hostname);

        std::fs::create_dir_all(&config.data_dir)?;

        let replicator = Arc::new(
            RaftReplicator::new(
                node_id.clone(),
                config.raft_addr(),
                config.voter,
                &config.data_dir,
                config.bootstrap.rpc_timeout(),
            )
            .await?,
        );

        let members = Arc::new(MemberList::new(node_id.clone(), hostname));
        for peer in &config.peers {
            members.upsert(peer.node_id.clone(), peer.hostname.clone());
        }

        Ok(Self {
            node_id,
            config,
            members,
            replicator,
            shutdown: CancellationToken::new(),
        })
    }

    /// Join an existing cluster or found a new one. Fails once every
    /// attempt is used up so the process exits instead of hanging.
    pub async fn bootstrap(&self) -> Result<BootstrapOutcome> {
        let settings = &self.config.bootstrap;
        let joiner = Joiner::new(
            HttpPeerJoiner::new(settings.rpc_timeout())?,
            self.node_id.clone(),
            self.config.raft_addr(),
            self.config.voter,
        )
        .with_backoff(settings.join_backoff());

        let bootstrapper = Bootstrapper::new(
            self.members.clone(),
            self.config.port_by_node(),
            joiner,
            self.replicator.clone(),
        )
        .with_retries(settings.max_attempts, settings.retry_interval());

        let outcome = bootstrapper.run(&self.shutdown).await?;
        if outcome == BootstrapOutcome::Bootstrapped {
            self.register_self().await?;
        }
        Ok(outcome)
    }

    async fn register_self(&self) -> Result<()> {
        if !self.replicator.wait_for_leader(LEADER_WAIT).await? {
            info!("Another node leads the cluster, not registering self");
            return Ok(());
        }

        let local = self.replicator.local_member();
        let view = self.replicator.snapshot();
        if let Some(existing) = view.member_by_id(&self.node_id) {
            if existing.address == local.address && existing.voter == local.voter {
                debug!("Already registered as {}", local.address);
                return Ok(());
            }
        }

        self.replicator
            .apply(MetadataCommand::RegisterMember(local))
            .await?;
        info!("Registered node {} in cluster", self.node_id);
        Ok(())
    }

    pub async fn run(&self) -> Result<()> {
        info!("Starting MetaDaemon...");

        match self.bootstrap().await {
            Ok(BootstrapOutcome::Bootstrapped) => info!("Founded cluster as {}", self.node_id),
            Ok(BootstrapOutcome::Joined { leader }) => info!("Joined cluster via {}", leader),
            Err(_) if self.shutdown.is_cancelled() => return Ok(()),
            Err(e) => return Err(e),
        }

        let refresh_handle = self.spawn_membership_refresh_loop();

        tokio::select! {
            _ = refresh_handle => {
                error!("Membership refresh loop exited unexpectedly");
            }
            _ = self.shutdown.cancelled() => {
                info!("Shutdown signal received");
            }
        }

        Ok(())
    }

    fn spawn_membership_refresh_loop(&self) -> tokio::task::JoinHandle<()> {
        let replicator = self.replicator.clone();
        let members = self.members.clone();
        let interval = self.config.membership_refresh_secs.max(1);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let changed = members.sync_from(&replicator.shared_state().members());
                        if changed > 0 {
                            debug!("Membership view updated ({} changes, {} known)", changed, members.len());
                        }
                    }
                    _ = shutdown.cancelled() => {
                        break;
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn replicator(&self) -> &Arc<RaftReplicator> {
        &self.replicator
    }

    pub fn members(&self) -> &Arc<MemberList> {
        &self.members
    }
}
