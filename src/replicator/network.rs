use crate::replicator::storage::{MetaNode, NodeIdType, TypeConfig};
use openraft::error::{InstallSnapshotError, NetworkError, RPCError, RaftError, Unreachable};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use std::time::Duration;

/// Hands out HTTP clients for Raft RPCs. All clients share one connection
/// pool.
#[derive(Clone)]
pub struct MetaNetworkFactory {
    client: reqwest::Client,
}

impl MetaNetworkFactory {
    pub fn new(rpc_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(rpc_timeout).build()?;
        Ok(Self { client })
    }
}

pub struct MetaNetwork {
    target: NodeIdType,
    target_addr: String,
    client: reqwest::Client,
}

impl MetaNetwork {
    async fn send_rpc<Req, Resp, E>(
        &self,
        path: &str,
        req: &Req,
    ) -> Result<Resp, RPCError<NodeIdType, MetaNode, RaftError<NodeIdType, E>>>
    where
        Req: serde::Serialize,
        Resp: serde::de::DeserializeOwned,
        E: std::error::Error,
    {
        let url = format!("http://{}/raft/{}", self.target_addr, path);

        let response = self
            .client
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    RPCError::Unreachable(Unreachable::new(&e))
                } else {
                    RPCError::Network(NetworkError::new(&e))
                }
            })?;

        if !response.status().is_success() {
            tracing::debug!(peer = self.target, path, status = %response.status(), "raft rpc rejected");
            return Err(RPCError::Network(NetworkError::new(&std::io::Error::other(
                format!("HTTP error: {}", response.status()),
            ))));
        }

        response
            .json()
            .await
            .map_err(|e| RPCError::Network(NetworkError::new(&e)))
    }
}

impl RaftNetworkFactory<TypeConfig> for MetaNetworkFactory {
    type Network = MetaNetwork;

    async fn new_client(&mut self, target: NodeIdType, node: &MetaNode) -> Self::Network {
        MetaNetwork {
            target,
            target_addr: node.addr.clone(),
            client: self.client.clone(),
        }
    }
}

impl RaftNetwork<TypeConfig> for MetaNetwork {
    async fn append_entries(
        &mut self,
        req: AppendEntriesRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<AppendEntriesResponse<NodeIdType>, RPCError<NodeIdType, MetaNode, RaftError<NodeIdType>>>
    {
        self.send_rpc("append_entries", &req).await
    }

    async fn install_snapshot(
        &mut self,
        req: InstallSnapshotRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<
        InstallSnapshotResponse<NodeIdType>,
        RPCError<NodeIdType, MetaNode, RaftError<NodeIdType, InstallSnapshotError>>,
    > {
        self.send_rpc("install_snapshot", &req).await
    }

    async fn vote(
        &mut self,
        req: VoteRequest<NodeIdType>,
        _option: RPCOption,
    ) -> Result<VoteResponse<NodeIdType>, RPCError<NodeIdType, MetaNode, RaftError<NodeIdType>>> {
        self.send_rpc("vote", &req).await
    }
}
