use crate::bootstrap::JOIN_PATH;
use crate::error::{JoinStatus, PeerJoinError};
use crate::replicator::{RaftReplicator, Replicator, TypeConfig};
use crate::types::{JoinRequest, JoinResponse};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use openraft::raft::{AppendEntriesRequest, InstallSnapshotRequest, VoteRequest};
use std::sync::Arc;
use tracing::{info, warn};

pub fn create_raft_router(replicator: Arc<RaftReplicator>) -> Router {
    Router::new()
        .route("/raft/vote", post(handle_vote))
        .route("/raft/append_entries", post(handle_append_entries))
        .route("/raft/install_snapshot", post(handle_install_snapshot))
        .with_state(replicator)
}

/// Server side of the join RPC. Only the leader admits nodes; followers
/// answer resource-exhausted with the leader's address.
pub fn create_join_router<R: Replicator + 'static>(replicator: Arc<R>) -> Router {
    Router::new()
        .route(JOIN_PATH, post(handle_join::<R>))
        .with_state(replicator)
}

fn rpc_result<T: serde::Serialize, E: std::fmt::Display>(result: Result<T, E>) -> Response {
    match result {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn handle_vote(
    State(replicator): State<Arc<RaftReplicator>>,
    Json(req): Json<VoteRequest<u64>>,
) -> Response {
    rpc_result(replicator.raft().vote(req).await)
}

async fn handle_append_entries(
    State(replicator): State<Arc<RaftReplicator>>,
    Json(req): Json<AppendEntriesRequest<TypeConfig>>,
) -> Response {
    rpc_result(replicator.raft().append_entries(req).await)
}

async fn handle_install_snapshot(
    State(replicator): State<Arc<RaftReplicator>>,
    Json(req): Json<InstallSnapshotRequest<TypeConfig>>,
) -> Response {
    rpc_result(replicator.raft().install_snapshot(req).await)
}

fn reject(err: PeerJoinError) -> Response {
    (err.status.http_status(), Json(err)).into_response()
}

async fn handle_join<R: Replicator>(
    State(replicator): State<Arc<R>>,
    Json(req): Json<JoinRequest>,
) -> Response {
    if req.id.is_empty() || req.address.is_empty() {
        return reject(PeerJoinError::new(
            JoinStatus::InvalidArgument,
            "join request needs both id and address",
        ));
    }

    if !replicator.is_leader() {
        return match replicator.leader_addr() {
            Some(leader) => reject(PeerJoinError::not_leader(leader)),
            None => reject(PeerJoinError::new(
                JoinStatus::Unavailable,
                "no leader elected",
            )),
        };
    }

    info!(node = %req.id, address = %req.address, voter = req.voter, "join request");
    match replicator.add_peer(&req).await {
        Ok(()) => (
            StatusCode::OK,
            Json(JoinResponse {
                leader: replicator.leader_addr(),
            }),
        )
            .into_response(),
        Err(e) => {
            warn!(node = %req.id, error = %e, "join rejected");
            match e.downcast::<PeerJoinError>() {
                Ok(err) => reject(err),
                Err(e) => reject(PeerJoinError::new(JoinStatus::Internal, e.to_string())),
            }
        }
    }
}
