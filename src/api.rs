use crate::bootstrap::ClusterStateReader;
use crate::daemon::MetaDaemon;
use crate::replicator::Replicator;
use crate::types::*;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

pub fn create_router(daemon: Arc<MetaDaemon>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/members", get(list_members))
        .route(
            "/metadata/:key",
            get(get_entry).put(put_entry).delete(delete_entry),
        )
        .with_state(daemon)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Serialize)]
struct StatusResponse {
    node_id: String,
    is_leader: bool,
    leader_id: Option<String>,
    leader_addr: Option<String>,
    term: u64,
    cluster_size: usize,
    known_peers: usize,
}

async fn get_status(State(daemon): State<Arc<MetaDaemon>>) -> impl IntoResponse {
    let view = daemon.replicator().snapshot();

    Json(StatusResponse {
        node_id: daemon.node_id().to_string(),
        is_leader: daemon.replicator().is_leader(),
        leader_id: view.leader_id,
        leader_addr: view.leader_addr,
        term: view.term,
        cluster_size: view.members.len(),
        known_peers: daemon.members().all_cluster_members(0).len(),
    })
}

async fn list_members(State(daemon): State<Arc<MetaDaemon>>) -> impl IntoResponse {
    Json(daemon.replicator().snapshot().members)
}

async fn get_entry(
    State(daemon): State<Arc<MetaDaemon>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match daemon.replicator().shared_state().get(&key) {
        Some(value) => (StatusCode::OK, Json(value)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("no entry for {}", key) })),
        )
            .into_response(),
    }
}

async fn put_entry(
    State(daemon): State<Arc<MetaDaemon>>,
    Path(key): Path<String>,
    Json(value): Json<serde_json::Value>,
) -> impl IntoResponse {
    write_command(&daemon, MetadataCommand::Put { key, value }).await
}

async fn delete_entry(
    State(daemon): State<Arc<MetaDaemon>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    write_command(&daemon, MetadataCommand::Delete { key }).await
}

async fn write_command(daemon: &MetaDaemon, command: MetadataCommand) -> axum::response::Response {
    if !daemon.replicator().is_leader() {
        return (
            StatusCode::MISDIRECTED_REQUEST,
            Json(serde_json::json!({
                "error": "not the leader",
                "leader": daemon.replicator().leader_addr(),
            })),
        )
            .into_response();
    }

    match daemon.replicator().apply(command).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
