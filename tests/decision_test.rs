mod common;

use common::*;
use metaraft::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const LOCAL_ID: &str = "node1";
const LOCAL_ADDR: &str = "172.18.0.4:8300";

#[test]
fn test_decide_empty_set_bootstraps() {
    assert_eq!(
        decide(LOCAL_ID, LOCAL_ADDR, RemoteNodeMap::new()),
        BootstrapDecision::Bootstrap
    );
}

#[test]
fn test_decide_only_self_bootstraps() {
    let remote = nodes(&[(LOCAL_ID, LOCAL_ADDR)]);
    assert_eq!(decide(LOCAL_ID, LOCAL_ADDR, remote), BootstrapDecision::Bootstrap);
}

#[test]
fn test_decide_single_entry_with_own_address_bootstraps() {
    let remote = nodes(&[("alias", LOCAL_ADDR)]);
    assert_eq!(decide(LOCAL_ID, LOCAL_ADDR, remote), BootstrapDecision::Bootstrap);
}

#[test]
fn test_decide_single_remote_joins() {
    let remote = nodes(&[("node2", "172.18.0.5:8300")]);
    assert_eq!(
        decide(LOCAL_ID, LOCAL_ADDR, remote.clone()),
        BootstrapDecision::Join(remote)
    );
}

#[test]
fn test_decide_self_plus_peers_joins_with_full_set() {
    let remote = nodes(&[(LOCAL_ID, LOCAL_ADDR), ("node2", "172.18.0.5:8300")]);
    assert_eq!(
        decide(LOCAL_ID, LOCAL_ADDR, remote.clone()),
        BootstrapDecision::Join(remote)
    );
}

fn bootstrapper(
    reader: FakeClusterState,
    port_by_node: &[(&str, u16)],
    peer_joiner: ScriptedPeerJoiner,
    consensus: Arc<CountingConsensus>,
) -> Bootstrapper<FakeClusterState, ScriptedPeerJoiner, CountingConsensus> {
    let port_by_node: HashMap<String, u16> = port_by_node
        .iter()
        .map(|(id, port)| (id.to_string(), *port))
        .collect();
    let joiner = Joiner::new(peer_joiner, LOCAL_ID, LOCAL_ADDR, true)
        .with_backoff(Duration::from_millis(1));
    Bootstrapper::new(Arc::new(reader), port_by_node, joiner, consensus)
}

#[tokio::test]
async fn test_single_node_bootstraps_without_join_rpc() {
    let consensus = Arc::new(CountingConsensus::default());
    let boot = bootstrapper(
        FakeClusterState::new(LOCAL_ID, &[(LOCAL_ID, "172.18.0.4")]),
        &[(LOCAL_ID, 8300)],
        ScriptedPeerJoiner::new().accept(LOCAL_ADDR),
        consensus.clone(),
    );

    let outcome = boot.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome, BootstrapOutcome::Bootstrapped);
    assert_eq!(consensus.count(), 1);
}

#[tokio::test]
async fn test_unresolvable_peers_bootstrap() {
    let consensus = Arc::new(CountingConsensus::default());
    let boot = bootstrapper(
        FakeClusterState::new(LOCAL_ID, &[(LOCAL_ID, "172.18.0.4"), ("node2", "")]),
        &[(LOCAL_ID, 8300), ("node2", 8300)],
        ScriptedPeerJoiner::new(),
        consensus.clone(),
    );

    let outcome = boot.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome, BootstrapOutcome::Bootstrapped);
    assert_eq!(consensus.count(), 1);
}

#[tokio::test]
async fn test_multi_node_joins_existing_leader() {
    let consensus = Arc::new(CountingConsensus::default());
    let boot = bootstrapper(
        FakeClusterState::new(
            LOCAL_ID,
            &[(LOCAL_ID, "172.18.0.4"), ("node2", "172.18.0.5"), ("node3", "172.18.0.6")],
        ),
        &[(LOCAL_ID, 8300), ("node2", 8300), ("node3", 8300)],
        ScriptedPeerJoiner::new()
            .reject("172.18.0.5:8300", PeerJoinError::not_leader("172.18.0.6:8300"))
            .accept("172.18.0.6:8300"),
        consensus.clone(),
    );

    let outcome = boot.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(
        outcome,
        BootstrapOutcome::Joined {
            leader: "172.18.0.6:8300".to_string()
        }
    );
    assert_eq!(consensus.count(), 0);
}

#[tokio::test]
async fn test_retries_then_fails_loudly() {
    let consensus = Arc::new(CountingConsensus::default());
    let boot = bootstrapper(
        FakeClusterState::new(LOCAL_ID, &[(LOCAL_ID, "172.18.0.4"), ("node2", "172.18.0.5")]),
        &[(LOCAL_ID, 8300), ("node2", 8300)],
        ScriptedPeerJoiner::new().reject("172.18.0.5:8300", plain_error("connection refused")),
        consensus.clone(),
    )
    .with_retries(3, Duration::from_millis(1));

    let err = boot.run(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, BootstrapError::Join(JoinError::Exhausted { .. })));
    assert!(err.to_string().contains("node2(172.18.0.5:8300)"));
    assert_eq!(consensus.count(), 0);
}

#[tokio::test]
async fn test_consensus_failure_is_reported() {
    let consensus = Arc::new(CountingConsensus {
        fail: true,
        ..Default::default()
    });
    let boot = bootstrapper(
        FakeClusterState::new(LOCAL_ID, &[]),
        &[(LOCAL_ID, 8300)],
        ScriptedPeerJoiner::new(),
        consensus.clone(),
    );

    let err = boot.run(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, BootstrapError::Consensus(_)));
    assert!(!err.is_cancelled());
}

#[tokio::test]
async fn test_cancelled_bootstrap_does_not_retry() {
    let consensus = Arc::new(CountingConsensus::default());
    let boot = bootstrapper(
        FakeClusterState::new(LOCAL_ID, &[(LOCAL_ID, "172.18.0.4"), ("node2", "172.18.0.5")]),
        &[(LOCAL_ID, 8300), ("node2", 8300)],
        ScriptedPeerJoiner::new().reject("172.18.0.5:8300", plain_error("down")),
        consensus,
    )
    .with_retries(5, Duration::from_secs(30));

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = boot.run(&cancel).await.unwrap_err();

    assert!(err.is_cancelled());
}
