mod common;

use common::*;
use metaraft::*;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const LOCAL_ID: &str = "node1";
const LOCAL_ADDR: &str = "10.0.0.1:8300";

fn joiner(peer_joiner: ScriptedPeerJoiner) -> Joiner<ScriptedPeerJoiner> {
    Joiner::new(peer_joiner, LOCAL_ID, LOCAL_ADDR, true).with_backoff(Duration::from_millis(1))
}

#[tokio::test]
async fn test_first_successful_candidate_short_circuits() {
    let joiner = joiner(
        ScriptedPeerJoiner::new()
            .accept("10.0.0.2:8300")
            .accept("10.0.0.3:8300"),
    );
    let remote = nodes(&[("peerA", "10.0.0.2:8300"), ("peerB", "10.0.0.3:8300")]);

    let leader = joiner.run(&CancellationToken::new(), &remote).await.unwrap();

    assert_eq!(leader, "10.0.0.2:8300");
    assert_eq!(joiner_calls(&joiner), vec!["10.0.0.2:8300"]);
}

#[tokio::test]
async fn test_local_node_is_never_a_join_target() {
    let joiner = joiner(ScriptedPeerJoiner::new().accept(LOCAL_ADDR).accept("10.0.0.2:8300"));
    let remote = nodes(&[(LOCAL_ID, LOCAL_ADDR), ("peerA", "10.0.0.2:8300")]);

    let leader = joiner.run(&CancellationToken::new(), &remote).await.unwrap();

    assert_eq!(leader, "10.0.0.2:8300");
    assert!(!joiner_calls(&joiner).contains(&LOCAL_ADDR.to_string()));
}

#[tokio::test]
async fn test_join_request_is_built_from_local_identity() {
    let joiner = Joiner::new(
        ScriptedPeerJoiner::new()
            .reject("10.0.0.2:8300", plain_error("boom"))
            .accept("10.0.0.3:8300"),
        LOCAL_ID,
        LOCAL_ADDR,
        false,
    )
    .with_backoff(Duration::from_millis(1));
    let remote = nodes(&[("peerA", "10.0.0.2:8300"), ("peerB", "10.0.0.3:8300")]);

    joiner.run(&CancellationToken::new(), &remote).await.unwrap();

    let expected = JoinRequest {
        id: LOCAL_ID.to_string(),
        address: LOCAL_ADDR.to_string(),
        voter: false,
    };
    let calls = joiner_requests(&joiner);
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|req| *req == expected));
}

#[tokio::test]
async fn test_follows_leader_hint_before_next_candidate() {
    let joiner = joiner(
        ScriptedPeerJoiner::new()
            .reject("10.0.0.2:8300", PeerJoinError::not_leader("10.0.0.9:8300"))
            .accept("10.0.0.9:8300")
            .accept("10.0.0.3:8300"),
    );
    let remote = nodes(&[("peerA", "10.0.0.2:8300"), ("peerB", "10.0.0.3:8300")]);

    let leader = joiner.run(&CancellationToken::new(), &remote).await.unwrap();

    assert_eq!(leader, "10.0.0.9:8300");
    assert_eq!(joiner_calls(&joiner), vec!["10.0.0.2:8300", "10.0.0.9:8300"]);
}

#[tokio::test]
async fn test_leader_hint_pointing_at_other_candidate() {
    let joiner = joiner(
        ScriptedPeerJoiner::new()
            .reject("10.0.0.2:8300", PeerJoinError::not_leader("10.0.0.3:8300"))
            .accept("10.0.0.3:8300"),
    );
    let remote = nodes(&[("peerA", "10.0.0.2:8300"), ("peerB", "10.0.0.3:8300")]);

    let leader = joiner.run(&CancellationToken::new(), &remote).await.unwrap();

    assert_eq!(leader, "10.0.0.3:8300");
}

#[tokio::test]
async fn test_failed_leader_follow_moves_on() {
    let joiner = joiner(
        ScriptedPeerJoiner::new()
            .reject("10.0.0.2:8300", PeerJoinError::not_leader("10.0.0.9:8300"))
            .reject("10.0.0.9:8300", plain_error("leader stepped down"))
            .accept("10.0.0.3:8300"),
    );
    let remote = nodes(&[("peerA", "10.0.0.2:8300"), ("peerB", "10.0.0.3:8300")]);

    let leader = joiner.run(&CancellationToken::new(), &remote).await.unwrap();

    assert_eq!(leader, "10.0.0.3:8300");
    assert_eq!(
        joiner_calls(&joiner),
        vec!["10.0.0.2:8300", "10.0.0.9:8300", "10.0.0.3:8300"]
    );
}

#[tokio::test]
async fn test_resource_exhausted_without_leader_is_plain_failure() {
    let joiner = joiner(
        ScriptedPeerJoiner::new()
            .reject(
                "10.0.0.2:8300",
                PeerJoinError::new(JoinStatus::ResourceExhausted, "busy"),
            )
            .reject(
                "10.0.0.3:8300",
                PeerJoinError::new(JoinStatus::Internal, "broken").with_leader("10.0.0.9:8300"),
            ),
    );
    let remote = nodes(&[("peerA", "10.0.0.2:8300"), ("peerB", "10.0.0.3:8300")]);

    let err = joiner.run(&CancellationToken::new(), &remote).await.unwrap_err();

    // Neither failure qualifies for a redirect.
    assert_eq!(joiner_calls(&joiner), vec!["10.0.0.2:8300", "10.0.0.3:8300"]);
    assert_eq!(err.failures().len(), 2);
}

#[tokio::test]
async fn test_exhausted_error_names_every_candidate() {
    let joiner = joiner(
        ScriptedPeerJoiner::new()
            .reject("10.0.0.2:8300", plain_error("connection refused"))
            .reject("10.0.0.3:8300", plain_error("no route to host")),
    );
    let remote = nodes(&[("peerA", "10.0.0.2:8300"), ("peerB", "10.0.0.3:8300")]);

    let err = joiner.run(&CancellationToken::new(), &remote).await.unwrap_err();

    assert!(matches!(err, JoinError::Exhausted { .. }));
    let msg = err.to_string();
    assert!(msg.contains("peerA(10.0.0.2:8300): unavailable: connection refused"), "{}", msg);
    assert!(msg.contains("peerB(10.0.0.3:8300): unavailable: no route to host"), "{}", msg);
}

#[tokio::test]
async fn test_exhausted_error_tags_leader_attempts() {
    let joiner = joiner(
        ScriptedPeerJoiner::new()
            .reject("10.0.0.2:8300", PeerJoinError::not_leader("10.0.0.9:8300"))
            .reject("10.0.0.9:8300", plain_error("leader gone")),
    );
    let remote = nodes(&[("peerA", "10.0.0.2:8300")]);

    let err = joiner.run(&CancellationToken::new(), &remote).await.unwrap_err();

    assert_eq!(
        err.failures(),
        &[JoinFailure::Leader {
            address: "10.0.0.9:8300".to_string(),
            error: plain_error("leader gone"),
        }]
    );
    assert!(err.to_string().contains("leader(10.0.0.9:8300): unavailable: leader gone"));
}

#[tokio::test]
async fn test_empty_candidate_set_is_an_error() {
    let joiner = joiner(ScriptedPeerJoiner::new());

    let err = joiner
        .run(&CancellationToken::new(), &RemoteNodeMap::new())
        .await
        .unwrap_err();

    assert!(matches!(err, JoinError::NoCandidates { .. }));
    assert!(joiner_calls(&joiner).is_empty());
}

#[tokio::test]
async fn test_only_self_is_an_error() {
    let joiner = joiner(ScriptedPeerJoiner::new().accept(LOCAL_ADDR));

    let err = joiner
        .run(&CancellationToken::new(), &nodes(&[(LOCAL_ID, LOCAL_ADDR)]))
        .await
        .unwrap_err();

    assert!(matches!(err, JoinError::NoCandidates { .. }));
    assert!(joiner_calls(&joiner).is_empty());
}

#[tokio::test]
async fn test_cancel_during_backoff_stops_promptly() {
    let joiner = Joiner::new(
        ScriptedPeerJoiner::new()
            .reject("10.0.0.2:8300", plain_error("down"))
            .accept("10.0.0.3:8300"),
        LOCAL_ID,
        LOCAL_ADDR,
        true,
    )
    .with_backoff(Duration::from_secs(30));
    let remote = nodes(&[("peerA", "10.0.0.2:8300"), ("peerB", "10.0.0.3:8300")]);
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let err = joiner.run(&cancel, &remote).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(joiner_calls(&joiner), vec!["10.0.0.2:8300"]);
}

#[tokio::test]
async fn test_cancel_during_rpc_stops_promptly() {
    let joiner = joiner(
        ScriptedPeerJoiner::new()
            .accept("10.0.0.2:8300")
            .delay("10.0.0.2:8300", Duration::from_secs(30)),
    );
    let remote = nodes(&[("peerA", "10.0.0.2:8300"), ("peerB", "10.0.0.3:8300")]);
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let err = joiner.run(&cancel, &remote).await.unwrap_err();

    assert!(matches!(err, JoinError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(joiner_calls(&joiner), vec!["10.0.0.2:8300"]);
}

#[tokio::test]
async fn test_already_cancelled_issues_no_rpc() {
    let joiner = joiner(ScriptedPeerJoiner::new().accept("10.0.0.2:8300"));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = joiner
        .run(&cancel, &nodes(&[("peerA", "10.0.0.2:8300")]))
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(joiner_calls(&joiner).is_empty());
}

fn joiner_calls(joiner: &Joiner<ScriptedPeerJoiner>) -> Vec<String> {
    joiner.peer_joiner().called_addresses()
}

fn joiner_requests(joiner: &Joiner<ScriptedPeerJoiner>) -> Vec<JoinRequest> {
    joiner
        .peer_joiner()
        .calls
        .lock()
        .unwrap()
        .iter()
        .map(|(_, req)| req.clone())
        .collect()
}
