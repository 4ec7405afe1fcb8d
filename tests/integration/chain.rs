//! Action chain against stub action services

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use role_probe::action::ActionError;

use crate::{chain_for, chain_with_timeout, Reply, StubAction};

fn verified(input: &str) -> String {
    format!("{}-verified", input)
}

fn echo(input: &str) -> String {
    input.to_string()
}

#[tokio::test]
async fn test_single_port_returns_body() {
    let stub = StubAction::start(Reply::Body("leader".into())).await;
    let chain = chain_for(&[&stub]);

    let role = chain.resolve(&CancellationToken::new()).await.unwrap();
    assert_eq!(role, "leader");

    // First action always sees an empty previous output
    assert_eq!(stub.received(), vec![String::new()]);
}

#[tokio::test]
async fn test_output_is_piped_to_next_port() {
    let first = StubAction::start(Reply::Body("leader".into())).await;
    let second = StubAction::start(Reply::Transform(verified)).await;
    let chain = chain_for(&[&first, &second]);

    let role = chain.resolve(&CancellationToken::new()).await.unwrap();
    assert_eq!(role, "leader-verified");
    assert_eq!(second.received(), vec!["leader".to_string()]);
}

#[tokio::test]
async fn test_pipeline_preserves_exact_body() {
    let raw = "role with spaces & symbols=+%\n{\"json\":true}";
    let first = StubAction::start(Reply::Body(raw.into())).await;
    let second = StubAction::start(Reply::Transform(echo)).await;
    let chain = chain_for(&[&first, &second]);

    let role = chain.resolve(&CancellationToken::new()).await.unwrap();
    assert_eq!(role, raw);
    assert_eq!(second.received(), vec![raw.to_string()]);
}

#[tokio::test]
async fn test_pipeline_preserves_non_utf8_body() {
    let first = StubAction::start(Reply::Raw(b"l\xff".to_vec())).await;
    let second = StubAction::start(Reply::Body("leader".into())).await;
    let chain = chain_for(&[&first, &second]);

    let role = chain.resolve(&CancellationToken::new()).await.unwrap();
    assert_eq!(role, "leader");
    assert_eq!(
        second.queries(),
        vec!["KB_CONSENSUS_SET_LAST_STDOUT=l%FF".to_string()]
    );
}

#[tokio::test]
async fn test_non_2xx_aborts_chain() {
    let first = StubAction::start(Reply::Body("leader".into())).await;
    let second = StubAction::start(Reply::Status(500)).await;
    let third = StubAction::start(Reply::Body("follower".into())).await;
    let chain = chain_for(&[&first, &second, &third]);

    let err = chain.resolve(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ActionError::Status(500)));
    assert_eq!(err.to_string(), "received status code 500");

    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 1);
    assert_eq!(third.calls(), 0);
}

#[tokio::test]
async fn test_redirect_status_is_failure() {
    let stub = StubAction::start(Reply::Status(302)).await;
    let chain = chain_for(&[&stub]);

    let err = chain.resolve(&CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.to_string(), "received status code 302");
}

#[tokio::test]
async fn test_connection_refused_stops_before_later_ports() {
    let later = StubAction::start(Reply::Body("leader".into())).await;
    let chain = role_probe::action::ActionChain::new(role_probe::action::ChainConfig {
        ports: vec![crate::closed_port(), later.port],
        connect_timeout: Duration::from_secs(1),
        request_timeout: Duration::from_secs(5),
    });

    let err = chain.resolve(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ActionError::Request { .. }));
    assert_eq!(later.calls(), 0);
}

#[tokio::test]
async fn test_cancellation_aborts_in_flight_request() {
    let stub = StubAction::start(Reply::Hang).await;
    let chain = chain_for(&[&stub]);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = chain.resolve(&cancel).await.unwrap_err();
    assert!(matches!(err, ActionError::Cancelled));
    assert_eq!(err.to_string(), "context canceled");
}

#[tokio::test]
async fn test_request_timeout() {
    let stub = StubAction::start(Reply::Hang).await;
    let chain = chain_with_timeout(&[&stub], Duration::from_millis(200));

    let err = chain.resolve(&CancellationToken::new()).await.unwrap_err();
    match err {
        ActionError::Timeout { timeout, .. } => assert_eq!(timeout, Duration::from_millis(200)),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_chain_is_stateless_between_resolutions() {
    let first = StubAction::start(Reply::Body("leader".into())).await;
    let second = StubAction::start(Reply::Transform(echo)).await;
    let chain = chain_for(&[&first, &second]);
    let cancel = CancellationToken::new();

    chain.resolve(&cancel).await.unwrap();
    first.set_reply(Reply::Body("follower".into()));
    let role = chain.resolve(&cancel).await.unwrap();

    assert_eq!(role, "follower");
    assert_eq!(first.received(), vec![String::new(), String::new()]);
    assert_eq!(
        second.received(),
        vec!["leader".to_string(), "follower".to_string()]
    );
}

#[tokio::test]
async fn test_close_idle_connections_between_resolutions() {
    let stub = StubAction::start(Reply::Body("leader".into())).await;
    let chain = chain_for(&[&stub]);
    let cancel = CancellationToken::new();

    assert_eq!(chain.resolve(&cancel).await.unwrap(), "leader");
    chain.close_idle_connections();
    chain.close_idle_connections();
    assert_eq!(chain.resolve(&cancel).await.unwrap(), "leader");
    assert_eq!(stub.calls(), 2);
}
