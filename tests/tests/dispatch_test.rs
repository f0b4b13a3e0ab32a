//! Exchange correlation against a simulated node with misbehaving timing

use meshwork_host::{ExchangeError, Frame, ProtocolMessage};
use meshwork_integration_tests::integration::{SimulatedNode, TestScenarios};
use meshwork_lib::seq_is_after;
use std::time::Duration;

#[tokio::test]
async fn test_late_response_is_never_taken_for_the_next_one() {
    let _ = env_logger::builder().is_test(true).try_init();
    let node = SimulatedNode::new();
    let config = TestScenarios::host_config();
    let mut dispatcher = TestScenarios::dispatcher(&node, &config);

    // The reply arrives well after the exchange gave up on it
    node.set_latency(Duration::from_millis(250)).await;
    let result = dispatcher.exchange(ProtocolMessage::ZcInit).await;
    assert!(matches!(result, Err(ExchangeError::NoResponse { seq: 1, .. })));

    tokio::time::sleep(Duration::from_millis(300)).await;
    node.set_latency(Duration::ZERO).await;

    let response = dispatcher.exchange(ProtocolMessage::ZcId).await.unwrap();
    assert!(matches!(response, ProtocolMessage::ZcIdRes { .. }));

    // The stale Ok was drained before the second request went out
    assert_eq!(dispatcher.metrics().drained_frames, 1);
    assert_eq!(dispatcher.metrics().responses, 1);
    assert_eq!(dispatcher.metrics().no_responses, 1);
}

#[tokio::test]
async fn test_stale_frame_arriving_mid_exchange_is_skipped() {
    let node = SimulatedNode::new();
    let mut config = TestScenarios::host_config();
    config.console_read_timeout = Duration::from_millis(500);
    let mut dispatcher = TestScenarios::dispatcher(&node, &config);

    dispatcher.exchange(ProtocolMessage::ZcInit).await.unwrap();

    // A duplicate of the first reply shows up while the second exchange waits
    node.set_latency(Duration::from_millis(150)).await;
    let stale = node.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        stale.inject(ProtocolMessage::Ok.encode(1).unwrap());
    });

    let response = dispatcher.exchange(ProtocolMessage::ZcNwkId).await.unwrap();
    assert!(matches!(response, ProtocolMessage::ZcNwkIdRes { .. }));
    assert_eq!(dispatcher.metrics().unexpected_frames, 1);
}

#[tokio::test]
async fn test_undecodable_frames_are_skipped() {
    let node = SimulatedNode::new();
    node.set_stray_frames(2).await;
    let config = TestScenarios::host_config();
    let mut dispatcher = TestScenarios::dispatcher(&node, &config);

    // Strays reuse the reply code with an empty payload, which cannot decode
    let response = dispatcher.exchange(ProtocolMessage::ZcId).await.unwrap();
    assert!(matches!(response, ProtocolMessage::ZcIdRes { .. }));
    assert_eq!(dispatcher.metrics().unexpected_frames, 2);
}

#[tokio::test]
async fn test_sequence_numbers_wrap_across_many_exchanges() {
    let node = SimulatedNode::new();
    let config = TestScenarios::host_config();
    let mut dispatcher = TestScenarios::dispatcher(&node, &config);

    for _ in 0..260 {
        dispatcher.exchange(ProtocolMessage::ZcNwkId).await.unwrap();
    }

    let seqs = node.request_seqs().await;
    assert_eq!(seqs.len(), 260);
    assert!(seqs.windows(2).all(|pair| seq_is_after(pair[1], pair[0])));
    assert_eq!(seqs[255], 0);
}

#[tokio::test]
async fn test_unknown_request_code_is_answered() {
    let node = SimulatedNode::new();
    let config = TestScenarios::host_config();
    let mut dispatcher = TestScenarios::dispatcher(&node, &config);

    let response = dispatcher
        .exchange(ProtocolMessage::Unknown {
            code: 200,
            payload: vec![1, 2, 3],
        })
        .await
        .unwrap();
    assert_eq!(response, ProtocolMessage::UnknownMessage);

    node.inject(Frame::new(99, 201, vec![7]));
    assert_eq!(dispatcher.drain().await, 1);
}
