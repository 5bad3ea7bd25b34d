//! End-to-end bridge tests against an in-memory mock node.

use nodegate_bridge::testing::{spawn_mock_node, MockNodeConfig, MockNodeHandle};
use nodegate_bridge::{
    BridgeConfig, BridgeError, Liveness, NodeBridge, SubmitOutcome,
};
use nodegate_types::test_utils::{test_mempool_tx, test_tx};
use std::sync::Arc;
use std::time::Duration;

async fn ready_bridge(
    config: BridgeConfig,
    mock: MockNodeConfig,
) -> (Arc<NodeBridge>, MockNodeHandle) {
    let (connector, handle) = spawn_mock_node(mock);
    let bridge = Arc::new(NodeBridge::connect_with(connector, config));
    wait_ready(&bridge).await;
    (bridge, handle)
}

async fn wait_ready(bridge: &NodeBridge) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !bridge.is_ready() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("bridge became ready");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_submit_accept_then_duplicate_rejected() {
    let (bridge, node) =
        ready_bridge(BridgeConfig::for_testing(), MockNodeConfig::default()).await;

    let tx = test_tx(1);
    assert_eq!(bridge.submit(tx.clone()).await.unwrap(), SubmitOutcome::Accepted);
    assert_eq!(node.mempool_len(), 1);

    // The same transaction again conflicts with the mempool entry.
    match bridge.submit(tx).await.unwrap() {
        SubmitOutcome::Rejected { reason } => {
            assert_eq!(reason.as_str(), "already-in-mempool")
        }
        SubmitOutcome::Accepted => panic!("duplicate submission accepted"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scripted_rejection_reason_passes_through() {
    let (bridge, node) =
        ready_bridge(BridgeConfig::for_testing(), MockNodeConfig::default()).await;

    let tx = test_tx(7);
    node.reject_with(tx.id(), "fee too small");
    match bridge.submit(tx).await.unwrap() {
        SubmitOutcome::Rejected { reason } => assert_eq!(reason.as_str(), "fee too small"),
        SubmitOutcome::Accepted => panic!("scripted rejection ignored"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_submissions_all_resolve() {
    let (bridge, node) =
        ready_bridge(BridgeConfig::for_testing(), MockNodeConfig::default()).await;

    let mut joins = Vec::new();
    for seed in 0..10u8 {
        let bridge = bridge.clone();
        joins.push(tokio::spawn(
            async move { bridge.submit(test_tx(seed)).await },
        ));
    }
    for join in joins {
        assert_eq!(join.await.unwrap().unwrap(), SubmitOutcome::Accepted);
    }
    assert_eq!(node.mempool_len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_snapshot_lifecycle() {
    let mempool = vec![test_mempool_tx(1), test_mempool_tx(2), test_mempool_tx(3)];
    let total_bytes: u64 = mempool.iter().map(|tx| tx.bytes.len() as u64).sum();
    let config = MockNodeConfig {
        slot: 424_242,
        initial_mempool: mempool.clone(),
        ..MockNodeConfig::default()
    };
    let (bridge, _node) = ready_bridge(BridgeConfig::for_testing(), config).await;

    let (token, slot) = bridge.acquire().await.unwrap();
    assert_eq!(slot, 424_242);

    let sizes = bridge.sizes(token.clone()).await.unwrap();
    assert_eq!(sizes.number_of_txs, 3);
    assert_eq!(sizes.current_size_bytes, total_bytes);

    assert!(bridge.has_tx(token.clone(), mempool[0].id).await.unwrap());
    assert!(!bridge
        .has_tx(token.clone(), test_mempool_tx(99).id)
        .await
        .unwrap());

    // The cursor walks the snapshot exactly once, then stays exhausted.
    let mut seen = Vec::new();
    while let Some(tx) = bridge.next_tx(token.clone()).await.unwrap() {
        seen.push(tx.id);
    }
    assert_eq!(seen, mempool.iter().map(|tx| tx.id).collect::<Vec<_>>());
    assert!(bridge.next_tx(token.clone()).await.unwrap().is_none());

    bridge.release(token.clone()).await.unwrap();

    // The released token is dead; a fresh acquisition gets a fresh token.
    let err = bridge.sizes(token.clone()).await.unwrap_err();
    assert!(matches!(err, BridgeError::StateContract(_)));
    let (token2, _) = bridge.acquire().await.unwrap();
    assert_ne!(token, token2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_snapshot_is_immune_to_later_submissions() {
    let (bridge, _node) =
        ready_bridge(BridgeConfig::for_testing(), MockNodeConfig::default()).await;

    let (token, _) = bridge.acquire().await.unwrap();
    assert_eq!(bridge.sizes(token.clone()).await.unwrap().number_of_txs, 0);

    // Accepted after the snapshot was taken; the snapshot must not see it.
    bridge.submit(test_tx(5)).await.unwrap();
    assert_eq!(bridge.sizes(token.clone()).await.unwrap().number_of_txs, 0);
    assert!(!bridge.has_tx(token.clone(), test_tx(5).id()).await.unwrap());

    // A fresh snapshot does.
    bridge.release(token).await.unwrap();
    let (token, _) = bridge.acquire().await.unwrap();
    assert_eq!(bridge.sizes(token).await.unwrap().number_of_txs, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_query_before_acquire_is_local_violation() {
    let (bridge, node) =
        ready_bridge(BridgeConfig::for_testing(), MockNodeConfig::default()).await;

    let err = bridge.next_tx("feedface00000000".into()).await.unwrap_err();
    assert!(matches!(err, BridgeError::StateContract(_)));

    // The violation was refused locally; the connection still works.
    assert!(bridge.is_ready());
    assert_eq!(
        bridge.submit(test_tx(1)).await.unwrap(),
        SubmitOutcome::Accepted
    );
    assert_eq!(node.mempool_len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stale_token_refused_without_costing_connection() {
    let (bridge, _node) =
        ready_bridge(BridgeConfig::for_testing(), MockNodeConfig::default()).await;

    let (token, _) = bridge.acquire().await.unwrap();
    let err = bridge.sizes("0000000000000bad".into()).await.unwrap_err();
    assert!(matches!(err, BridgeError::StateContract(_)));

    // The real token still works afterwards.
    assert_eq!(bridge.sizes(token.clone()).await.unwrap().number_of_txs, 0);
    bridge.release(token).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_double_acquire_is_a_violation() {
    let (bridge, _node) =
        ready_bridge(BridgeConfig::for_testing(), MockNodeConfig::default()).await;

    let (token, _) = bridge.acquire().await.unwrap();
    let err = bridge.acquire().await.unwrap_err();
    assert!(matches!(err, BridgeError::StateContract(_)));
    bridge.release(token).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_in_flight_timeout_tears_down_and_queued_timeout_is_clean() {
    let config = BridgeConfig::for_testing();
    let (bridge, node) = ready_bridge(config, MockNodeConfig::default()).await;

    node.set_stall_submission(true);

    // First call goes on the wire and stalls; its deadline passes while the
    // node holds agency. The second expires while still queued behind it.
    let slow = {
        let bridge = bridge.clone();
        tokio::spawn(async move {
            bridge
                .submit_with_timeout(test_tx(1), Duration::from_millis(400))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let queued = {
        let bridge = bridge.clone();
        tokio::spawn(async move {
            bridge
                .submit_with_timeout(test_tx(2), Duration::from_millis(50))
                .await
        })
    };

    assert_eq!(
        slow.await.unwrap(),
        Err(BridgeError::Timeout { in_flight: true })
    );
    assert_eq!(
        queued.await.unwrap(),
        Err(BridgeError::Timeout { in_flight: false })
    );

    // The torn-down connection is redialed; submissions work again.
    node.set_stall_submission(false);
    wait_ready(&bridge).await;
    assert_eq!(
        bridge.submit(test_tx(3)).await.unwrap(),
        SubmitOutcome::Accepted
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queued_timeout_resolves_at_its_own_deadline() {
    let (bridge, node) =
        ready_bridge(BridgeConfig::for_testing(), MockNodeConfig::default()).await;

    // The head call stalls on the wire well past the queued call's deadline.
    node.set_stall_submission(true);
    let head = {
        let bridge = bridge.clone();
        tokio::spawn(async move {
            bridge
                .submit_with_timeout(test_tx(1), Duration::from_secs(1))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The queued call must resolve near its own 100ms deadline, not when
    // the head call finally releases the worker.
    let issued = std::time::Instant::now();
    let result = bridge
        .submit_with_timeout(test_tx(2), Duration::from_millis(100))
        .await;
    let waited = issued.elapsed();
    assert_eq!(result, Err(BridgeError::Timeout { in_flight: false }));
    assert!(
        waited < Duration::from_millis(600),
        "queued timeout took {waited:?}"
    );

    assert_eq!(
        head.await.unwrap(),
        Err(BridgeError::Timeout { in_flight: true })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connection_drop_fails_queued_calls_and_recovers() {
    let (bridge, node) =
        ready_bridge(BridgeConfig::for_testing(), MockNodeConfig::default()).await;

    node.set_stall_submission(true);
    let mut joins = Vec::new();
    for seed in 0..3u8 {
        let bridge = bridge.clone();
        joins.push(tokio::spawn(async move {
            bridge
                .submit_with_timeout(test_tx(seed), Duration::from_secs(5))
                .await
        }));
        // Keep issue order deterministic.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    node.drop_connection();
    for join in joins {
        assert_eq!(join.await.unwrap(), Err(BridgeError::ConnectionLost));
    }

    node.set_stall_submission(false);
    wait_ready(&bridge).await;
    assert_eq!(
        bridge.submit(test_tx(9)).await.unwrap(),
        SubmitOutcome::Accepted
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_snapshot_tokens_die_with_the_connection() {
    let (bridge, node) =
        ready_bridge(BridgeConfig::for_testing(), MockNodeConfig::default()).await;

    let (token, _) = bridge.acquire().await.unwrap();
    node.drop_connection();
    tokio::time::sleep(Duration::from_millis(100)).await;
    wait_ready(&bridge).await;

    let err = bridge.sizes(token).await.unwrap_err();
    assert!(matches!(err, BridgeError::StateContract(_)));

    // A fresh session on the new connection works.
    let (token, _) = bridge.acquire().await.unwrap();
    bridge.release(token).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconnect_disabled_closes_permanently() {
    let config = BridgeConfig::for_testing().with_reconnect(false);
    let (bridge, node) = ready_bridge(config, MockNodeConfig::default()).await;

    assert_eq!(
        bridge.submit(test_tx(1)).await.unwrap(),
        SubmitOutcome::Accepted
    );

    node.drop_connection();
    let state = tokio::time::timeout(
        Duration::from_secs(2),
        bridge.liveness_changed(Liveness::Ready),
    )
    .await
    .expect("liveness settled");
    assert_eq!(state, Liveness::Closed);

    let err = bridge.submit(test_tx(2)).await.unwrap_err();
    assert_eq!(err, BridgeError::ConnectionLost);
}
