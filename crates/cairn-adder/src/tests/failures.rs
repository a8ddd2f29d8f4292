//! Failure handling: replicas, peer faults, pin ledger, cancellation.

use std::sync::Arc;
use std::time::Duration;

use cairn_rpc::{LocalCluster, RpcError};
use cairn_types::{AddParams, AddState, ParamsError};

use crate::adder::Adder;
use crate::entry::{Entry, MemoryEntries};
use crate::error::AddError;

use super::helpers::{
    ThrottledCluster, add, all_blocks, assert_replicated, cluster, params, sample_tree, test_data,
};

// -----------------------------------------------------------------------
// Allocation
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_insufficient_replicas_before_any_block() {
    let cluster = cluster(1);
    let err = add(&cluster, params(2, 2), sample_tree()).await.unwrap_err();

    assert!(matches!(
        err,
        AddError::InsufficientReplicas {
            needed: 2,
            available: 1
        }
    ));
    assert_eq!(cluster.total_store_calls().await, 0);
    assert!(cluster.pins().await.is_empty());
}

#[tokio::test]
async fn test_down_peers_are_not_allocated() {
    let cluster = cluster(3);
    cluster.set_down(cluster.peers()[0], true).await;
    cluster.set_down(cluster.peers()[1], true).await;

    let err = add(&cluster, params(2, 3), sample_tree()).await.unwrap_err();
    assert!(matches!(
        err,
        AddError::InsufficientReplicas { available: 1, .. }
    ));

    let summary = add(&cluster, params(1, 3), sample_tree()).await.unwrap();
    assert_eq!(summary.pin.allocations, vec![cluster.peers()[2]]);
}

#[tokio::test]
async fn test_user_allocations_preferred() {
    let cluster = cluster(4);
    let wanted = vec![cluster.peers()[3], cluster.peers()[2]];
    let params = AddParams {
        user_allocations: wanted.clone(),
        ..params(1, 2)
    };
    let summary = add(&cluster, params, sample_tree()).await.unwrap();
    assert_eq!(summary.pin.allocations, wanted);
    assert_eq!(cluster.stats(&cluster.peers()[0]).await.store_calls, 0);
}

#[tokio::test]
async fn test_invalid_params_rejected_before_allocation() {
    let cluster = cluster(2);
    let err = add(&cluster, params(3, 2), sample_tree()).await.unwrap_err();
    assert!(matches!(
        err,
        AddError::InvalidParams(ParamsError::Replication { min: 3, max: 2 })
    ));
    assert_eq!(cluster.eligible_calls(), 0);
}

// -----------------------------------------------------------------------
// Distribution
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_broken_peer_replaced_by_standby() {
    let cluster = cluster(3);
    let broken = cluster.peers()[1];
    cluster.set_broken(broken, true).await;

    let summary = add(&cluster, params(2, 2), sample_tree()).await.unwrap();

    // The pin names the peers holding the root, not the original allocation.
    let standby = cluster.peers()[2];
    assert_eq!(summary.pin.allocations, vec![cluster.peers()[0], standby]);
    assert!(cluster.has_block(&standby, &summary.root).await);
    assert!(!cluster.has_block(&broken, &summary.root).await);
    assert_replicated(&cluster, &summary.root, 2).await;
    assert_eq!(cluster.stats(&broken).await.stored, 0);
    assert_eq!(
        cluster.stats(&cluster.peers()[2]).await.stored,
        summary.report.blocks
    );
}

#[tokio::test]
async fn test_distribution_failure_means_no_pin() {
    let cluster = cluster(2);
    cluster.set_broken(cluster.peers()[1], true).await;

    let adder = Adder::new(cluster.clone(), params(2, 2));
    let state = adder.subscribe_state();
    let err = adder
        .add(MemoryEntries::new(sample_tree()))
        .await
        .unwrap_err();

    match err {
        AddError::Distribution { needed, acked, .. } => {
            assert_eq!(needed, 2);
            assert_eq!(acked, 1);
        }
        other => panic!("expected distribution error, got {other:?}"),
    }
    assert!(cluster.pins().await.is_empty());
    assert_eq!(*state.borrow(), AddState::Failed);
}

#[tokio::test]
async fn test_flaky_peers_recover_within_budget() {
    let cluster = cluster(2);
    for peer in cluster.peers() {
        cluster.set_flaky(*peer, 2).await;
    }
    let params = AddParams {
        peer_attempts: 3,
        ..params(2, 2)
    };
    let summary = add(&cluster, params, sample_tree()).await.unwrap();
    assert_replicated(&cluster, &summary.root, 2).await;
}

// -----------------------------------------------------------------------
// Pin ledger
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_pin_failure_leaves_blocks_in_place() {
    let cluster = cluster(1);
    cluster.fail_pins(Some("ledger offline".into())).await;

    let err = add(&cluster, params(1, 1), sample_tree()).await.unwrap_err();
    match err {
        AddError::PinCommit { source, .. } => {
            assert_eq!(source, RpcError::PinLedger("ledger offline".into()));
        }
        other => panic!("expected pin commit error, got {other:?}"),
    }
    assert!(!all_blocks(&cluster).await.is_empty());
    assert!(cluster.pins().await.is_empty());
}

// -----------------------------------------------------------------------
// Cancellation
// -----------------------------------------------------------------------

fn slow_cluster() -> Arc<LocalCluster> {
    Arc::new(LocalCluster::new(1).with_store_latency(Duration::from_millis(20)))
}

#[tokio::test]
async fn test_abort_before_start() {
    let cluster = cluster(1);
    let adder = Adder::new(cluster.clone(), params(1, 1));
    let handle = adder.abort_handle();
    handle.abort();
    assert!(handle.is_aborted());

    let err = adder
        .add(MemoryEntries::new(sample_tree()))
        .await
        .unwrap_err();
    assert!(matches!(err, AddError::Cancelled));
    assert!(cluster.pins().await.is_empty());
}

#[tokio::test]
async fn test_abort_mid_distribution() {
    let cluster = slow_cluster();
    let adder = Adder::new(cluster.clone(), params(1, 1));
    let handle = adder.abort_handle();
    let state = adder.subscribe_state();

    let entries = vec![Entry::file("big", test_data(64 * 100))];
    let task = tokio::spawn(adder.add(MemoryEntries::new(entries)));
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.abort();

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, AddError::Cancelled));
    assert_eq!(*state.borrow(), AddState::Failed);
    assert!(cluster.pins().await.is_empty());
}

#[tokio::test]
async fn test_deadline_cancels() {
    let cluster = slow_cluster();
    let params = AddParams {
        timeout_ms: Some(30),
        ..params(1, 1)
    };
    let entries = vec![Entry::file("big", test_data(64 * 100))];
    let err = add(&cluster, params, entries).await.unwrap_err();
    assert!(matches!(err, AddError::Cancelled));
    assert!(cluster.pins().await.is_empty());
}

#[tokio::test]
async fn test_abort_after_pin_commit_issued_is_ignored() {
    let cluster = cluster(1);
    let rpc = Arc::new(
        ThrottledCluster::new(cluster.clone()).with_pin_delay(Duration::from_millis(50)),
    );
    let adder = Adder::new(rpc, params(1, 1));
    let handle = adder.abort_handle();
    let mut state = adder.subscribe_state();

    let task = tokio::spawn(adder.add(MemoryEntries::new(sample_tree())));
    state
        .wait_for(|s| *s == AddState::Distributed)
        .await
        .unwrap();
    handle.abort();

    let summary = task.await.unwrap().unwrap();
    assert_eq!(*state.borrow(), AddState::Pinned);
    assert_eq!(cluster.pins().await, vec![summary.pin]);
}

#[tokio::test]
async fn test_deadline_does_not_interrupt_pin_commit() {
    let cluster = cluster(1);
    let rpc = Arc::new(
        ThrottledCluster::new(cluster.clone()).with_pin_delay(Duration::from_millis(80)),
    );
    let params = AddParams {
        timeout_ms: Some(40),
        ..params(1, 1)
    };
    let summary = Adder::new(rpc, params)
        .add(MemoryEntries::new(sample_tree()))
        .await
        .unwrap();
    assert_eq!(cluster.pins().await.len(), 1);
    assert_eq!(cluster.pins().await[0].cid, summary.root);
}
