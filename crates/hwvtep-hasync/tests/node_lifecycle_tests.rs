//! Integration tests for node connect/disconnect handling and the
//! subscription-driven engine loop

mod common;

use common::{Harness, SETTLE_TIMEOUT};
use pretty_assertions::assert_eq;
use sonic_ha_common::{NodeId, Partition};
use sonic_ha_test::{
    local_ucast, logical_switch, node, one_of_each, wait_until, within, MemoryTopology,
    StoreVerifier, CHILD_1, CHILD_2, CHILD_3, HA_NODE,
};

#[tokio::test]
async fn test_connected_child_reconciled_both_ways() {
    let h = Harness::new(&[CHILD_1]);
    for rec in one_of_each(HA_NODE) {
        h.seed(Partition::Intended, rec);
    }
    for rec in one_of_each(CHILD_1) {
        h.seed(Partition::Observed, rec);
    }

    assert!(h.engine.on_child_connected(&node(CHILD_1)).unwrap());
    h.settle().await;

    let verifier = StoreVerifier::new(&h.store);
    // every intended table but local unicast MACs
    verifier
        .assert_record_count(Partition::Intended, &node(CHILD_1), 8)
        .unwrap();
    // logical switch, local unicast MAC and tunnel IP
    verifier
        .assert_record_count(Partition::Observed, &node(HA_NODE), 3)
        .unwrap();
    let mac = local_ucast(HA_NODE, "ls0", "00:00:00:00:00:01", "10.0.0.1");
    verifier
        .assert_record(Partition::Observed, &mac.identity(), &mac)
        .unwrap();
    assert_eq!(h.engine.stats().full_merges, 2);

    // nothing left to do on a second connect
    h.writer.clear();
    assert!(h.engine.on_child_connected(&node(CHILD_1)).unwrap());
    h.settle().await;
    assert!(h.writer.calls().is_empty());
}

#[tokio::test]
async fn test_connect_removes_stale_child_config() {
    let h = Harness::new(&[CHILD_1]);
    h.seed(Partition::Intended, logical_switch(HA_NODE, "ls0", 100));
    h.seed(Partition::Intended, logical_switch(CHILD_1, "stale", 7));

    h.engine.on_child_connected(&node(CHILD_1)).unwrap();
    h.settle().await;

    assert_eq!(
        h.records(Partition::Intended, CHILD_1),
        vec![logical_switch(CHILD_1, "ls0", 100)]
    );
}

#[tokio::test]
async fn test_connect_keeps_aggregate_state_from_other_children() {
    let h = Harness::new(&[CHILD_1, CHILD_2]);
    h.seed(Partition::Observed, logical_switch(HA_NODE, "from-c2", 2));
    h.seed(Partition::Observed, logical_switch(CHILD_1, "ls0", 100));

    h.engine.on_child_connected(&node(CHILD_1)).unwrap();
    h.settle().await;

    assert_eq!(h.records(Partition::Observed, HA_NODE).len(), 2);
    assert!(h.writer.deletes().is_empty());
}

#[tokio::test]
async fn test_connect_does_not_resurrect_concurrently_deleted_row() {
    let h = Harness::new(&[CHILD_1]);
    let ls = logical_switch(HA_NODE, "ls0", 100);
    h.seed(Partition::Intended, ls.clone());
    h.store.hold_next_node_read(Partition::Intended, &node(HA_NODE));

    assert!(h.engine.on_child_connected(&node(CHILD_1)).unwrap());
    within(SETTLE_TIMEOUT, h.store.node_read_held()).await.unwrap();

    // the merge snapshot still has the row; delete it before the merge acts
    h.remove(Partition::Intended, &ls);
    let engine = &h.engine;
    wait_until(SETTLE_TIMEOUT, || engine.stats().noop_skips >= 1)
        .await
        .unwrap();
    h.store.release_node_read();
    h.settle().await;

    assert!(h.records(Partition::Intended, CHILD_1).is_empty());
    assert!(h.writer.writes().is_empty());
    assert_eq!(h.engine.stats().full_merges, 2);
}

#[tokio::test]
async fn test_connect_applies_update_made_during_merge() {
    let h = Harness::new(&[CHILD_1]);
    h.seed(Partition::Intended, logical_switch(HA_NODE, "ls0", 100));
    h.store.hold_next_node_read(Partition::Intended, &node(HA_NODE));

    h.engine.on_child_connected(&node(CHILD_1)).unwrap();
    within(SETTLE_TIMEOUT, h.store.node_read_held()).await.unwrap();
    h.write(Partition::Intended, logical_switch(HA_NODE, "ls0", 200));
    h.store.release_node_read();
    h.settle().await;

    assert_eq!(
        h.records(Partition::Intended, CHILD_1),
        vec![logical_switch(CHILD_1, "ls0", 200)]
    );
}

#[tokio::test]
async fn test_connect_of_ungrouped_node() {
    let h = Harness::new(&[CHILD_1]);
    assert!(!h
        .engine
        .on_child_connected(&NodeId::new("hwvtep://uuid/solo"))
        .unwrap());
    assert_eq!(h.queue.pending(), 0);
}

#[tokio::test]
async fn test_last_disconnect_clears_aggregate_state() {
    let h = Harness::new(&[CHILD_1, CHILD_2]);
    h.seed(Partition::Observed, logical_switch(HA_NODE, "ls0", 100));
    h.seed(
        Partition::Observed,
        local_ucast(HA_NODE, "ls0", "00:00:00:00:00:01", "10.0.0.1"),
    );

    h.topology.set_connected(&node(CHILD_1), false);
    assert!(!h.engine.on_child_disconnected(&node(CHILD_1)).unwrap());
    h.settle().await;
    assert_eq!(h.records(Partition::Observed, HA_NODE).len(), 2);

    h.topology.set_connected(&node(CHILD_2), false);
    assert!(h.engine.on_child_disconnected(&node(CHILD_2)).unwrap());
    h.settle().await;

    assert!(h.records(Partition::Observed, HA_NODE).is_empty());
    assert_eq!(h.writer.deletes().len(), 2);
}

#[tokio::test]
async fn test_reconnect_during_cleanup_keeps_aggregate_state() {
    let h = Harness::new(&[CHILD_1]);
    h.seed(Partition::Observed, logical_switch(HA_NODE, "ls0", 100));
    h.seed(Partition::Observed, logical_switch(CHILD_1, "ls0", 100));
    h.store.hold_next_node_read(Partition::Observed, &node(HA_NODE));

    h.topology.set_connected(&node(CHILD_1), false);
    assert!(h.engine.on_child_disconnected(&node(CHILD_1)).unwrap());
    within(SETTLE_TIMEOUT, h.store.node_read_held()).await.unwrap();
    h.topology.set_connected(&node(CHILD_1), true);
    h.store.release_node_read();
    h.settle().await;

    assert!(h.writer.deletes().is_empty());
    assert_eq!(h.records(Partition::Observed, HA_NODE).len(), 1);
}

#[tokio::test]
async fn test_resync_skips_disconnected_children() {
    let h = Harness::new(&[CHILD_1, CHILD_2, CHILD_3]);
    h.topology.set_connected(&node(CHILD_3), false);
    h.seed(Partition::Intended, logical_switch(HA_NODE, "ls0", 100));

    assert_eq!(h.engine.resync_aggregate(&node(HA_NODE)).unwrap(), 2);
    h.settle().await;

    assert_eq!(h.records(Partition::Intended, CHILD_1).len(), 1);
    assert_eq!(h.records(Partition::Intended, CHILD_2).len(), 1);
    assert!(h.records(Partition::Intended, CHILD_3).is_empty());
}

#[tokio::test]
async fn test_topology_failure_reported() {
    let topology = MemoryTopology::with_group(HA_NODE, &[CHILD_1]);
    topology.set_failing(true);
    let h = Harness::with_topology(topology);

    assert!(h.engine.on_child_connected(&node(CHILD_1)).is_err());
    assert!(h.engine.on_child_disconnected(&node(CHILD_1)).is_err());
    assert!(h.engine.resync_aggregate(&node(HA_NODE)).is_err());
}

#[tokio::test]
async fn test_subscriptions_drive_replication() {
    let h = Harness::new(&[CHILD_1, CHILD_2]);
    let handle = h.engine.start();

    // fan-out through the intended subscription
    let ls = logical_switch(HA_NODE, "ls0", 100);
    h.store.put(Partition::Intended, ls.clone());
    let store = &h.store;
    wait_until(SETTLE_TIMEOUT, || {
        [CHILD_1, CHILD_2].iter().all(|c| {
            store
                .get(Partition::Intended, &ls.identity_on(&node(c)))
                .is_some()
        })
    })
    .await
    .unwrap();

    // fan-in through the observed subscription
    let mac = local_ucast(CHILD_1, "ls0", "00:00:00:00:00:01", "10.0.0.1");
    h.store.put(Partition::Observed, mac.clone());
    wait_until(SETTLE_TIMEOUT, || {
        store
            .get(Partition::Observed, &mac.identity_on(&node(HA_NODE)))
            .is_some()
    })
    .await
    .unwrap();

    // deletes travel the same way
    h.store.delete(Partition::Intended, &ls.identity());
    wait_until(SETTLE_TIMEOUT, || {
        store.records(Partition::Intended, &node(CHILD_1)).is_empty()
            && store.records(Partition::Intended, &node(CHILD_2)).is_empty()
    })
    .await
    .unwrap();

    h.settle().await;
    // the copies written on children and aggregate do not propagate further
    assert_eq!(h.writer.writes().len(), 3);

    handle.shutdown().await;
}
