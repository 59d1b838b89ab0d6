//! Replication Wait Tests
//!
//! `wait_for_replica` against a second in-process store standing in for a
//! replica, with a background thread shipping sync tokens across.

use crate::*;
use bazaar::keys;
use std::sync::atomic::AtomicBool;
use std::thread;

fn quick(link_timeout: Duration) -> SyncOptions {
    SyncOptions {
        poll_interval: Duration::from_millis(1),
        link_timeout,
        fsync_wait: Duration::from_millis(50),
    }
}

/// Ship pending sync tokens from `primary` to `replica` until told to stop,
/// bringing the link up and draining fsyncs after `delay`
fn spawn_shipper(
    primary: Arc<MemoryStore>,
    replica: Arc<MemoryStore>,
    delay: Duration,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        thread::sleep(delay);
        replica.set_info("master_link_status", "up");
        while !stop.load(Ordering::SeqCst) {
            for (token, score) in primary.zrange_with_scores(keys::SYNC_WAIT, 0, -1).unwrap() {
                replica.zadd(keys::SYNC_WAIT, &token, score).unwrap();
            }
            replica.set_info("aof_pending_bio_fsync", "0");
            thread::sleep(Duration::from_millis(2));
        }
    })
}

#[test]
fn test_purchase_then_wait_for_lagging_replica() {
    let (store, bazaar) = create_bazaar();
    bazaar.market.grant_item("userX", "itemX").unwrap();
    bazaar.market.deposit("userY", 50).unwrap();
    bazaar.market.list_item("itemX", "userX", 10).unwrap();
    assert!(bazaar
        .market
        .purchase_item("userY", "itemX", "userX", 10)
        .unwrap()
        .is_success());

    let replica = Arc::new(MemoryStore::new());
    replica.set_info("master_link_status", "down");
    replica.set_info("aof_pending_bio_fsync", "1");
    let stop = Arc::new(AtomicBool::new(false));
    let shipper = spawn_shipper(
        store.clone(),
        replica.clone(),
        Duration::from_millis(20),
        Arc::clone(&stop),
    );

    let report = bazaar
        .wait_for_replica(replica.as_ref(), &quick(Duration::from_secs(2)))
        .unwrap();
    stop.store(true, Ordering::SeqCst);
    shipper.join().unwrap();

    assert!(report.fsynced);
    assert!(report.elapsed >= Duration::from_millis(20));
    assert!(replica.zscore(keys::SYNC_WAIT, &report.token).unwrap().is_some());
    assert_eq!(store.zscore(keys::SYNC_WAIT, &report.token).unwrap(), None);
}

#[test]
fn test_link_down_is_retryable_timeout() {
    let (store, bazaar) = create_bazaar();
    let replica = MemoryStore::new();
    replica.set_info("master_link_status", "down");

    let err = bazaar
        .wait_for_replica(&replica, &quick(Duration::from_millis(30)))
        .unwrap_err();
    assert!(matches!(err, bazaar::Error::Timeout(_)));
    assert!(err.is_retryable());
    assert_eq!(store.zcard(keys::SYNC_WAIT).unwrap(), 0);
}

#[test]
fn test_sequential_waits_leave_no_tokens() {
    let (store, bazaar) = create_bazaar();
    let mut tokens = Vec::new();
    for _ in 0..3 {
        let report = bazaar
            .wait_for_replica(store.as_ref(), &quick(Duration::from_millis(100)))
            .unwrap();
        tokens.push(report.token);
    }
    tokens.dedup();
    assert_eq!(tokens.len(), 3);
    assert_eq!(store.zcard(keys::SYNC_WAIT).unwrap(), 0);
}
