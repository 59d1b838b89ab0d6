//! Marketplace Workflow Tests
//!
//! Listing and purchasing, alone and under contention.

use crate::*;
use bazaar::keys;
use std::sync::Barrier;
use std::thread;

// =============================================================================
// SCENARIOS
// =============================================================================

#[test]
fn test_list_then_purchase_scenario() {
    let (store, bazaar) = create_bazaar();
    let market = &bazaar.market;

    market.grant_item("userX", "itemX").unwrap();
    assert_eq!(market.inventory("userX").unwrap(), vec!["itemX"]);

    let listed = market.list_item("itemX", "userX", 10).unwrap();
    assert_eq!(listed, TradeOutcome::Succeeded);
    assert!(market.inventory("userX").unwrap().is_empty());
    let entries = store.zrange_with_scores(keys::MARKET, 0, -1).unwrap();
    assert!(entries.iter().any(|(member, _)| member == "itemX.userX"));

    market.deposit("userY", 125).unwrap();
    let bought = market.purchase_item("userY", "itemX", "userX", 10).unwrap();
    assert_eq!(bought, TradeOutcome::Succeeded);

    assert_eq!(market.funds("userY").unwrap(), 115);
    assert_eq!(market.funds("userX").unwrap(), 10);
    assert!(market.inventory("userY").unwrap().contains(&"itemX".to_string()));
    assert_eq!(store.zscore(keys::MARKET, "itemX.userX").unwrap(), None);
}

#[test]
fn test_stale_price_changes_nothing() {
    let (store, bazaar) = create_bazaar();
    let market = &bazaar.market;
    market.grant_item("userX", "itemX").unwrap();
    market.list_item("itemX", "userX", 10).unwrap();
    market.deposit("userY", 125).unwrap();

    // Seller relists at a higher price behind the buyer's back
    store.zadd(keys::MARKET, "itemX.userX", 15.0).unwrap();

    let outcome = market.purchase_item("userY", "itemX", "userX", 10).unwrap();
    assert_eq!(
        outcome,
        TradeOutcome::NotPossible(Rejection::PriceChanged {
            expected: 10,
            actual: 15
        })
    );
    assert_eq!(market.funds("userY").unwrap(), 125);
    assert_eq!(market.funds("userX").unwrap(), 0);
    assert!(market.inventory("userY").unwrap().is_empty());
    assert_eq!(market.market_price("itemX", "userX").unwrap(), Some(15));
}

#[test]
fn test_rejection_releases_watch() {
    init_tracing();
    let store = Arc::new(FaultyStore::new(Fault::AlwaysConflict));
    let market = Market::new(store.clone());

    let outcome = market.list_item("ghost", "userX", 1).unwrap();
    assert!(matches!(
        outcome,
        TradeOutcome::NotPossible(Rejection::ItemNotInInventory { .. })
    ));
    assert_eq!(store.unwatches.load(Ordering::SeqCst), 1);
    assert_eq!(store.execs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_exhausted_budget_reports_failure() {
    init_tracing();
    let store = Arc::new(FaultyStore::new(Fault::AlwaysConflict));
    let market = Market::new(store.clone())
        .with_list_policy(RetryPolicy::with_budget(Duration::from_millis(30)));
    market.grant_item("userX", "itemX").unwrap();

    let outcome = market.list_item("itemX", "userX", 10).unwrap();
    assert_eq!(outcome, TradeOutcome::FailedAfterRetries);
    assert!(store.execs.load(Ordering::SeqCst) > 1);
    assert_eq!(store.inner.smembers("inventory:userX").unwrap(), vec!["itemX"]);
    assert_eq!(store.inner.zcard(keys::MARKET).unwrap(), 0);
}

#[test]
fn test_connection_failure_is_not_retried() {
    init_tracing();
    let store = Arc::new(FaultyStore::new(Fault::ConnectionLost));
    let market = Market::new(store.clone());
    market.grant_item("userX", "itemX").unwrap();
    market.list_item("itemX", "userX", 10).unwrap_err();
    assert_eq!(store.execs.load(Ordering::SeqCst), 1);

    let err: bazaar::Error = market.list_item("itemX", "userX", 10).unwrap_err().into();
    assert!(err.is_connection());
}

// =============================================================================
// CONTENTION
// =============================================================================

#[test]
fn test_concurrent_purchases_exactly_one_wins() {
    let (store, bazaar) = create_bazaar();
    let market = bazaar.market.clone();
    market.grant_item("seller", "relic").unwrap();
    market.list_item("relic", "seller", 40).unwrap();

    let buyers: Vec<String> = (0..8).map(|i| format!("buyer{}", i)).collect();
    for buyer in &buyers {
        market.deposit(buyer, 100).unwrap();
    }

    let barrier = Arc::new(Barrier::new(buyers.len()));
    let handles: Vec<_> = buyers
        .iter()
        .cloned()
        .map(|buyer| {
            let market = market.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                market.purchase_item(&buyer, "relic", "seller", 40).unwrap()
            })
        })
        .collect();
    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners = outcomes.iter().filter(|o| o.is_success()).count();
    assert_eq!(winners, 1, "outcomes: {:?}", outcomes);
    for outcome in outcomes.iter().filter(|o| !o.is_success()) {
        assert!(
            matches!(outcome, TradeOutcome::NotPossible(Rejection::NotListed { .. })),
            "loser saw {:?}",
            outcome
        );
    }

    let owners: Vec<&String> = buyers
        .iter()
        .filter(|b| market.inventory(b).unwrap().contains(&"relic".to_string()))
        .collect();
    assert_eq!(owners.len(), 1);
    assert_eq!(market.funds("seller").unwrap(), 40);

    let mut everyone: Vec<&str> = buyers.iter().map(String::as_str).collect();
    everyone.push("seller");
    assert_eq!(total_funds(&store, &everyone), 800);
}

#[test]
fn test_double_listing_lists_once() {
    let (store, bazaar) = create_bazaar();
    bazaar.market.grant_item("userX", "itemX").unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [10, 20]
        .into_iter()
        .map(|price| {
            let market = bazaar.market.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                market.list_item("itemX", "userX", price).unwrap()
            })
        })
        .collect();
    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 1);
    assert_eq!(store.zcard(keys::MARKET).unwrap(), 1);
    assert!(bazaar.market.inventory("userX").unwrap().is_empty());
}

#[test]
fn test_trading_churn_preserves_invariants() {
    let (store, bazaar) = create_bazaar();
    let traders = ["t0", "t1", "t2", "t3"];
    let items: Vec<String> = (0..12).map(|i| format!("item{}", i)).collect();
    for (i, item) in items.iter().enumerate() {
        bazaar.market.grant_item(traders[i % traders.len()], item).unwrap();
    }
    for trader in traders {
        bazaar.market.deposit(trader, 1_000).unwrap();
    }

    let barrier = Arc::new(Barrier::new(traders.len()));
    let handles: Vec<_> = traders
        .iter()
        .enumerate()
        .map(|(n, me)| {
            let market = bazaar.market.clone();
            let barrier = Arc::clone(&barrier);
            let me = me.to_string();
            thread::spawn(move || {
                barrier.wait();
                for round in 0..30 {
                    if round % 2 == 0 {
                        for item in market.inventory(&me).unwrap() {
                            market.list_item(&item, &me, 5 + (n as i64)).unwrap();
                        }
                    } else {
                        for listing in market.listings().unwrap() {
                            if listing.seller != me {
                                market
                                    .purchase_item(&me, &listing.item, &listing.seller, listing.price)
                                    .unwrap();
                            }
                        }
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    // Every item is in exactly one place
    let listed: Vec<String> = bazaar
        .market
        .listings()
        .unwrap()
        .into_iter()
        .map(|l| l.item)
        .collect();
    for item in &items {
        let holders = traders
            .iter()
            .filter(|t| bazaar.market.inventory(t).unwrap().contains(item))
            .count();
        let on_market = listed.iter().filter(|l| *l == item).count();
        assert_eq!(holders + on_market, 1, "{} held {} times, listed {} times", item, holders, on_market);
    }

    assert_eq!(total_funds(&store, &traders), 4_000);
    for trader in traders {
        assert!(bazaar.market.funds(trader).unwrap() >= 0);
    }
}
