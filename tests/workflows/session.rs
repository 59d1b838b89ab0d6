//! Session Tracking Tests

use crate::*;
use bazaar::keys;
use std::thread;

#[test]
fn test_browsing_session() {
    let (store, bazaar) = create_bazaar();
    let sessions = &bazaar.sessions;

    sessions.record_activity("tok-1", "alice", None).unwrap();
    for item in ["hat", "scarf", "hat"] {
        sessions.record_activity("tok-1", "alice", Some(item)).unwrap();
    }
    sessions.record_activity("tok-2", "bob", Some("hat")).unwrap();

    assert_eq!(sessions.user_for_token("tok-1").unwrap().as_deref(), Some("alice"));
    assert_eq!(sessions.user_for_token("tok-2").unwrap().as_deref(), Some("bob"));
    assert_eq!(sessions.user_for_token("tok-3").unwrap(), None);
    assert!(sessions.last_seen("tok-1").unwrap().is_some());

    // A repeat view moves the item, it is not listed twice
    let views = sessions.recent_views("tok-1").unwrap();
    assert_eq!(views.len(), 2);
    assert!(views.contains(&"hat".to_string()));
    assert!(views.contains(&"scarf".to_string()));

    assert_eq!(sessions.view_count("hat").unwrap(), 3);
    assert_eq!(sessions.view_count("scarf").unwrap(), 1);
    assert_eq!(store.zcard(keys::RECENT).unwrap(), 2);
}

#[test]
fn test_configured_view_limit() {
    init_tracing();
    let bazaar = Bazaar::builder().recent_views(3).open().unwrap();
    for i in 0..10 {
        let item = format!("item{}", i);
        bazaar
            .sessions
            .record_activity("tok", "alice", Some(item.as_str()))
            .unwrap();
    }
    assert_eq!(bazaar.sessions.recent_views("tok").unwrap().len(), 3);
}

#[test]
fn test_concurrent_activity_on_one_token() {
    let (store, bazaar) = create_bazaar();
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let sessions = bazaar.sessions.clone();
            thread::spawn(move || {
                for i in 0..20 {
                    let item = format!("t{}-item{}", t, i);
                    sessions
                        .record_activity("shared", "alice", Some(item.as_str()))
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    // Each event trims after adding, so the bound holds at quiescence
    assert!(store.zcard(&keys::viewed_by("shared")).unwrap() <= 25);
    assert_eq!(store.zcard(keys::VIEWED).unwrap(), 80);
    assert_eq!(
        bazaar.sessions.user_for_token("shared").unwrap().as_deref(),
        Some("alice")
    );
}
