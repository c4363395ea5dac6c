//! Change bus fan-out and live query stream behavior.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{user_mapping, users_by_name, MemoryBackend, User, USERS_TABLE};
use ripple_db::changes::{ChangeFilter, Changes};
use ripple_db::client::Store;
use ripple_db::query::{Query, RawQuery};
use ripple_db::reactive::{ChangeBus, OverflowPolicy};
use ripple_db::scheduler::ImmediateScheduler;

fn store_with(backend: &MemoryBackend) -> Store {
    Store::builder()
        .backend(backend.clone())
        .register(user_mapping())
        .scheduler(ImmediateScheduler)
        .build()
        .unwrap()
}

// ============================================================================
// ChangeBus
// ============================================================================

#[test]
fn publish_reaches_matching_subscribers_only() {
    let bus = ChangeBus::new();
    let users_hits = Arc::new(AtomicUsize::new(0));
    let orders_hits = Arc::new(AtomicUsize::new(0));

    let users_counter = Arc::clone(&users_hits);
    let _users = bus.subscribe(ChangeFilter::tables(["users"]), move |_| {
        users_counter.fetch_add(1, Ordering::SeqCst);
    });
    let orders_counter = Arc::clone(&orders_hits);
    let _orders = bus.subscribe(ChangeFilter::tables(["orders"]), move |_| {
        orders_counter.fetch_add(1, Ordering::SeqCst);
    });

    bus.publish(&Changes::table("users"));
    bus.publish(&Changes::table("users"));
    bus.publish(&Changes::table("orders"));

    assert_eq!(users_hits.load(Ordering::SeqCst), 2);
    assert_eq!(orders_hits.load(Ordering::SeqCst), 1);
}

#[test]
fn tag_filters_match_independently_of_tables() {
    let bus = ChangeBus::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let _sub = bus.subscribe(
        ChangeFilter::new([] as [String; 0], ["profile"]),
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );

    bus.publish(&Changes::new(["anything"], ["profile"]));
    bus.publish(&Changes::table("anything"));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn late_subscriber_never_sees_earlier_publications() {
    let bus = ChangeBus::new();
    bus.publish(&Changes::table("users"));

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let _sub = bus.subscribe(ChangeFilter::tables(["users"]), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    bus.publish(&Changes::table("users"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn cancel_stops_delivery_and_is_idempotent() {
    let bus = ChangeBus::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let subscription = bus.subscribe(ChangeFilter::all(), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    bus.publish(&Changes::table("users"));
    subscription.cancel();
    subscription.cancel();
    assert!(subscription.is_cancelled());
    bus.publish(&Changes::table("users"));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(bus.subscriber_count(), 0);
}

#[test]
fn concurrent_publishers_fan_out_safely() {
    let bus = Arc::new(ChangeBus::new());
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let _sub = bus.subscribe(ChangeFilter::tables(["users"]), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut handles = Vec::new();
    for _ in 0..4 {
        let bus = Arc::clone(&bus);
        handles.push(std::thread::spawn(move || {
            for _ in 0..25 {
                bus.publish(&Changes::table("users"));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(hits.load(Ordering::SeqCst), 100);
}

#[test]
fn sink_may_subscribe_during_publish_without_deadlock() {
    let bus = Arc::new(ChangeBus::new());
    let bus_clone = Arc::clone(&bus);
    let _sub = bus.subscribe(ChangeFilter::all(), move |_| {
        let inner = bus_clone.subscribe(ChangeFilter::all(), |_| {});
        inner.cancel();
    });

    bus.publish(&Changes::table("users"));
    assert_eq!(bus.subscriber_count(), 1);
}

// ============================================================================
// Live streams
// ============================================================================

#[test]
fn live_query_emits_cold_start_value_immediately() {
    let backend = MemoryBackend::new();
    let store = store_with(&backend);
    store.put(User::new(None, "Alice")).execute().unwrap();

    let stream = store
        .get_list::<User>(Query::new(USERS_TABLE))
        .stream(OverflowPolicy::Buffer);

    let first = stream.try_recv().expect("cold start value").unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].name, "Alice");
}

#[test]
fn live_query_reemits_per_matching_write_without_dedup() {
    let backend = MemoryBackend::new();
    let store = store_with(&backend);

    // Query that never matches: every re-execution yields the same empty
    // result, and each one must still be emitted.
    let stream = store
        .get_list::<User>(users_by_name("nobody"))
        .stream(OverflowPolicy::Buffer);

    assert_eq!(stream.try_recv().unwrap().unwrap().len(), 0);

    store.put(User::new(None, "Alice")).execute().unwrap();
    store.put(User::new(None, "Bob")).execute().unwrap();

    let after_first = stream.try_recv().expect("emission for first write");
    let after_second = stream.try_recv().expect("emission for second write");
    assert_eq!(after_first.unwrap().len(), 0);
    assert_eq!(after_second.unwrap().len(), 0);
    assert!(stream.try_recv().is_none());
}

#[test]
fn live_query_ignores_unrelated_tables() {
    let backend = MemoryBackend::new();
    let store = store_with(&backend);

    let stream = store
        .get_list::<User>(Query::new(USERS_TABLE))
        .stream(OverflowPolicy::Buffer);
    assert!(stream.try_recv().is_some(), "cold start");

    store
        .execute_raw(RawQuery {
            affects_tables: vec!["orders".to_string()],
            ..RawQuery::new("UPDATE orders SET total = 0")
        })
        .execute()
        .unwrap();

    assert!(
        stream.try_recv().is_none(),
        "write to an unrelated table must not re-trigger"
    );
}

#[test]
fn live_query_observes_declared_tags() {
    let backend = MemoryBackend::new();
    let store = store_with(&backend);

    let query = Query {
        observes_tags: vec!["billing".to_string()],
        ..Query::new(USERS_TABLE)
    };
    let stream = store.get_list::<User>(query).stream(OverflowPolicy::Buffer);
    assert!(stream.try_recv().is_some(), "cold start");

    // A raw write that only declares the tag still re-triggers the query.
    store
        .execute_raw(RawQuery {
            affects_tags: vec!["billing".to_string()],
            ..RawQuery::new("UPDATE invoices SET total = 0")
        })
        .execute()
        .unwrap();

    assert!(stream.try_recv().is_some(), "tag match must re-trigger");
}

#[test]
fn latest_policy_keeps_only_the_newest_unreceived_value() {
    let backend = MemoryBackend::new();
    let store = store_with(&backend);

    let stream = store
        .get_list::<User>(Query::new(USERS_TABLE))
        .stream(OverflowPolicy::Latest);

    store.put(User::new(None, "Alice")).execute().unwrap();
    store.put(User::new(None, "Bob")).execute().unwrap();
    store.put(User::new(None, "Carol")).execute().unwrap();

    let newest = stream.try_recv().expect("one value kept").unwrap();
    assert_eq!(newest.len(), 3, "kept value reflects the final state");
    assert!(
        stream.try_recv().is_none(),
        "intermediates must have been dropped"
    );
}

#[test]
fn buffer_policy_queues_every_emission() {
    let backend = MemoryBackend::new();
    let store = store_with(&backend);

    let stream = store
        .get_list::<User>(Query::new(USERS_TABLE))
        .stream(OverflowPolicy::Buffer);

    store.put(User::new(None, "Alice")).execute().unwrap();
    store.put(User::new(None, "Bob")).execute().unwrap();

    let mut sizes = Vec::new();
    while let Some(item) = stream.try_recv() {
        sizes.push(item.unwrap().len());
    }
    assert_eq!(sizes, vec![0, 1, 2], "cold start plus one per write");
}

#[test]
fn failed_reexecution_terminates_the_stream_with_an_error() {
    let backend = MemoryBackend::new();
    let store = store_with(&backend);

    let stream = store
        .get_list::<User>(Query::new(USERS_TABLE))
        .stream(OverflowPolicy::Buffer);
    assert!(stream.try_recv().unwrap().is_ok(), "cold start succeeds");

    backend.set_fail_reads(true);
    store.put(User::new(None, "Alice")).execute().unwrap();

    let terminal = stream.try_recv().expect("terminal item");
    assert!(terminal.is_err());
    assert!(stream.try_recv().is_none());

    // The subscription is torn down: later writes emit nothing.
    backend.set_fail_reads(false);
    store.put(User::new(None, "Bob")).execute().unwrap();
    assert!(stream.try_recv().is_none());
    assert_eq!(store.change_subscriber_count(), 0);
}

#[test]
fn cancelled_stream_receives_nothing_further() {
    let backend = MemoryBackend::new();
    let store = store_with(&backend);

    let stream = store
        .get_list::<User>(Query::new(USERS_TABLE))
        .stream(OverflowPolicy::Buffer);
    assert!(stream.try_recv().is_some(), "cold start");

    stream.cancel();
    stream.cancel();
    assert!(stream.is_cancelled());

    store.put(User::new(None, "Alice")).execute().unwrap();
    assert!(stream.try_recv().is_none());
    assert!(stream.recv().is_none(), "closed stream unblocks recv");
}

#[test]
fn dropping_a_stream_cancels_its_subscription() {
    let backend = MemoryBackend::new();
    let store = store_with(&backend);

    let stream = store
        .get_list::<User>(Query::new(USERS_TABLE))
        .stream(OverflowPolicy::Buffer);
    drop(stream);

    // No subscriber left behind: this write fans out to nobody.
    store.put(User::new(None, "Alice")).execute().unwrap();
    assert_eq!(store.change_subscriber_count(), 0);
}

#[test]
fn raw_query_without_observed_set_emits_once_and_completes() {
    let backend = MemoryBackend::new();
    let store = store_with(&backend);
    store.put(User::new(None, "Alice")).execute().unwrap();

    let stream = store
        .get_list::<User>(RawQuery::new("SELECT * FROM users"))
        .stream(OverflowPolicy::Buffer);

    assert_eq!(stream.recv().unwrap().unwrap().len(), 1);
    assert!(stream.recv().is_none(), "auto-refresh disabled: stream ends");
}

#[test]
fn object_stream_reemits_identical_not_found_results() {
    let backend = MemoryBackend::new();
    let store = store_with(&backend);

    let stream = store
        .get_object::<User>(users_by_name("nobody"))
        .stream(OverflowPolicy::Buffer);

    assert!(stream.try_recv().unwrap().unwrap().is_none(), "cold start");

    store.put(User::new(None, "Alice")).execute().unwrap();
    store.put(User::new(None, "Bob")).execute().unwrap();

    // Two unrelated writes to the observed table: two more `None` results.
    assert!(stream.try_recv().expect("first reemit").unwrap().is_none());
    assert!(stream.try_recv().expect("second reemit").unwrap().is_none());
    assert!(stream.try_recv().is_none());
}

#[test]
fn stream_iterates_until_cancelled() {
    let backend = MemoryBackend::new();
    let store = store_with(&backend);

    let mut stream = store
        .get_list::<User>(Query::new(USERS_TABLE))
        .stream(OverflowPolicy::Buffer);

    store.put(User::new(None, "Alice")).execute().unwrap();
    stream.cancel();

    // After cancel the iterator terminates instead of blocking.
    assert_eq!(stream.by_ref().count(), 0);
}
