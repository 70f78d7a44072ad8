mod common;

use common::MockTransport;
use fetchcache::cache::codec;
use fetchcache::{CacheContext, CacheEntry, CacheStore, FetchError, KeyState};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::{sleep, timeout};

#[tokio::test]
async fn test_producer_to_consumer_round_trip() {
    // Producer: a server preloads before rendering
    let server_transport = MockTransport::new()
        .respond("/people", 200, r#"[{"name": "Luke"}]"#)
        .respond("/planets", 500, "")
        .shared();
    let server = CacheContext::new(server_transport.clone());
    let _ = server.preload_all(["/people", "/planets"]).await;
    let payload = server.serialize().unwrap();

    // Consumer: a fresh context that must not repeat the work
    let client_transport = MockTransport::new().shared();
    let client = CacheContext::new(client_transport.clone());
    assert_eq!(client.hydrate(&payload), 2);

    assert_eq!(client.store().snapshot_all(), server.store().snapshot_all());
    assert_eq!(client.ensure("/people").await, Ok(json!([{"name": "Luke"}])));
    assert_eq!(client.ensure("/planets").await, Err(FetchError::status(500)));
    assert_eq!(client_transport.total_calls(), 0);
}

#[tokio::test]
async fn test_hydration_suppresses_fetch() {
    let transport = MockTransport::new().shared();
    let context = CacheContext::new(transport.clone());

    context.hydrate(
        r#"{"/people": {"data": [{"name": "Leia"}], "error": null, "timestamp": 1700000000000}}"#,
    );

    let (state, mut sub) = context.subscribe("/people");
    assert!(!state.is_loading);
    assert_eq!(state.data, Some(json!([{"name": "Leia"}])));
    assert!(state.error.is_none());

    // Nothing was pending, so nothing is pushed
    assert!(timeout(Duration::from_millis(50), sub.recv()).await.is_err());
    assert_eq!(transport.total_calls(), 0);
    assert_eq!(context.store().get("/people").unwrap().timestamp, 1_700_000_000_000);
}

#[tokio::test]
async fn test_null_body_is_handed_off_as_data() {
    let server_transport = MockTransport::new().respond("/flag", 200, "null").shared();
    let server = CacheContext::new(server_transport);
    assert_eq!(server.ensure("/flag").await, Ok(Value::Null));
    let payload = server.serialize().unwrap();

    let value: Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(value["/flag"]["data"], Value::Null);
    assert_eq!(value["/flag"]["error"], Value::Null);

    let client_transport = MockTransport::new().shared();
    let client = CacheContext::new(client_transport.clone());
    assert_eq!(client.hydrate(&payload), 1);
    assert_eq!(client.state("/flag"), KeyState::Resolved);

    let (state, _sub) = client.subscribe("/flag");
    assert!(!state.is_loading);
    assert_eq!(state.data, Some(Value::Null));
    assert!(state.error.is_none());
    assert_eq!(client.ensure("/flag").await, Ok(Value::Null));
    assert_eq!(client_transport.total_calls(), 0);
}

#[tokio::test]
async fn test_failed_entries_carry_no_data_field() {
    let transport = MockTransport::new().respond("/down", 503, "").shared();
    let context = CacheContext::new(transport);
    let _ = context.preload("/down").await;

    let value: Value = serde_json::from_str(&context.serialize().unwrap()).unwrap();
    let mut fields: Vec<&String> = value["/down"].as_object().unwrap().keys().collect();
    fields.sort();
    assert_eq!(fields, vec!["error", "timestamp"]);
}

#[tokio::test]
async fn test_round_trip_is_exact() {
    let store = CacheStore::new();
    store.put(
        "/a",
        CacheEntry {
            data: Some(json!({"nested": {"list": [1, 2.5, "x", null]}})),
            error: None,
            timestamp: 1,
        },
    );
    store.put(
        "/b",
        CacheEntry {
            data: None,
            error: Some(FetchError::decode("expected value at line 1 column 1")),
            timestamp: 2,
        },
    );

    let decoded = codec::decode(&codec::encode(&store).unwrap()).unwrap();
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded["/a"], store.get("/a").unwrap());
    assert_eq!(decoded["/b"], store.get("/b").unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_in_flight_keys_never_cross_the_boundary() {
    let transport = MockTransport::gated()
        .respond("/slow", 200, "[]")
        .respond("/fast", 200, "{}")
        .shared();
    let context = CacheContext::new(transport.clone());

    transport.release(1);
    context.preload("/fast").await.unwrap();

    let pending = tokio::spawn({
        let context = context.clone();
        async move { context.ensure("/slow").await }
    });
    while context.state("/slow") != KeyState::Pending {
        sleep(Duration::from_millis(5)).await;
    }

    let payload = context.serialize().unwrap();
    let value: Value = serde_json::from_str(&payload).unwrap();
    let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["/fast"]);
    for entry in value.as_object().unwrap().values() {
        let mut fields: Vec<&String> = entry.as_object().unwrap().keys().collect();
        fields.sort();
        assert_eq!(fields, vec!["data", "error", "timestamp"]);
    }

    transport.release(1);
    assert_eq!(pending.await.unwrap(), Ok(json!([])));
}

#[tokio::test]
async fn test_malformed_payload_leaves_cache_empty() {
    let transport = MockTransport::new().respond("/people", 200, "[]").shared();
    let context = CacheContext::new(transport.clone());

    assert_eq!(context.hydrate("<script>window.__CACHE__ = oops</script>"), 0);
    assert!(context.store().is_empty());

    // Startup continues and the key is fetched normally
    assert_eq!(context.ensure("/people").await, Ok(json!([])));
    assert_eq!(transport.calls("/people"), 1);
}

#[tokio::test]
async fn test_late_hydration_discards_local_state() {
    let transport = MockTransport::new().respond("/local", 200, "1").shared();
    let context = CacheContext::new(transport);
    context.preload("/local").await.unwrap();

    context.hydrate(r#"{"/remote": {"data": 2, "error": null, "timestamp": 5}}"#);

    assert_eq!(context.state("/local"), KeyState::Empty);
    assert_eq!(context.state("/remote"), KeyState::Resolved);
}
