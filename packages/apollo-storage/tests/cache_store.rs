use std::sync::Arc;

use serde_json::json;
use time::Duration;

use apollo_storage::{CacheStore, Error, StorageMode};
use apollo_testkit::{ManualClock, durable_store, failing_store};

#[tokio::test]
async fn put_then_get_round_trips_until_ttl_elapses() {
	let clock = Arc::new(ManualClock::default());
	let (store, backend) = durable_store(clock.clone());
	let payload = json!({ "articles": [{ "id": "12345", "title": "Aortic dissection" }] });

	store.put("pubmed", "q1", payload.clone(), Duration::minutes(5)).await.expect("put");

	let entry = store.get("pubmed", "q1").await.expect("get").expect("hit");

	assert_eq!(entry.payload, payload);
	assert_eq!(entry.expires_at - entry.created_at, Duration::minutes(5));
	assert!(backend.raw("pubmed", "q1").is_some());

	clock.advance(Duration::minutes(5));

	assert!(store.get("pubmed", "q1").await.expect("get").is_none());
	assert_eq!(store.mode(), StorageMode::Durable);
}

#[tokio::test]
async fn fallback_round_trip_respects_ttl() {
	let clock = Arc::new(ManualClock::default());
	let store = CacheStore::memory_only(clock.clone());

	store.put("session", "abc", json!({ "foo": "bar" }), Duration::seconds(90)).await.expect("put");

	clock.advance(Duration::seconds(89));

	assert!(store.get("session", "abc").await.expect("get").is_some());

	clock.advance(Duration::seconds(1));

	assert!(store.get("session", "abc").await.expect("get").is_none());
	assert_eq!(store.mode(), StorageMode::Fallback);
}

#[tokio::test]
async fn durable_failure_demotes_and_serves_from_fallback() {
	let clock = Arc::new(ManualClock::default());
	let (store, backend) = failing_store(clock);

	assert_eq!(store.mode(), StorageMode::Durable);

	store.put("pubmed", "q1", json!([1, 2, 3]), Duration::minutes(1)).await.expect("put");

	assert_eq!(store.mode(), StorageMode::Fallback);
	assert_eq!(backend.calls(), 1);

	let entry = store.get("pubmed", "q1").await.expect("get").expect("hit");

	assert_eq!(entry.payload, json!([1, 2, 3]));
	assert_eq!(store.list_keys("pubmed", 10).await.expect("list"), vec!["q1".to_string()]);

	store.delete("pubmed", "q1").await.expect("delete");

	assert!(store.get("pubmed", "q1").await.expect("get").is_none());
	assert_eq!(backend.calls(), 1, "Fallback mode must not keep hammering the backend.");
}

#[tokio::test]
async fn failed_probe_keeps_fallback_mode() {
	let clock = Arc::new(ManualClock::default());
	let (store, backend) = failing_store(clock);

	assert!(!store.probe().await);
	assert_eq!(store.mode(), StorageMode::Fallback);
	assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn recovery_does_not_migrate_fallback_entries() {
	let clock = Arc::new(ManualClock::default());
	let (store, backend) = durable_store(clock);

	store.put("pubmed", "before", json!("durable"), Duration::minutes(10)).await.expect("put");

	backend.set_available(false);

	store.put("pubmed", "during", json!("fallback"), Duration::minutes(10)).await.expect("put");

	assert_eq!(store.mode(), StorageMode::Fallback);
	assert!(store.get("pubmed", "before").await.expect("get").is_none());

	backend.set_available(true);

	assert!(store.probe().await);
	assert_eq!(store.mode(), StorageMode::Durable);
	assert!(store.get("pubmed", "before").await.expect("get").is_some());
	assert!(store.get("pubmed", "during").await.expect("get").is_none());
}

#[tokio::test]
async fn reconnect_loop_promotes_once_backend_returns() {
	let clock = Arc::new(ManualClock::default());
	let (store, backend) = durable_store(clock);
	let store = Arc::new(store);

	backend.set_available(false);

	assert!(!store.probe().await);

	let handle = store
		.spawn_reconnect_loop(std::time::Duration::from_millis(10))
		.expect("First reconnect loop must start.");

	assert!(store.spawn_reconnect_loop(std::time::Duration::from_millis(10)).is_none());

	backend.set_available(true);

	for _ in 0..200 {
		if store.mode() == StorageMode::Durable {
			break;
		}

		tokio::time::sleep(std::time::Duration::from_millis(10)).await;
	}

	assert_eq!(store.mode(), StorageMode::Durable);

	handle.abort();
}

#[tokio::test]
async fn replace_keeps_original_expiry() {
	let clock = Arc::new(ManualClock::default());
	let (store, _backend) = durable_store(clock.clone());
	let mut entry =
		store.put("session", "s1", json!({ "n": 1 }), Duration::hours(1)).await.expect("put");

	clock.advance(Duration::minutes(30));

	entry.payload = json!({ "n": 2 });

	assert!(store.replace(&entry).await.expect("replace"));

	let stored = store.get("session", "s1").await.expect("get").expect("hit");

	assert_eq!(stored.payload, json!({ "n": 2 }));
	assert_eq!(stored.expires_at, entry.expires_at);

	clock.advance(Duration::minutes(30));

	assert!(!store.replace(&entry).await.expect("replace"));
	assert!(store.get("session", "s1").await.expect("get").is_none());
}

#[tokio::test]
async fn get_any_skips_excluded_namespaces() {
	let clock = Arc::new(ManualClock::default());
	let store = CacheStore::memory_only(clock);

	store.put("session", "shared", json!("session"), Duration::minutes(1)).await.expect("put");
	store.put("pubmed", "shared", json!("pubmed"), Duration::minutes(1)).await.expect("put");

	let entry = store.get_any("shared", &["session"]).await.expect("get_any").expect("hit");

	assert_eq!(entry.source, "pubmed");
	assert!(store.get_any("missing", &[]).await.expect("get_any").is_none());
}

#[tokio::test]
async fn list_entries_respects_limit() {
	let clock = Arc::new(ManualClock::default());
	let (store, _backend) = durable_store(clock);

	for key in ["a", "b", "c"] {
		store.put("session", key, json!({ "key": key }), Duration::hours(1)).await.expect("put");
	}

	assert_eq!(store.list_entries("session", 2).await.expect("list").len(), 2);
	assert_eq!(store.list_entries("session", 50).await.expect("list").len(), 3);
	assert!(store.list_entries("session", 0).await.expect("list").is_empty());
}

#[tokio::test]
async fn invalid_arguments_are_rejected() {
	let store = CacheStore::memory_only(Arc::new(ManualClock::default()));
	let cases = [
		store.put("", "k", json!(1), Duration::minutes(1)).await,
		store.put("pub:med", "k", json!(1), Duration::minutes(1)).await,
		store.put("pubmed", " ", json!(1), Duration::minutes(1)).await,
		store.put("pubmed", "k", json!(1), Duration::ZERO).await,
	];

	for result in cases {
		assert!(matches!(result, Err(Error::InvalidArgument(_))), "Unexpected result: {result:?}");
	}
}
