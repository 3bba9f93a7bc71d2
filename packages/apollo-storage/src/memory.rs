use std::{
	collections::HashMap,
	sync::{Mutex, MutexGuard},
};

use time::OffsetDateTime;

use crate::models::CacheEntry;

type Namespaces = HashMap<String, HashMap<String, CacheEntry>>;

/// Process-local stand-in for the durable backend.
///
/// The map has no native TTL: each entry carries its own expiry, checked on read. Expired entries
/// are dropped when a read or listing touches them, and a write sweeps the bucket it lands in.
#[derive(Debug, Default)]
pub struct MemoryStore {
	entries: Mutex<Namespaces>,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn put(&self, entry: CacheEntry, now: OffsetDateTime) {
		let mut entries = self.lock();
		let bucket = entries.entry(entry.source.clone()).or_default();

		bucket.retain(|_, stored| !stored.is_expired(now));
		bucket.insert(entry.key.clone(), entry);
	}

	pub fn get(&self, namespace: &str, key: &str, now: OffsetDateTime) -> Option<CacheEntry> {
		let mut entries = self.lock();
		let bucket = entries.get_mut(namespace)?;

		if bucket.get(key)?.is_expired(now) {
			bucket.remove(key);

			return None;
		}

		bucket.get(key).cloned()
	}

	pub fn delete(&self, namespace: &str, key: &str) {
		if let Some(bucket) = self.lock().get_mut(namespace) {
			bucket.remove(key);
		}
	}

	pub fn list_keys(&self, namespace: &str, limit: usize, now: OffsetDateTime) -> Vec<String> {
		let mut entries = self.lock();
		let Some(bucket) = entries.get_mut(namespace) else { return Vec::new() };

		bucket.retain(|_, entry| !entry.is_expired(now));

		bucket.keys().take(limit).cloned().collect()
	}

	/// Namespaces in sorted order, so cross-namespace lookups are repeatable within a process.
	pub fn namespaces(&self) -> Vec<String> {
		let mut names = self.lock().keys().cloned().collect::<Vec<_>>();

		names.sort();

		names
	}

	pub fn len(&self) -> usize {
		self.lock().values().map(HashMap::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn lock(&self) -> MutexGuard<'_, Namespaces> {
		self.entries.lock().unwrap_or_else(|err| err.into_inner())
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use time::{Duration, macros::datetime};

	use super::*;

	fn entry(namespace: &str, key: &str, now: OffsetDateTime, ttl_secs: i64) -> CacheEntry {
		CacheEntry::new(namespace, key, json!({ "key": key }), now, Duration::seconds(ttl_secs))
	}

	#[test]
	fn expired_entries_read_as_miss_and_are_evicted() {
		let now = datetime!(2026-05-01 12:00 UTC);
		let store = MemoryStore::new();

		store.put(entry("pubmed", "q1", now, 60), now);

		assert!(store.get("pubmed", "q1", now + Duration::seconds(59)).is_some());
		assert!(store.get("pubmed", "q1", now + Duration::seconds(60)).is_none());
		assert!(store.is_empty());
	}

	#[test]
	fn listing_skips_expired_and_respects_limit() {
		let now = datetime!(2026-05-01 12:00 UTC);
		let store = MemoryStore::new();

		store.put(entry("session", "a", now, 10), now);
		store.put(entry("session", "b", now, 100), now);
		store.put(entry("session", "c", now, 100), now);
		store.put(entry("pubmed", "x", now, 100), now);

		let later = now + Duration::seconds(50);
		let mut keys = store.list_keys("session", 10, later);

		keys.sort();

		assert_eq!(keys, vec!["b".to_string(), "c".to_string()]);
		assert_eq!(store.list_keys("session", 1, later).len(), 1);
		assert!(store.list_keys("missing", 10, later).is_empty());
	}

	#[test]
	fn overwrite_replaces_whole_entry() {
		let now = datetime!(2026-05-01 12:00 UTC);
		let store = MemoryStore::new();

		store.put(entry("pubmed", "q1", now, 60), now);
		store.put(CacheEntry::new("pubmed", "q1", json!([1, 2]), now, Duration::seconds(60)), now);

		let stored = store.get("pubmed", "q1", now).expect("entry");

		assert_eq!(stored.payload, json!([1, 2]));
		assert_eq!(store.len(), 1);

		store.delete("pubmed", "q1");
		store.delete("pubmed", "q1");

		assert!(store.get("pubmed", "q1", now).is_none());
	}

	#[test]
	fn writes_sweep_expired_entries_from_their_bucket() {
		let now = datetime!(2026-05-01 12:00 UTC);
		let store = MemoryStore::new();

		for i in 0..1_000 {
			store.put(entry("pubmed", &format!("q{i}"), now, 1), now);
		}

		store.put(entry("session", "s1", now, 1), now);

		let later = now + Duration::hours(1);

		store.put(entry("pubmed", "fresh", later, 60), later);

		assert!(store.get("pubmed", "fresh", later).is_some());
		assert_eq!(store.len(), 2, "Only the fresh entry and the untouched bucket may remain.");

		store.put(entry("session", "s2", later, 60), later);

		assert_eq!(store.len(), 2);
	}
}
