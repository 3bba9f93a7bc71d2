use std::sync::{
	Arc,
	atomic::{AtomicBool, AtomicU8, Ordering},
};

use serde::Serialize;
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use tokio::task::JoinHandle;

use crate::{
	Clock, DurableBackend, Error, Result, SystemClock, durable::RedisBackend, memory::MemoryStore,
	models::{self, CacheEntry},
	validate_key, validate_namespace,
};

const MODE_DURABLE: u8 = 0;
const MODE_FALLBACK: u8 = 1;

/// Which backing store currently serves reads and writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
	Durable,
	Fallback,
}
impl StorageMode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Durable => "durable",
			Self::Fallback => "fallback",
		}
	}
}

/// Namespaced TTL cache that never surfaces durable-backend failures.
///
/// Starts optimistic in [`StorageMode::Durable`]. The first backend error flips it to
/// [`StorageMode::Fallback`] and the failed call is replayed against the in-process store. The
/// store only returns to durable mode through [`CacheStore::probe`], usually driven by
/// [`CacheStore::spawn_reconnect_loop`].
pub struct CacheStore {
	durable: Option<Arc<dyn DurableBackend>>,
	fallback: MemoryStore,
	clock: Arc<dyn Clock>,
	mode: AtomicU8,
	reconnect_loop: AtomicBool,
}
impl CacheStore {
	pub fn new(durable: Option<Arc<dyn DurableBackend>>, clock: Arc<dyn Clock>) -> Self {
		let mode = if durable.is_some() { MODE_DURABLE } else { MODE_FALLBACK };

		Self {
			durable,
			fallback: MemoryStore::new(),
			clock,
			mode: AtomicU8::new(mode),
			reconnect_loop: AtomicBool::new(false),
		}
	}

	pub fn memory_only(clock: Arc<dyn Clock>) -> Self {
		Self::new(None, clock)
	}

	/// Builds a store over Redis and checks reachability once. Never fails: an unusable
	/// configuration or an unreachable server leaves the store in fallback mode.
	pub async fn connect(cfg: &apollo_config::Redis) -> Self {
		let clock: Arc<dyn Clock> = Arc::new(SystemClock);

		match RedisBackend::new(cfg) {
			Ok(backend) => {
				let store = Self::new(Some(Arc::new(backend)), clock);

				if store.probe().await {
					tracing::info!(host = %cfg.host, port = cfg.port, "Durable cache backend ready.");
				}

				store
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					"Invalid Redis settings. Serving from the in-process fallback store."
				);

				Self::memory_only(clock)
			},
		}
	}

	pub fn mode(&self) -> StorageMode {
		match self.mode.load(Ordering::SeqCst) {
			MODE_DURABLE => StorageMode::Durable,
			_ => StorageMode::Fallback,
		}
	}

	pub fn now(&self) -> OffsetDateTime {
		self.clock.now()
	}

	pub async fn put(
		&self,
		namespace: &str,
		key: &str,
		payload: Value,
		ttl: Duration,
	) -> Result<CacheEntry> {
		validate_namespace(namespace)?;
		validate_key(key)?;

		if !ttl.is_positive() {
			return Err(Error::InvalidArgument("ttl must be greater than zero.".to_string()));
		}

		let entry = CacheEntry::new(namespace, key, payload, self.clock.now(), ttl);

		self.write(&entry, ttl).await?;

		Ok(entry)
	}

	/// Overwrites an existing entry while keeping its original expiry.
	///
	/// Returns `false` without writing when the entry has already expired.
	pub async fn replace(&self, entry: &CacheEntry) -> Result<bool> {
		validate_namespace(&entry.source)?;
		validate_key(&entry.key)?;

		let Some(remaining) = entry.remaining_ttl(self.clock.now()) else {
			return Ok(false);
		};

		self.write(entry, remaining).await?;

		Ok(true)
	}

	pub async fn get(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>> {
		validate_namespace(namespace)?;
		validate_key(key)?;

		let now = self.clock.now();

		if let Some(backend) = self.active_backend() {
			match backend.get(namespace, key).await {
				Ok(Some(raw)) => {
					let entry = decode_entry(namespace, key, &raw);

					return Ok(entry.filter(|entry| !entry.is_expired(now)));
				},
				Ok(None) => return Ok(None),
				Err(err) => self.demote("get", &err),
			}
		}

		Ok(self.fallback.get(namespace, key, now))
	}

	/// Idempotent; deleting a missing key succeeds.
	pub async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
		validate_namespace(namespace)?;
		validate_key(key)?;

		if let Some(backend) = self.active_backend() {
			match backend.delete(namespace, key).await {
				Ok(()) => return Ok(()),
				Err(err) => self.demote("delete", &err),
			}
		}

		self.fallback.delete(namespace, key);

		Ok(())
	}

	pub async fn list_keys(&self, namespace: &str, limit: usize) -> Result<Vec<String>> {
		validate_namespace(namespace)?;

		if limit == 0 {
			return Ok(Vec::new());
		}
		if let Some(backend) = self.active_backend() {
			match backend.list_keys(namespace, limit).await {
				Ok(keys) => return Ok(keys),
				Err(err) => self.demote("list_keys", &err),
			}
		}

		Ok(self.fallback.list_keys(namespace, limit, self.clock.now()))
	}

	/// Live entries of `namespace`, up to `limit`. Keys that expire between listing and reading
	/// are skipped.
	pub async fn list_entries(&self, namespace: &str, limit: usize) -> Result<Vec<CacheEntry>> {
		let keys = self.list_keys(namespace, limit).await?;
		let mut entries = Vec::with_capacity(keys.len());

		for key in keys {
			if let Some(entry) = self.get(namespace, &key).await? {
				entries.push(entry);
			}
		}

		Ok(entries)
	}

	pub async fn namespaces(&self) -> Vec<String> {
		if let Some(backend) = self.active_backend() {
			match backend.namespaces().await {
				Ok(names) => return names,
				Err(err) => self.demote("namespaces", &err),
			}
		}

		self.fallback.namespaces()
	}

	/// First live entry stored under `key` in any namespace not listed in `exclude`.
	///
	/// Namespaces are visited in sorted order. When the same key exists in several namespaces the
	/// winner depends only on that order, not on which entry was written last.
	pub async fn get_any(&self, key: &str, exclude: &[&str]) -> Result<Option<CacheEntry>> {
		validate_key(key)?;

		for namespace in self.namespaces().await {
			if exclude.contains(&namespace.as_str()) || validate_namespace(&namespace).is_err() {
				continue;
			}
			if let Some(entry) = self.get(&namespace, key).await? {
				return Ok(Some(entry));
			}
		}

		Ok(None)
	}

	/// Pings the durable backend and updates the mode accordingly. Returns whether it is reachable.
	pub async fn probe(&self) -> bool {
		let Some(backend) = self.durable.as_deref() else { return false };

		match backend.ping().await {
			Ok(()) => {
				let previous = self.mode.swap(MODE_DURABLE, Ordering::SeqCst);

				if previous == MODE_FALLBACK {
					tracing::info!(
						fallback_entries = self.fallback.len(),
						"Durable cache backend reachable again. Fallback entries are not migrated."
					);
				}

				true
			},
			Err(err) => {
				self.demote("ping", &err);

				false
			},
		}
	}

	/// Starts the background probe that promotes the store back to durable mode.
	///
	/// At most one loop runs per store; later calls return `None`. The loop ends once the store is
	/// dropped.
	pub fn spawn_reconnect_loop(
		self: &Arc<Self>,
		interval: std::time::Duration,
	) -> Option<JoinHandle<()>> {
		if self.durable.is_none() || interval.is_zero() {
			return None;
		}
		if self.reconnect_loop.swap(true, Ordering::SeqCst) {
			return None;
		}

		let store = Arc::downgrade(self);

		Some(tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);

			ticker.tick().await;

			loop {
				ticker.tick().await;

				let Some(store) = store.upgrade() else { break };

				if store.mode() == StorageMode::Fallback {
					store.probe().await;
				}
			}
		}))
	}

	fn active_backend(&self) -> Option<&dyn DurableBackend> {
		if self.mode() != StorageMode::Durable {
			return None;
		}

		self.durable.as_deref()
	}

	async fn write(&self, entry: &CacheEntry, ttl: Duration) -> Result<()> {
		if let Some(backend) = self.active_backend() {
			let raw = serde_json::to_string(entry)?;

			match backend.put(&entry.source, &entry.key, &raw, models::ttl_secs(ttl)).await {
				Ok(()) => return Ok(()),
				Err(err) => self.demote("put", &err),
			}
		}

		self.fallback.put(entry.clone(), self.clock.now());

		Ok(())
	}

	fn demote(&self, operation: &'static str, err: &Error) {
		let previous = self.mode.swap(MODE_FALLBACK, Ordering::SeqCst);

		if previous == MODE_DURABLE {
			tracing::warn!(
				operation,
				error = %err,
				"Durable cache backend unavailable. Serving from the in-process fallback store."
			);
		} else {
			tracing::debug!(operation, error = %err, "Durable cache backend still unavailable.");
		}
	}
}

fn decode_entry(namespace: &str, key: &str, raw: &str) -> Option<CacheEntry> {
	match serde_json::from_str::<CacheEntry>(raw) {
		Ok(entry) => Some(entry),
		Err(err) => {
			tracing::warn!(namespace, key, error = %err, "Dropping undecodable cache entry.");

			None
		},
	}
}
