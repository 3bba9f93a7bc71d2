mod error;

pub use error::{Error, Result};

use std::{
	collections::HashMap,
	env,
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
};

use serde_json::Map;
use time::{Duration, OffsetDateTime, macros::datetime};
use uuid::Uuid;

use apollo_config::Config;
use apollo_domain::{Candidate, SearchSource};
use apollo_providers::{SearchPage, SearchProvider, SearchRequest};
use apollo_storage::{BoxFuture, CacheStore, Clock, DurableBackend};

const TEST_CONFIG_TOML: &str = r#"
[service]
http_bind = "127.0.0.1:0"
mcp_bind = "127.0.0.1:0"
log_level = "debug"

[storage.redis]
host = "127.0.0.1"
port = 6379
key_prefix = "apollo_test"
connect_timeout_ms = 200
command_timeout_ms = 200

[providers.pubmed]
api_base = "http://127.0.0.1:9/eutils"
timeout_ms = 1000
max_retries = 0
retry_delay_ms = 1

[providers.clinicaltrials]
api_base = "http://127.0.0.1:9/api/v2"
timeout_ms = 1000
max_retries = 0
retry_delay_ms = 1

[search]
max_results = 10
abstract_max_chars = 500
query_timeout_ms = 2000
min_classification_confidence = 0.5

[cache]
session_ttl_hours = 24.0
data_ttl_minutes = 60.0
pubmed_ttl_minutes = 1440
clinicaltrials_ttl_minutes = 360
"#;

pub fn env_redis_url() -> Option<String> {
	env::var("APOLLO_REDIS_URL").ok()
}

/// A validated configuration pointing at unroutable upstreams, for tests that never hit the network.
pub fn test_config() -> Config {
	let cfg: Config = match toml::from_str(TEST_CONFIG_TOML) {
		Ok(cfg) => cfg,
		Err(err) => panic!("Test config must parse: {err}."),
	};

	if let Err(err) = apollo_config::validate(&cfg) {
		panic!("Test config must validate: {err}.");
	}

	cfg
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
	now: Mutex<OffsetDateTime>,
}
impl ManualClock {
	pub fn new(start: OffsetDateTime) -> Self {
		Self { now: Mutex::new(start) }
	}

	pub fn advance(&self, by: Duration) {
		let mut now = self.now.lock().unwrap_or_else(|err| err.into_inner());

		*now += by;
	}
}
impl Default for ManualClock {
	fn default() -> Self {
		Self::new(datetime!(2026-01-15 09:30 UTC))
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.now.lock().unwrap_or_else(|err| err.into_inner())
	}
}

/// Durable backend whose every call fails, as if the server were unreachable.
#[derive(Debug, Default)]
pub struct FailingBackend {
	calls: AtomicUsize,
}
impl FailingBackend {
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	fn fail<T>(&self, operation: &str) -> BoxFuture<'static, apollo_storage::Result<T>>
	where
		T: Send + 'static,
	{
		self.calls.fetch_add(1, Ordering::SeqCst);

		let err = refused(operation);

		Box::pin(async move { Err(err) })
	}
}
impl DurableBackend for FailingBackend {
	fn put<'a>(
		&'a self,
		_namespace: &'a str,
		_key: &'a str,
		_raw: &'a str,
		_ttl_secs: u64,
	) -> BoxFuture<'a, apollo_storage::Result<()>> {
		self.fail("put")
	}

	fn get<'a>(
		&'a self,
		_namespace: &'a str,
		_key: &'a str,
	) -> BoxFuture<'a, apollo_storage::Result<Option<String>>> {
		self.fail("get")
	}

	fn delete<'a>(
		&'a self,
		_namespace: &'a str,
		_key: &'a str,
	) -> BoxFuture<'a, apollo_storage::Result<()>> {
		self.fail("delete")
	}

	fn list_keys<'a>(
		&'a self,
		_namespace: &'a str,
		_limit: usize,
	) -> BoxFuture<'a, apollo_storage::Result<Vec<String>>> {
		self.fail("list_keys")
	}

	fn namespaces(&self) -> BoxFuture<'_, apollo_storage::Result<Vec<String>>> {
		self.fail("namespaces")
	}

	fn ping(&self) -> BoxFuture<'_, apollo_storage::Result<()>> {
		self.fail("ping")
	}
}

/// In-memory durable backend that can be switched off and on to simulate an outage.
///
/// It keeps raw serialized values and ignores TTLs; expiry is enforced by the store reading it.
#[derive(Debug)]
pub struct MemoryDurableBackend {
	entries: Mutex<HashMap<(String, String), String>>,
	available: AtomicBool,
}
impl MemoryDurableBackend {
	pub fn new() -> Self {
		Self { entries: Mutex::new(HashMap::new()), available: AtomicBool::new(true) }
	}

	pub fn set_available(&self, available: bool) {
		self.available.store(available, Ordering::SeqCst);
	}

	pub fn raw(&self, namespace: &str, key: &str) -> Option<String> {
		self.lock().get(&(namespace.to_string(), key.to_string())).cloned()
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), String>> {
		self.entries.lock().unwrap_or_else(|err| err.into_inner())
	}

	fn run<T, F>(&self, operation: &str, f: F) -> BoxFuture<'static, apollo_storage::Result<T>>
	where
		T: Send + 'static,
		F: FnOnce(&mut HashMap<(String, String), String>) -> T,
	{
		let result = if self.available.load(Ordering::SeqCst) {
			Ok(f(&mut self.lock()))
		} else {
			Err(refused(operation))
		};

		Box::pin(async move { result })
	}
}
impl Default for MemoryDurableBackend {
	fn default() -> Self {
		Self::new()
	}
}
impl DurableBackend for MemoryDurableBackend {
	fn put<'a>(
		&'a self,
		namespace: &'a str,
		key: &'a str,
		raw: &'a str,
		_ttl_secs: u64,
	) -> BoxFuture<'a, apollo_storage::Result<()>> {
		self.run("put", |entries| {
			entries.insert((namespace.to_string(), key.to_string()), raw.to_string());
		})
	}

	fn get<'a>(
		&'a self,
		namespace: &'a str,
		key: &'a str,
	) -> BoxFuture<'a, apollo_storage::Result<Option<String>>> {
		self.run("get", |entries| entries.get(&(namespace.to_string(), key.to_string())).cloned())
	}

	fn delete<'a>(
		&'a self,
		namespace: &'a str,
		key: &'a str,
	) -> BoxFuture<'a, apollo_storage::Result<()>> {
		self.run("delete", |entries| {
			entries.remove(&(namespace.to_string(), key.to_string()));
		})
	}

	fn list_keys<'a>(
		&'a self,
		namespace: &'a str,
		limit: usize,
	) -> BoxFuture<'a, apollo_storage::Result<Vec<String>>> {
		self.run("list_keys", |entries| {
			entries
				.keys()
				.filter(|(ns, _)| ns == namespace)
				.map(|(_, key)| key.clone())
				.take(limit)
				.collect()
		})
	}

	fn namespaces(&self) -> BoxFuture<'_, apollo_storage::Result<Vec<String>>> {
		self.run("namespaces", |entries| {
			let mut names = entries.keys().map(|(ns, _)| ns.clone()).collect::<Vec<_>>();

			names.sort();
			names.dedup();

			names
		})
	}

	fn ping(&self) -> BoxFuture<'_, apollo_storage::Result<()>> {
		self.run("ping", |_| ())
	}
}

/// Store wired to a backend that always fails, starting in durable mode.
pub fn failing_store(clock: Arc<ManualClock>) -> (CacheStore, Arc<FailingBackend>) {
	let backend = Arc::new(FailingBackend::default());
	let store = CacheStore::new(Some(backend.clone()), clock);

	(store, backend)
}

/// Store wired to a healthy in-memory durable backend.
pub fn durable_store(clock: Arc<ManualClock>) -> (CacheStore, Arc<MemoryDurableBackend>) {
	let backend = Arc::new(MemoryDurableBackend::new());
	let store = CacheStore::new(Some(backend.clone()), clock);

	(store, backend)
}

/// Search provider answering from a fixed query table. Unknown queries return no candidates.
#[derive(Debug)]
pub struct StaticSearchProvider {
	source: SearchSource,
	pages: HashMap<String, Vec<String>>,
	calls: AtomicUsize,
	seen: Mutex<Vec<String>>,
}
impl StaticSearchProvider {
	pub fn new(source: SearchSource) -> Self {
		Self {
			source,
			pages: HashMap::new(),
			calls: AtomicUsize::new(0),
			seen: Mutex::new(Vec::new()),
		}
	}

	/// Makes `query` return the given ids, in order.
	pub fn with_page(mut self, query: &str, ids: &[&str]) -> Self {
		self.pages.insert(query.to_string(), ids.iter().map(|id| id.to_string()).collect());

		self
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	/// Query strings received so far, in arrival order.
	pub fn seen(&self) -> Vec<String> {
		self.seen.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl SearchProvider for StaticSearchProvider {
	fn search<'a>(
		&'a self,
		req: &'a SearchRequest<'a>,
	) -> BoxFuture<'a, apollo_providers::Result<SearchPage>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.seen.lock().unwrap_or_else(|err| err.into_inner()).push(req.query.to_string());

			let ids = self.pages.get(req.query).cloned().unwrap_or_default();
			let candidates = ids
				.iter()
				.take(req.max_results as usize)
				.map(|id| candidate(self.source, id, &format!("Result {id} for {}", req.query)))
				.collect::<Vec<_>>();

			Ok(SearchPage { total_hits: ids.len() as u64, candidates })
		})
	}
}

/// Search provider whose every call fails with an upstream error.
#[derive(Debug, Default)]
pub struct FailingSearchProvider {
	calls: AtomicUsize,
}
impl FailingSearchProvider {
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl SearchProvider for FailingSearchProvider {
	fn search<'a>(
		&'a self,
		_req: &'a SearchRequest<'a>,
	) -> BoxFuture<'a, apollo_providers::Result<SearchPage>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			Err(apollo_providers::Error::InvalidResponse {
				message: "Simulated upstream outage.".to_string(),
			})
		})
	}
}

/// Search provider that never answers within any reasonable timeout.
#[derive(Debug, Default)]
pub struct StalledSearchProvider;
impl SearchProvider for StalledSearchProvider {
	fn search<'a>(
		&'a self,
		_req: &'a SearchRequest<'a>,
	) -> BoxFuture<'a, apollo_providers::Result<SearchPage>> {
		Box::pin(async move {
			tokio::time::sleep(std::time::Duration::from_secs(300)).await;

			Ok(SearchPage::default())
		})
	}
}

pub fn candidate(source: SearchSource, id: &str, title: &str) -> Candidate {
	Candidate {
		id: id.to_string(),
		source,
		title: title.to_string(),
		summary: "Summary.".to_string(),
		url: format!("https://example.org/{id}"),
		metadata: Map::new(),
		relevance_score: None,
		priority_weight: 0,
	}
}

/// Redis settings with a unique key prefix, so concurrent test runs never share keys.
pub struct TestKeyspace {
	url: String,
	redis: apollo_config::Redis,
}
impl TestKeyspace {
	/// Accepts `redis://[:password@]host[:port][/db]`.
	pub fn new(url: &str) -> Result<Self> {
		let invalid = || Error::Message(format!("Unsupported Redis URL for tests: {url}."));
		let rest = url.strip_prefix("redis://").ok_or_else(invalid)?;
		let (auth, rest) = match rest.rsplit_once('@') {
			Some((auth, rest)) => (Some(auth), rest),
			None => (None, rest),
		};
		let (addr, db) = match rest.split_once('/') {
			Some((addr, db)) if !db.is_empty() => (addr, db.parse().map_err(|_| invalid())?),
			Some((addr, _)) => (addr, 0),
			None => (rest, 0),
		};
		let (host, port) = match addr.rsplit_once(':') {
			Some((host, port)) => (host, port.parse().map_err(|_| invalid())?),
			None => (addr, 6379),
		};
		let password = auth
			.map(|auth| auth.rsplit_once(':').map(|(_, password)| password).unwrap_or(auth))
			.filter(|password| !password.is_empty())
			.map(str::to_string);
		let redis = apollo_config::Redis {
			host: host.to_string(),
			port,
			password,
			database: db,
			key_prefix: format!("apollo_test_{}", Uuid::new_v4().simple()),
			connect_timeout_ms: 2_000,
			command_timeout_ms: 2_000,
			reconnect_interval_secs: 0,
		};

		Ok(Self { url: url.to_string(), redis })
	}

	pub fn redis(&self) -> &apollo_config::Redis {
		&self.redis
	}

	/// Deletes every key under this keyspace's prefix.
	pub async fn cleanup(&self) -> Result<()> {
		let client = redis::Client::open(self.url.as_str())?;
		let mut conn = client.get_multiplexed_async_connection().await?;
		let pattern = format!("{}:*", self.redis.key_prefix);
		let mut cursor = 0_u64;

		loop {
			let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
				.arg(cursor)
				.arg("MATCH")
				.arg(&pattern)
				.arg("COUNT")
				.arg(200)
				.query_async(&mut conn)
				.await?;

			if !keys.is_empty() {
				let _: i64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
			}
			if next == 0 {
				break;
			}

			cursor = next;
		}

		Ok(())
	}
}

fn refused(operation: &str) -> apollo_storage::Error {
	let err = redis::RedisError::from(std::io::Error::new(
		std::io::ErrorKind::ConnectionRefused,
		format!("simulated outage during {operation}"),
	));

	apollo_storage::Error::Redis(err)
}
