use std::{future::Future, time::Duration};

use redis::{
	Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, aio::MultiplexedConnection,
};
use tokio::{sync::Mutex, time};

use crate::{BoxFuture, DurableBackend, Error, Result};

const NAMESPACE_REGISTRY: &str = "namespaces";
const SCAN_BATCH: usize = 100;

/// Redis-backed durable store.
///
/// Keys are laid out as `{prefix}:{namespace}:{key}`; every namespace written to is recorded in the
/// `{prefix}:namespaces` set. A single multiplexed connection is shared by all callers and the
/// mutex around it keeps at most one connect attempt in flight.
pub struct RedisBackend {
	client: Client,
	conn: Mutex<Option<MultiplexedConnection>>,
	key_prefix: String,
	connect_timeout: Duration,
	command_timeout: Duration,
}
impl RedisBackend {
	pub fn new(cfg: &apollo_config::Redis) -> Result<Self> {
		let client = Client::open(connection_info(cfg))?;

		Ok(Self {
			client,
			conn: Mutex::new(None),
			key_prefix: cfg.key_prefix.clone(),
			connect_timeout: Duration::from_millis(cfg.connect_timeout_ms),
			command_timeout: Duration::from_millis(cfg.command_timeout_ms),
		})
	}

	fn entry_key(&self, namespace: &str, key: &str) -> String {
		format!("{}:{namespace}:{key}", self.key_prefix)
	}

	fn registry_key(&self) -> String {
		format!("{}:{NAMESPACE_REGISTRY}", self.key_prefix)
	}

	async fn connection(&self) -> Result<MultiplexedConnection> {
		let mut slot = self.conn.lock().await;

		if let Some(conn) = slot.as_ref() {
			return Ok(conn.clone());
		}

		let conn = time::timeout(self.connect_timeout, self.client.get_multiplexed_async_connection())
			.await
			.map_err(|_| Error::Timeout {
				operation: "connect",
				timeout_ms: self.connect_timeout.as_millis() as u64,
			})??;

		tracing::info!(key_prefix = %self.key_prefix, "Connected to Redis.");

		*slot = Some(conn.clone());

		Ok(conn)
	}

	/// Runs one command round-trip under the command timeout. Any failure drops the cached
	/// connection so the next call reconnects.
	async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
	where
		F: Future<Output = redis::RedisResult<T>>,
	{
		match time::timeout(self.command_timeout, fut).await {
			Ok(Ok(value)) => Ok(value),
			Ok(Err(err)) => {
				self.reset().await;

				Err(err.into())
			},
			Err(_) => {
				self.reset().await;

				Err(Error::Timeout {
					operation,
					timeout_ms: self.command_timeout.as_millis() as u64,
				})
			},
		}
	}

	async fn reset(&self) {
		*self.conn.lock().await = None;
	}

	async fn put_inner(&self, namespace: &str, key: &str, raw: &str, ttl_secs: u64) -> Result<()> {
		let mut conn = self.connection().await?;
		let mut pipe = redis::pipe();

		pipe.atomic()
			.cmd("SET")
			.arg(self.entry_key(namespace, key))
			.arg(raw)
			.arg("EX")
			.arg(ttl_secs)
			.ignore()
			.cmd("SADD")
			.arg(self.registry_key())
			.arg(namespace)
			.ignore();

		let _: () = self.bounded("put", pipe.query_async(&mut conn)).await?;

		Ok(())
	}

	async fn get_inner(&self, namespace: &str, key: &str) -> Result<Option<String>> {
		let mut conn = self.connection().await?;
		let cmd = redis::cmd("GET").arg(self.entry_key(namespace, key)).clone();
		let raw: Option<String> = self.bounded("get", cmd.query_async(&mut conn)).await?;

		Ok(raw)
	}

	async fn delete_inner(&self, namespace: &str, key: &str) -> Result<()> {
		let mut conn = self.connection().await?;
		let cmd = redis::cmd("DEL").arg(self.entry_key(namespace, key)).clone();
		let _removed: i64 = self.bounded("delete", cmd.query_async(&mut conn)).await?;

		Ok(())
	}

	async fn list_keys_inner(&self, namespace: &str, limit: usize) -> Result<Vec<String>> {
		let mut conn = self.connection().await?;
		let prefix = self.entry_key(namespace, "");
		let pattern = format!("{prefix}*");
		let mut cursor = 0_u64;
		let mut keys = Vec::new();

		loop {
			let cmd = redis::cmd("SCAN")
				.arg(cursor)
				.arg("MATCH")
				.arg(&pattern)
				.arg("COUNT")
				.arg(SCAN_BATCH)
				.clone();
			let (next, batch): (u64, Vec<String>) =
				self.bounded("scan", cmd.query_async(&mut conn)).await?;

			for full in batch {
				if keys.len() >= limit {
					break;
				}
				if let Some(key) = full.strip_prefix(&prefix) {
					keys.push(key.to_string());
				}
			}

			if next == 0 || keys.len() >= limit {
				break;
			}

			cursor = next;
		}

		Ok(keys)
	}

	async fn namespaces_inner(&self) -> Result<Vec<String>> {
		let mut conn = self.connection().await?;
		let cmd = redis::cmd("SMEMBERS").arg(self.registry_key()).clone();
		let mut names: Vec<String> = self.bounded("namespaces", cmd.query_async(&mut conn)).await?;

		names.sort();

		Ok(names)
	}

	async fn ping_inner(&self) -> Result<()> {
		let mut conn = self.connection().await?;
		let cmd = redis::cmd("PING");
		let _pong: String = self.bounded("ping", cmd.query_async(&mut conn)).await?;

		Ok(())
	}
}
impl DurableBackend for RedisBackend {
	fn put<'a>(
		&'a self,
		namespace: &'a str,
		key: &'a str,
		raw: &'a str,
		ttl_secs: u64,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.put_inner(namespace, key, raw, ttl_secs))
	}

	fn get<'a>(&'a self, namespace: &'a str, key: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
		Box::pin(self.get_inner(namespace, key))
	}

	fn delete<'a>(&'a self, namespace: &'a str, key: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.delete_inner(namespace, key))
	}

	fn list_keys<'a>(
		&'a self,
		namespace: &'a str,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(self.list_keys_inner(namespace, limit))
	}

	fn namespaces(&self) -> BoxFuture<'_, Result<Vec<String>>> {
		Box::pin(self.namespaces_inner())
	}

	fn ping(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(self.ping_inner())
	}
}

/// Structured connection settings. Credentials never pass through a URL, so reserved characters
/// in the password need no escaping.
fn connection_info(cfg: &apollo_config::Redis) -> ConnectionInfo {
	ConnectionInfo {
		addr: ConnectionAddr::Tcp(cfg.host.clone(), cfg.port),
		redis: RedisConnectionInfo {
			db: cfg.database,
			password: cfg.password.clone(),
			..Default::default()
		},
	}
}
