use std::{future::Future, pin::Pin};

use crate::Result;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Remote key-value service holding serialized [`crate::CacheEntry`] values.
///
/// Implementations own their own connection handling. Every error returned here is absorbed by
/// [`crate::CacheStore`], which then demotes itself to the fallback store.
pub trait DurableBackend
where
	Self: Send + Sync,
{
	fn put<'a>(
		&'a self,
		namespace: &'a str,
		key: &'a str,
		raw: &'a str,
		ttl_secs: u64,
	) -> BoxFuture<'a, Result<()>>;

	fn get<'a>(&'a self, namespace: &'a str, key: &'a str) -> BoxFuture<'a, Result<Option<String>>>;

	fn delete<'a>(&'a self, namespace: &'a str, key: &'a str) -> BoxFuture<'a, Result<()>>;

	/// Up to `limit` keys in `namespace`, without the namespace prefix. Order is unspecified.
	fn list_keys<'a>(
		&'a self,
		namespace: &'a str,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<String>>>;

	/// Every namespace that has ever been written to.
	fn namespaces(&self) -> BoxFuture<'_, Result<Vec<String>>>;

	fn ping(&self) -> BoxFuture<'_, Result<()>>;
}
