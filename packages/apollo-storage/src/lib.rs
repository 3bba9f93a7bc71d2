//! Namespaced TTL cache with a durable Redis backend and an in-process fallback.
//!
//! Known limitation: the durable backend and the fallback store are independent. Entries written
//! while the store runs in fallback mode are not copied to Redis when it becomes reachable again,
//! and entries already in Redis are invisible while in fallback mode.

pub mod backend;
pub mod clock;
pub mod durable;
pub mod memory;
pub mod models;
pub mod store;

mod error;

pub use backend::{BoxFuture, DurableBackend};
pub use clock::{Clock, SystemClock};
pub use error::Error;
pub use models::CacheEntry;
pub use store::{CacheStore, StorageMode};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Rejects namespaces that would break the `{prefix}:{namespace}:{key}` layout.
pub fn validate_namespace(namespace: &str) -> Result<()> {
	if namespace.trim().is_empty() {
		return Err(Error::InvalidArgument("namespace must be non-empty.".to_string()));
	}
	if !namespace.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
		return Err(Error::InvalidArgument(format!(
			"namespace {namespace:?} may only contain ASCII letters, digits, '_' or '-'."
		)));
	}

	Ok(())
}

pub fn validate_key(key: &str) -> Result<()> {
	if key.trim().is_empty() {
		return Err(Error::InvalidArgument("key must be non-empty.".to_string()));
	}

	Ok(())
}
