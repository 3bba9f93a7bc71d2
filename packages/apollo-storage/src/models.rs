use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Duration, OffsetDateTime};

use apollo_domain::time_serde;

/// A cached JSON payload. Entries are only ever replaced whole.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
	pub key: String,
	pub source: String,
	pub payload: Value,
	#[serde(with = "time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "time_serde")]
	pub expires_at: OffsetDateTime,
}
impl CacheEntry {
	pub fn new(
		namespace: &str,
		key: &str,
		payload: Value,
		now: OffsetDateTime,
		ttl: Duration,
	) -> Self {
		Self {
			key: key.to_string(),
			source: namespace.to_string(),
			payload,
			created_at: now,
			expires_at: now + ttl,
		}
	}

	pub fn is_expired(&self, now: OffsetDateTime) -> bool {
		now >= self.expires_at
	}

	/// Time left before expiry, or `None` once the entry has expired.
	pub fn remaining_ttl(&self, now: OffsetDateTime) -> Option<Duration> {
		let remaining = self.expires_at - now;

		remaining.is_positive().then_some(remaining)
	}
}

/// Whole seconds for a backend `EX` argument. Partial seconds round up; the result is at least 1.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
	let whole = ttl.whole_seconds().max(0) as u64;
	let partial = ttl.subsec_nanoseconds() > 0;

	(whole + u64::from(partial)).max(1)
}
