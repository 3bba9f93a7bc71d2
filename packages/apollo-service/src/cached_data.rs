use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{Duration, OffsetDateTime};

use apollo_domain::time_serde;
use apollo_storage::StorageMode;

use crate::{
	ApolloService, Error, Result, invalid_request,
	sessions::{SESSION_NAMESPACE, timestamp},
	ttl_from,
};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheDataRequest {
	#[serde(default)]
	pub cache_key: String,
	#[serde(default)]
	pub data: Option<Value>,
	#[serde(default)]
	pub source: String,
	#[serde(default)]
	pub ttl_minutes: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheDataResponse {
	pub success: bool,
	pub cache_key: String,
	pub source: String,
	#[serde(with = "time_serde")]
	pub expires_at: OffsetDateTime,
	pub storage: StorageMode,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCachedDataRequest {
	#[serde(default)]
	pub cache_key: String,
	#[serde(default)]
	pub source: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCachedDataResponse {
	pub success: bool,
	pub cache_data: Value,
	pub source: String,
	pub storage: StorageMode,
}

impl ApolloService {
	/// Caches arbitrary JSON under `source`/`cache_key`. The session namespace is reserved.
	pub async fn cache_data(&self, req: CacheDataRequest) -> Result<CacheDataResponse> {
		let cache_key = req.cache_key.trim().to_string();
		let source = data_source(&req.source)?;

		if cache_key.is_empty() {
			return Err(invalid_request("cacheKey is required."));
		}

		let data = req
			.data
			.filter(|value| !value.is_null())
			.ok_or_else(|| invalid_request("data is required."))?;
		let minutes = req.ttl_minutes.unwrap_or(self.cfg.cache.data_ttl_minutes);
		let ttl = ttl_from(minutes, Duration::MINUTE, "ttlMinutes")?;
		let now = self.store.now();
		let mut payload = Map::new();

		payload.insert("data".to_string(), data);
		payload.insert("source".to_string(), Value::String(source.clone()));
		payload.insert("cachedAt".to_string(), Value::String(timestamp(&now)?));
		payload.insert("expiresAt".to_string(), Value::String(timestamp(&(now + ttl))?));

		let entry = self.store.put(&source, &cache_key, Value::Object(payload), ttl).await?;

		tracing::info!(
			cache_kind = %source,
			ttl_minutes = minutes,
			storage = self.store.mode().as_str(),
			"Data cached."
		);

		Ok(CacheDataResponse {
			success: true,
			cache_key,
			source,
			expires_at: entry.expires_at,
			storage: self.store.mode(),
		})
	}

	/// Looks up cached data. Without a source every data namespace is searched in name order and
	/// the first live entry wins.
	pub async fn get_cached_data(&self, req: GetCachedDataRequest) -> Result<GetCachedDataResponse> {
		let cache_key = req.cache_key.trim();

		if cache_key.is_empty() {
			return Err(invalid_request("cacheKey is required."));
		}

		let entry = match req.source.as_deref().map(str::trim).filter(|source| !source.is_empty()) {
			Some(source) => {
				let source = data_source(source)?;

				self.store.get(&source, cache_key).await?
			},
			None => self.store.get_any(cache_key, &[SESSION_NAMESPACE]).await?,
		};
		let Some(entry) = entry else {
			tracing::info!(hit = false, "Cached data miss.");

			return Err(Error::NotFound { message: "Cached data not found or expired".to_string() });
		};

		tracing::info!(cache_kind = %entry.source, hit = true, "Cached data hit.");

		Ok(GetCachedDataResponse {
			success: true,
			cache_data: entry.payload,
			source: entry.source,
			storage: self.store.mode(),
		})
	}
}

fn data_source(raw: &str) -> Result<String> {
	let source = raw.trim();

	if source.is_empty() {
		return Err(invalid_request("source is required."));
	}
	if source == SESSION_NAMESPACE {
		return Err(invalid_request("source \"session\" is reserved for patient sessions."));
	}

	Ok(source.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn session_namespace_is_reserved() {
		assert!(data_source("session").is_err());
		assert!(data_source("  ").is_err());
		assert_eq!(data_source(" imaging ").expect("source"), "imaging");
	}
}
