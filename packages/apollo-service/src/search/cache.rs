use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use apollo_domain::{Candidate, SearchSource};

use crate::{Error, Result};

const SEARCH_CACHE_SCHEMA_VERSION: i32 = 1;

/// Raw, unscored upstream result as written to the cache.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSearch {
	pub schema_version: i32,
	pub candidates: Vec<Candidate>,
	pub total_hits: u64,
}
impl CachedSearch {
	pub fn new(candidates: Vec<Candidate>, total_hits: u64) -> Self {
		Self { schema_version: SEARCH_CACHE_SCHEMA_VERSION, candidates, total_hits }
	}

	pub fn decode(payload: Value) -> Option<Self> {
		serde_json::from_value::<Self>(payload)
			.ok()
			.filter(|cached| cached.schema_version == SEARCH_CACHE_SCHEMA_VERSION)
	}
}

pub fn hash_cache_key(payload: &Value) -> Result<String> {
	let raw = serde_json::to_vec(payload).map_err(|err| Error::Storage {
		message: format!("Failed to encode cache key payload: {err}"),
	})?;

	Ok(blake3::hash(&raw).to_hex().to_string())
}

pub fn cache_key_prefix(key: &str) -> &str {
	let len = key.len().min(12);

	&key[..len]
}

/// Key for one upstream lookup. The priority tier is not part of it, so two tiers issuing the same
/// query string share one entry.
pub fn build_search_cache_key(
	source: SearchSource,
	query: &str,
	max_results: u32,
	summary_max_chars: usize,
	status: Option<&str>,
	filters: &BTreeMap<String, String>,
) -> Result<String> {
	let payload = json!({
		"kind": "search",
		"schema_version": SEARCH_CACHE_SCHEMA_VERSION,
		"source": source.as_str(),
		"query": query.trim(),
		"max_results": max_results,
		"summary_max_chars": summary_max_chars,
		"status": status,
		"filters": filters,
	});

	hash_cache_key(&payload)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn key_depends_on_query_context() {
		let filters = BTreeMap::new();
		let base =
			build_search_cache_key(SearchSource::PubMed, "sepsis", 10, 500, None, &filters)
				.expect("key");
		let padded =
			build_search_cache_key(SearchSource::PubMed, "  sepsis ", 10, 500, None, &filters)
				.expect("key");
		let other_source =
			build_search_cache_key(SearchSource::ClinicalTrials, "sepsis", 10, 500, None, &filters)
				.expect("key");
		let with_status = build_search_cache_key(
			SearchSource::PubMed,
			"sepsis",
			10,
			500,
			Some("RECRUITING"),
			&filters,
		)
		.expect("key");
		let with_filter = build_search_cache_key(
			SearchSource::PubMed,
			"sepsis",
			10,
			500,
			None,
			&BTreeMap::from([("mindate".to_string(), "2020".to_string())]),
		)
		.expect("key");

		assert_eq!(base, padded);
		assert_eq!(base.len(), 64);
		assert_ne!(base, other_source);
		assert_ne!(base, with_status);
		assert_ne!(base, with_filter);
		assert_eq!(cache_key_prefix(&base).len(), 12);
	}

	#[test]
	fn stale_schema_is_ignored() {
		let payload = json!({ "schemaVersion": 0, "candidates": [], "totalHits": 3 });

		assert!(CachedSearch::decode(payload).is_none());
		assert!(CachedSearch::decode(json!({ "unexpected": true })).is_none());
	}
}
