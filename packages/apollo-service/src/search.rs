pub mod cache;
pub mod scoring;

use std::{
	collections::{BTreeMap, HashSet},
	time::Duration as StdDuration,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::Duration;

use apollo_domain::{
	Candidate, ClassificationResult, PriorityTermSet, PriorityTier, SearchSource,
	StructuredClinicalRecord, WeightedQuery, build_queries, extract_tiers,
};
use apollo_providers::SearchRequest;
use apollo_storage::StorageMode;

use crate::{
	ApolloService, Error, Result, invalid_request,
	search::cache::{CachedSearch, build_search_cache_key, cache_key_prefix},
};

pub const NO_SEARCHABLE_TERMS: &str = "No searchable terms found in structured data";

const MAX_RESULTS_LIMIT: u32 = 100;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSearchRequest {
	#[serde(default)]
	pub structured_data: Option<Value>,
	#[serde(default)]
	pub source: Option<String>,
	#[serde(default)]
	pub status: Option<String>,
	#[serde(default)]
	pub filters: Option<Map<String, Value>>,
	#[serde(default)]
	pub classification: Option<ClassificationResult>,
	#[serde(default)]
	pub max_results: Option<u32>,
}

/// Ranked candidates, serialized as `articles` for PubMed and `trials` for ClinicalTrials.gov.
#[derive(Clone, Debug, Serialize)]
pub enum SearchResults {
	#[serde(rename = "articles")]
	Articles(Vec<Candidate>),
	#[serde(rename = "trials")]
	Trials(Vec<Candidate>),
}
impl SearchResults {
	fn new(source: SearchSource, candidates: Vec<Candidate>) -> Self {
		match source {
			SearchSource::PubMed => Self::Articles(candidates),
			SearchSource::ClinicalTrials => Self::Trials(candidates),
		}
	}

	pub fn candidates(&self) -> &[Candidate] {
		match self {
			Self::Articles(candidates) | Self::Trials(candidates) => candidates,
		}
	}
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDiagnostic {
	pub tier: PriorityTier,
	pub weight: u8,
	pub query: String,
	pub result_count: usize,
	pub total_hits: u64,
	pub cached: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSearchResponse {
	pub success: bool,
	pub source: SearchSource,
	#[serde(flatten)]
	pub results: SearchResults,
	/// Unique candidates found across all queries, before capping.
	pub total: usize,
	/// The combined query string, or empty when nothing was searched.
	pub query: String,
	pub search_terms: PriorityTermSet,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	pub queries: Vec<QueryDiagnostic>,
	pub storage: StorageMode,
}
impl ExternalSearchResponse {
	pub fn candidates(&self) -> &[Candidate] {
		self.results.candidates()
	}
}

struct QueryOutcome {
	candidates: Vec<Candidate>,
	diagnostic: QueryDiagnostic,
}

struct QueryContext<'a> {
	source: SearchSource,
	max_results: u32,
	status: Option<&'a str>,
	filters: &'a BTreeMap<String, String>,
}

impl ApolloService {
	pub async fn search_external(&self, req: ExternalSearchRequest) -> Result<ExternalSearchResponse> {
		let structured = req
			.structured_data
			.filter(|value| !value.is_null())
			.ok_or_else(|| invalid_request("Structured data is required"))?;
		let record = StructuredClinicalRecord::from_value(structured)
			.ok_or_else(|| invalid_request("structuredData must be a JSON object."))?;
		let source = match req.source.as_deref() {
			Some(raw) => SearchSource::parse(raw).ok_or_else(|| {
				invalid_request(format!("source must be pubmed or clinicaltrials, got {raw:?}."))
			})?,
			None => SearchSource::PubMed,
		};
		let max_results = req.max_results.unwrap_or(self.cfg.search.max_results);

		if max_results == 0 || max_results > MAX_RESULTS_LIMIT {
			return Err(invalid_request(format!(
				"maxResults must be in the range 1-{MAX_RESULTS_LIMIT}."
			)));
		}

		let filters = normalize_filters(req.filters)?;
		let status = req.status.as_deref().map(str::trim).filter(|status| !status.is_empty());
		let mut tiers = extract_tiers(&record);

		if let Some(classification) = req.classification.as_ref() {
			let merged = tiers
				.merge_classification(classification, self.cfg.search.min_classification_confidence);

			tracing::debug!(merged, "Applied image classification to search terms.");
		}

		let queries = build_queries(&tiers);

		if queries.is_empty() {
			tracing::info!(source = source.as_str(), "No searchable terms in structured data.");

			return Ok(ExternalSearchResponse {
				success: true,
				source,
				results: SearchResults::new(source, Vec::new()),
				total: 0,
				query: String::new(),
				search_terms: tiers,
				message: Some(NO_SEARCHABLE_TERMS.to_string()),
				queries: Vec::new(),
				storage: self.store.mode(),
			});
		}

		let ctx = QueryContext { source, max_results, status, filters: &filters };
		let outcomes =
			futures::future::join_all(queries.iter().map(|query| self.run_query(&ctx, query)))
				.await;
		let mut diagnostics = Vec::with_capacity(outcomes.len());
		let mut per_query = Vec::with_capacity(outcomes.len());
		let mut unique = HashSet::new();

		for (query, outcome) in queries.iter().zip(outcomes) {
			unique.extend(outcome.candidates.iter().map(|candidate| candidate.id.clone()));
			diagnostics.push(outcome.diagnostic);
			per_query.push((query.clone(), outcome.candidates));
		}

		let ranked = scoring::merge_and_score(per_query, &tiers, max_results as usize);
		let combined = queries
			.iter()
			.find(|query| query.priority_tier == PriorityTier::Combined)
			.map(|query| query.query_string.clone())
			.unwrap_or_default();
		let failed = diagnostics.iter().filter(|diagnostic| diagnostic.error.is_some()).count();

		tracing::info!(
			source = source.as_str(),
			queries = diagnostics.len(),
			failed_queries = failed,
			unique = unique.len(),
			returned = ranked.len(),
			"External search completed."
		);

		let message = (failed == diagnostics.len())
			.then(|| "All upstream searches failed; see queries for details.".to_string());

		Ok(ExternalSearchResponse {
			success: true,
			source,
			results: SearchResults::new(source, ranked),
			total: unique.len(),
			query: combined,
			search_terms: tiers,
			message,
			queries: diagnostics,
			storage: self.store.mode(),
		})
	}

	/// Cache-first lookup for one planned query. Never fails: upstream errors and timeouts
	/// degrade to an empty list recorded in the diagnostic.
	async fn run_query(&self, ctx: &QueryContext<'_>, query: &WeightedQuery) -> QueryOutcome {
		let namespace = ctx.source.as_str();
		let summary_max_chars = self.cfg.search.abstract_max_chars;
		let mut diagnostic = QueryDiagnostic {
			tier: query.priority_tier,
			weight: query.weight,
			query: query.query_string.clone(),
			result_count: 0,
			total_hits: 0,
			cached: false,
			error: None,
		};
		let cache_key = match build_search_cache_key(
			ctx.source,
			&query.query_string,
			ctx.max_results,
			summary_max_chars,
			ctx.status,
			ctx.filters,
		) {
			Ok(key) => Some(key),
			Err(err) => {
				tracing::warn!(error = %err, cache_kind = namespace, "Cache key build failed.");

				None
			},
		};

		if let Some(key) = cache_key.as_deref() {
			match self.store.get(namespace, key).await {
				Ok(Some(entry)) => match CachedSearch::decode(entry.payload) {
					Some(cached) => {
						tracing::info!(
							cache_kind = namespace,
							cache_key_prefix = cache_key_prefix(key),
							hit = true,
							tier = query.priority_tier.as_str(),
							"Cache hit."
						);

						diagnostic.cached = true;

						return finish(diagnostic, query, cached.candidates, cached.total_hits);
					},
					None => {
						tracing::warn!(
							cache_kind = namespace,
							cache_key_prefix = cache_key_prefix(key),
							"Cache payload decode failed."
						);
					},
				},
				Ok(None) => {
					tracing::info!(
						cache_kind = namespace,
						cache_key_prefix = cache_key_prefix(key),
						hit = false,
						tier = query.priority_tier.as_str(),
						"Cache miss."
					);
				},
				Err(err) => {
					tracing::warn!(
						error = %err,
						cache_kind = namespace,
						cache_key_prefix = cache_key_prefix(key),
						"Cache read failed."
					);
				},
			}
		}

		let req = SearchRequest {
			query: &query.query_string,
			max_results: ctx.max_results,
			summary_max_chars,
			status: ctx.status,
			filters: ctx.filters,
		};
		let timeout = StdDuration::from_millis(self.cfg.search.query_timeout_ms);
		let provider = self.providers.for_source(ctx.source);
		let page = match tokio::time::timeout(timeout, provider.search(&req)).await {
			Ok(Ok(page)) => page,
			Ok(Err(err)) => {
				tracing::warn!(
					error = %err,
					source = namespace,
					tier = query.priority_tier.as_str(),
					"Upstream search failed."
				);

				diagnostic.error = Some(err.to_string());

				return finish(diagnostic, query, Vec::new(), 0);
			},
			Err(_) => {
				tracing::warn!(
					source = namespace,
					tier = query.priority_tier.as_str(),
					timeout_ms = self.cfg.search.query_timeout_ms,
					"Upstream search timed out."
				);

				diagnostic.error = Some(format!(
					"Upstream search timed out after {} ms.",
					self.cfg.search.query_timeout_ms
				));

				return finish(diagnostic, query, Vec::new(), 0);
			},
		};

		if let Some(key) = cache_key.as_deref() {
			self.write_search_cache(ctx.source, key, &page.candidates, page.total_hits).await;
		}

		finish(diagnostic, query, page.candidates, page.total_hits)
	}

	async fn write_search_cache(
		&self,
		source: SearchSource,
		key: &str,
		candidates: &[Candidate],
		total_hits: u64,
	) {
		let ttl = Duration::minutes(self.search_ttl_minutes(source) as i64);
		let payload = match serde_json::to_value(CachedSearch::new(candidates.to_vec(), total_hits)) {
			Ok(payload) => payload,
			Err(err) => {
				tracing::warn!(error = %err, cache_kind = source.as_str(), "Cache encode failed.");

				return;
			},
		};

		match self.store.put(source.as_str(), key, payload, ttl).await {
			Ok(_) => {
				tracing::info!(
					cache_kind = source.as_str(),
					cache_key_prefix = cache_key_prefix(key),
					ttl_minutes = self.search_ttl_minutes(source),
					storage = self.store.mode().as_str(),
					"Cache stored."
				);
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_kind = source.as_str(),
					cache_key_prefix = cache_key_prefix(key),
					"Cache write failed."
				);
			},
		}
	}

	fn search_ttl_minutes(&self, source: SearchSource) -> u64 {
		let minutes = match source {
			SearchSource::PubMed => self.cfg.cache.pubmed_ttl_minutes,
			SearchSource::ClinicalTrials => self.cfg.cache.clinicaltrials_ttl_minutes,
		};

		minutes.min(apollo_config::MAX_CACHE_TTL_MINUTES)
	}
}

fn finish(
	mut diagnostic: QueryDiagnostic,
	query: &WeightedQuery,
	mut candidates: Vec<Candidate>,
	total_hits: u64,
) -> QueryOutcome {
	for candidate in &mut candidates {
		candidate.priority_weight = query.weight;
		candidate.relevance_score = None;
	}

	diagnostic.result_count = candidates.len();
	diagnostic.total_hits = total_hits;

	QueryOutcome { candidates, diagnostic }
}

/// Flattens caller filters into upstream query parameters. Only scalar values are accepted.
fn normalize_filters(filters: Option<Map<String, Value>>) -> Result<BTreeMap<String, String>> {
	let mut out = BTreeMap::new();

	for (name, value) in filters.unwrap_or_default() {
		let name = name.trim().to_string();

		if name.is_empty() {
			return Err(invalid_request("filters keys must be non-empty."));
		}

		let value = match value {
			Value::String(text) => text,
			Value::Number(number) => number.to_string(),
			Value::Bool(flag) => flag.to_string(),
			Value::Null => continue,
			_ => {
				return Err(Error::InvalidRequest {
					message: format!("filters.{name} must be a string, number, or boolean."),
				});
			},
		};

		out.insert(name, value);
	}

	Ok(out)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn filters_flatten_scalars_and_drop_nulls() {
		let filters = json!({ "mindate": "2020", "retstart": 5, "open": true, "skip": null });
		let Value::Object(map) = filters else { panic!("object expected") };
		let flattened = normalize_filters(Some(map)).expect("filters");

		assert_eq!(flattened.get("mindate").map(String::as_str), Some("2020"));
		assert_eq!(flattened.get("retstart").map(String::as_str), Some("5"));
		assert_eq!(flattened.get("open").map(String::as_str), Some("true"));
		assert!(!flattened.contains_key("skip"));
	}

	#[test]
	fn nested_filters_are_rejected() {
		let Value::Object(map) = json!({ "phase": ["PHASE2"] }) else { panic!("object expected") };
		let err = normalize_filters(Some(map)).expect_err("expected error");

		assert!(matches!(err, Error::InvalidRequest { .. }));
	}

	#[test]
	fn results_serialize_under_source_key() {
		let articles = serde_json::to_value(SearchResults::new(SearchSource::PubMed, Vec::new()))
			.expect("serialize");
		let trials =
			serde_json::to_value(SearchResults::new(SearchSource::ClinicalTrials, Vec::new()))
				.expect("serialize");

		assert_eq!(articles, json!({ "articles": [] }));
		assert_eq!(trials, json!({ "trials": [] }));
	}
}
