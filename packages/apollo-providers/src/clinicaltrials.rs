use std::collections::HashMap;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use apollo_config::SearchProviderConfig;
use apollo_domain::{Candidate, SearchSource, truncate_summary};

use crate::{Error, Result, SearchPage, SearchRequest};

const STUDY_URL_BASE: &str = "https://clinicaltrials.gov/study";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudiesResponse {
	studies: Option<Vec<Value>>,
	#[serde(default)]
	total_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Study {
	protocol_section: ProtocolSection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProtocolSection {
	identification_module: IdentificationModule,
	#[serde(default)]
	status_module: Option<StatusModule>,
	#[serde(default)]
	description_module: Option<DescriptionModule>,
	#[serde(default)]
	conditions_module: Option<ConditionsModule>,
	#[serde(default)]
	design_module: Option<DesignModule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentificationModule {
	nct_id: String,
	#[serde(default)]
	brief_title: Option<String>,
	#[serde(default)]
	official_title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusModule {
	#[serde(default)]
	overall_status: Option<String>,
	#[serde(default)]
	start_date_struct: Option<DateStruct>,
}

#[derive(Debug, Deserialize)]
struct DateStruct {
	#[serde(default)]
	date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptionModule {
	#[serde(default)]
	brief_summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConditionsModule {
	#[serde(default)]
	conditions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DesignModule {
	#[serde(default)]
	phases: Vec<String>,
}

/// ClinicalTrials.gov v2 client. The first call resolves NCT ids, the second fetches the studies.
pub struct ClinicalTrialsClient {
	client: Client,
	cfg: SearchProviderConfig,
}
impl ClinicalTrialsClient {
	pub fn new(cfg: &SearchProviderConfig) -> Result<Self> {
		Ok(Self { client: crate::http_client(cfg)?, cfg: cfg.clone() })
	}

	pub async fn search(&self, req: &SearchRequest<'_>) -> Result<SearchPage> {
		let (ids, total_hits) = self.search_ids(req).await?;

		if ids.is_empty() {
			return Ok(SearchPage { candidates: Vec::new(), total_hits });
		}

		let studies = self.fetch_studies(&ids).await?;
		let candidates = order_by_ids(&ids, parse_studies(studies, req.summary_max_chars));

		tracing::debug!(requested = ids.len(), parsed = candidates.len(), "Parsed trials.");

		Ok(SearchPage { candidates, total_hits })
	}

	async fn search_ids(&self, req: &SearchRequest<'_>) -> Result<(Vec<String>, u64)> {
		let url = format!("{}/studies", self.cfg.api_base);
		let mut params = vec![
			("query.term".to_string(), req.query.to_string()),
			("pageSize".to_string(), req.max_results.to_string()),
			("fields".to_string(), "NCTId".to_string()),
			("countTotal".to_string(), "true".to_string()),
			("format".to_string(), "json".to_string()),
		];

		if let Some(status) = req.status.map(str::trim).filter(|status| !status.is_empty()) {
			params.push(("filter.overallStatus".to_string(), status.to_ascii_uppercase()));
		}

		crate::push_filters(&mut params, req.filters);

		let res = crate::get_with_retry(&self.client, &self.cfg, &url, &params).await?;
		let body: Value = res.json().await?;

		parse_id_response(body, req.max_results as usize)
	}

	async fn fetch_studies(&self, ids: &[String]) -> Result<Vec<Value>> {
		let url = format!("{}/studies", self.cfg.api_base);
		let params = vec![
			("filter.ids".to_string(), ids.join(",")),
			("pageSize".to_string(), ids.len().to_string()),
			("format".to_string(), "json".to_string()),
		];
		let res = crate::get_with_retry(&self.client, &self.cfg, &url, &params).await?;
		let body: StudiesResponse = res.json().await?;

		body.studies.ok_or_else(|| Error::InvalidResponse {
			message: "ClinicalTrials.gov response is missing studies.".to_string(),
		})
	}
}

fn parse_id_response(body: Value, max_results: usize) -> Result<(Vec<String>, u64)> {
	let response: StudiesResponse = serde_json::from_value(body)?;
	let studies = response.studies.ok_or_else(|| Error::InvalidResponse {
		message: "ClinicalTrials.gov response is missing studies.".to_string(),
	})?;
	let ids = studies
		.iter()
		.filter_map(|study| {
			study
				.pointer("/protocolSection/identificationModule/nctId")
				.and_then(Value::as_str)
				.map(str::trim)
				.filter(|id| !id.is_empty())
				.map(str::to_string)
		})
		.take(max_results)
		.collect::<Vec<_>>();
	let total_hits = response.total_count.unwrap_or(ids.len() as u64);

	Ok((ids, total_hits))
}

/// Decodes each study on its own. A study that does not match the expected shape is skipped.
fn parse_studies(studies: Vec<Value>, summary_max_chars: usize) -> Vec<Candidate> {
	let mut candidates = Vec::with_capacity(studies.len());

	for raw in studies {
		match serde_json::from_value::<Study>(raw) {
			Ok(study) => candidates.push(study_to_candidate(study, summary_max_chars)),
			Err(err) => {
				tracing::warn!(error = %err, "Skipping unparseable trial record.");
			},
		}
	}

	candidates
}

fn study_to_candidate(study: Study, summary_max_chars: usize) -> Candidate {
	let protocol = study.protocol_section;
	let nct_id = protocol.identification_module.nct_id.trim().to_string();
	let title = protocol
		.identification_module
		.brief_title
		.or(protocol.identification_module.official_title)
		.filter(|title| !title.trim().is_empty())
		.unwrap_or_else(|| "Untitled study".to_string());
	let summary = protocol
		.description_module
		.and_then(|module| module.brief_summary)
		.filter(|summary| !summary.trim().is_empty())
		.unwrap_or_else(|| "No summary available".to_string());
	let mut metadata = Map::new();

	metadata.insert("nctId".to_string(), json!(nct_id));

	if let Some(status) = protocol.status_module {
		if let Some(overall) = status.overall_status {
			metadata.insert("status".to_string(), json!(overall));
		}
		if let Some(start) = status.start_date_struct.and_then(|date| date.date) {
			metadata.insert("startDate".to_string(), json!(start));
		}
	}

	metadata.insert(
		"conditions".to_string(),
		json!(protocol.conditions_module.map(|module| module.conditions).unwrap_or_default()),
	);
	metadata.insert(
		"phases".to_string(),
		json!(protocol.design_module.map(|module| module.phases).unwrap_or_default()),
	);

	Candidate {
		url: format!("{STUDY_URL_BASE}/{nct_id}"),
		id: nct_id,
		source: SearchSource::ClinicalTrials,
		title: title.trim().to_string(),
		summary: truncate_summary(&summary, summary_max_chars),
		metadata,
		relevance_score: None,
		priority_weight: 0,
	}
}

/// Restores the relevance order of the id lookup, which the batch fetch does not preserve.
fn order_by_ids(ids: &[String], candidates: Vec<Candidate>) -> Vec<Candidate> {
	let rank = ids.iter().enumerate().map(|(idx, id)| (id.as_str(), idx)).collect::<HashMap<_, _>>();
	let mut ranked = candidates
		.into_iter()
		.filter_map(|candidate| rank.get(candidate.id.as_str()).copied().map(|idx| (idx, candidate)))
		.collect::<Vec<_>>();

	ranked.sort_by_key(|(idx, _)| *idx);
	ranked.dedup_by(|(left, _), (right, _)| left == right);

	ranked.into_iter().map(|(_, candidate)| candidate).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn study(nct_id: &str, title: &str) -> Value {
		json!({
			"protocolSection": {
				"identificationModule": { "nctId": nct_id, "briefTitle": title },
				"statusModule": {
					"overallStatus": "RECRUITING",
					"startDateStruct": { "date": "2024-02" }
				},
				"descriptionModule": { "briefSummary": "Evaluates endovascular repair." },
				"conditionsModule": { "conditions": ["Aortic Dissection"] },
				"designModule": { "phases": ["PHASE3"] }
			}
		})
	}

	#[test]
	fn parses_ids_and_total() {
		let body = json!({
			"studies": [
				{ "protocolSection": { "identificationModule": { "nctId": "NCT00000001" } } },
				{ "protocolSection": {} },
				{ "protocolSection": { "identificationModule": { "nctId": "NCT00000002" } } }
			],
			"totalCount": 57
		});
		let (ids, total) = parse_id_response(body, 10).expect("parse failed");

		assert_eq!(ids, vec!["NCT00000001".to_string(), "NCT00000002".to_string()]);
		assert_eq!(total, 57);
	}

	#[test]
	fn missing_studies_is_invalid() {
		let err = parse_id_response(json!({ "message": "oops" }), 10).expect_err("expected error");

		assert!(matches!(err, Error::InvalidResponse { .. }));
	}

	#[test]
	fn malformed_studies_are_skipped() {
		let studies = vec![
			study("NCT00000001", "TEVAR in type B dissection"),
			json!({ "protocolSection": { "identificationModule": {} } }),
			json!("not a study"),
		];
		let candidates = parse_studies(studies, 500);

		assert_eq!(candidates.len(), 1);

		let trial = &candidates[0];

		assert_eq!(trial.id, "NCT00000001");
		assert_eq!(trial.url, "https://clinicaltrials.gov/study/NCT00000001");
		assert_eq!(trial.summary, "Evaluates endovascular repair.");
		assert_eq!(trial.metadata["status"], "RECRUITING");
		assert_eq!(trial.metadata["conditions"], json!(["Aortic Dissection"]));
		assert_eq!(trial.metadata["phases"], json!(["PHASE3"]));
		assert_eq!(trial.source, SearchSource::ClinicalTrials);
	}

	#[test]
	fn batch_results_follow_id_order() {
		let ids = vec!["NCT2".to_string(), "NCT1".to_string()];
		let candidates = parse_studies(
			vec![study("NCT1", "first"), study("NCT3", "unrequested"), study("NCT2", "second")],
			500,
		);
		let ordered = order_by_ids(&ids, candidates);

		assert_eq!(
			ordered.iter().map(|candidate| candidate.id.as_str()).collect::<Vec<_>>(),
			vec!["NCT2", "NCT1"]
		);
	}
}
