pub mod clinicaltrials;
pub mod pubmed;

mod error;

pub use error::{Error, Result};

use std::{collections::BTreeMap, future::Future, pin::Pin, time::Duration};

use reqwest::{Client, Response, StatusCode};

use apollo_config::SearchProviderConfig;
use apollo_domain::Candidate;

use crate::{clinicaltrials::ClinicalTrialsClient, pubmed::PubMedClient};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Upstream literature or trial search. Implementations must not cache.
pub trait SearchProvider
where
	Self: Send + Sync,
{
	fn search<'a>(&'a self, req: &'a SearchRequest<'a>) -> BoxFuture<'a, Result<SearchPage>>;
}

/// One upstream lookup: a boolean-AND term query plus optional narrowing.
#[derive(Clone, Debug)]
pub struct SearchRequest<'a> {
	pub query: &'a str,
	pub max_results: u32,
	pub summary_max_chars: usize,
	/// Recruitment status, honored by ClinicalTrials.gov only.
	pub status: Option<&'a str>,
	/// Extra upstream query parameters, forwarded verbatim.
	pub filters: &'a BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchPage {
	pub candidates: Vec<Candidate>,
	/// Hits the upstream reported for the query, before `max_results` capping.
	pub total_hits: u64,
}

impl SearchProvider for PubMedClient {
	fn search<'a>(&'a self, req: &'a SearchRequest<'a>) -> BoxFuture<'a, Result<SearchPage>> {
		Box::pin(PubMedClient::search(self, req))
	}
}

impl SearchProvider for ClinicalTrialsClient {
	fn search<'a>(&'a self, req: &'a SearchRequest<'a>) -> BoxFuture<'a, Result<SearchPage>> {
		Box::pin(ClinicalTrialsClient::search(self, req))
	}
}

pub(crate) fn http_client(cfg: &SearchProviderConfig) -> Result<Client> {
	let client = Client::builder()
		.timeout(Duration::from_millis(cfg.timeout_ms))
		.user_agent(concat!("apollo/", env!("CARGO_PKG_VERSION")))
		.build()?;

	Ok(client)
}

/// GETs `url`, retrying rate-limit responses and transport failures with a linear backoff.
pub(crate) async fn get_with_retry(
	client: &Client,
	cfg: &SearchProviderConfig,
	url: &str,
	params: &[(String, String)],
) -> Result<Response> {
	let mut attempt = 0_u32;

	loop {
		match client.get(url).query(params).send().await {
			Ok(res) if res.status() == StatusCode::TOO_MANY_REQUESTS && attempt < cfg.max_retries => {
				tracing::debug!(url, attempt, "Upstream rate limited the request. Retrying.");
			},
			Ok(res) => return Ok(res.error_for_status()?),
			Err(err) if attempt < cfg.max_retries => {
				tracing::debug!(url, attempt, error = %err, "Upstream request failed. Retrying.");
			},
			Err(err) => return Err(err.into()),
		}

		attempt += 1;

		tokio::time::sleep(Duration::from_millis(cfg.retry_delay_ms.saturating_mul(attempt.into())))
			.await;
	}
}

pub(crate) fn push_filters(params: &mut Vec<(String, String)>, filters: &BTreeMap<String, String>) {
	for (name, value) in filters {
		if params.iter().any(|(existing, _)| existing == name) {
			continue;
		}

		params.push((name.clone(), value.clone()));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn filters_never_override_core_parameters() {
		let mut params = vec![("term".to_string(), "sepsis".to_string())];
		let filters = BTreeMap::from([
			("term".to_string(), "other".to_string()),
			("mindate".to_string(), "2020".to_string()),
		]);

		push_filters(&mut params, &filters);

		assert_eq!(
			params,
			vec![
				("term".to_string(), "sepsis".to_string()),
				("mindate".to_string(), "2020".to_string()),
			]
		);
	}
}
