pub mod cached_data;
pub mod search;
pub mod sessions;

mod error;

pub use apollo_providers::{BoxFuture, SearchProvider};
pub use cached_data::{
	CacheDataRequest, CacheDataResponse, GetCachedDataRequest, GetCachedDataResponse,
};
pub use error::{Error, Result};
pub use search::{ExternalSearchRequest, ExternalSearchResponse, QueryDiagnostic, SearchResults};
pub use sessions::{
	DeleteSessionRequest, DeleteSessionResponse, GetSessionRequest, GetSessionResponse,
	ListSessionsRequest, ListSessionsResponse, SaveSessionRequest, SaveSessionResponse,
	SessionSummary,
};

use std::sync::Arc;

use apollo_config::Config;
use apollo_domain::SearchSource;
use apollo_providers::{clinicaltrials::ClinicalTrialsClient, pubmed::PubMedClient};
use apollo_storage::{CacheStore, StorageMode};

#[derive(Clone)]
pub struct Providers {
	pub pubmed: Arc<dyn SearchProvider>,
	pub clinical_trials: Arc<dyn SearchProvider>,
}
impl Providers {
	pub fn new(pubmed: Arc<dyn SearchProvider>, clinical_trials: Arc<dyn SearchProvider>) -> Self {
		Self { pubmed, clinical_trials }
	}

	/// HTTP clients for the configured upstreams.
	pub fn from_config(cfg: &Config) -> Result<Self> {
		let pubmed = PubMedClient::new(&cfg.providers.pubmed)?;
		let clinical_trials = ClinicalTrialsClient::new(&cfg.providers.clinicaltrials)?;

		Ok(Self::new(Arc::new(pubmed), Arc::new(clinical_trials)))
	}

	pub fn for_source(&self, source: SearchSource) -> &dyn SearchProvider {
		match source {
			SearchSource::PubMed => self.pubmed.as_ref(),
			SearchSource::ClinicalTrials => self.clinical_trials.as_ref(),
		}
	}
}

pub struct ApolloService {
	pub cfg: Config,
	pub store: Arc<CacheStore>,
	pub providers: Providers,
}
impl ApolloService {
	pub fn new(cfg: Config, store: Arc<CacheStore>, providers: Providers) -> Self {
		Self { cfg, store, providers }
	}

	/// Connects the cache store and upstream clients described by `cfg`.
	///
	/// Redis being unreachable is not an error; the store starts in fallback mode.
	pub async fn connect(cfg: Config) -> Result<Self> {
		let providers = Providers::from_config(&cfg)?;
		let store = Arc::new(CacheStore::connect(&cfg.storage.redis).await);

		if cfg.storage.redis.reconnect_interval_secs > 0 {
			store.spawn_reconnect_loop(std::time::Duration::from_secs(
				cfg.storage.redis.reconnect_interval_secs,
			));
		}

		Ok(Self::new(cfg, store, providers))
	}

	pub fn storage_mode(&self) -> StorageMode {
		self.store.mode()
	}
}

const MAX_TTL_SECS: f64 = 10.0 * 365.0 * 86_400.0;

pub(crate) fn invalid_request(message: impl Into<String>) -> Error {
	Error::InvalidRequest { message: message.into() }
}

/// Converts a caller-supplied amount of `unit` into a TTL, rejecting non-positive, non-finite and
/// absurdly long values.
pub(crate) fn ttl_from(amount: f64, unit: time::Duration, field: &str) -> Result<time::Duration> {
	let secs = amount * unit.as_seconds_f64();

	if !secs.is_finite() || secs <= 0.0 || secs > MAX_TTL_SECS {
		return Err(invalid_request(format!(
			"{field} must be a positive duration of at most ten years."
		)));
	}

	Ok(time::Duration::seconds_f64(secs))
}
