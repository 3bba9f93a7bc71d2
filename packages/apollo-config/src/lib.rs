mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, Config, Providers, Redis, Search, SearchProviderConfig, Service, Storage,
};

use std::{env, fs, path::Path};

pub const ENV_REDIS_HOST: &str = "REDIS_HOST";
pub const ENV_REDIS_PORT: &str = "REDIS_PORT";
pub const ENV_REDIS_PASSWORD: &str = "REDIS_PASSWORD";
pub const ENV_NCBI_API_KEY: &str = "NCBI_API_KEY";
pub const ENV_PUBMED_API_BASE: &str = "PUBMED_API_BASE";
pub const ENV_CLINICALTRIALS_API_BASE: &str = "CLINICALTRIALS_API_BASE";

/// Upper bound for search cache TTLs: ten years.
pub const MAX_CACHE_TTL_MINUTES: u64 = 10 * 365 * 24 * 60;

const MAX_SEARCH_RESULTS: u32 = 100;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	apply_env_overrides(&mut cfg, |name| env::var(name).ok())?;
	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

/// Overlays connection settings and secrets from the environment onto a parsed config.
pub fn apply_env_overrides<F>(cfg: &mut Config, lookup: F) -> Result<()>
where
	F: Fn(&str) -> Option<String>,
{
	if let Some(host) = lookup(ENV_REDIS_HOST) {
		cfg.storage.redis.host = host;
	}
	if let Some(raw) = lookup(ENV_REDIS_PORT) {
		cfg.storage.redis.port = raw.trim().parse().map_err(|_| Error::Validation {
			message: format!("{ENV_REDIS_PORT} must be a valid port number, got {raw}."),
		})?;
	}
	if let Some(password) = lookup(ENV_REDIS_PASSWORD) {
		cfg.storage.redis.password = Some(password);
	}
	if let Some(key) = lookup(ENV_NCBI_API_KEY) {
		cfg.providers.pubmed.api_key = Some(key);
	}
	if let Some(base) = lookup(ENV_PUBMED_API_BASE) {
		cfg.providers.pubmed.api_base = base;
	}
	if let Some(base) = lookup(ENV_CLINICALTRIALS_API_BASE) {
		cfg.providers.clinicaltrials.api_base = base;
	}

	Ok(())
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("service.http_bind", &cfg.service.http_bind),
		("service.mcp_bind", &cfg.service.mcp_bind),
		("storage.redis.host", &cfg.storage.redis.host),
		("storage.redis.key_prefix", &cfg.storage.redis.key_prefix),
		("providers.pubmed.api_base", &cfg.providers.pubmed.api_base),
		("providers.clinicaltrials.api_base", &cfg.providers.clinicaltrials.api_base),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.storage.redis.key_prefix.contains(':') {
		return Err(Error::Validation {
			message: "storage.redis.key_prefix must not contain ':'.".to_string(),
		});
	}
	if cfg.storage.redis.connect_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "storage.redis.connect_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.redis.command_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "storage.redis.command_timeout_ms must be greater than zero.".to_string(),
		});
	}

	for (label, provider) in
		[("pubmed", &cfg.providers.pubmed), ("clinicaltrials", &cfg.providers.clinicaltrials)]
	{
		if provider.timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("providers.{label}.timeout_ms must be greater than zero."),
			});
		}
	}

	if cfg.search.max_results == 0 || cfg.search.max_results > MAX_SEARCH_RESULTS {
		return Err(Error::Validation {
			message: format!("search.max_results must be in the range 1-{MAX_SEARCH_RESULTS}."),
		});
	}
	if cfg.search.abstract_max_chars == 0 {
		return Err(Error::Validation {
			message: "search.abstract_max_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.search.query_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "search.query_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if !cfg.search.min_classification_confidence.is_finite() {
		return Err(Error::Validation {
			message: "search.min_classification_confidence must be a finite number.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.search.min_classification_confidence) {
		return Err(Error::Validation {
			message: "search.min_classification_confidence must be in the range 0.0-1.0."
				.to_string(),
		});
	}

	for (label, value) in [
		("cache.session_ttl_hours", cfg.cache.session_ttl_hours),
		("cache.data_ttl_minutes", cfg.cache.data_ttl_minutes),
	] {
		if !value.is_finite() || value <= 0.0 {
			return Err(Error::Validation {
				message: format!("{label} must be a finite number greater than zero."),
			});
		}
	}

	for (label, value) in [
		("cache.pubmed_ttl_minutes", cfg.cache.pubmed_ttl_minutes),
		("cache.clinicaltrials_ttl_minutes", cfg.cache.clinicaltrials_ttl_minutes),
	] {
		if value == 0 || value > MAX_CACHE_TTL_MINUTES {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 1-{MAX_CACHE_TTL_MINUTES}."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.storage.redis.password.as_deref().map(|value| value.trim().is_empty()).unwrap_or(false)
	{
		cfg.storage.redis.password = None;
	}

	for provider in [&mut cfg.providers.pubmed, &mut cfg.providers.clinicaltrials] {
		if provider.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
			provider.api_key = None;
		}

		let trimmed = provider.api_base.trim().trim_end_matches('/').to_string();

		provider.api_base = trimmed;
	}
}
