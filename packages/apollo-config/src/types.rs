use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub search: Search,
	pub cache: Cache,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub mcp_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub redis: Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Redis {
	pub host: String,
	pub port: u16,
	pub password: Option<String>,
	#[serde(default)]
	pub database: i64,
	#[serde(default = "default_key_prefix")]
	pub key_prefix: String,
	pub connect_timeout_ms: u64,
	pub command_timeout_ms: u64,
	/// Zero disables the background probe that promotes the store back to the durable backend.
	#[serde(default)]
	pub reconnect_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub pubmed: SearchProviderConfig,
	pub clinicaltrials: SearchProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchProviderConfig {
	pub api_base: String,
	pub api_key: Option<String>,
	pub timeout_ms: u64,
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	#[serde(default = "default_retry_delay_ms")]
	pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Search {
	pub max_results: u32,
	#[serde(default = "default_abstract_max_chars")]
	pub abstract_max_chars: usize,
	pub query_timeout_ms: u64,
	#[serde(default = "default_min_classification_confidence")]
	pub min_classification_confidence: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cache {
	#[serde(default = "default_session_ttl_hours")]
	pub session_ttl_hours: f64,
	#[serde(default = "default_data_ttl_minutes")]
	pub data_ttl_minutes: f64,
	pub pubmed_ttl_minutes: u64,
	pub clinicaltrials_ttl_minutes: u64,
}

fn default_key_prefix() -> String {
	"apollo".to_string()
}

fn default_max_retries() -> u32 {
	2
}

fn default_retry_delay_ms() -> u64 {
	500
}

fn default_abstract_max_chars() -> usize {
	500
}

fn default_min_classification_confidence() -> f32 {
	0.5
}

fn default_session_ttl_hours() -> f64 {
	24.0
}

fn default_data_ttl_minutes() -> f64 {
	60.0
}
