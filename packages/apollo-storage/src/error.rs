#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Redis(#[from] redis::RedisError),
	#[error("Durable backend {operation} timed out after {timeout_ms} ms.")]
	Timeout { operation: &'static str, timeout_ms: u64 },
}
