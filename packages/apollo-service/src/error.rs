pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl Error {
	/// Message without the category prefix, as shown to API callers.
	pub fn message(&self) -> &str {
		match self {
			Self::InvalidRequest { message }
			| Self::NotFound { message }
			| Self::Provider { message }
			| Self::Storage { message } => message,
		}
	}
}
impl From<apollo_storage::Error> for Error {
	fn from(err: apollo_storage::Error) -> Self {
		match err {
			apollo_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			other => Self::Storage { message: other.to_string() },
		}
	}
}

impl From<apollo_providers::Error> for Error {
	fn from(err: apollo_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
