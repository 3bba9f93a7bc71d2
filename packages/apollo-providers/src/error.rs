pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	Xml(#[from] quick_xml::DeError),
	#[error(transparent)]
	Regex(#[from] regex::Error),
	#[error("{message}")]
	InvalidResponse { message: String },
}
