use axum::{
	Json, Router,
	extract::{State, rejection::JsonRejection},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;
use time::OffsetDateTime;

use apollo_domain::{SearchSource, time_serde};
use apollo_service::{Error as ServiceError, ExternalSearchRequest, ExternalSearchResponse};
use apollo_storage::StorageMode;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
	pub status: &'static str,
	pub timestamp: String,
	pub storage: StorageMode,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	success: bool,
	error: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	details: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error: String,
	details: Option<String>,
}
impl ApiError {
	fn new(status: StatusCode, error: impl Into<String>, details: Option<String>) -> Self {
		Self { status, error: error.into(), details }
	}

	pub fn status(&self) -> StatusCode {
		self.status
	}
}
impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidRequest { message } =>
				Self::new(StatusCode::BAD_REQUEST, message, None),
			ServiceError::NotFound { message } => Self::new(StatusCode::NOT_FOUND, message, None),
			ServiceError::Provider { message } | ServiceError::Storage { message } => {
				tracing::error!(error = %message, "Request failed.");

				Self::new(
					StatusCode::INTERNAL_SERVER_ERROR,
					"Failed to search external sources",
					Some(message),
				)
			},
		}
	}
}
impl From<JsonRejection> for ApiError {
	fn from(rejection: JsonRejection) -> Self {
		Self::new(StatusCode::BAD_REQUEST, rejection.body_text(), None)
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { success: false, error: self.error, details: self.details };

		(self.status, Json(body)).into_response()
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/api/health", get(health))
		.route("/api/search-external", post(search_external))
		.route("/api/search-pubmed", post(search_pubmed))
		.with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
	let timestamp = time_serde::format(&OffsetDateTime::now_utc()).map_err(|err| {
		ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Health check failed", Some(err.to_string()))
	})?;

	Ok(Json(HealthResponse { status: "OK", timestamp, storage: state.service.storage_mode() }))
}

async fn search_external(
	State(state): State<AppState>,
	payload: Result<Json<ExternalSearchRequest>, JsonRejection>,
) -> Result<Json<ExternalSearchResponse>, ApiError> {
	let Json(req) = payload?;
	let response = state.service.search_external(req).await?;

	Ok(Json(response))
}

/// Older clients only know PubMed; the source field is ignored here.
async fn search_pubmed(
	State(state): State<AppState>,
	payload: Result<Json<ExternalSearchRequest>, JsonRejection>,
) -> Result<Json<ExternalSearchResponse>, ApiError> {
	let Json(mut req) = payload?;

	req.source = Some(SearchSource::PubMed.as_str().to_string());

	let response = state.service.search_external(req).await?;

	Ok(Json(response))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn service_errors_map_to_status_codes() {
		let invalid: ApiError =
			ServiceError::InvalidRequest { message: "Structured data is required".to_string() }
				.into();
		let missing: ApiError = ServiceError::NotFound { message: "gone".to_string() }.into();
		let upstream: ApiError = ServiceError::Provider { message: "HTTP 503".to_string() }.into();

		assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
		assert!(invalid.details.is_none());
		assert_eq!(missing.status(), StatusCode::NOT_FOUND);
		assert_eq!(upstream.status(), StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(upstream.details.as_deref(), Some("HTTP 503"));
	}
}
