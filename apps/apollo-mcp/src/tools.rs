//! Tool bodies. Each returns `{ success: true, ... }` or `{ success: false, error }`; missing or
//! ill-typed arguments are reported as `ErrorData` instead.

use rmcp::{
	ErrorData,
	model::{CallToolResult, JsonObject},
};
use serde::Serialize;
use serde_json::{Value, json};

use apollo_service::{
	ApolloService, CacheDataRequest, DeleteSessionRequest, Error as ServiceError,
	GetCachedDataRequest, GetSessionRequest, ListSessionsRequest, SaveSessionRequest,
};

pub async fn save_patient_session(
	service: &ApolloService,
	mut params: JsonObject,
) -> Result<Value, ErrorData> {
	let req = SaveSessionRequest {
		session_id: take_optional_string(&mut params, "sessionId")?,
		patient_data: Some(take_required_value(&mut params, "patientData")?),
		expiration_hours: take_optional_number(&mut params, "expirationHours")?,
	};

	envelope(service.save_session(req).await)
}

pub async fn get_patient_session(
	service: &ApolloService,
	mut params: JsonObject,
) -> Result<Value, ErrorData> {
	let req = GetSessionRequest { session_id: take_required_string(&mut params, "sessionId")? };

	envelope(service.get_session(req).await)
}

pub async fn delete_patient_session(
	service: &ApolloService,
	mut params: JsonObject,
) -> Result<Value, ErrorData> {
	let req = DeleteSessionRequest { session_id: take_required_string(&mut params, "sessionId")? };

	envelope(service.delete_session(req).await)
}

pub async fn cache_medical_data(
	service: &ApolloService,
	mut params: JsonObject,
) -> Result<Value, ErrorData> {
	let req = CacheDataRequest {
		cache_key: take_required_string(&mut params, "cacheKey")?,
		data: Some(take_required_value(&mut params, "data")?),
		source: take_required_string(&mut params, "source")?,
		ttl_minutes: take_optional_number(&mut params, "ttlMinutes")?,
	};

	envelope(service.cache_data(req).await)
}

pub async fn get_cached_data(
	service: &ApolloService,
	mut params: JsonObject,
) -> Result<Value, ErrorData> {
	let req = GetCachedDataRequest {
		cache_key: take_required_string(&mut params, "cacheKey")?,
		source: take_optional_string(&mut params, "source")?,
	};

	envelope(service.get_cached_data(req).await)
}

pub async fn list_active_sessions(
	service: &ApolloService,
	mut params: JsonObject,
) -> Result<Value, ErrorData> {
	let limit = match params.remove("limit") {
		None | Some(Value::Null) => None,
		Some(value) => Some(value.as_u64().ok_or_else(|| {
			ErrorData::invalid_params("limit must be a non-negative integer.", None)
		})? as usize),
	};

	envelope(service.list_active_sessions(ListSessionsRequest { limit }).await)
}

fn envelope<T>(outcome: apollo_service::Result<T>) -> Result<Value, ErrorData>
where
	T: Serialize,
{
	match outcome {
		Ok(response) => serde_json::to_value(response).map_err(|err| {
			ErrorData::internal_error(format!("Failed to encode tool result: {err}"), None)
		}),
		Err(err) => {
			if matches!(err, ServiceError::Provider { .. } | ServiceError::Storage { .. }) {
				tracing::error!(error = %err, "Tool call failed.");
			}

			Ok(json!({ "success": false, "error": err.message() }))
		},
	}
}

pub(crate) fn into_tool_result(envelope: Value) -> Result<CallToolResult, ErrorData> {
	if envelope.get("success").and_then(Value::as_bool) == Some(true) {
		Ok(CallToolResult::structured(envelope))
	} else {
		Ok(CallToolResult::structured_error(envelope))
	}
}

fn take_required_string(params: &mut JsonObject, key: &str) -> Result<String, ErrorData> {
	let value = params
		.remove(key)
		.ok_or_else(|| ErrorData::invalid_params(format!("{key} is required."), None))?;
	let text = value
		.as_str()
		.ok_or_else(|| ErrorData::invalid_params(format!("{key} must be a string."), None))?
		.trim();

	if text.is_empty() {
		return Err(ErrorData::invalid_params(format!("{key} must be non-empty."), None));
	}

	Ok(text.to_string())
}

fn take_optional_string(params: &mut JsonObject, key: &str) -> Result<Option<String>, ErrorData> {
	let Some(value) = params.remove(key).filter(|value| !value.is_null()) else { return Ok(None) };
	let text = value
		.as_str()
		.ok_or_else(|| ErrorData::invalid_params(format!("{key} must be a string."), None))?
		.trim();

	if text.is_empty() {
		return Err(ErrorData::invalid_params(format!("{key} must be non-empty."), None));
	}

	Ok(Some(text.to_string()))
}

fn take_required_value(params: &mut JsonObject, key: &str) -> Result<Value, ErrorData> {
	params
		.remove(key)
		.filter(|value| !value.is_null())
		.ok_or_else(|| ErrorData::invalid_params(format!("{key} is required."), None))
}

fn take_optional_number(params: &mut JsonObject, key: &str) -> Result<Option<f64>, ErrorData> {
	let Some(value) = params.remove(key).filter(|value| !value.is_null()) else { return Ok(None) };

	value
		.as_f64()
		.map(Some)
		.ok_or_else(|| ErrorData::invalid_params(format!("{key} must be a number."), None))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn params(value: Value) -> JsonObject {
		match value {
			Value::Object(map) => map,
			other => panic!("Expected an object, got {other}."),
		}
	}

	#[test]
	fn optional_strings_treat_null_as_absent() {
		let mut args = params(json!({ "sessionId": null, "source": " labs " }));

		assert_eq!(take_optional_string(&mut args, "sessionId").expect("ok"), None);
		assert_eq!(take_optional_string(&mut args, "source").expect("ok"), Some("labs".into()));
	}

	#[test]
	fn ill_typed_arguments_are_invalid_params() {
		let mut args = params(json!({ "sessionId": 42, "ttlMinutes": "soon" }));

		assert!(take_required_string(&mut args, "sessionId").is_err());
		assert!(take_optional_number(&mut args, "ttlMinutes").is_err());
		assert!(take_required_value(&mut args, "data").is_err());
	}

	#[test]
	fn envelopes_mark_failures() {
		let failed = envelope::<Value>(Err(ServiceError::NotFound {
			message: "Session not found or expired".to_string(),
		}))
		.expect("envelope");

		assert_eq!(failed, json!({ "success": false, "error": "Session not found or expired" }));
		assert!(into_tool_result(failed).is_ok());
	}
}
