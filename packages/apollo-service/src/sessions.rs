use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use apollo_domain::time_serde;
use apollo_storage::{CacheEntry, StorageMode};

use crate::{ApolloService, Error, Result, invalid_request, ttl_from};

pub const SESSION_NAMESPACE: &str = "session";

const DEFAULT_LIST_LIMIT: usize = 50;
const FIELD_SESSION_ID: &str = "sessionId";
const FIELD_CREATED_AT: &str = "createdAt";
const FIELD_LAST_ACCESSED: &str = "lastAccessed";
const FIELD_EXPIRES_AT: &str = "expiresAt";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSessionRequest {
	#[serde(default)]
	pub session_id: Option<String>,
	#[serde(default)]
	pub patient_data: Option<Value>,
	#[serde(default)]
	pub expiration_hours: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSessionResponse {
	pub success: bool,
	pub session_id: String,
	#[serde(with = "time_serde")]
	pub expires_at: OffsetDateTime,
	pub storage: StorageMode,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSessionRequest {
	pub session_id: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSessionResponse {
	pub success: bool,
	pub session_data: Value,
	pub storage: StorageMode,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSessionRequest {
	pub session_id: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSessionResponse {
	pub success: bool,
	pub session_id: String,
	pub message: String,
	pub storage: StorageMode,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSessionsRequest {
	#[serde(default)]
	pub limit: Option<usize>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
	pub session_id: String,
	pub created_at: Option<String>,
	pub last_accessed: Option<String>,
	pub expires_at: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSessionsResponse {
	pub success: bool,
	pub sessions: Vec<SessionSummary>,
	pub total_count: usize,
	pub storage: StorageMode,
}

impl ApolloService {
	/// Stores patient data under a session id, generating one when the caller has none.
	///
	/// Object payloads are flattened next to the bookkeeping fields; anything else is kept under
	/// `patientData`.
	pub async fn save_session(&self, req: SaveSessionRequest) -> Result<SaveSessionResponse> {
		let session_id = match req.session_id.as_deref().map(str::trim) {
			Some("") => return Err(invalid_request("sessionId must be non-empty when provided.")),
			Some(id) => id.to_string(),
			None => Uuid::new_v4().to_string(),
		};
		let patient_data = req
			.patient_data
			.filter(|value| !value.is_null())
			.ok_or_else(|| invalid_request("Patient data is required"))?;
		let hours = req.expiration_hours.unwrap_or(self.cfg.cache.session_ttl_hours);
		let ttl = ttl_from(hours, Duration::HOUR, "expirationHours")?;
		let now = self.store.now();
		let payload = session_payload(&session_id, patient_data, now, now + ttl)?;
		let entry = self.store.put(SESSION_NAMESPACE, &session_id, payload, ttl).await?;

		tracing::info!(
			session_id = %session_id,
			expiration_hours = hours,
			storage = self.store.mode().as_str(),
			"Session saved."
		);

		Ok(SaveSessionResponse {
			success: true,
			session_id,
			expires_at: entry.expires_at,
			storage: self.store.mode(),
		})
	}

	/// Returns the stored session and records the access time. The expiry is not extended.
	pub async fn get_session(&self, req: GetSessionRequest) -> Result<GetSessionResponse> {
		let session_id = required_id(&req.session_id)?;
		let Some(mut entry) = self.store.get(SESSION_NAMESPACE, session_id).await? else {
			return Err(Error::NotFound { message: "Session not found or expired".to_string() });
		};

		touch(&mut entry, self.store.now())?;

		if !self.store.replace(&entry).await? {
			return Err(Error::NotFound { message: "Session not found or expired".to_string() });
		}

		tracing::debug!(session_id = %session_id, "Session accessed.");

		Ok(GetSessionResponse {
			success: true,
			session_data: entry.payload,
			storage: self.store.mode(),
		})
	}

	/// Deleting a missing session still succeeds.
	pub async fn delete_session(&self, req: DeleteSessionRequest) -> Result<DeleteSessionResponse> {
		let session_id = required_id(&req.session_id)?.to_string();

		self.store.delete(SESSION_NAMESPACE, &session_id).await?;

		tracing::info!(session_id = %session_id, "Session deleted.");

		Ok(DeleteSessionResponse {
			success: true,
			message: format!("Session {session_id} deleted successfully"),
			session_id,
			storage: self.store.mode(),
		})
	}

	pub async fn list_active_sessions(
		&self,
		req: ListSessionsRequest,
	) -> Result<ListSessionsResponse> {
		let limit = req.limit.unwrap_or(DEFAULT_LIST_LIMIT);

		if limit == 0 {
			return Err(invalid_request("limit must be greater than zero."));
		}

		let entries = self.store.list_entries(SESSION_NAMESPACE, limit).await?;
		let sessions = entries.iter().map(summarize).collect::<Vec<_>>();

		Ok(ListSessionsResponse {
			success: true,
			total_count: sessions.len(),
			sessions,
			storage: self.store.mode(),
		})
	}
}

fn required_id(raw: &str) -> Result<&str> {
	let id = raw.trim();

	if id.is_empty() {
		return Err(invalid_request("sessionId is required."));
	}

	Ok(id)
}

fn session_payload(
	session_id: &str,
	patient_data: Value,
	now: OffsetDateTime,
	expires_at: OffsetDateTime,
) -> Result<Value> {
	let mut payload = Map::new();

	match patient_data {
		Value::Object(fields) => payload.extend(fields),
		other => {
			payload.insert("patientData".to_string(), other);
		},
	}

	payload.insert(FIELD_SESSION_ID.to_string(), Value::String(session_id.to_string()));
	payload.insert(FIELD_CREATED_AT.to_string(), Value::String(timestamp(&now)?));
	payload.insert(FIELD_LAST_ACCESSED.to_string(), Value::String(timestamp(&now)?));
	payload.insert(FIELD_EXPIRES_AT.to_string(), Value::String(timestamp(&expires_at)?));

	Ok(Value::Object(payload))
}

fn touch(entry: &mut CacheEntry, now: OffsetDateTime) -> Result<()> {
	let stamp = timestamp(&now)?;

	match entry.payload.as_object_mut() {
		Some(fields) => {
			fields.insert(FIELD_LAST_ACCESSED.to_string(), Value::String(stamp));
		},
		None => {
			tracing::warn!(session_id = %entry.key, "Session payload is not an object.");
		},
	}

	Ok(())
}

fn summarize(entry: &CacheEntry) -> SessionSummary {
	let field = |name: &str| {
		entry.payload.get(name).and_then(Value::as_str).map(str::to_string)
	};

	SessionSummary {
		session_id: field(FIELD_SESSION_ID).unwrap_or_else(|| entry.key.clone()),
		created_at: field(FIELD_CREATED_AT),
		last_accessed: field(FIELD_LAST_ACCESSED),
		expires_at: field(FIELD_EXPIRES_AT),
	}
}

pub(crate) fn timestamp(at: &OffsetDateTime) -> Result<String> {
	time_serde::format(at).map_err(|err| Error::Storage {
		message: format!("Failed to format timestamp: {err}"),
	})
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use time::macros::datetime;

	use super::*;

	#[test]
	fn object_patient_data_is_flattened() {
		let now = datetime!(2026-01-15 09:30 UTC);
		let payload = session_payload(
			"s-1",
			json!({ "name": "Jane", "age": 54 }),
			now,
			now + Duration::hours(24),
		)
		.expect("payload");

		assert_eq!(payload["sessionId"], "s-1");
		assert_eq!(payload["name"], "Jane");
		assert_eq!(payload["age"], 54);
		assert_eq!(payload["createdAt"], "2026-01-15T09:30:00Z");
		assert_eq!(payload["lastAccessed"], payload["createdAt"]);
		assert_eq!(payload["expiresAt"], "2026-01-16T09:30:00Z");
	}

	#[test]
	fn scalar_patient_data_is_nested() {
		let now = datetime!(2026-01-15 09:30 UTC);
		let payload = session_payload("s-2", json!("free text"), now, now + Duration::hours(1))
			.expect("payload");

		assert_eq!(payload["patientData"], "free text");
	}

	#[test]
	fn bookkeeping_fields_win_over_patient_fields() {
		let now = datetime!(2026-01-15 09:30 UTC);
		let payload = session_payload(
			"s-3",
			json!({ "sessionId": "spoofed", "createdAt": "yesterday" }),
			now,
			now + Duration::hours(1),
		)
		.expect("payload");

		assert_eq!(payload["createdAt"], "2026-01-15T09:30:00Z");
		assert_eq!(payload["sessionId"], "s-3");
	}
}
