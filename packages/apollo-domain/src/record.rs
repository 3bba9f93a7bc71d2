//! Structured clinical record produced upstream by the text-extraction step.
//!
//! Every field is optional and decoded leniently: the extractor emits free-form JSON, so a
//! wrong-typed value is treated as absent instead of failing the whole record. Keys are
//! accepted in camelCase and in the spaced spelling of the extraction template.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Literal the extractor writes when it could not determine a value.
pub const UNKNOWN_SENTINEL: &str = "None";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredClinicalRecord {
	#[serde(default, alias = "visit motivation", deserialize_with = "lenient_text")]
	pub visit_motivation: Option<String>,
	#[serde(default, alias = "diagnosis tests", deserialize_with = "lenient_list")]
	pub diagnosis_tests: Vec<DiagnosisTest>,
	#[serde(default, deserialize_with = "lenient_list")]
	pub treatments: Vec<Treatment>,
	#[serde(default, deserialize_with = "lenient_list")]
	pub symptoms: Vec<Symptom>,
	#[serde(default, alias = "patient medical history", deserialize_with = "lenient_object")]
	pub medical_history: Option<MedicalHistory>,
}
impl StructuredClinicalRecord {
	/// Decodes a record from arbitrary JSON. Returns `None` only when the value is not an object.
	pub fn from_value(value: Value) -> Option<Self> {
		if !value.is_object() {
			return None;
		}

		serde_json::from_value(value).ok()
	}
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisTest {
	#[serde(default, deserialize_with = "lenient_text")]
	pub test: Option<String>,
	#[serde(default, deserialize_with = "lenient_text")]
	pub condition: Option<String>,
	#[serde(default, deserialize_with = "lenient_text")]
	pub result: Option<String>,
	#[serde(default, deserialize_with = "lenient_text")]
	pub severity: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Treatment {
	#[serde(default, deserialize_with = "lenient_text")]
	pub name: Option<String>,
	#[serde(default, alias = "related condition", deserialize_with = "lenient_text")]
	pub related_condition: Option<String>,
	#[serde(default, deserialize_with = "lenient_text")]
	pub dosage: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Symptom {
	#[serde(default, alias = "name of symptom", deserialize_with = "lenient_text")]
	pub name_of_symptom: Option<String>,
	#[serde(default, alias = "intensity of symptom", deserialize_with = "lenient_text")]
	pub intensity: Option<String>,
	#[serde(default, deserialize_with = "lenient_text")]
	pub location: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalHistory {
	#[serde(default, alias = "physiological context", deserialize_with = "lenient_text")]
	pub physiological_context: Option<String>,
	#[serde(default, alias = "psychological context", deserialize_with = "lenient_text")]
	pub psychological_context: Option<String>,
}

/// Result object handed over by the image classifier.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
	#[serde(default, alias = "predictedClass", deserialize_with = "lenient_text")]
	pub predicted_class: Option<String>,
	#[serde(default)]
	pub confidence: Option<f32>,
	#[serde(default)]
	pub success: bool,
}

/// Returns the trimmed value unless it is blank or the unknown sentinel.
pub fn searchable(value: Option<&str>) -> Option<&str> {
	let trimmed = value?.trim();

	if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNKNOWN_SENTINEL) {
		return None;
	}

	Some(trimmed)
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
	D: Deserializer<'de>,
{
	let value = Value::deserialize(deserializer)?;

	Ok(match value {
		Value::String(text) => Some(text),
		_ => None,
	})
}

fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
	D: Deserializer<'de>,
	T: serde::de::DeserializeOwned,
{
	let value = Value::deserialize(deserializer)?;
	let Value::Array(items) = value else { return Ok(Vec::new()) };

	Ok(items
		.into_iter()
		.filter(Value::is_object)
		.filter_map(|item| serde_json::from_value(item).ok())
		.collect())
}

fn lenient_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
	D: Deserializer<'de>,
	T: serde::de::DeserializeOwned,
{
	let value = Value::deserialize(deserializer)?;

	if !value.is_object() {
		return Ok(None);
	}

	Ok(serde_json::from_value(value).ok())
}
