use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const TRUNCATION_MARKER: &str = "...";

/// External search backend a candidate was found in. Doubles as its cache namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchSource {
	#[serde(rename = "pubmed")]
	PubMed,
	#[serde(rename = "clinicaltrials")]
	ClinicalTrials,
}
impl SearchSource {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::PubMed => "pubmed",
			Self::ClinicalTrials => "clinicaltrials",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"pubmed" => Some(Self::PubMed),
			"clinicaltrials" => Some(Self::ClinicalTrials),
			_ => None,
		}
	}
}
impl Display for SearchSource {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A single article or trial returned by an external search backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
	pub id: String,
	pub source: SearchSource,
	pub title: String,
	#[serde(rename = "abstract", alias = "summary", default)]
	pub summary: String,
	pub url: String,
	#[serde(default)]
	pub metadata: Map<String, Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub relevance_score: Option<f32>,
	#[serde(default)]
	pub priority_weight: u8,
}

/// Caps `text` at `max_chars` characters, appending the truncation marker when shortened.
pub fn truncate_summary(text: &str, max_chars: usize) -> String {
	let trimmed = text.trim();

	match trimmed.char_indices().nth(max_chars) {
		Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &trimmed[..cut]),
		None => trimmed.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn short_summary_is_untouched() {
		assert_eq!(truncate_summary("  brief  ", 500), "brief");
	}

	#[test]
	fn long_summary_is_cut_on_char_boundary() {
		let text = "é".repeat(12);
		let cut = truncate_summary(&text, 10);

		assert_eq!(cut, format!("{}...", "é".repeat(10)));
	}

	#[test]
	fn source_round_trips_through_names() {
		for source in [SearchSource::PubMed, SearchSource::ClinicalTrials] {
			assert_eq!(SearchSource::parse(source.as_str()), Some(source));
			assert_eq!(
				serde_json::to_value(source).expect("serialize"),
				serde_json::json!(source.as_str())
			);
		}

		assert_eq!(SearchSource::parse("scholar"), None);
	}
}
