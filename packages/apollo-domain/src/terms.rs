use serde::{Deserialize, Serialize};

use crate::record::{ClassificationResult, StructuredClinicalRecord, searchable};

/// Clinical importance bucket of a search term.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TermTier {
	Critical,
	High,
	Medium,
	Low,
}
impl TermTier {
	pub const ALL: [Self; 4] = [Self::Critical, Self::High, Self::Medium, Self::Low];

	/// Score contribution when a term of this tier appears in a candidate title.
	pub fn title_weight(self) -> f32 {
		match self {
			Self::Critical => 5.0,
			Self::High => 3.0,
			Self::Medium => 2.0,
			Self::Low => 1.0,
		}
	}

	/// Score contribution when a term of this tier appears in a candidate summary.
	pub fn summary_weight(self) -> f32 {
		match self {
			Self::Critical => 3.0,
			Self::High => 2.0,
			Self::Medium => 1.0,
			Self::Low => 0.5,
		}
	}
}

/// Search terms bucketed by clinical importance. No tier ever holds a blank or sentinel value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityTermSet {
	pub critical: Vec<String>,
	pub high: Vec<String>,
	pub medium: Vec<String>,
	pub low: Vec<String>,
}
impl PriorityTermSet {
	pub fn tier(&self, tier: TermTier) -> &[String] {
		match tier {
			TermTier::Critical => &self.critical,
			TermTier::High => &self.high,
			TermTier::Medium => &self.medium,
			TermTier::Low => &self.low,
		}
	}

	pub fn is_empty(&self) -> bool {
		TermTier::ALL.iter().all(|tier| self.tier(*tier).is_empty())
	}

	/// Every term in tier order: critical, high, medium, then low.
	pub fn all_terms(&self) -> impl Iterator<Item = &str> {
		TermTier::ALL.into_iter().flat_map(|tier| self.tier(tier).iter().map(String::as_str))
	}

	/// Adds the classifier's predicted class as a critical term when it is trustworthy enough.
	///
	/// Returns whether a term was added.
	pub fn merge_classification(
		&mut self,
		classification: &ClassificationResult,
		min_confidence: f32,
	) -> bool {
		if !classification.success {
			return false;
		}

		let confident =
			classification.confidence.map(|value| value >= min_confidence).unwrap_or(false);

		if !confident {
			return false;
		}

		let Some(label) = searchable(classification.predicted_class.as_deref()) else {
			return false;
		};

		if self.critical.iter().any(|term| term.eq_ignore_ascii_case(label)) {
			return false;
		}

		self.critical.push(label.to_string());

		true
	}
}

pub fn extract_tiers(record: &StructuredClinicalRecord) -> PriorityTermSet {
	let mut tiers = PriorityTermSet::default();

	tiers.critical.extend(collect(record.diagnosis_tests.iter().map(|d| d.condition.as_deref())));

	tiers.high.extend(collect(record.diagnosis_tests.iter().map(|d| d.test.as_deref())));
	tiers.high.extend(collect(record.treatments.iter().map(|t| t.name.as_deref())));
	tiers.high.extend(collect(record.treatments.iter().map(|t| t.related_condition.as_deref())));

	tiers.medium.extend(collect(record.symptoms.iter().map(|s| s.name_of_symptom.as_deref())));
	tiers.medium.extend(collect(
		record.medical_history.iter().map(|history| history.physiological_context.as_deref()),
	));

	tiers.low.extend(collect(std::iter::once(record.visit_motivation.as_deref())));

	tiers
}

fn collect<'a, I>(values: I) -> impl Iterator<Item = String> + 'a
where
	I: Iterator<Item = Option<&'a str>> + 'a,
{
	values.filter_map(searchable).map(str::to_string)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn classification(label: &str, confidence: f32, success: bool) -> ClassificationResult {
		ClassificationResult {
			predicted_class: Some(label.to_string()),
			confidence: Some(confidence),
			success,
		}
	}

	#[test]
	fn confident_classification_joins_critical_tier() {
		let mut tiers = PriorityTermSet::default();

		assert!(tiers.merge_classification(&classification("glioma", 0.91, true), 0.5));
		assert_eq!(tiers.critical, vec!["glioma".to_string()]);
	}

	#[test]
	fn weak_or_failed_classification_is_ignored() {
		let mut tiers = PriorityTermSet::default();

		assert!(!tiers.merge_classification(&classification("glioma", 0.2, true), 0.5));
		assert!(!tiers.merge_classification(&classification("glioma", 0.99, false), 0.5));
		assert!(!tiers.merge_classification(&classification("None", 0.99, true), 0.5));
		assert!(tiers.is_empty());
	}

	#[test]
	fn classification_does_not_duplicate_existing_condition() {
		let mut tiers =
			PriorityTermSet { critical: vec!["Glioma".to_string()], ..Default::default() };

		assert!(!tiers.merge_classification(&classification("glioma", 0.9, true), 0.5));
		assert_eq!(tiers.critical.len(), 1);
	}
}
