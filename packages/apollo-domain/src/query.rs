use serde::{Deserialize, Serialize};

use crate::terms::PriorityTermSet;

const TERM_SEPARATOR: &str = " AND ";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
	Critical,
	High,
	Medium,
	Combined,
}
impl PriorityTier {
	pub fn weight(self) -> u8 {
		match self {
			Self::Critical => 5,
			Self::High => 3,
			Self::Medium => 2,
			Self::Combined => 1,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Critical => "critical",
			Self::High => "high",
			Self::Medium => "medium",
			Self::Combined => "combined",
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedQuery {
	pub query_string: String,
	pub priority_tier: PriorityTier,
	pub weight: u8,
}
impl WeightedQuery {
	fn new(tier: PriorityTier, terms: &[&str]) -> Self {
		Self { query_string: terms.join(TERM_SEPARATOR), priority_tier: tier, weight: tier.weight() }
	}
}

/// Plans the per-tier queries in fixed order: critical, high, medium, then combined.
///
/// Empty tiers are skipped. The combined query spans every tier including `low` and is only
/// emitted when at least one term exists, so an empty term set yields no queries.
pub fn build_queries(tiers: &PriorityTermSet) -> Vec<WeightedQuery> {
	let mut queries = Vec::with_capacity(4);

	for (tier, terms) in [
		(PriorityTier::Critical, &tiers.critical),
		(PriorityTier::High, &tiers.high),
		(PriorityTier::Medium, &tiers.medium),
	] {
		if terms.is_empty() {
			continue;
		}

		let terms = terms.iter().map(String::as_str).collect::<Vec<_>>();

		queries.push(WeightedQuery::new(tier, &terms));
	}

	let combined = tiers.all_terms().collect::<Vec<_>>();

	if !combined.is_empty() {
		queries.push(WeightedQuery::new(PriorityTier::Combined, &combined));
	}

	queries
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn low_only_terms_emit_a_single_combined_query() {
		let tiers = PriorityTermSet { low: vec!["follow-up".to_string()], ..Default::default() };
		let queries = build_queries(&tiers);

		assert_eq!(queries.len(), 1);
		assert_eq!(queries[0].priority_tier, PriorityTier::Combined);
		assert_eq!(queries[0].query_string, "follow-up");
		assert_eq!(queries[0].weight, 1);
	}

	#[test]
	fn terms_are_joined_with_and() {
		let tiers = PriorityTermSet {
			high: vec!["MRI".to_string(), "biopsy".to_string()],
			..Default::default()
		};
		let queries = build_queries(&tiers);

		assert_eq!(queries[0].query_string, "MRI AND biopsy");
		assert_eq!(queries[1].query_string, "MRI AND biopsy");
	}
}
