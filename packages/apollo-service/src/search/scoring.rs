use std::collections::HashMap;

use apollo_domain::{Candidate, PriorityTermSet, WeightedQuery, terms::TermTier};

/// Sum of tier weights for every term found in the title or summary, case-insensitively.
pub fn relevance_score(candidate: &Candidate, tiers: &PriorityTermSet) -> f32 {
	let title = candidate.title.to_lowercase();
	let summary = candidate.summary.to_lowercase();
	let mut score = 0.0;

	for tier in TermTier::ALL {
		for term in tiers.tier(tier) {
			let needle = term.to_lowercase();

			if title.contains(&needle) {
				score += tier.title_weight();
			}
			if summary.contains(&needle) {
				score += tier.summary_weight();
			}
		}
	}

	score
}

/// Merges per-query results into one ranked list.
///
/// Results must arrive in planning order. The first sighting of an id seeds its entry; a later
/// sighting only matters when its query weight is strictly higher, in which case the entry takes
/// that weight and is rescored. Output is ordered by weight, then score, keeping first-seen order
/// among ties.
pub fn merge_and_score(
	per_query: Vec<(WeightedQuery, Vec<Candidate>)>,
	tiers: &PriorityTermSet,
	max_results: usize,
) -> Vec<Candidate> {
	let mut order = Vec::new();
	let mut by_id: HashMap<String, Candidate> = HashMap::new();

	for (query, candidates) in per_query {
		for mut candidate in candidates {
			match by_id.get_mut(&candidate.id) {
				Some(existing) =>
					if query.weight > existing.priority_weight {
						existing.priority_weight = query.weight;
						existing.relevance_score = Some(relevance_score(existing, tiers));
					},
				None => {
					candidate.priority_weight = query.weight;
					candidate.relevance_score = Some(relevance_score(&candidate, tiers));

					order.push(candidate.id.clone());
					by_id.insert(candidate.id.clone(), candidate);
				},
			}
		}
	}

	let mut merged = order.into_iter().filter_map(|id| by_id.remove(&id)).collect::<Vec<_>>();

	merged.sort_by(|a, b| {
		b.priority_weight.cmp(&a.priority_weight).then_with(|| {
			let left = a.relevance_score.unwrap_or(0.0);
			let right = b.relevance_score.unwrap_or(0.0);

			right.total_cmp(&left)
		})
	});
	merged.truncate(max_results);

	merged
}

#[cfg(test)]
mod tests {
	use serde_json::Map;

	use apollo_domain::{PriorityTier, SearchSource};

	use super::*;

	fn candidate(id: &str, title: &str, summary: &str) -> Candidate {
		Candidate {
			id: id.to_string(),
			source: SearchSource::PubMed,
			title: title.to_string(),
			summary: summary.to_string(),
			url: format!("https://pubmed.ncbi.nlm.nih.gov/{id}/"),
			metadata: Map::new(),
			relevance_score: None,
			priority_weight: 0,
		}
	}

	fn query(tier: PriorityTier) -> WeightedQuery {
		WeightedQuery {
			query_string: tier.as_str().to_string(),
			priority_tier: tier,
			weight: tier.weight(),
		}
	}

	fn tiers() -> PriorityTermSet {
		PriorityTermSet {
			critical: vec!["Aortic dissection".to_string()],
			high: vec!["CT scan".to_string()],
			medium: vec!["back pain".to_string()],
			low: vec!["acute back pain".to_string()],
		}
	}

	#[test]
	fn scores_title_and_summary_matches_per_tier() {
		let hit = candidate(
			"1",
			"AORTIC DISSECTION after trauma",
			"A CT scan showed acute back pain origin.",
		);

		// critical title 5, high summary 2, medium summary 1, low summary 0.5.
		assert_eq!(relevance_score(&hit, &tiers()), 8.5);
		assert_eq!(relevance_score(&candidate("2", "Unrelated", "Nothing"), &tiers()), 0.0);
	}

	#[test]
	fn duplicate_ids_keep_highest_weight() {
		let merged = merge_and_score(
			vec![
				(query(PriorityTier::High), vec![candidate("12345", "CT scan", "")]),
				(query(PriorityTier::Combined), vec![candidate("12345", "CT scan", "")]),
			],
			&tiers(),
			10,
		);

		assert_eq!(merged.len(), 1);
		assert_eq!(merged[0].priority_weight, 3);
	}

	#[test]
	fn later_higher_weight_sighting_promotes_and_rescores() {
		let merged = merge_and_score(
			vec![
				(query(PriorityTier::Medium), vec![candidate("7", "Aortic dissection", "")]),
				(query(PriorityTier::Critical), vec![candidate("7", "ignored title", "")]),
			],
			&tiers(),
			10,
		);

		assert_eq!(merged.len(), 1);
		assert_eq!(merged[0].priority_weight, 5);
		assert_eq!(merged[0].title, "Aortic dissection");
		assert_eq!(merged[0].relevance_score, Some(5.0));
	}

	#[test]
	fn orders_by_weight_then_score_then_input_order() {
		let merged = merge_and_score(
			vec![
				(
					query(PriorityTier::High),
					vec![
						candidate("a", "plain", ""),
						candidate("b", "CT scan", ""),
						candidate("c", "plain", ""),
					],
				),
				(query(PriorityTier::Critical), vec![candidate("d", "plain", "")]),
			],
			&tiers(),
			10,
		);
		let ids = merged.iter().map(|candidate| candidate.id.as_str()).collect::<Vec<_>>();

		assert_eq!(ids, vec!["d", "b", "a", "c"]);
	}

	#[test]
	fn truncates_to_max_results() {
		let merged = merge_and_score(
			vec![(
				query(PriorityTier::Critical),
				(0..8).map(|idx| candidate(&idx.to_string(), "t", "s")).collect(),
			)],
			&tiers(),
			3,
		);

		assert_eq!(merged.len(), 3);
		assert_eq!(merged[0].id, "0");
	}

	#[test]
	fn no_queries_yield_no_candidates() {
		assert!(merge_and_score(Vec::new(), &tiers(), 10).is_empty());
	}
}
