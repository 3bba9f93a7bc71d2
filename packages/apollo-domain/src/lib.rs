pub mod candidate;
pub mod query;
pub mod record;
pub mod terms;
pub mod time_serde;

pub use candidate::{Candidate, SearchSource, truncate_summary};
pub use query::{PriorityTier, WeightedQuery, build_queries};
pub use record::{
	ClassificationResult, DiagnosisTest, MedicalHistory, StructuredClinicalRecord, Symptom,
	Treatment,
};
pub use terms::{PriorityTermSet, TermTier, extract_tiers};
