/*
 * src/llm/mod.rs
 *
 * LLM gateway: routes typed prompt requests to a configured provider per
 * task kind and returns parsed, schema-validated responses.
 */

use serde::{Deserialize, Serialize};

pub mod config;
pub mod gateway;
pub mod mock;

pub use config::ProviderConfig;
pub use gateway::LlmGateway;
pub use mock::MockLLM;

/// What the prompt is for. Provider selection is configured per task kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmTaskKind {
	IntentClassification,
	ChangeSetGeneration,
	SkeletonPlanning,
	ActivityPopulation,
	MealPopulation,
	TransportPopulation,
}

impl LlmTaskKind {
	pub const ALL: [LlmTaskKind; 6] = [
		LlmTaskKind::IntentClassification,
		LlmTaskKind::ChangeSetGeneration,
		LlmTaskKind::SkeletonPlanning,
		LlmTaskKind::ActivityPopulation,
		LlmTaskKind::MealPopulation,
		LlmTaskKind::TransportPopulation,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			LlmTaskKind::IntentClassification => "intent_classification",
			LlmTaskKind::ChangeSetGeneration => "change_set_generation",
			LlmTaskKind::SkeletonPlanning => "skeleton_planning",
			LlmTaskKind::ActivityPopulation => "activity_population",
			LlmTaskKind::MealPopulation => "meal_population",
			LlmTaskKind::TransportPopulation => "transport_population",
		}
	}
}
