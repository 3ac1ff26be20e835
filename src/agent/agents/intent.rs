/*
 * src/agent/agents/intent.rs
 *
 * Intent classifier for chat-driven edits. A small, fast model turns the
 * user's utterance into a structured intent (operation kind, target day,
 * referenced nodes) that is persisted into agentData for the editor.
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agent::{Agent, AgentContext, AgentOutput, TaskKind};
use crate::error::CoreResult;
use crate::llm::LlmTaskKind;
use crate::models::itinerary::Itinerary;
use crate::summary;

pub const INTENT_CLASSIFIER: &str = "intent_classifier";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentAction {
	AddNode,
	RemoveNode,
	ModifyNode,
	MoveNode,
	Query,
	Other,
}

/// What the classifier extracts from one utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIntent {
	pub action: IntentAction,
	#[serde(default)]
	pub day: Option<u32>,
	/// Node IDs the user appears to reference, copied verbatim.
	#[serde(default)]
	pub node_ids: Vec<String>,
	#[serde(default)]
	pub details: Option<String>,
}

pub struct IntentClassifier;

impl IntentClassifier {
	pub fn new() -> Self {
		Self
	}

	fn build_prompt(message: &str, itinerary: &Itinerary) -> String {
		let context = summary::summarize(itinerary);
		format!(
			r#"Classify a traveler's edit request against their itinerary.

Itinerary:
{context}

User message: {message}

Extract the following and return ONLY a valid JSON object with these fields:
{{
  "action": "add_node" | "remove_node" | "modify_node" | "move_node" | "query" | "other",
  "day": number or null (the day the request targets, if any),
  "nodeIds": [array of node IDs from the itinerary above that the request refers to],
  "details": string or null (what specifically should change, in your words)
}}

Rules:
- "nodeIds" may ONLY contain IDs that appear in the itinerary above.
- Questions about the plan with no change requested are "query".
- Return ONLY the JSON object, no other text."#,
		)
	}
}

impl Default for IntentClassifier {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Agent for IntentClassifier {
	fn name(&self) -> String {
		INTENT_CLASSIFIER.to_string()
	}

	fn supported_tasks(&self) -> Vec<TaskKind> {
		vec![TaskKind::Edit]
	}

	fn priority(&self) -> u8 {
		10
	}

	async fn execute(&self, ctx: &AgentContext, itinerary: &Itinerary) -> CoreResult<AgentOutput> {
		let message = ctx.payload["message"].as_str().unwrap_or_default();
		let prompt = Self::build_prompt(message, itinerary);

		let intent: UserIntent = ctx
			.llm
			.invoke_json(LlmTaskKind::IntentClassification, &prompt, ctx.deadline)
			.await?;

		info!(
			target: "orchestrator_pipeline",
			agent = INTENT_CLASSIFIER,
			itinerary_id = %ctx.itinerary_id,
			action = ?intent.action,
			day = ?intent.day,
			node_refs = intent.node_ids.len(),
			"Classified intent"
		);

		let mut output = AgentOutput::empty();
		output.data = Some(serde_json::to_value(&intent).unwrap_or_default());
		Ok(output)
	}
}
