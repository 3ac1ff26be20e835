/*
 * src/agent/agents/editor.rs
 *
 * The editing agent for chat-driven changes. Builds ID-exposing context
 * with the summarizer, asks the main model for a ChangeSet whose operations
 * reference existing node IDs, and hands the result to the orchestrator to
 * apply (or propose, for a dry run).
 *
 * Correctness rests on three coupled contracts: canonical stable IDs, a
 * summarizer that shows them to the model verbatim, and the engine's strict
 * resolver that never invents a target.
 */

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::agent::{Agent, AgentContext, AgentOutput, TaskKind};
use crate::error::CoreResult;
use crate::models::changeset::{ChangeSet, USER_ACTOR};
use crate::models::chat::ChatTurn;
use crate::models::itinerary::Itinerary;
use crate::llm::LlmTaskKind;
use crate::summary;

use super::intent::{INTENT_CLASSIFIER, UserIntent};

pub const EDITOR_AGENT: &str = "editor_agent";

pub struct EditorAgent;

impl EditorAgent {
	pub fn new() -> Self {
		Self
	}

	fn build_prompt(message: &str, itinerary: &Itinerary, intent: Option<&UserIntent>) -> String {
		let context = summary::summarize(itinerary);
		let intent_line = match intent {
			Some(intent) => format!(
				"Classified intent: {}\n",
				serde_json::to_string(intent).unwrap_or_default()
			),
			None => String::new(),
		};
		format!(
			r#"Turn a traveler's request into edit operations on their itinerary.

Itinerary:
{context}

{intent_line}User request: {message}

Return ONLY a valid JSON object with this exact shape:
{{
  "scope": "day" or "trip",
  "day": number or null,
  "preferences": {{ "userFirst": true, "respectLocks": true, "preserveTiming": true }},
  "ops": [
    {{ "op": "insert", "after": "day2_node1" or null, "day": 2, "node": {{ "type": "attraction", "title": "...", "startTime": "13:30", "endTime": "15:30" }} }},
    {{ "op": "replace", "id": "day2_node2", "node": {{ "startTime": "10:00" }} }},
    {{ "op": "delete", "id": "day2_node3" }},
    {{ "op": "move", "id": "day1_node2", "toDay": 3, "position": 0 }},
    {{ "op": "update", "id": "day3_node1", "fields": {{ "addLabels": ["tag"] }} }}
  ]
}}

Rules:
- Every "id" and "after" value MUST be one of the node IDs shown in the
  itinerary above, copied exactly. Never invent or guess an ID.
- Use the smallest set of operations that satisfies the request.
- If the request asks for nothing actionable, return an empty "ops" array.
- Return ONLY the JSON object, no other text."#,
		)
	}
}

impl Default for EditorAgent {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Agent for EditorAgent {
	fn name(&self) -> String {
		EDITOR_AGENT.to_string()
	}

	fn supported_tasks(&self) -> Vec<TaskKind> {
		vec![TaskKind::Edit]
	}

	fn priority(&self) -> u8 {
		20
	}

	fn depends_on(&self) -> Vec<String> {
		vec![INTENT_CLASSIFIER.to_string()]
	}

	// A chat edit with no editor is a no-op; fail the plan loudly instead.
	fn required(&self) -> bool {
		true
	}

	async fn execute(&self, ctx: &AgentContext, itinerary: &Itinerary) -> CoreResult<AgentOutput> {
		let message = ctx.payload["message"].as_str().unwrap_or_default();
		let propose = ctx.payload["propose"].as_bool().unwrap_or(false);

		// The classifier persisted its result into agentData one level ago.
		let intent: Option<UserIntent> = itinerary
			.agent_data
			.get(INTENT_CLASSIFIER)
			.and_then(|v| serde_json::from_value(v.clone()).ok());

		let prompt = Self::build_prompt(message, itinerary, intent.as_ref());
		let mut changes: ChangeSet = ctx
			.llm
			.invoke_json(LlmTaskKind::ChangeSetGeneration, &prompt, ctx.deadline)
			.await?;

		// Chat edits are user-authored regardless of what the model claims.
		changes.updated_by = USER_ACTOR.to_string();

		info!(
			target: "orchestrator_pipeline",
			agent = EDITOR_AGENT,
			itinerary_id = %ctx.itinerary_id,
			ops = changes.ops.len(),
			propose,
			"Generated change set"
		);

		if changes.ops.is_empty() {
			let mut output = AgentOutput::empty();
			output.messages = vec![ChatTurn::assistant(
				"I didn't find anything to change for that request.",
			)];
			return Ok(output);
		}

		let ack = if propose {
			"Here is what I would change; nothing has been applied yet."
		} else {
			"I've updated your itinerary."
		};

		let mut output = AgentOutput::with_changes(changes);
		output.propose = propose;
		output.messages = vec![ChatTurn::assistant(ack)];
		output.data = Some(json!({ "propose": propose }));
		Ok(output)
	}
}
