/*
 * src/agent/agents/populate.rs
 *
 * Phase A populators. One agent per node responsibility (activity, meal,
 * transport); each walks the skeleton day by day and asks the LLM to fill
 * in the placeholder nodes it owns, with the prompt spelling out the exact
 * node IDs it may touch. The patch comes back keyed by those IDs and runs
 * through the Change Engine, whose strict resolver rejects anything the
 * model invented.
 */

use async_trait::async_trait;
use chrono::NaiveTime;
use serde::Deserialize;
use serde_json::json;
use std::fmt::Write;
use tracing::{debug, warn};

use crate::agent::{Agent, AgentContext, AgentOutput, TaskKind};
use crate::error::{CoreError, CoreResult};
use crate::llm::LlmTaskKind;
use crate::models::changeset::{
	ChangeOp, ChangeSet, FieldPatch, NodePatch, Preferences, Scope,
};
use crate::models::hhmm;
use crate::models::itinerary::{Day, Itinerary, NodeLocation, NodeType};

use super::skeleton::SKELETON_PLANNER;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DayPopulation {
	updates: Vec<NodeUpdate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeUpdate {
	id: String,
	#[serde(default)]
	title: Option<String>,
	#[serde(default)]
	description: Option<String>,
	#[serde(default)]
	location_name: Option<String>,
	#[serde(default)]
	address: Option<String>,
	#[serde(default, with = "hhmm")]
	start_time: Option<NaiveTime>,
	#[serde(default, with = "hhmm")]
	end_time: Option<NaiveTime>,
	#[serde(default)]
	cost: Option<f64>,
	#[serde(default)]
	labels: Option<Vec<String>>,
}

/// A populator parameterized by the node type it is responsible for.
pub struct PopulatorAgent {
	name: &'static str,
	node_type: NodeType,
	task_kind: LlmTaskKind,
	priority: u8,
	guidance: &'static str,
}

impl PopulatorAgent {
	pub fn activity() -> Self {
		Self {
			name: "activity_agent",
			node_type: NodeType::Attraction,
			task_kind: LlmTaskKind::ActivityPopulation,
			priority: 20,
			guidance: "Pick real sights and activities that fit the day's area and the trip themes. \
				Prefer well-known places a traveler can actually visit.",
		}
	}

	pub fn meal() -> Self {
		Self {
			name: "meal_agent",
			node_type: NodeType::Meal,
			task_kind: LlmTaskKind::MealPopulation,
			priority: 21,
			guidance: "Pick concrete restaurants or food markets near the day's other stops. \
				Vary cuisine across the trip and respect the meal's time of day.",
		}
	}

	pub fn transport() -> Self {
		Self {
			name: "transport_agent",
			node_type: NodeType::Transport,
			task_kind: LlmTaskKind::TransportPopulation,
			priority: 22,
			guidance: "Describe the practical leg: mode, departure point, and arrival point. \
				Use local transit where sensible and keep durations realistic.",
		}
	}

	fn build_prompt(&self, itinerary: &Itinerary, day: &Day, ids: &[String]) -> String {
		let mut listing = String::new();
		for node in day.nodes.iter().filter(|n| n.node_type == self.node_type) {
			let window = match (node.start_time, node.end_time) {
				(Some(s), Some(e)) => format!(" [{}-{}]", s.format("%H:%M"), e.format("%H:%M")),
				_ => String::new(),
			};
			_ = writeln!(listing, "  {}: {}{}", node.id, node.title, window);
		}
		format!(
			r#"You are filling in placeholder stops for one day of a trip to {destination}.

Day {day} ({date}), area: {area}
Placeholders you may populate (these are the ONLY valid IDs):
{listing}
{guidance}

Return ONLY a valid JSON object with this exact shape:
{{
  "updates": [
    {{
      "id": "{example_id}",
      "title": "concrete name of the place",
      "description": "one useful sentence for the traveler",
      "locationName": "place name",
      "address": "street address if known",
      "startTime": "HH:MM",
      "endTime": "HH:MM",
      "cost": 0,
      "labels": ["tag"]
    }}
  ]
}}

Rules:
- Use ONLY the IDs listed above, exactly as written. Do not invent IDs.
- Keep each stop inside its existing time window when one is shown.
- Omit fields you have nothing for; do not write placeholders.
- Return ONLY the JSON object, no other text."#,
			destination = itinerary.destination,
			day = day.day_number,
			date = day.date,
			area = super::day_area(itinerary, day),
			listing = listing,
			guidance = self.guidance,
			example_id = ids.first().map(String::as_str).unwrap_or("day1_node1"),
		)
	}
}

#[async_trait]
impl Agent for PopulatorAgent {
	fn name(&self) -> String {
		self.name.to_string()
	}

	fn supported_tasks(&self) -> Vec<TaskKind> {
		vec![TaskKind::Generate]
	}

	fn priority(&self) -> u8 {
		self.priority
	}

	fn depends_on(&self) -> Vec<String> {
		vec![SKELETON_PLANNER.to_string()]
	}

	async fn execute(&self, ctx: &AgentContext, itinerary: &Itinerary) -> CoreResult<AgentOutput> {
		let mut ops = Vec::new();
		let mut populated = 0usize;

		for day in &itinerary.days {
			if ctx.cancel.is_cancelled() {
				return Err(CoreError::Cancelled);
			}

			let ids: Vec<String> = day
				.nodes
				.iter()
				.filter(|n| n.node_type == self.node_type)
				.map(|n| n.id.clone())
				.collect();
			if ids.is_empty() {
				continue;
			}

			let prompt = self.build_prompt(itinerary, day, &ids);
			let population: DayPopulation = ctx
				.llm
				.invoke_json(self.task_kind, &prompt, ctx.deadline)
				.await?;

			for update in population.updates {
				if !ids.contains(&update.id) {
					// Strict resolution happens in the engine; flag it here
					// too so prompt regressions show up in the logs.
					warn!(
						target: "orchestrator_pipeline",
						agent = self.name,
						id = %update.id,
						day = day.day_number,
						"LLM referenced an ID outside its allowed set"
					);
				}

				let location = update.location_name.as_ref().map(|name| NodeLocation {
					name: name.clone(),
					address: update.address.clone(),
					..NodeLocation::default()
				});
				let patch = NodePatch {
					title: update.title.clone(),
					location,
					start_time: update.start_time,
					end_time: update.end_time,
					cost: update.cost,
					..NodePatch::default()
				};
				if !patch.is_empty() {
					ops.push(ChangeOp::Replace {
						id: update.id.clone(),
						node: patch,
					});
				}

				let mut fields = FieldPatch::default();
				if let Some(labels) = update.labels {
					fields.add_labels = labels;
				}
				if let Some(description) = update.description {
					fields.add_tips = vec![description];
				}
				if fields != FieldPatch::default() {
					ops.push(ChangeOp::Update {
						id: update.id,
						fields,
					});
				}
				populated += 1;
			}
		}

		debug!(
			target: "orchestrator_pipeline",
			agent = self.name,
			itinerary_id = %ctx.itinerary_id,
			populated,
			ops = ops.len(),
			"Built population patch"
		);

		if ops.is_empty() {
			return Ok(AgentOutput::empty());
		}

		let changes = ChangeSet {
			scope: Scope::Trip,
			day: None,
			preferences: Preferences {
				user_first: true,
				respect_locks: true,
				preserve_timing: false,
			},
			ops,
			updated_by: self.name.to_string(),
		};

		let mut output = AgentOutput::with_changes(changes);
		output.data = Some(json!({ "populated": populated }));
		Ok(output)
	}
}
