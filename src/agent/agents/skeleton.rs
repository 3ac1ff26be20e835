/*
 * src/agent/agents/skeleton.rs
 *
 * The skeleton planner: produces the day scaffold for a fresh itinerary as
 * placeholder nodes with a type and a rough time window. The IDs the
 * resulting inserts receive (day{N}_node{1..k}, since every day starts
 * empty) are the contract every downstream agent must honor.
 */

use async_trait::async_trait;
use chrono::NaiveTime;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::agent::{Agent, AgentContext, AgentOutput, TaskKind};
use crate::error::CoreResult;
use crate::ids;
use crate::llm::LlmTaskKind;
use crate::models::changeset::{ChangeOp, ChangeSet, NodeDraft, Preferences, Scope};
use crate::models::hhmm;
use crate::models::itinerary::{Itinerary, NodeType};

pub const SKELETON_PLANNER: &str = "skeleton_planner";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkeletonPlan {
	#[serde(default)]
	summary: Option<String>,
	days: Vec<SkeletonDay>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkeletonDay {
	day: u32,
	#[serde(default)]
	location: Option<String>,
	nodes: Vec<SkeletonNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkeletonNode {
	#[serde(rename = "type")]
	node_type: NodeType,
	title: String,
	#[serde(default, with = "hhmm")]
	start_time: Option<NaiveTime>,
	#[serde(default, with = "hhmm")]
	end_time: Option<NaiveTime>,
}

pub struct SkeletonPlanner;

impl SkeletonPlanner {
	pub fn new() -> Self {
		Self
	}

	fn build_prompt(itinerary: &Itinerary) -> String {
		let themes = if itinerary.themes.is_empty() {
			"none given".to_string()
		} else {
			itinerary.themes.join(", ")
		};
		format!(
			r#"Plan the daily scaffold for a trip.

Destination: {destination}
Dates: {start} to {end} ({days} days)
Themes: {themes}

For every day from 1 to {days}, propose 3 to 6 placeholder stops in visit
order. Each stop gets a type, a short working title, and a rough time
window. Use type "attraction" for sights and activities, "meal" for
breakfast/lunch/dinner, "transport" for transfers between areas, "hotel"
for check-in/check-out, and "freetime" for unscheduled slack.

Return ONLY a valid JSON object with this exact shape:
{{
  "summary": "one-sentence trip summary",
  "days": [
    {{
      "day": 1,
      "location": "area or neighborhood for the day",
      "nodes": [
        {{ "type": "meal", "title": "Breakfast near the hotel", "startTime": "08:30", "endTime": "09:30" }}
      ]
    }}
  ]
}}

Rules:
- Include every day exactly once, in order, with day numbers 1 to {days}.
- Times are 24h "HH:MM" and must not overlap within a day.
- Return ONLY the JSON object, no other text."#,
			destination = itinerary.destination,
			start = itinerary.start_date,
			end = itinerary.end_date,
			days = itinerary.day_count(),
			themes = themes,
		)
	}
}

impl Default for SkeletonPlanner {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Agent for SkeletonPlanner {
	fn name(&self) -> String {
		SKELETON_PLANNER.to_string()
	}

	fn supported_tasks(&self) -> Vec<TaskKind> {
		vec![TaskKind::Generate]
	}

	fn priority(&self) -> u8 {
		10
	}

	// Without the scaffold there is nothing for the rest of the plan to do.
	fn required(&self) -> bool {
		true
	}

	async fn execute(&self, ctx: &AgentContext, itinerary: &Itinerary) -> CoreResult<AgentOutput> {
		let prompt = Self::build_prompt(itinerary);
		let plan: SkeletonPlan = ctx
			.llm
			.invoke_json(LlmTaskKind::SkeletonPlanning, &prompt, ctx.deadline)
			.await?;

		let mut ops = Vec::new();
		let mut assigned = serde_json::Map::new();
		let mut day_locations = serde_json::Map::new();
		let mut days = plan.days;
		days.sort_by_key(|d| d.day);

		for day in &days {
			if let Some(location) = &day.location {
				day_locations.insert(day.day.to_string(), json!(location));
			}
			// Every day starts empty, so inserts land as day{N}_node{1..k}.
			// Record that contract for downstream agents.
			let ids: Vec<String> = (1..=day.nodes.len() as u32)
				.map(|seq| ids::format_id(day.day, seq))
				.collect();
			assigned.insert(format!("day{}", day.day), json!(ids));

			for node in &day.nodes {
				ops.push(ChangeOp::Insert {
					after: None,
					day: Some(day.day),
					node: NodeDraft {
						node_type: node.node_type,
						title: node.title.clone(),
						start_time: node.start_time,
						end_time: node.end_time,
						..NodeDraft::default()
					},
				});
			}
		}

		info!(
			target: "orchestrator_pipeline",
			agent = SKELETON_PLANNER,
			itinerary_id = %ctx.itinerary_id,
			days = days.len(),
			nodes = ops.len(),
			"Planned skeleton"
		);
		debug!(
			target: "orchestrator_pipeline",
			agent = SKELETON_PLANNER,
			assigned = %serde_json::to_string(&assigned).unwrap_or_default(),
			"Assigned node IDs"
		);

		let changes = ChangeSet {
			scope: Scope::Trip,
			day: None,
			preferences: Preferences::default(),
			ops,
			updated_by: SKELETON_PLANNER.to_string(),
		};

		let mut output = AgentOutput::with_changes(changes);
		output.summary = plan.summary;
		output.data = Some(json!({
			"assignedIds": assigned,
			"dayLocations": day_locations,
		}));
		Ok(output)
	}
}
