/*
 * src/agent/agents/enrichment.rs
 *
 * Phase B: resolves node locations against the external places service and
 * fills in coordinates, place IDs, websites, and opening hours. Fields it
 * writes carry agent provenance via `updatedBy`.
 */

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::agent::{Agent, AgentContext, AgentOutput, TaskKind};
use crate::error::{CoreError, CoreResult};
use crate::models::changeset::{ChangeOp, ChangeSet, FieldPatch, NodePatch, Preferences, Scope};
use crate::models::itinerary::{Itinerary, NodeLocation, NodeType};

pub const ENRICHMENT_AGENT: &str = "enrichment_agent";

pub struct EnrichmentAgent;

impl EnrichmentAgent {
	pub fn new() -> Self {
		Self
	}
}

impl Default for EnrichmentAgent {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Agent for EnrichmentAgent {
	fn name(&self) -> String {
		ENRICHMENT_AGENT.to_string()
	}

	fn supported_tasks(&self) -> Vec<TaskKind> {
		vec![TaskKind::Generate, TaskKind::Enrich]
	}

	fn priority(&self) -> u8 {
		30
	}

	fn depends_on(&self) -> Vec<String> {
		vec![
			"activity_agent".to_string(),
			"meal_agent".to_string(),
			"transport_agent".to_string(),
		]
	}

	async fn execute(&self, ctx: &AgentContext, itinerary: &Itinerary) -> CoreResult<AgentOutput> {
		let Some(places) = &ctx.places else {
			debug!(
				target: "orchestrator_pipeline",
				agent = ENRICHMENT_AGENT,
				"No places client configured; skipping enrichment"
			);
			return Ok(AgentOutput::empty());
		};

		let mut ops = Vec::new();
		let mut enriched = 0usize;
		let mut misses = 0usize;

		for day in &itinerary.days {
			let area = super::day_area(itinerary, day);
			for node in &day.nodes {
				if ctx.cancel.is_cancelled() {
					return Err(CoreError::Cancelled);
				}
				// Transit legs and free time have nothing to look up, and a
				// node that already carries a place ID is done.
				if matches!(node.node_type, NodeType::Transport | NodeType::Freetime) {
					continue;
				}
				if node
					.location
					.as_ref()
					.is_some_and(|loc| loc.place_id.is_some())
				{
					continue;
				}

				let query = match &node.location {
					Some(loc) if !loc.name.is_empty() => format!("{}, {}", loc.name, area),
					_ => format!("{}, {}", node.title, area),
				};
				let found = match places.find_place(&query, None).await {
					Ok(found) => found,
					Err(e) => {
						debug!(
							target: "orchestrator_pipeline",
							agent = ENRICHMENT_AGENT,
							node = %node.id,
							error = %e,
							"Place lookup failed; leaving node as-is"
						);
						misses += 1;
						continue;
					}
				};
				let Some(place) = found else {
					misses += 1;
					continue;
				};

				ops.push(ChangeOp::Replace {
					id: node.id.clone(),
					node: NodePatch {
						location: Some(NodeLocation {
							name: place.name.clone(),
							address: place.address.clone(),
							coordinates: place.coordinates,
							place_id: Some(place.place_id.clone()),
						}),
						..NodePatch::default()
					},
				});

				let mut fields = FieldPatch::default();
				if let Some(website) = &place.website {
					fields.add_links = vec![website.clone()];
				}
				if !place.opening_hours.is_empty() {
					fields.add_tips = place.opening_hours.clone();
				}
				if let Some(rating) = place.rating {
					fields.add_labels = vec![format!("rated {rating:.1}")];
				}
				if fields != FieldPatch::default() {
					ops.push(ChangeOp::Update {
						id: node.id.clone(),
						fields,
					});
				}
				enriched += 1;
			}
		}

		info!(
			target: "orchestrator_pipeline",
			agent = ENRICHMENT_AGENT,
			itinerary_id = %ctx.itinerary_id,
			enriched,
			misses,
			"Finished place lookups"
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
			updated_by: ENRICHMENT_AGENT.to_string(),
		};

		let mut output = AgentOutput::with_changes(changes);
		output.data = Some(json!({ "enriched": enriched, "misses": misses }));
		Ok(output)
	}
}
