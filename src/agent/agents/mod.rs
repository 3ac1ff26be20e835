/*
 * src/agent/agents/mod.rs
 *
 * The canonical pipeline and editing agents, plus the default registration
 * that wires them into a registry.
 */

use std::sync::Arc;

use crate::agent::AgentRegistry;
use crate::error::CoreResult;

pub mod editor;
pub mod enrichment;
pub mod intent;
pub mod populate;
pub mod skeleton;

pub use editor::EditorAgent;
pub use enrichment::EnrichmentAgent;
pub use intent::{IntentAction, IntentClassifier, UserIntent};
pub use populate::PopulatorAgent;
pub use skeleton::SkeletonPlanner;

use crate::models::itinerary::{Day, Itinerary};

/// The area a day's stops cluster around: the day's own location when set,
/// else the area the skeleton planner recorded in agentData, else the trip
/// destination.
pub(crate) fn day_area<'a>(itinerary: &'a Itinerary, day: &'a Day) -> &'a str {
	if let Some(location) = day.location.as_deref() {
		return location;
	}
	itinerary
		.agent_data
		.get(skeleton::SKELETON_PLANNER)
		.and_then(|data| data.get("dayLocations"))
		.and_then(|locations| locations.get(day.day_number.to_string()))
		.and_then(|v| v.as_str())
		.unwrap_or(&itinerary.destination)
}

/// Registers the canonical pipelines:
///
/// Initial generation: skeleton planner, then the activity/meal/transport
/// populators in parallel (Phase A), then enrichment (Phase B).
/// Chat edit: intent classifier, then the editor.
pub fn register_default_agents(registry: &AgentRegistry) -> CoreResult<()> {
	registry.register(Arc::new(SkeletonPlanner::new()))?;
	registry.register(Arc::new(PopulatorAgent::activity()))?;
	registry.register(Arc::new(PopulatorAgent::meal()))?;
	registry.register(Arc::new(PopulatorAgent::transport()))?;
	registry.register(Arc::new(EnrichmentAgent::new()))?;
	registry.register(Arc::new(IntentClassifier::new()))?;
	registry.register(Arc::new(EditorAgent::new()))?;
	Ok(())
}
