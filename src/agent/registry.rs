/*
 * src/agent/registry.rs
 *
 * Process-wide agent registry: declarative mapping from task tag to the
 * ordered set of agents that handle it, plus the topological execution
 * plan the orchestrator runs.
 *
 * This is the only process-wide mutable structure in the core; every
 * mutation goes through this guarded API so tests can swap agents
 * deterministically.
 */

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::agent::{Agent, TaskKind};
use crate::error::{CoreError, CoreResult};

struct Registration {
	agent: Arc<dyn Agent>,
	enabled: bool,
}

#[derive(Default)]
pub struct AgentRegistry {
	// read-mostly; writes only on registration and runtime toggles
	inner: RwLock<Vec<Registration>>,
}

impl AgentRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers an agent. Rejected if another enabled agent already covers
	/// one of its task tags at the same priority.
	pub fn register(&self, agent: Arc<dyn Agent>) -> CoreResult<()> {
		let mut guard = self.inner.write().expect("registry lock");

		let tasks: HashSet<TaskKind> = agent.supported_tasks().into_iter().collect();
		for existing in guard.iter().filter(|r| r.enabled && r.agent.enabled()) {
			if existing.agent.priority() != agent.priority() {
				continue;
			}
			if let Some(overlap) = existing
				.agent
				.supported_tasks()
				.iter()
				.find(|t| tasks.contains(t))
			{
				return Err(CoreError::RegistryConflict(format!(
					"agent '{}' overlaps '{}' on task '{}' at priority {}",
					agent.name(),
					existing.agent.name(),
					overlap.as_str(),
					agent.priority()
				)));
			}
		}

		info!(
			target: "orchestrator_pipeline",
			agent = %agent.name(),
			priority = agent.priority(),
			"Registered agent"
		);
		guard.push(Registration { agent, enabled: true });
		Ok(())
	}

	/// Runtime enable/disable toggle. Returns false if no such agent.
	pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
		let mut guard = self.inner.write().expect("registry lock");
		match guard.iter_mut().find(|r| r.agent.name() == name) {
			Some(reg) => {
				reg.enabled = enabled;
				true
			}
			None => false,
		}
	}

	/// Enabled agents supporting `task`, ordered by (priority, name).
	pub fn agents_for(&self, task: TaskKind) -> Vec<Arc<dyn Agent>> {
		let guard = self.inner.read().expect("registry lock");
		let mut selected: Vec<Arc<dyn Agent>> = guard
			.iter()
			.filter(|r| r.enabled && r.agent.enabled())
			.filter(|r| r.agent.supported_tasks().contains(&task))
			.map(|r| Arc::clone(&r.agent))
			.collect();
		selected.sort_by_key(|a| (a.priority(), a.name()));
		selected
	}

	/// Topological execution plan for `task`: agents grouped into levels.
	/// Agents within a level run in parallel; levels run in order. A
	/// dependency on an agent outside the selection is treated as already
	/// satisfied; a cycle is a registry conflict.
	pub fn execution_plan(&self, task: TaskKind) -> CoreResult<Vec<Vec<Arc<dyn Agent>>>> {
		let selected = self.agents_for(task);
		let names: HashSet<String> = selected.iter().map(|a| a.name()).collect();

		let mut remaining: HashMap<String, Arc<dyn Agent>> =
			selected.into_iter().map(|a| (a.name(), a)).collect();
		let mut placed: HashSet<String> = HashSet::new();
		let mut levels: Vec<Vec<Arc<dyn Agent>>> = Vec::new();

		while !remaining.is_empty() {
			let mut level: Vec<Arc<dyn Agent>> = remaining
				.values()
				.filter(|a| {
					a.depends_on()
						.iter()
						.all(|dep| placed.contains(dep) || !names.contains(dep))
				})
				.map(Arc::clone)
				.collect();

			if level.is_empty() {
				let stuck: Vec<String> = remaining.keys().cloned().collect();
				return Err(CoreError::RegistryConflict(format!(
					"dependency cycle among agents: {}",
					stuck.join(", ")
				)));
			}

			level.sort_by_key(|a| (a.priority(), a.name()));
			for agent in &level {
				placed.insert(agent.name());
				remaining.remove(&agent.name());
			}
			levels.push(level);
		}

		Ok(levels)
	}
}
