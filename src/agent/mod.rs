/*
 * src/agent/mod.rs
 *
 * The agent abstraction: a named unit of work that reads an itinerary
 * snapshot and produces a partial patch (a ChangeSet), usually via an LLM
 * call. Dispatch is table-driven through the registry; there are no
 * inheritance hierarchies.
 */

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use crate::error::CoreResult;
use crate::llm::LlmGateway;
use crate::models::changeset::ChangeSet;
use crate::models::chat::ChatTurn;
use crate::models::itinerary::Itinerary;
use crate::places::PlacesClient;

pub mod agents;
pub mod orchestrator;
pub mod registry;

pub use orchestrator::{Orchestrator, OrchestratorResult};
pub use registry::AgentRegistry;

/// Orchestrator-level task tags. Each agent declares which of these it
/// supports; the registry maps a tag to its ordered set of agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
	/// Initial generation: skeleton, populate, enrich.
	Generate,
	/// Chat-driven edit: classify intent, generate and apply a ChangeSet.
	Edit,
	/// Re-run enrichment on an existing document.
	Enrich,
}

impl TaskKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			TaskKind::Generate => "generate",
			TaskKind::Edit => "edit",
			TaskKind::Enrich => "enrich",
		}
	}
}

/// Cooperative cancellation signal carried by every orchestration. Clones
/// share the underlying flag.
#[derive(Clone)]
pub struct CancelToken {
	rx: watch::Receiver<bool>,
}

/// The setter half; dropping it does not cancel.
pub struct CancelHandle {
	tx: watch::Sender<bool>,
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
	let (tx, rx) = watch::channel(false);
	(CancelHandle { tx }, CancelToken { rx })
}

impl CancelHandle {
	pub fn cancel(&self) {
		_ = self.tx.send(true);
	}
}

impl CancelToken {
	pub fn is_cancelled(&self) -> bool {
		*self.rx.borrow()
	}

	/// Resolves when cancellation is requested.
	pub async fn cancelled(&self) {
		let mut rx = self.rx.clone();
		while !*rx.borrow() {
			if rx.changed().await.is_err() {
				// Handle dropped without cancelling; never resolve.
				std::future::pending::<()>().await;
			}
		}
	}
}

/// Everything an agent gets to work with besides the document snapshot.
pub struct AgentContext {
	pub itinerary_id: String,
	pub task: TaskKind,
	/// Task payload (e.g. the chat message for an edit).
	pub payload: Value,
	pub llm: Arc<LlmGateway>,
	pub places: Option<Arc<dyn PlacesClient>>,
	pub cancel: CancelToken,
	/// Remaining budget for this agent's LLM calls.
	pub deadline: Option<Duration>,
}

/// What one agent hands back to the orchestrator.
#[derive(Default)]
pub struct AgentOutput {
	/// Patch to run through the Change Engine, if any.
	pub changes: Option<ChangeSet>,
	/// Dry-run the patch instead of applying it.
	pub propose: bool,
	/// Opaque payload for the document's `agentData` map.
	pub data: Option<Value>,
	/// Trip-level summary text to write onto the document.
	pub summary: Option<String>,
	/// Assistant-facing turns to surface to the caller.
	pub messages: Vec<ChatTurn>,
}

impl AgentOutput {
	pub fn empty() -> Self {
		Self::default()
	}

	pub fn with_changes(changes: ChangeSet) -> Self {
		Self {
			changes: Some(changes),
			..Self::default()
		}
	}
}

/// A pipeline or editing agent. Metadata drives planning: `priority` orders
/// agents within a phase (lower first), `depends_on` builds the DAG, and
/// `required` decides whether a failure aborts the whole plan.
#[async_trait]
pub trait Agent: Send + Sync {
	fn name(&self) -> String;

	/// Display kind for progress events; defaults to the name.
	fn kind(&self) -> String {
		self.name()
	}

	fn supported_tasks(&self) -> Vec<TaskKind>;

	fn priority(&self) -> u8 {
		50
	}

	fn enabled(&self) -> bool {
		true
	}

	fn depends_on(&self) -> Vec<String> {
		Vec::new()
	}

	fn required(&self) -> bool {
		false
	}

	/// Produces a partial patch from a read-only snapshot. The orchestrator
	/// owns serialization and commits.
	async fn execute(&self, ctx: &AgentContext, itinerary: &Itinerary) -> CoreResult<AgentOutput>;
}
