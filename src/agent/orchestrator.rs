/*
 * src/agent/orchestrator.rs
 *
 * Executes an agent plan for one itinerary: classify -> fan-out -> fan-in
 * -> commit. Agents within a topological level run concurrently; their
 * patches are serialized into the document through the Change Engine under
 * a per-itinerary mutex, with bounded retries on version conflicts.
 * Lifecycle events stream to the bus at every agent transition.
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::agent::{
	Agent, AgentContext, AgentOutput, AgentRegistry, CancelToken, TaskKind, cancel_pair,
};
use crate::bus::{AgentStatus, EventBus, ProgressEvent};
use crate::engine::{ApplyReport, ChangeEngine};
use crate::error::{CoreError, CoreResult};
use crate::global::{AGENT_TIMEOUT_MS, MAX_VERSION_RETRIES, ORCHESTRATION_TIMEOUT_MS};
use crate::llm::LlmGateway;
use crate::migration;
use crate::models::changeset::{ChangeSet, Diff, OpOutcome, OpStatus};
use crate::models::chat::{ChatRequest, ChatResponse, ChatTurn, RunStatus};
use crate::models::itinerary::ItineraryStatus;
use crate::places::PlacesClient;
use crate::store::DocumentStore;

/// Result of one orchestration run.
#[derive(Debug)]
pub struct OrchestratorResult {
	/// Latest committed version at the end of the run.
	pub version: u64,
	pub status: RunStatus,
	/// The last ChangeSet an agent produced (applied or proposed).
	pub change_set: Option<ChangeSet>,
	pub diff: Option<Diff>,
	pub op_statuses: Vec<OpStatus>,
	pub messages: Vec<ChatTurn>,
}

pub struct Orchestrator {
	registry: Arc<AgentRegistry>,
	store: Arc<dyn DocumentStore>,
	engine: Arc<ChangeEngine>,
	bus: Arc<EventBus>,
	llm: Arc<LlmGateway>,
	places: Option<Arc<dyn PlacesClient>>,
	// per-itinerary mutation serialization
	locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Orchestrator {
	pub fn new(
		registry: Arc<AgentRegistry>,
		store: Arc<dyn DocumentStore>,
		bus: Arc<EventBus>,
		llm: Arc<LlmGateway>,
	) -> Self {
		Self {
			registry,
			engine: Arc::new(ChangeEngine::new(Arc::clone(&store))),
			store,
			bus,
			llm,
			places: None,
			locks: Mutex::new(HashMap::new()),
		}
	}

	pub fn with_places(mut self, places: Arc<dyn PlacesClient>) -> Self {
		self.places = Some(places);
		self
	}

	pub fn engine(&self) -> &Arc<ChangeEngine> {
		&self.engine
	}

	/// Runs the agent plan for `task` with the default deadline.
	pub async fn execute(
		&self,
		itinerary_id: &str,
		task: TaskKind,
		payload: Value,
		deadline: Option<Duration>,
	) -> CoreResult<OrchestratorResult> {
		let (_handle, token) = cancel_pair();
		self.execute_with(itinerary_id, task, payload, deadline, token).await
	}

	/// Runs the agent plan with an externally held cancellation token.
	///
	/// Deadline exhaustion cancels in-flight agents and returns a `Partial`
	/// result carrying the latest committed version. External cancellation
	/// is terminal: a single `failed` event with reason `cancelled` goes to
	/// the bus and the call returns `Cancelled`.
	pub async fn execute_with(
		&self,
		itinerary_id: &str,
		task: TaskKind,
		payload: Value,
		deadline: Option<Duration>,
		cancel: CancelToken,
	) -> CoreResult<OrchestratorResult> {
		let deadline = deadline.unwrap_or(Duration::from_millis(ORCHESTRATION_TIMEOUT_MS));
		let run = self.run_plan(itinerary_id, task, payload, cancel.clone());

		match tokio::time::timeout(deadline, run).await {
			Ok(result) => result,
			Err(_) => {
				// In-flight agents were dropped with the run future.
				warn!(
					target: "orchestrator_pipeline",
					itinerary_id,
					task = task.as_str(),
					deadline_ms = deadline.as_millis() as u64,
					"Deadline exhausted; returning partial result"
				);
				self.bus.publish(
					ProgressEvent::new(itinerary_id, "orchestrator", "orchestrator", AgentStatus::Failed)
						.with_message("deadline exceeded"),
				);
				let version = self
					.store
					.get(itinerary_id)
					.await
					.map(|doc| doc.version)
					.unwrap_or(0);
				Ok(OrchestratorResult {
					version,
					status: RunStatus::Partial,
					change_set: None,
					diff: None,
					op_statuses: Vec::new(),
					messages: Vec::new(),
				})
			}
		}
	}

	/// Chat entry point: routes the utterance through the Edit pipeline.
	pub async fn chat(&self, request: ChatRequest) -> CoreResult<ChatResponse> {
		let payload = json!({
			"message": request.message,
			"userId": request.user_id,
			"propose": request.propose,
		});
		let deadline = request.deadline_ms.map(Duration::from_millis);
		let result = self
			.execute(&request.itinerary_id, TaskKind::Edit, payload, deadline)
			.await?;
		Ok(ChatResponse {
			version: result.version,
			change_set: result.change_set,
			diff: result.diff,
			op_statuses: result.op_statuses,
			messages: result.messages,
			status: result.status,
		})
	}

	async fn run_plan(
		&self,
		itinerary_id: &str,
		task: TaskKind,
		payload: Value,
		cancel: CancelToken,
	) -> CoreResult<OrchestratorResult> {
		self.migrate_if_needed(itinerary_id).await?;

		if task == TaskKind::Generate {
			self.meta_with_retry(itinerary_id, Some(ItineraryStatus::Generating), None)
				.await?;
		}

		let plan = self.registry.execution_plan(task)?;
		let total: usize = plan.iter().map(|level| level.len()).sum();
		info!(
			target: "orchestrator_pipeline",
			itinerary_id,
			task = task.as_str(),
			levels = plan.len(),
			agents = total,
			"Executing agent plan"
		);

		let mut completed = 0usize;
		let mut change_set = None;
		let mut diff = None;
		let mut op_statuses = Vec::new();
		let mut messages = Vec::new();
		let mut any_failed = false;

		for level in plan {
			if cancel.is_cancelled() {
				return self.cancelled_exit(itinerary_id).await;
			}

			// Agents in a level fan out concurrently; their patches are
			// serialized into the document as they come back.
			let runs = level.iter().map(|agent| {
				self.run_agent(agent, itinerary_id, task, payload.clone(), cancel.clone(), completed, total)
			});
			let results = join_all(runs).await;

			if cancel.is_cancelled() {
				return self.cancelled_exit(itinerary_id).await;
			}

			for (agent, result) in level.iter().zip(results) {
				completed += 1;
				let progress = ((completed * 100) / total.max(1)) as u8;
				match result {
					Ok(output) => {
						let committed = self.commit_output(itinerary_id, agent.as_ref(), output).await?;
						if let Some(report) = committed.report {
							for status in &report.statuses {
								if let OpOutcome::Failed { error } = &status.outcome {
									messages.push(ChatTurn::assistant(error.to_string()));
								}
							}
							op_statuses = report.statuses;
							diff = Some(report.diff);
						}
						if committed.change_set.is_some() {
							change_set = committed.change_set;
						}
						messages.extend(committed.messages);
						self.bus.publish(
							ProgressEvent::new(
								itinerary_id,
								agent.name(),
								agent.kind(),
								AgentStatus::Succeeded,
							)
							.with_progress(progress),
						);
					}
					Err(e) if e.is_terminal() => {
						return self.cancelled_exit(itinerary_id).await;
					}
					Err(e) => {
						any_failed = true;
						warn!(
							target: "orchestrator_pipeline",
							itinerary_id,
							agent = %agent.name(),
							error = %e,
							"Agent failed"
						);
						self.bus.publish(
							ProgressEvent::new(
								itinerary_id,
								agent.name(),
								agent.kind(),
								AgentStatus::Failed,
							)
							.with_progress(progress)
							.with_message(e.to_string()),
						);
						if agent.required() {
							if task == TaskKind::Generate {
								_ = self
									.meta_with_retry(itinerary_id, Some(ItineraryStatus::Failed), None)
									.await;
							}
							return Err(CoreError::AgentFailed {
								agent: agent.name(),
								reason: e.to_string(),
							});
						}
					}
				}
			}
		}

		if task == TaskKind::Generate {
			self.meta_with_retry(itinerary_id, Some(ItineraryStatus::Ready), None)
				.await?;
		}

		let version = self.store.get(itinerary_id).await?.version;
		Ok(OrchestratorResult {
			version,
			status: if any_failed {
				RunStatus::Partial
			} else {
				RunStatus::Completed
			},
			change_set,
			diff,
			op_statuses,
			messages,
		})
	}

	async fn run_agent(
		&self,
		agent: &Arc<dyn Agent>,
		itinerary_id: &str,
		task: TaskKind,
		payload: Value,
		cancel: CancelToken,
		completed: usize,
		total: usize,
	) -> CoreResult<AgentOutput> {
		self.bus.publish(
			ProgressEvent::new(itinerary_id, agent.name(), agent.kind(), AgentStatus::Running)
				.with_progress(((completed * 100) / total.max(1)) as u8),
		);

		let ctx = AgentContext {
			itinerary_id: itinerary_id.to_string(),
			task,
			payload,
			llm: Arc::clone(&self.llm),
			places: self.places.clone(),
			cancel: cancel.clone(),
			deadline: Some(Duration::from_millis(AGENT_TIMEOUT_MS)),
		};
		let snapshot = self.store.get(itinerary_id).await?;

		debug!(
			target: "orchestrator_pipeline",
			itinerary_id,
			agent = %agent.name(),
			"Invoking agent"
		);

		tokio::select! {
			_ = cancel.cancelled() => Err(CoreError::Cancelled),
			result = tokio::time::timeout(
				Duration::from_millis(AGENT_TIMEOUT_MS),
				agent.execute(&ctx, &snapshot),
			) => match result {
				Ok(inner) => inner,
				Err(_) => Err(CoreError::AgentFailed {
					agent: agent.name(),
					reason: "agent deadline exceeded".to_string(),
				}),
			},
		}
	}

	async fn commit_output(
		&self,
		itinerary_id: &str,
		agent: &dyn Agent,
		output: AgentOutput,
	) -> CoreResult<CommittedOutput> {
		let mut committed = CommittedOutput {
			report: None,
			change_set: None,
			messages: output.messages,
		};

		if let Some(changes) = output.changes {
			let report = if output.propose {
				self.engine.propose(itinerary_id, &changes).await?
			} else {
				self.apply_with_retry(itinerary_id, &changes).await?
			};
			debug!(
				target: "orchestrator_pipeline",
				itinerary_id,
				agent = %agent.name(),
				ops = changes.ops.len(),
				applied = report.statuses.iter().filter(|s| s.outcome.is_applied()).count(),
				proposed = output.propose,
				"Merged agent patch"
			);
			committed.report = Some(report);
			committed.change_set = Some(changes);
		}

		if let Some(data) = output.data {
			self.agent_data_with_retry(itinerary_id, &agent.name(), data).await?;
		}

		if output.summary.is_some() {
			self.meta_with_retry(itinerary_id, None, output.summary).await?;
		}

		Ok(committed)
	}

	/// Applies a patch under the per-itinerary mutex, re-resolving against
	/// the fresh head on version conflicts, a bounded number of times.
	async fn apply_with_retry(
		&self,
		itinerary_id: &str,
		changes: &ChangeSet,
	) -> CoreResult<ApplyReport> {
		let lock = self.lock_for(itinerary_id).await;
		let _guard = lock.lock().await;

		let mut attempt = 0u32;
		loop {
			match self.engine.apply(itinerary_id, changes).await {
				Err(CoreError::VersionConflict { expected, actual })
					if attempt < MAX_VERSION_RETRIES =>
				{
					attempt += 1;
					warn!(
						target: "orchestrator_pipeline",
						itinerary_id,
						expected,
						actual,
						attempt,
						"Version conflict; reloading and retrying"
					);
				}
				other => return other,
			}
		}
	}

	async fn meta_with_retry(
		&self,
		itinerary_id: &str,
		status: Option<ItineraryStatus>,
		summary: Option<String>,
	) -> CoreResult<u64> {
		let lock = self.lock_for(itinerary_id).await;
		let _guard = lock.lock().await;

		let mut attempt = 0u32;
		loop {
			match self.engine.update_meta(itinerary_id, status, summary.clone()).await {
				Err(CoreError::VersionConflict { .. }) if attempt < MAX_VERSION_RETRIES => {
					attempt += 1;
				}
				other => return other,
			}
		}
	}

	async fn agent_data_with_retry(
		&self,
		itinerary_id: &str,
		agent: &str,
		data: Value,
	) -> CoreResult<u64> {
		let lock = self.lock_for(itinerary_id).await;
		let _guard = lock.lock().await;

		let mut attempt = 0u32;
		loop {
			match self.engine.put_agent_data(itinerary_id, agent, data.clone()).await {
				Err(CoreError::VersionConflict { .. }) if attempt < MAX_VERSION_RETRIES => {
					attempt += 1;
				}
				other => return other,
			}
		}
	}

	/// Rewrites legacy node IDs before any agent sees the document.
	async fn migrate_if_needed(&self, itinerary_id: &str) -> CoreResult<()> {
		let lock = self.lock_for(itinerary_id).await;
		let _guard = lock.lock().await;

		let doc = self.store.get(itinerary_id).await?;
		if !migration::needs_migration(&doc) {
			return Ok(());
		}
		let migrated = migration::migrate(&doc);
		if migrated.version == doc.version {
			// Migration degraded gracefully; keep serving the original.
			return Ok(());
		}
		self.store.put(&migrated, doc.version).await
	}

	async fn cancelled_exit(&self, itinerary_id: &str) -> CoreResult<OrchestratorResult> {
		self.bus.publish(
			ProgressEvent::new(itinerary_id, "orchestrator", "orchestrator", AgentStatus::Failed)
				.with_message("cancelled"),
		);
		Err(CoreError::Cancelled)
	}

	async fn lock_for(&self, itinerary_id: &str) -> Arc<Mutex<()>> {
		let mut map = self.locks.lock().await;
		Arc::clone(
			map.entry(itinerary_id.to_string())
				.or_insert_with(|| Arc::new(Mutex::new(()))),
		)
	}
}

struct CommittedOutput {
	report: Option<ApplyReport>,
	change_set: Option<ChangeSet>,
	messages: Vec<ChatTurn>,
}
