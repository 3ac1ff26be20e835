/*
 * src/error.rs
 *
 * Error taxonomy for the itinerary mutation core.
 *
 * Two layers:
 *   OpError   - per-operation failures inside a ChangeSet. These are data:
 *               they ride along in the per-op statuses and never abort an
 *               apply on their own.
 *   CoreError - commit- and orchestration-level failures that abort the
 *               current unit of work.
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Per-operation failure, reported and skipped within a ChangeSet.
///
/// The `NodeNotFound` message deliberately lists the valid IDs in scope so
/// the failing operation can be echoed back to a user (or an LLM) verbatim.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OpError {
	#[error("Node with ID '{id}' not found. Available: {}", .available.join(", "))]
	NodeNotFound { id: String, available: Vec<String> },

	#[error("Node '{id}' is locked and the change set respects locks")]
	Locked { id: String },

	#[error("Invalid operation shape: {reason}")]
	InvalidShape { reason: String },

	#[error("Day {day} is out of range; the itinerary has {day_count} days")]
	DayOutOfRange { day: u32, day_count: u32 },

	#[error("ID '{id}' does not match the day{{N}}_node{{M}} format")]
	IdFormatConflict { id: String },
}

/// Failures from the LLM gateway.
///
/// `Transient` and `RateLimited` are retried with backoff; `SchemaMismatch`
/// is fatal for the invocation that produced it.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
	#[error("transient LLM failure: {0}")]
	Transient(String),

	#[error("LLM response did not match the expected schema: {0}")]
	SchemaMismatch(String),

	#[error("LLM provider rate limited the request")]
	RateLimited,

	#[error("LLM call timed out")]
	Timeout,
}

impl LlmError {
	/// Whether the gateway should retry after this error.
	pub fn is_retryable(&self) -> bool {
		matches!(self, LlmError::Transient(_) | LlmError::RateLimited)
	}
}

/// Commit- and orchestration-level errors.
#[derive(Debug, Error)]
pub enum CoreError {
	#[error("failed to load itinerary: {0}")]
	LoadFailed(String),

	#[error("failed to persist itinerary: {0}")]
	PersistFailed(String),

	#[error("version conflict: expected {expected}, store has {actual}")]
	VersionConflict { expected: u64, actual: u64 },

	#[error("ID '{id}' is not in canonical day{{N}}_node{{M}} form")]
	InvalidIdFormat { id: String },

	#[error(transparent)]
	Llm(#[from] LlmError),

	#[error("agent '{agent}' failed: {reason}")]
	AgentFailed { agent: String, reason: String },

	#[error("orchestration was cancelled")]
	Cancelled,

	#[error("orchestration deadline exceeded")]
	DeadlineExceeded,

	#[error("migration failed: {0}")]
	MigrationFailed(String),

	#[error("agent registry conflict: {0}")]
	RegistryConflict(String),

	#[error("places lookup failed: {0}")]
	PlacesFailed(String),
}

impl CoreError {
	/// Terminal errors end the whole orchestration rather than a single agent.
	pub fn is_terminal(&self) -> bool {
		matches!(self, CoreError::Cancelled | CoreError::DeadlineExceeded)
	}
}
