/*
 * src/models/chat.rs
 *
 * Request/response DTOs for the chat-driven edit entry point.
 */

use serde::{Deserialize, Serialize};

use crate::models::changeset::{ChangeSet, Diff, OpStatus};

/// A chat message routed into the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
	pub itinerary_id: String,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub deadline_ms: Option<u64>,
	/// Dry-run: compute the diff without persisting.
	#[serde(default)]
	pub propose: bool,
}

/// One turn of the assistant-facing conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
	pub role: String,
	pub text: String,
}

impl ChatTurn {
	pub fn assistant(text: impl Into<String>) -> Self {
		Self {
			role: "assistant".to_string(),
			text: text.into(),
		}
	}
}

/// Terminal state of one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
	Completed,
	/// Deadline or cancellation cut the run short; the version reported is
	/// the latest committed one.
	Partial,
	Failed,
}

/// What the orchestrator hands back for a chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
	pub version: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub change_set: Option<ChangeSet>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub diff: Option<Diff>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub op_statuses: Vec<OpStatus>,
	pub messages: Vec<ChatTurn>,
	pub status: RunStatus,
}
