/*
 * src/models/changeset.rs
 *
 * The ChangeSet wire shape: an ordered list of operations plus preferences,
 * shared between the LLM, the orchestrator, and the external API, and the
 * diff / per-op status types the Change Engine reports back.
 */

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::OpError;
use crate::models::hhmm;
use crate::models::itinerary::{NodeLocation, NodeStatus, NodeType};

/// Whether the change set targets one day or the whole trip. Advisory: each
/// op resolves its own target by exact ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
	Day,
	Trip,
}

/// Conflict and safety preferences for a whole ChangeSet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
	/// Prefer user-supplied content over agent-supplied on conflict.
	#[serde(default)]
	pub user_first: bool,
	/// Honor the `locked` flag. Booking flows set this to false deliberately.
	#[serde(default = "default_true")]
	pub respect_locks: bool,
	/// Shift later start/end times to avoid overlaps when inserting.
	#[serde(default)]
	pub preserve_timing: bool,
}

fn default_true() -> bool {
	true
}

impl Default for Preferences {
	fn default() -> Self {
		Self {
			user_first: false,
			respect_locks: true,
			preserve_timing: false,
		}
	}
}

/// Payload of a new node: everything but the ID, which the engine allocates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDraft {
	#[serde(rename = "type", default = "default_node_type")]
	pub node_type: NodeType,
	pub title: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub location: Option<NodeLocation>,
	#[serde(default, with = "hhmm", skip_serializing_if = "Option::is_none")]
	pub start_time: Option<NaiveTime>,
	#[serde(default, with = "hhmm", skip_serializing_if = "Option::is_none")]
	pub end_time: Option<NaiveTime>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cost: Option<f64>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub labels: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub tips: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub links: Vec<String>,
}

fn default_node_type() -> NodeType {
	NodeType::Other
}

/// Partial node fields for `replace`. Only present fields are written; the
/// ID is always preserved.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
	#[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
	pub node_type: Option<NodeType>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub location: Option<NodeLocation>,
	#[serde(default, with = "hhmm", skip_serializing_if = "Option::is_none")]
	pub start_time: Option<NaiveTime>,
	#[serde(default, with = "hhmm", skip_serializing_if = "Option::is_none")]
	pub end_time: Option<NaiveTime>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cost: Option<f64>,
}

impl NodePatch {
	pub fn is_empty(&self) -> bool {
		self.node_type.is_none()
			&& self.title.is_none()
			&& self.location.is_none()
			&& self.start_time.is_none()
			&& self.end_time.is_none()
			&& self.cost.is_none()
	}
}

/// Field-level metadata diff for `update`.
///
/// `labels`/`links`/`tips` replace the whole list; the `add_*` variants
/// append (deduplicated). Setting `booking_ref` forces `locked = true`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPatch {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub labels: Option<Vec<String>>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub add_labels: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub links: Option<Vec<String>>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub add_links: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tips: Option<Vec<String>>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub add_tips: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub locked: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub booking_ref: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<NodeStatus>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cost: Option<f64>,
}

/// One edit operation. Tagged on the wire by its `op` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ChangeOp {
	/// Allocate a new ID in the target day; insert immediately after `after`,
	/// or at the end of the day if `after` is null.
	Insert {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		after: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		day: Option<u32>,
		node: NodeDraft,
	},
	/// Overwrite the provided fields of the node with this exact ID.
	Replace { id: String, node: NodePatch },
	/// Remove the node with this exact ID. The ID is not reclaimed.
	Delete { id: String },
	/// Remove the node and re-insert it into `toDay`, allocating a new ID
	/// there (IDs are day-scoped). The old ID is not reclaimed.
	Move {
		id: String,
		#[serde(rename = "toDay")]
		to_day: u32,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		position: Option<usize>,
	},
	/// Apply a field-level metadata diff.
	Update { id: String, fields: FieldPatch },
}

impl ChangeOp {
	pub fn kind(&self) -> &'static str {
		match self {
			ChangeOp::Insert { .. } => "insert",
			ChangeOp::Replace { .. } => "replace",
			ChangeOp::Delete { .. } => "delete",
			ChangeOp::Move { .. } => "move",
			ChangeOp::Update { .. } => "update",
		}
	}

	/// The ID the op targets, when it has one.
	pub fn target(&self) -> Option<&str> {
		match self {
			ChangeOp::Insert { after, .. } => after.as_deref(),
			ChangeOp::Replace { id, .. }
			| ChangeOp::Delete { id }
			| ChangeOp::Move { id, .. }
			| ChangeOp::Update { id, .. } => Some(id),
		}
	}
}

/// An ordered list of operations plus preferences, applied op-by-op to one
/// itinerary. `updated_by` names the author; `"user"` marks user-authored
/// edits for the `user_first` conflict rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
	pub scope: Scope,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub day: Option<u32>,
	#[serde(default)]
	pub preferences: Preferences,
	pub ops: Vec<ChangeOp>,
	#[serde(default = "default_actor")]
	pub updated_by: String,
}

pub const USER_ACTOR: &str = "user";

fn default_actor() -> String {
	USER_ACTOR.to_string()
}

impl ChangeSet {
	pub fn trip(ops: Vec<ChangeOp>) -> Self {
		Self {
			scope: Scope::Trip,
			day: None,
			preferences: Preferences::default(),
			ops,
			updated_by: default_actor(),
		}
	}

	pub fn with_author(mut self, author: impl Into<String>) -> Self {
		self.updated_by = author.into();
		self
	}

	pub fn is_user_authored(&self) -> bool {
		self.updated_by == USER_ACTOR
	}
}

/// Outcome of one operation within an apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum OpOutcome {
	Applied,
	/// Not applied, but not an error either (e.g. `user_first` preservation).
	Skipped { reason: String },
	Failed { error: OpError },
}

impl OpOutcome {
	pub fn is_applied(&self) -> bool {
		matches!(self, OpOutcome::Applied)
	}
}

/// Per-op status line returned to the caller, one per submitted op, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpStatus {
	pub index: usize,
	pub op: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub target: Option<String>,
	#[serde(flatten)]
	pub outcome: OpOutcome,
}

/// Node-ID level diff of one commit attempt.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
	pub added: Vec<String>,
	pub removed: Vec<String>,
	pub updated: Vec<String>,
	pub preview_version: u64,
	pub from_version: u64,
	/// Equals `from_version` in propose mode (nothing was persisted).
	pub to_version: u64,
}

impl Diff {
	pub fn is_empty(&self) -> bool {
		self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
	}
}
