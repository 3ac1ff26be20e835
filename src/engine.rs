/*
 * src/engine.rs
 *
 * The Change Engine: applies an ordered ChangeSet to a loaded itinerary
 * with strict ID resolution, per-op statuses, version increment, and diff
 * computation.
 *
 * Resolution policy: IDs match by exact string equality, anywhere in the
 * document. There is no fallback - an unresolvable ID fails that one op
 * with NodeNotFound carrying the currently valid IDs. A failing op is
 * skipped; later ops continue on the post-previous-success state. The
 * document is persisted (version+1) iff at least one op applied.
 */

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{CoreResult, OpError};
use crate::ids;
use crate::models::changeset::{
	ChangeOp, ChangeSet, Diff, FieldPatch, NodeDraft, NodePatch, OpOutcome, OpStatus,
};
use crate::models::itinerary::{Itinerary, ItineraryStatus, Node, NodeStatus};
use crate::models::now_ms;
use crate::store::DocumentStore;

/// How a commit attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
	/// At least one op applied; the new version was persisted.
	Committed,
	/// Every op failed or was skipped; nothing was persisted.
	NoChange,
	/// Dry run; the diff is what an apply would have done.
	Proposed,
}

#[derive(Debug)]
pub struct ApplyReport {
	pub statuses: Vec<OpStatus>,
	pub diff: Diff,
	pub outcome: CommitOutcome,
}

pub struct ChangeEngine {
	store: Arc<dyn DocumentStore>,
}

impl ChangeEngine {
	pub fn new(store: Arc<dyn DocumentStore>) -> Self {
		Self { store }
	}

	/// Applies `changeset` and persists on success.
	///
	/// Load and persist failures abort the whole commit; per-op failures are
	/// reported in the per-op statuses and do not.
	pub async fn apply(&self, itinerary_id: &str, changeset: &ChangeSet) -> CoreResult<ApplyReport> {
		let mut doc = self.store.get(itinerary_id).await?;
		let from_version = doc.version;

		let (statuses, mut diff) = apply_ops(&mut doc, changeset);
		let applied = statuses.iter().filter(|s| s.outcome.is_applied()).count();

		diff.from_version = from_version;
		diff.preview_version = from_version + 1;

		if applied == 0 {
			debug!(
				target: "change_engine",
				itinerary_id,
				ops = changeset.ops.len(),
				"No op applied; skipping persist"
			);
			diff.to_version = from_version;
			return Ok(ApplyReport {
				statuses,
				diff,
				outcome: CommitOutcome::NoChange,
			});
		}

		doc.touch();
		self.store.put(&doc, from_version).await?;
		diff.to_version = doc.version;

		info!(
			target: "change_engine",
			itinerary_id,
			from_version,
			to_version = doc.version,
			applied,
			failed = statuses.len() - applied,
			added = diff.added.len(),
			removed = diff.removed.len(),
			updated = diff.updated.len(),
			"Committed change set"
		);

		Ok(ApplyReport {
			statuses,
			diff,
			outcome: CommitOutcome::Committed,
		})
	}

	/// Dry run: same resolution and statuses as `apply`, nothing persisted.
	/// `previewVersion` is what the version would become.
	pub async fn propose(
		&self,
		itinerary_id: &str,
		changeset: &ChangeSet,
	) -> CoreResult<ApplyReport> {
		let mut doc = self.store.get(itinerary_id).await?;
		let from_version = doc.version;

		let (statuses, mut diff) = apply_ops(&mut doc, changeset);
		diff.from_version = from_version;
		diff.to_version = from_version;
		diff.preview_version = from_version + 1;

		Ok(ApplyReport {
			statuses,
			diff,
			outcome: CommitOutcome::Proposed,
		})
	}

	/// Restores the snapshot committed as `to_version` and commits it as a
	/// new version. Operations are never inverted algebraically.
	pub async fn undo(&self, itinerary_id: &str, to_version: u64) -> CoreResult<ApplyReport> {
		let current = self.store.get(itinerary_id).await?;
		let snapshot = self.store.get_at_version(itinerary_id, to_version).await?;
		let from_version = current.version;

		let mut restored = snapshot;
		restored.version = from_version;
		restored.touch();

		let mut diff = diff_documents(&current, &restored);
		diff.from_version = from_version;
		diff.preview_version = from_version + 1;
		diff.to_version = restored.version;

		self.store.put(&restored, from_version).await?;

		info!(
			target: "change_engine",
			itinerary_id,
			restored_from = to_version,
			from_version,
			to_version = restored.version,
			"Restored snapshot"
		);

		Ok(ApplyReport {
			statuses: Vec::new(),
			diff,
			outcome: CommitOutcome::Committed,
		})
	}

	/// Document-level status/summary write. Commits a new version so the
	/// "mutated only via the engine" rule covers the whole lifecycle.
	pub async fn update_meta(
		&self,
		itinerary_id: &str,
		status: Option<ItineraryStatus>,
		summary: Option<String>,
	) -> CoreResult<u64> {
		let mut doc = self.store.get(itinerary_id).await?;
		let from_version = doc.version;
		if let Some(status) = status {
			doc.status = status;
		}
		if let Some(summary) = summary {
			doc.summary = Some(summary);
		}
		doc.touch();
		self.store.put(&doc, from_version).await?;
		Ok(doc.version)
	}

	/// Writes one agent's opaque payload into `agentData`.
	pub async fn put_agent_data(
		&self,
		itinerary_id: &str,
		agent: &str,
		payload: Value,
	) -> CoreResult<u64> {
		let mut doc = self.store.get(itinerary_id).await?;
		let from_version = doc.version;
		doc.agent_data.insert(agent.to_string(), payload);
		doc.touch();
		self.store.put(&doc, from_version).await?;
		Ok(doc.version)
	}
}

/// Runs every op in order against `doc`, mutating it in place. Pure with
/// respect to the store; both apply and propose funnel through here.
pub fn apply_ops(doc: &mut Itinerary, changeset: &ChangeSet) -> (Vec<OpStatus>, Diff) {
	let mut statuses = Vec::with_capacity(changeset.ops.len());
	let mut acc = DiffAccumulator::default();

	for (index, op) in changeset.ops.iter().enumerate() {
		let outcome = match op {
			ChangeOp::Insert { after, day, node } => {
				apply_insert(doc, changeset, after.as_deref(), *day, node, &mut acc)
			}
			ChangeOp::Replace { id, node } => apply_replace(doc, changeset, id, node, &mut acc),
			ChangeOp::Delete { id } => apply_delete(doc, changeset, id, &mut acc),
			ChangeOp::Move { id, to_day, position } => {
				apply_move(doc, changeset, id, *to_day, *position, &mut acc)
			}
			ChangeOp::Update { id, fields } => apply_update(doc, changeset, id, fields, &mut acc),
		};

		if let OpOutcome::Failed { error } = &outcome {
			warn!(
				target: "change_engine",
				itinerary_id = %doc.itinerary_id,
				index,
				op = op.kind(),
				error = %error,
				"Operation failed"
			);
		}

		statuses.push(OpStatus {
			index,
			op: op.kind().to_string(),
			target: op.target().map(str::to_string),
			outcome,
		});
	}

	(statuses, acc.finish())
}

/// Accumulates per-op diff contributions and resolves them into the final
/// added/removed/updated sets at the end of the run.
#[derive(Default)]
struct DiffAccumulator {
	added: Vec<String>,
	removed: Vec<String>,
	updated: Vec<String>,
}

impl DiffAccumulator {
	fn finish(self) -> Diff {
		// A node inserted and then deleted within the same change set never
		// existed as far as the diff is concerned.
		let transient: Vec<String> = self
			.added
			.iter()
			.filter(|id| self.removed.contains(id))
			.cloned()
			.collect();

		let mut added = self.added;
		added.retain(|id| !transient.contains(id));
		dedup_in_order(&mut added);

		let mut removed = self.removed;
		removed.retain(|id| !transient.contains(id));
		dedup_in_order(&mut removed);

		let mut updated = self.updated;
		updated.retain(|id| !added.contains(id) && !removed.contains(id) && !transient.contains(id));
		dedup_in_order(&mut updated);

		Diff {
			added,
			removed,
			updated,
			..Diff::default()
		}
	}
}

fn dedup_in_order(ids: &mut Vec<String>) {
	let mut seen = std::collections::HashSet::new();
	ids.retain(|id| seen.insert(id.clone()));
}

/// Valid IDs to report alongside NodeNotFound: the target day's IDs when a
/// day can be inferred from the op or the missing ID's prefix, otherwise
/// every node ID in the document.
fn available_ids(doc: &Itinerary, missing_id: &str, day_hint: Option<u32>) -> Vec<String> {
	let inferred = day_hint.or_else(|| ids::extract_day(missing_id).ok());
	if let Some(day_number) = inferred {
		if let Some(day) = doc.day(day_number) {
			return day.node_ids();
		}
	}
	doc.all_node_ids()
}

fn node_not_found(doc: &Itinerary, id: &str, day_hint: Option<u32>) -> OpOutcome {
	OpOutcome::Failed {
		error: OpError::NodeNotFound {
			id: id.to_string(),
			available: available_ids(doc, id, day_hint),
		},
	}
}

fn locked(id: &str) -> OpOutcome {
	OpOutcome::Failed {
		error: OpError::Locked { id: id.to_string() },
	}
}

fn invalid_shape(reason: impl Into<String>) -> OpOutcome {
	OpOutcome::Failed {
		error: OpError::InvalidShape {
			reason: reason.into(),
		},
	}
}

/// A target that resolves but still carries a legacy ID means the document
/// was never migrated; refusing the op keeps the canonical-ID contract from
/// silently eroding.
fn id_format_conflict(id: &str) -> Option<OpOutcome> {
	(!ids::is_canonical(id)).then(|| OpOutcome::Failed {
		error: OpError::IdFormatConflict { id: id.to_string() },
	})
}

/// The user_first preference: an agent-authored change set must not clobber
/// a node the user touched last.
fn preserved_for_user(changeset: &ChangeSet, node: &Node) -> bool {
	changeset.preferences.user_first
		&& !changeset.is_user_authored()
		&& node.updated_by.as_deref() == Some(crate::models::changeset::USER_ACTOR)
}

fn apply_insert(
	doc: &mut Itinerary,
	changeset: &ChangeSet,
	after: Option<&str>,
	day: Option<u32>,
	draft: &NodeDraft,
	acc: &mut DiffAccumulator,
) -> OpOutcome {
	if draft.title.trim().is_empty() {
		return invalid_shape("insert requires a node title");
	}

	// Resolve the target day: an explicit `after` anchor wins (the node
	// lands in whatever day that anchor actually lives in), then the op's
	// own `day`, then the change set's advisory day.
	let (day_idx, insert_at) = match after {
		Some(anchor) => match doc.locate(anchor) {
			Some((di, ni)) => (di, ni + 1),
			None => return node_not_found(doc, anchor, day),
		},
		None => {
			let Some(day_number) = day.or(changeset.day) else {
				return invalid_shape("insert requires a day or an after id");
			};
			if day_number == 0 || day_number > doc.day_count() {
				return OpOutcome::Failed {
					error: OpError::DayOutOfRange {
						day: day_number,
						day_count: doc.day_count(),
					},
				};
			}
			let di = doc
				.days
				.iter()
				.position(|d| d.day_number == day_number)
				.expect("contiguous days");
			let len = doc.days[di].nodes.len();
			(di, len)
		}
	};

	let day = &mut doc.days[day_idx];
	let id = ids::allocate_in(day);
	let node = Node {
		id: id.clone(),
		node_type: draft.node_type,
		title: draft.title.clone(),
		location: draft.location.clone(),
		start_time: draft.start_time,
		end_time: draft.end_time,
		cost: draft.cost,
		labels: draft.labels.clone(),
		tips: draft.tips.clone(),
		links: draft.links.clone(),
		booking_ref: None,
		locked: false,
		status: NodeStatus::Planned,
		updated_by: Some(changeset.updated_by.clone()),
		updated_at: now_ms(),
	};
	day.nodes.insert(insert_at, node);

	if changeset.preferences.preserve_timing {
		shift_following_times(day, insert_at);
	}

	acc.added.push(id);
	OpOutcome::Applied
}

fn apply_replace(
	doc: &mut Itinerary,
	changeset: &ChangeSet,
	id: &str,
	patch: &NodePatch,
	acc: &mut DiffAccumulator,
) -> OpOutcome {
	if patch.is_empty() {
		return invalid_shape("replace carries no fields");
	}
	let respect_locks = changeset.preferences.respect_locks;
	let Some(node) = doc.find_node(id) else {
		return node_not_found(doc, id, None);
	};
	if let Some(conflict) = id_format_conflict(id) {
		return conflict;
	}
	if respect_locks && node.locked {
		return locked(id);
	}
	if preserved_for_user(changeset, node) {
		return OpOutcome::Skipped {
			reason: format!("node '{id}' was last edited by the user"),
		};
	}

	let author = changeset.updated_by.clone();
	let node = doc.find_node_mut(id).expect("checked above");
	if let Some(t) = patch.node_type {
		node.node_type = t;
	}
	if let Some(title) = &patch.title {
		node.title = title.clone();
	}
	if let Some(location) = &patch.location {
		node.location = Some(location.clone());
	}
	if let Some(start) = patch.start_time {
		node.start_time = Some(start);
	}
	if let Some(end) = patch.end_time {
		node.end_time = Some(end);
	}
	if let Some(cost) = patch.cost {
		node.cost = Some(cost);
	}
	node.updated_by = Some(author);
	node.updated_at = now_ms();

	acc.updated.push(id.to_string());
	OpOutcome::Applied
}

fn apply_delete(
	doc: &mut Itinerary,
	changeset: &ChangeSet,
	id: &str,
	acc: &mut DiffAccumulator,
) -> OpOutcome {
	let Some((di, ni)) = doc.locate(id) else {
		return node_not_found(doc, id, None);
	};
	if let Some(conflict) = id_format_conflict(id) {
		return conflict;
	}
	if changeset.preferences.respect_locks && doc.days[di].nodes[ni].locked {
		return locked(id);
	}

	let day = &mut doc.days[di];
	day.nodes.remove(ni);
	// The sequence number stays burned into max_node_seq; edges touching
	// the removed node would dangle.
	day.edges.retain(|e| e.from != id && e.to != id);

	acc.removed.push(id.to_string());
	OpOutcome::Applied
}

fn apply_move(
	doc: &mut Itinerary,
	changeset: &ChangeSet,
	id: &str,
	to_day: u32,
	position: Option<usize>,
	acc: &mut DiffAccumulator,
) -> OpOutcome {
	let Some((di, ni)) = doc.locate(id) else {
		return node_not_found(doc, id, None);
	};
	if let Some(conflict) = id_format_conflict(id) {
		return conflict;
	}
	if changeset.preferences.respect_locks && doc.days[di].nodes[ni].locked {
		return locked(id);
	}
	if to_day == 0 || to_day > doc.day_count() {
		return OpOutcome::Failed {
			error: OpError::DayOutOfRange {
				day: to_day,
				day_count: doc.day_count(),
			},
		};
	}

	let mut node = doc.days[di].nodes.remove(ni);
	let old_id = node.id.clone();
	doc.days[di].edges.retain(|e| e.from != old_id && e.to != old_id);

	let dest = doc.day_mut(to_day).expect("range checked");
	let new_id = ids::allocate_in(dest);
	node.id = new_id.clone();
	node.updated_by = Some(changeset.updated_by.clone());
	node.updated_at = now_ms();

	let at = position.unwrap_or(dest.nodes.len()).min(dest.nodes.len());
	dest.nodes.insert(at, node);

	if changeset.preferences.preserve_timing {
		shift_following_times(dest, at);
	}

	acc.removed.push(old_id);
	acc.added.push(new_id);
	OpOutcome::Applied
}

fn apply_update(
	doc: &mut Itinerary,
	changeset: &ChangeSet,
	id: &str,
	fields: &FieldPatch,
	acc: &mut DiffAccumulator,
) -> OpOutcome {
	let Some(node) = doc.find_node(id) else {
		return node_not_found(doc, id, None);
	};
	if let Some(conflict) = id_format_conflict(id) {
		return conflict;
	}
	if changeset.preferences.respect_locks && node.locked {
		return locked(id);
	}
	if preserved_for_user(changeset, node) {
		return OpOutcome::Skipped {
			reason: format!("node '{id}' was last edited by the user"),
		};
	}
	// A booking reference pins the node; unlocking requires clearing the
	// booking through whatever flow owns it, not a field diff.
	if fields.locked == Some(false)
		&& (node.booking_ref.is_some() || fields.booking_ref.is_some())
	{
		return invalid_shape("cannot unlock a node holding a booking reference");
	}

	let author = changeset.updated_by.clone();
	let node = doc.find_node_mut(id).expect("checked above");

	if let Some(labels) = &fields.labels {
		node.labels = labels.clone();
	}
	append_unique(&mut node.labels, &fields.add_labels);
	if let Some(links) = &fields.links {
		node.links = links.clone();
	}
	append_unique(&mut node.links, &fields.add_links);
	if let Some(tips) = &fields.tips {
		node.tips = tips.clone();
	}
	append_unique(&mut node.tips, &fields.add_tips);

	if let Some(status) = fields.status {
		node.status = status;
	}
	if let Some(cost) = fields.cost {
		node.cost = Some(cost);
	}
	if let Some(booking_ref) = &fields.booking_ref {
		node.booking_ref = Some(booking_ref.clone());
		// bookingRef present implies locked
		node.locked = true;
	}
	if let Some(locked) = fields.locked {
		if node.booking_ref.is_none() || locked {
			node.locked = locked;
		}
	}
	node.updated_by = Some(author);
	node.updated_at = now_ms();

	acc.updated.push(id.to_string());
	OpOutcome::Applied
}

fn append_unique(list: &mut Vec<String>, extra: &[String]) {
	for item in extra {
		if !list.contains(item) {
			list.push(item.clone());
		}
	}
}

/// After inserting at `inserted_at`, pushes later timed nodes forward so
/// that chronological order matches visit order again. Untimed nodes are
/// left alone.
fn shift_following_times(day: &mut crate::models::itinerary::Day, inserted_at: usize) {
	let Some(mut prev_end) = day.nodes[inserted_at].end_time else {
		return;
	};
	for node in day.nodes.iter_mut().skip(inserted_at + 1) {
		let Some(start) = node.start_time else {
			continue;
		};
		if start >= prev_end {
			break;
		}
		let shift = prev_end - start;
		node.start_time = Some(start + shift);
		if let Some(end) = node.end_time {
			node.end_time = Some(end + shift);
		}
		prev_end = node.end_time.unwrap_or(prev_end);
	}
}

/// ID-level diff between two documents, for undo reporting.
fn diff_documents(before: &Itinerary, after: &Itinerary) -> Diff {
	let before_ids = before.all_node_ids();
	let after_ids = after.all_node_ids();

	let added = after_ids
		.iter()
		.filter(|id| !before_ids.contains(id))
		.cloned()
		.collect();
	let removed = before_ids
		.iter()
		.filter(|id| !after_ids.contains(id))
		.cloned()
		.collect();
	let updated = after_ids
		.iter()
		.filter(|id| {
			before_ids.contains(id) && {
				let b = before.find_node(id);
				let a = after.find_node(id);
				b != a
			}
		})
		.cloned()
		.collect();

	Diff {
		added,
		removed,
		updated,
		..Diff::default()
	}
}

/// Checks the structural invariants the engine must preserve. Used by tests
/// after every mutation.
pub fn verify_invariants(doc: &Itinerary) -> Result<(), String> {
	let expected_days = (doc.end_date - doc.start_date).num_days() + 1;
	if doc.days.len() as i64 != expected_days {
		return Err(format!(
			"day count {} does not match date range {expected_days}",
			doc.days.len()
		));
	}
	for (i, day) in doc.days.iter().enumerate() {
		if day.day_number != i as u32 + 1 {
			return Err(format!(
				"days not contiguous: index {i} has dayNumber {}",
				day.day_number
			));
		}
		let mut seen = std::collections::HashSet::new();
		for node in &day.nodes {
			let day_part = ids::extract_day(&node.id)
				.map_err(|_| format!("non-canonical id {}", node.id))?;
			if day_part != day.day_number {
				return Err(format!(
					"id {} does not match owning day {}",
					node.id, day.day_number
				));
			}
			let seq = ids::extract_seq(&node.id).map_err(|e| e.to_string())?;
			if !seen.insert(seq) {
				return Err(format!("duplicate sequence in day {}: {}", day.day_number, seq));
			}
			if seq > day.max_node_seq {
				return Err(format!(
					"sequence {seq} above high-water mark {} in day {}",
					day.max_node_seq, day.day_number
				));
			}
			if node.booking_ref.is_some() && !node.locked {
				return Err(format!("node {} has bookingRef but is not locked", node.id));
			}
		}
	}
	Ok(())
}

/// Checks that consecutive timed nodes in a day appear in chronological
/// order. Separate from [`verify_invariants`] because only timing-aware
/// mutations (insert/move with `preserveTiming`) are expected to uphold it.
pub fn verify_timing(day: &crate::models::itinerary::Day) -> Result<(), String> {
	for pair in day.nodes.windows(2) {
		if let (Some(a), Some(b)) = (pair[0].start_time, pair[1].start_time) {
			if b < a {
				return Err(format!(
					"node {} starts at {b} before preceding node {} at {a}",
					pair[1].id, pair[0].id
				));
			}
		}
	}
	Ok(())
}
