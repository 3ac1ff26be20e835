/*
 * tests/properties.rs
 *
 * Invariants under random op sequences. The op generator mixes valid and
 * invalid targets on purpose: failed ops must leave the document obeying
 * every structural invariant, and commits must stay version-monotonic.
 */

use std::sync::Arc;

use chrono::NaiveDate;
use proptest::prelude::*;
use wayfarer::engine::{self, ChangeEngine, CommitOutcome};
use wayfarer::ids;
use wayfarer::migration;
use wayfarer::models::changeset::{
	ChangeOp, ChangeSet, FieldPatch, NodeDraft, NodePatch, Preferences, Scope,
};
use wayfarer::models::itinerary::{Itinerary, Node, NodeStatus, NodeType};
use wayfarer::store::{DocumentStore, InMemoryStore};

fn date(s: &str) -> NaiveDate {
	NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn node_with_id(id: &str) -> Node {
	Node {
		id: id.to_string(),
		node_type: NodeType::Attraction,
		title: format!("stop {id}"),
		location: None,
		start_time: None,
		end_time: None,
		cost: None,
		labels: vec![],
		tips: vec![],
		links: vec![],
		booking_ref: None,
		locked: false,
		status: NodeStatus::Planned,
		updated_by: None,
		updated_at: 0,
	}
}

/// Three days, two nodes each; day2_node1 is booked and locked.
fn base_doc(id: &str) -> Itinerary {
	let mut doc = Itinerary::new(id, "Sevilla", date("2026-09-01"), date("2026-09-03"));
	for day_number in 1..=3u32 {
		let day = doc.day_mut(day_number).unwrap();
		for _ in 0..2 {
			let node_id = ids::allocate_in(day);
			day.nodes.push(node_with_id(&node_id));
		}
	}
	{
		let node = doc.find_node_mut("day2_node1").unwrap();
		node.booking_ref = Some("BK-PROP".to_string());
		node.locked = true;
	}
	doc
}

fn arb_id() -> impl Strategy<Value = String> {
	prop_oneof![
		4 => (1u32..=3, 1u32..=4).prop_map(|(d, s)| format!("day{d}_node{s}")),
		1 => Just("day9_node9".to_string()),
		1 => Just("legacy_ref_42".to_string()),
	]
}

fn arb_op() -> impl Strategy<Value = ChangeOp> {
	prop_oneof![
		(proptest::option::of(arb_id()), 0u32..=4, "[a-z]{3,8}").prop_map(
			|(after, day, title)| ChangeOp::Insert {
				after,
				day: if day == 0 { None } else { Some(day) },
				node: NodeDraft {
					title,
					..NodeDraft::default()
				},
			}
		),
		(arb_id(), "[a-z]{3,8}").prop_map(|(id, title)| ChangeOp::Replace {
			id,
			node: NodePatch {
				title: Some(title),
				..NodePatch::default()
			},
		}),
		arb_id().prop_map(|id| ChangeOp::Delete { id }),
		(arb_id(), 0u32..=4, proptest::option::of(0usize..4)).prop_map(
			|(id, to_day, position)| ChangeOp::Move { id, to_day, position }
		),
		(arb_id(), proptest::option::of("[a-z]{2,6}"), any::<bool>()).prop_map(
			|(id, label, lock)| ChangeOp::Update {
				id,
				fields: FieldPatch {
					add_labels: label.into_iter().collect(),
					locked: lock.then_some(true),
					..FieldPatch::default()
				},
			}
		),
	]
}

fn changeset(ops: Vec<ChangeOp>) -> ChangeSet {
	ChangeSet {
		scope: Scope::Trip,
		day: None,
		preferences: Preferences::default(),
		ops,
		updated_by: "user".to_string(),
	}
}

proptest! {
	#![proptest_config(ProptestConfig::with_cases(64))]

	/// Invariants 1 and 2: after any accepted ChangeSet every ID is
	/// canonical for its owning day, sequences stay distinct, and the
	/// per-day max sequence never decreases.
	#[test]
	fn ids_stay_canonical_and_monotonic(ops in proptest::collection::vec(arb_op(), 1..8)) {
		let mut doc = base_doc("prop-ids");
		let before_max: Vec<u32> = doc.days.iter().map(|d| d.max_node_seq).collect();

		engine::apply_ops(&mut doc, &changeset(ops));

		engine::verify_invariants(&doc).unwrap();
		for (day, before) in doc.days.iter().zip(before_max) {
			prop_assert!(day.max_node_seq >= before);
		}
	}

	/// Invariant 6: with respectLocks on, no field of a locked node differs
	/// after the run.
	#[test]
	fn locked_nodes_are_immutable(ops in proptest::collection::vec(arb_op(), 1..8)) {
		let mut doc = base_doc("prop-locks");
		let locked_before = doc.find_node("day2_node1").unwrap().clone();

		engine::apply_ops(&mut doc, &changeset(ops));

		let locked_after = doc.find_node("day2_node1");
		prop_assert_eq!(locked_after, Some(&locked_before));
	}

	/// Invariant 3: version is bumped exactly once per commit with at least
	/// one applied op, and unchanged when every op fails.
	#[test]
	fn version_is_strictly_monotonic(ops in proptest::collection::vec(arb_op(), 1..8)) {
		let rt = tokio::runtime::Builder::new_current_thread()
			.enable_time()
			.build()
			.unwrap();
		rt.block_on(async {
			let doc = base_doc("prop-version");
			let store = Arc::new(InMemoryStore::new());
			store.create(&doc).await.unwrap();
			let engine = ChangeEngine::new(store.clone());

			let before = store.get("prop-version").await.unwrap().version;
			let report = engine.apply("prop-version", &changeset(ops)).await.unwrap();
			let after = store.get("prop-version").await.unwrap().version;

			match report.outcome {
				CommitOutcome::Committed => assert_eq!(after, before + 1),
				CommitOutcome::NoChange => assert_eq!(after, before),
				CommitOutcome::Proposed => unreachable!("apply never proposes"),
			}
		});
	}

	/// Property 4: apply then undo restores the pre-change document,
	/// ignoring version and updatedAt.
	#[test]
	fn undo_restores_prior_document(ops in proptest::collection::vec(arb_op(), 1..8)) {
		let rt = tokio::runtime::Builder::new_current_thread()
			.enable_time()
			.build()
			.unwrap();
		rt.block_on(async {
			let doc = base_doc("prop-undo");
			let store = Arc::new(InMemoryStore::new());
			store.create(&doc).await.unwrap();
			let engine = ChangeEngine::new(store.clone());
			let original = store.get("prop-undo").await.unwrap();

			let report = engine.apply("prop-undo", &changeset(ops)).await.unwrap();
			if report.outcome != CommitOutcome::Committed {
				return;
			}

			engine.undo("prop-undo", original.version).await.unwrap();
			let mut restored = store.get("prop-undo").await.unwrap();
			restored.version = original.version;
			restored.updated_at = original.updated_at;
			assert_eq!(restored, original);
		});
	}

	/// Property 5: migration is idempotent over arbitrary stored IDs.
	#[test]
	fn migration_is_idempotent(raw_ids in proptest::collection::vec("[a-z0-9_]{1,20}", 1..6)) {
		let mut doc = Itinerary::new("prop-mig", "Sevilla", date("2026-09-01"), date("2026-09-01"));
		{
			let day = doc.day_mut(1).unwrap();
			for (i, raw) in raw_ids.iter().enumerate() {
				// Suffix keeps generated IDs unique within the day.
				day.nodes.push(node_with_id(&format!("{raw}_{i}")));
			}
		}

		let once = migration::migrate(&doc);
		let twice = migration::migrate(&once);
		prop_assert_eq!(&once, &twice);
		prop_assert!(!migration::needs_migration(&once));
	}
}
