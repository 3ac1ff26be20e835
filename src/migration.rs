/*
 * src/migration.rs
 *
 * One-shot rewrite of legacy node IDs to the sequential day{N}_node{M}
 * scheme. Runs on load, before any agent touches the document.
 */

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::error::CoreResult;
use crate::ids;
use crate::models::itinerary::Itinerary;
use crate::models::now_ms;

/// True if any node in the document still carries a legacy ID.
pub fn needs_migration(doc: &Itinerary) -> bool {
	doc.days
		.iter()
		.flat_map(|d| d.nodes.iter())
		.any(|n| !ids::is_canonical(&n.id))
}

/// Rewrites every node ID to `day{dayNumber}_node{k}`, k starting at 1 in
/// stored node order, and bumps the version. Idempotent: a document that is
/// already fully canonical is returned unchanged.
///
/// If any step fails the original document is returned untouched; external
/// references to legacy IDs become dangling either way.
pub fn migrate(doc: &Itinerary) -> Itinerary {
	if !needs_migration(doc) {
		return doc.clone();
	}

	match try_migrate(doc) {
		Ok(migrated) => {
			info!(
				target: "migration",
				itinerary_id = %doc.itinerary_id,
				from_version = doc.version,
				to_version = migrated.version,
				"Rewrote legacy node IDs"
			);
			migrated
		}
		Err(e) => {
			warn!(
				target: "migration",
				itinerary_id = %doc.itinerary_id,
				error = %e,
				"Migration failed; returning original document"
			);
			doc.clone()
		}
	}
}

fn try_migrate(doc: &Itinerary) -> CoreResult<Itinerary> {
	let mut out = doc.clone();
	// old id -> new id, for remapping transit edges afterwards
	let mut renames: HashMap<String, String> = HashMap::new();

	for day in out.days.iter_mut() {
		for (i, node) in day.nodes.iter_mut().enumerate() {
			let new_id = ids::format_id(day.day_number, i as u32 + 1);
			if node.id != new_id {
				debug!(
					target: "migration",
					old = %node.id,
					new = %new_id,
					"Reassigning node ID"
				);
				renames.insert(std::mem::replace(&mut node.id, new_id.clone()), new_id);
			}
		}
		// Visit order is preserved, so the high-water mark is exactly the count.
		day.max_node_seq = day.max_node_seq.max(day.nodes.len() as u32);
	}

	for day in out.days.iter_mut() {
		day.edges.retain_mut(|edge| {
			if let Some(new_from) = renames.get(&edge.from) {
				edge.from = new_from.clone();
			}
			if let Some(new_to) = renames.get(&edge.to) {
				edge.to = new_to.clone();
			}
			// Endpoints we could not map would dangle; drop them.
			let resolvable = ids::is_canonical(&edge.from) && ids::is_canonical(&edge.to);
			if !resolvable {
				warn!(target: "migration", from = %edge.from, to = %edge.to, "Dropping unmappable edge");
			}
			resolvable
		});
	}

	out.version += 1;
	out.updated_at = now_ms();
	Ok(out)
}
