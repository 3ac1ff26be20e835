/*
 * src/ids.rs
 *
 * Sequential node ID allocation and canonical-form detection.
 *
 * Canonical IDs look like `day{N}_node{M}`: N is the owning day's number, M
 * is a positive sequence that only ever grows within a day. Anything else is
 * a legacy ID and gets rewritten by migration on load.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CoreError, CoreResult};
use crate::models::itinerary::{Day, Itinerary};

static NODE_ID_RE: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^day(\d+)_node(\d+)$").expect("node id regex"));

/// True iff `id` matches `day\d+_node\d+`.
pub fn is_canonical(id: &str) -> bool {
	NODE_ID_RE.is_match(id)
}

/// Day component of a canonical ID.
pub fn extract_day(id: &str) -> CoreResult<u32> {
	let caps = NODE_ID_RE
		.captures(id)
		.ok_or_else(|| CoreError::InvalidIdFormat { id: id.to_string() })?;
	caps[1]
		.parse()
		.map_err(|_| CoreError::InvalidIdFormat { id: id.to_string() })
}

/// Sequence component of a canonical ID.
pub fn extract_seq(id: &str) -> CoreResult<u32> {
	let caps = NODE_ID_RE
		.captures(id)
		.ok_or_else(|| CoreError::InvalidIdFormat { id: id.to_string() })?;
	caps[2]
		.parse()
		.map_err(|_| CoreError::InvalidIdFormat { id: id.to_string() })
}

pub fn format_id(day_number: u32, seq: u32) -> String {
	format!("day{day_number}_node{seq}")
}

/// Allocates the next node ID in `day` and advances its high-water mark.
///
/// The sequence is one past the larger of the day's recorded high-water mark
/// and any sequence still visible on surviving nodes, so deleted sequence
/// numbers never come back.
pub fn allocate_in(day: &mut Day) -> String {
	let scan_max = day
		.nodes
		.iter()
		.filter_map(|n| extract_seq(&n.id).ok())
		.max()
		.unwrap_or(0);
	let seq = scan_max.max(day.max_node_seq) + 1;
	day.max_node_seq = seq;
	format_id(day.day_number, seq)
}

/// Allocates the next node ID for `day_number` of `itinerary`.
pub fn allocate(itinerary: &mut Itinerary, day_number: u32) -> CoreResult<String> {
	let day = itinerary
		.day_mut(day_number)
		.ok_or_else(|| CoreError::LoadFailed(format!("no day {day_number} in itinerary")))?;
	Ok(allocate_in(day))
}
