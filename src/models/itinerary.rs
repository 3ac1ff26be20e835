/*
 * src/models/itinerary.rs
 *
 * The itinerary document model: the root aggregate, its days, and their
 * nodes, plus lookup helpers the Change Engine resolves operations through.
 *
 * Include:
 *   Itinerary       - Versioned root aggregate, one per trip
 *   Day             - One calendar day holding an ordered node sequence
 *   Node            - A single visit, meal, transit leg, or free slot
 *   TransitEdge     - Optional transit metadata between two node IDs
 */

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::models::{hhmm, now_ms};

/// Top-level lifecycle state of an itinerary document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItineraryStatus {
	Draft,
	Generating,
	Ready,
	Failed,
}

/// What kind of stop a node is. Unrecognized wire values collapse to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
	Attraction,
	Meal,
	Transport,
	Hotel,
	Freetime,
	#[serde(other)]
	#[default]
	Other,
}

impl NodeType {
	pub fn as_str(&self) -> &'static str {
		match self {
			NodeType::Attraction => "attraction",
			NodeType::Meal => "meal",
			NodeType::Transport => "transport",
			NodeType::Hotel => "hotel",
			NodeType::Freetime => "freetime",
			NodeType::Other => "other",
		}
	}
}

/// Visit state of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
	Planned,
	InProgress,
	Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
	pub lat: f64,
	pub lng: f64,
}

/// Where a node takes place.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeLocation {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub address: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub coordinates: Option<Coordinates>,
	/// External place identifier from the places service, when known.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub place_id: Option<String>,
}

/// A single visit, meal, transit leg, or free-time slot within a day.
///
/// `id` is canonical `day{N}_node{M}`: N equals the owning day's number and
/// M is never reused within that day, even after deletes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
	pub id: String,
	#[serde(rename = "type")]
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
	/// Present implies `locked`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub booking_ref: Option<String>,
	#[serde(default)]
	pub locked: bool,
	pub status: NodeStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub updated_by: Option<String>,
	pub updated_at: i64,
}

/// Transit metadata between two nodes, keyed by node IDs. Flat list, no
/// back-references, so the owned graph stays acyclic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitEdge {
	pub from: String,
	pub to: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mode: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub duration_minutes: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub distance_km: Option<f64>,
}

/// One calendar day. Node order is the visit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Day {
	pub day_number: u32,
	pub date: NaiveDate,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub location: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pace: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub total_distance_km: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub total_cost: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub total_duration_minutes: Option<i64>,
	#[serde(default, with = "hhmm", skip_serializing_if = "Option::is_none")]
	pub time_window_start: Option<NaiveTime>,
	#[serde(default, with = "hhmm", skip_serializing_if = "Option::is_none")]
	pub time_window_end: Option<NaiveTime>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub time_zone: Option<String>,
	#[serde(default)]
	pub nodes: Vec<Node>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub edges: Vec<TransitEdge>,
	/// High-water mark of every node sequence ever allocated in this day.
	/// Deleting the current max node must not make its M value reusable.
	#[serde(default)]
	pub max_node_seq: u32,
}

impl Day {
	pub fn empty(day_number: u32, date: NaiveDate) -> Self {
		Self {
			day_number,
			date,
			location: None,
			pace: None,
			total_distance_km: None,
			total_cost: None,
			total_duration_minutes: None,
			time_window_start: None,
			time_window_end: None,
			time_zone: None,
			nodes: Vec::new(),
			edges: Vec::new(),
			max_node_seq: 0,
		}
	}

	pub fn node_ids(&self) -> Vec<String> {
		self.nodes.iter().map(|n| n.id.clone()).collect()
	}
}

/// A single turn in the itinerary's chat transcript. Read-only to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
	pub role: String,
	pub text: String,
	pub timestamp: i64,
}

/// Revision metadata appended by the persistence layer. Read-only to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionEntry {
	pub version: u64,
	pub committed_at: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub actor: Option<String>,
}

/// The versioned root aggregate. All mutation flows through the Change
/// Engine; `version` strictly increases on every commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Itinerary {
	pub itinerary_id: String,
	pub version: u64,
	pub updated_at: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub origin: Option<String>,
	pub destination: String,
	pub start_date: NaiveDate,
	pub end_date: NaiveDate,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub currency: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub themes: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub summary: Option<String>,
	pub status: ItineraryStatus,
	pub days: Vec<Day>,
	/// Opaque per-agent payloads keyed by agent name.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub agent_data: BTreeMap<String, Value>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub revisions: Vec<RevisionEntry>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub chat: Vec<ChatEntry>,
}

impl Itinerary {
	/// Builds a fresh draft with one empty day per calendar day in range.
	/// Days are contiguous from 1 and sorted, which later mutations preserve.
	pub fn new(
		itinerary_id: impl Into<String>,
		destination: impl Into<String>,
		start_date: NaiveDate,
		end_date: NaiveDate,
	) -> Self {
		let day_count = (end_date - start_date).num_days().max(0) as u32 + 1;
		let days = (1..=day_count)
			.map(|n| {
				let date = start_date + chrono::Duration::days((n - 1) as i64);
				Day::empty(n, date)
			})
			.collect();
		Self {
			itinerary_id: itinerary_id.into(),
			version: 1,
			updated_at: now_ms(),
			origin: None,
			destination: destination.into(),
			start_date,
			end_date,
			currency: None,
			themes: Vec::new(),
			summary: None,
			status: ItineraryStatus::Draft,
			days,
			agent_data: BTreeMap::new(),
			revisions: Vec::new(),
			chat: Vec::new(),
		}
	}

	pub fn day_count(&self) -> u32 {
		self.days.len() as u32
	}

	pub fn day(&self, day_number: u32) -> Option<&Day> {
		self.days.iter().find(|d| d.day_number == day_number)
	}

	pub fn day_mut(&mut self, day_number: u32) -> Option<&mut Day> {
		self.days.iter_mut().find(|d| d.day_number == day_number)
	}

	/// Locates a node by exact ID anywhere in the document.
	/// Returns (day index, node index) into `days` / `days[i].nodes`.
	pub fn locate(&self, id: &str) -> Option<(usize, usize)> {
		for (di, day) in self.days.iter().enumerate() {
			if let Some(ni) = day.nodes.iter().position(|n| n.id == id) {
				return Some((di, ni));
			}
		}
		None
	}

	pub fn find_node(&self, id: &str) -> Option<&Node> {
		self.locate(id).map(|(di, ni)| &self.days[di].nodes[ni])
	}

	pub fn find_node_mut(&mut self, id: &str) -> Option<&mut Node> {
		let (di, ni) = self.locate(id)?;
		Some(&mut self.days[di].nodes[ni])
	}

	/// Every node ID in document order.
	pub fn all_node_ids(&self) -> Vec<String> {
		self.days.iter().flat_map(|d| d.node_ids()).collect()
	}

	/// Stamps a mutation: bumps the version and refreshes `updated_at`.
	pub fn touch(&mut self) {
		self.version += 1;
		self.updated_at = now_ms();
	}
}
