/*
 * src/summary.rs
 *
 * Renders an itinerary as LLM-facing text with every node ID spelled out
 * verbatim, so that generated operations can only reference IDs that
 * actually exist. The output stays under a caller-provided token budget by
 * shedding the least essential fields first (tips, then labels); node lines
 * and their IDs are never dropped.
 */

use std::fmt::Write;

use tracing::debug;

use crate::global::{CHARS_PER_TOKEN, SUMMARY_TOKEN_BUDGET};
use crate::models::itinerary::{Itinerary, Node};

/// Instruction appended to every summary. The Change Engine guarantees the
/// inverse: any ID shown here resolves.
pub const ID_DIRECTIVE: &str =
	"When referencing nodes in operations, use the EXACT IDs shown above.";

/// Rough token count for budget checks.
pub fn estimate_tokens(text: &str) -> usize {
	text.len().div_ceil(CHARS_PER_TOKEN)
}

/// Detail levels, from richest to barest. Truncation walks down this list
/// until the output fits; `Bare` is emitted even if it still does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Detail {
	Full,     // node lines + tips + labels
	NoTips,   // node lines + labels
	Bare,     // node lines only
}

pub fn summarize(itinerary: &Itinerary) -> String {
	summarize_within(itinerary, SUMMARY_TOKEN_BUDGET)
}

/// Renders the itinerary, truncating to fit `token_budget`.
pub fn summarize_within(itinerary: &Itinerary, token_budget: usize) -> String {
	for detail in [Detail::Full, Detail::NoTips, Detail::Bare] {
		let text = render(itinerary, detail);
		let tokens = estimate_tokens(&text);
		if tokens <= token_budget || detail == Detail::Bare {
			if detail != Detail::Full {
				debug!(
					target: "summarizer",
					itinerary_id = %itinerary.itinerary_id,
					token_budget,
					tokens,
					detail = ?detail,
					"Shed optional fields to fit the token budget"
				);
			}
			return text;
		}
	}
	unreachable!("Bare detail level always returns");
}

fn render(itinerary: &Itinerary, detail: Detail) -> String {
	let mut out = String::new();

	_ = writeln!(
		out,
		"Trip to {} ({} to {}), status: {:?}, version {}.",
		itinerary.destination,
		itinerary.start_date,
		itinerary.end_date,
		itinerary.status,
		itinerary.version
	);
	if !itinerary.themes.is_empty() {
		_ = writeln!(out, "Themes: {}.", itinerary.themes.join(", "));
	}
	out.push('\n');

	for day in &itinerary.days {
		match &day.location {
			Some(loc) => _ = writeln!(out, "Day {}: {} ({})", day.day_number, day.date, loc),
			None => _ = writeln!(out, "Day {}: {}", day.day_number, day.date),
		}
		if day.nodes.is_empty() {
			out.push_str("  No nodes\n");
			continue;
		}
		for node in &day.nodes {
			out.push_str(&node_line(node));
			out.push('\n');
			if detail != Detail::Bare && !node.labels.is_empty() {
				_ = writeln!(out, "    labels: {}", node.labels.join(", "));
			}
			if detail == Detail::Full {
				for tip in &node.tips {
					_ = writeln!(out, "    tip: {tip}");
				}
			}
		}
	}

	out.push('\n');
	out.push_str(ID_DIRECTIVE);
	out
}

/// `  {id}: {title} ({type}) [{startTime}-{endTime}]`
fn node_line(node: &Node) -> String {
	let mut line = format!(
		"  {}: {} ({})",
		node.id,
		node.title,
		node.node_type.as_str()
	);
	if node.start_time.is_some() || node.end_time.is_some() {
		let fmt = |t: Option<chrono::NaiveTime>| {
			t.map(|t| t.format("%H:%M").to_string())
				.unwrap_or_else(|| "?".to_string())
		};
		line.push_str(&format!(
			" [{}-{}]",
			fmt(node.start_time),
			fmt(node.end_time)
		));
	}
	if node.locked {
		line.push_str(" (locked)");
	}
	line
}
