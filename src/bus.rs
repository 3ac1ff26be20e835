/*
 * src/bus.rs
 *
 * Per-itinerary fan-out of lifecycle events to subscribed clients.
 *
 * Delivery is best-effort and in-order per subscriber. Publishing never
 * blocks: each subscriber gets a bounded channel, and a subscriber whose
 * backlog is full (or whose receiver is gone) is dropped. The persisted
 * itinerary is the source of truth; events are advisory progress.
 */

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, warn};

use crate::global::EVENT_BACKLOG;
use crate::models::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
	Running,
	Succeeded,
	Failed,
}

/// One lifecycle event on the progress stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
	pub agent_id: String,
	pub agent_kind: String,
	pub status: AgentStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub progress: Option<u8>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	pub itinerary_id: String,
	pub timestamp: i64,
}

impl ProgressEvent {
	pub fn new(
		itinerary_id: impl Into<String>,
		agent_id: impl Into<String>,
		agent_kind: impl Into<String>,
		status: AgentStatus,
	) -> Self {
		Self {
			agent_id: agent_id.into(),
			agent_kind: agent_kind.into(),
			status,
			progress: None,
			message: None,
			itinerary_id: itinerary_id.into(),
			timestamp: now_ms(),
		}
	}

	pub fn with_progress(mut self, pct: u8) -> Self {
		self.progress = Some(pct.min(100));
		self
	}

	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = Some(message.into());
		self
	}
}

struct Subscriber {
	id: u64,
	tx: Sender<ProgressEvent>,
}

/// A live subscription. Keep the receiver; pass the id back to
/// [`EventBus::unsubscribe`] on close.
pub struct Subscription {
	pub id: u64,
	pub rx: Receiver<ProgressEvent>,
}

#[derive(Default)]
pub struct EventBus {
	// itinerary id -> subscribers; no await happens under this lock
	subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
	next_id: AtomicU64,
}

impl EventBus {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn subscribe(&self, itinerary_id: &str) -> Subscription {
		let (tx, rx) = mpsc::channel(EVENT_BACKLOG);
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		self.subscribers
			.lock()
			.expect("subscriber map lock")
			.entry(itinerary_id.to_string())
			.or_default()
			.push(Subscriber { id, tx });
		debug!(target: "event_bus", itinerary_id, subscriber = id, "Subscribed");
		Subscription { id, rx }
	}

	pub fn unsubscribe(&self, itinerary_id: &str, subscription_id: u64) {
		let mut guard = self.subscribers.lock().expect("subscriber map lock");
		if let Some(subs) = guard.get_mut(itinerary_id) {
			subs.retain(|s| s.id != subscription_id);
			if subs.is_empty() {
				guard.remove(itinerary_id);
			}
		}
	}

	/// Non-blocking publish. Subscribers that cannot keep up are dropped.
	pub fn publish(&self, event: ProgressEvent) {
		let mut guard = self.subscribers.lock().expect("subscriber map lock");
		let Some(subs) = guard.get_mut(&event.itinerary_id) else {
			return;
		};
		subs.retain(|sub| match sub.tx.try_send(event.clone()) {
			Ok(()) => true,
			Err(TrySendError::Full(_)) => {
				warn!(
					target: "event_bus",
					itinerary_id = %event.itinerary_id,
					subscriber = sub.id,
					"Dropping slow subscriber (backlog full)"
				);
				false
			}
			Err(TrySendError::Closed(_)) => {
				debug!(
					target: "event_bus",
					itinerary_id = %event.itinerary_id,
					subscriber = sub.id,
					"Dropping closed subscriber"
				);
				false
			}
		});
		if subs.is_empty() {
			guard.remove(&event.itinerary_id);
		}
	}

	pub fn subscriber_count(&self, itinerary_id: &str) -> usize {
		self.subscribers
			.lock()
			.expect("subscriber map lock")
			.get(itinerary_id)
			.map(|s| s.len())
			.unwrap_or(0)
	}
}
