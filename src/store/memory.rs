/*
 * src/store/memory.rs
 *
 * In-memory document store: a revision log per itinerary with CAS on the
 * head version. Backs tests and single-process deployments; a real backend
 * implements the same trait.
 */

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::models::itinerary::Itinerary;
use crate::store::DocumentStore;

#[derive(Default)]
pub struct InMemoryStore {
	// itinerary id -> ordered revision log, newest last
	inner: RwLock<HashMap<String, Vec<Itinerary>>>,
}

impl InMemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of revisions held for an itinerary (test observability).
	pub async fn revision_count(&self, itinerary_id: &str) -> usize {
		self.inner
			.read()
			.await
			.get(itinerary_id)
			.map(|log| log.len())
			.unwrap_or(0)
	}
}

#[async_trait]
impl DocumentStore for InMemoryStore {
	async fn get(&self, itinerary_id: &str) -> CoreResult<Itinerary> {
		let guard = self.inner.read().await;
		guard
			.get(itinerary_id)
			.and_then(|log| log.last())
			.cloned()
			.ok_or_else(|| CoreError::LoadFailed(format!("unknown itinerary '{itinerary_id}'")))
	}

	async fn put(&self, doc: &Itinerary, expected_version: u64) -> CoreResult<()> {
		let mut guard = self.inner.write().await;
		let log = guard
			.get_mut(&doc.itinerary_id)
			.ok_or_else(|| CoreError::LoadFailed(format!("unknown itinerary '{}'", doc.itinerary_id)))?;
		let head = log.last().expect("revision log is never empty");
		if head.version != expected_version {
			return Err(CoreError::VersionConflict {
				expected: expected_version,
				actual: head.version,
			});
		}
		debug!(
			target: "store",
			itinerary_id = %doc.itinerary_id,
			version = doc.version,
			"Committed revision"
		);
		log.push(doc.clone());
		Ok(())
	}

	async fn get_at_version(&self, itinerary_id: &str, version: u64) -> CoreResult<Itinerary> {
		let guard = self.inner.read().await;
		guard
			.get(itinerary_id)
			.and_then(|log| log.iter().find(|doc| doc.version == version))
			.cloned()
			.ok_or_else(|| {
				CoreError::LoadFailed(format!(
					"no revision {version} for itinerary '{itinerary_id}'"
				))
			})
	}

	async fn create(&self, doc: &Itinerary) -> CoreResult<()> {
		let mut guard = self.inner.write().await;
		if guard.contains_key(&doc.itinerary_id) {
			return Err(CoreError::PersistFailed(format!(
				"itinerary '{}' already exists",
				doc.itinerary_id
			)));
		}
		guard.insert(doc.itinerary_id.clone(), vec![doc.clone()]);
		Ok(())
	}
}
