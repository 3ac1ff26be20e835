/*
 * src/store/mod.rs
 *
 * Document store gateway. The persistence backend itself is an external
 * collaborator; the core sees an opaque keyed store with compare-and-set on
 * the version and a version-indexed revision log for undo.
 */

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::models::itinerary::Itinerary;

pub mod memory;

pub use memory::InMemoryStore;

#[async_trait]
pub trait DocumentStore: Send + Sync {
	/// Loads the latest revision. `LoadFailed` if the itinerary is unknown.
	async fn get(&self, itinerary_id: &str) -> CoreResult<Itinerary>;

	/// Persists `doc` iff the stored head is still at `expected_version`
	/// (compare-and-set). `VersionConflict` carries the actual head version.
	/// The previous head stays in the revision log.
	async fn put(&self, doc: &Itinerary, expected_version: u64) -> CoreResult<()>;

	/// Loads the revision committed as `version`, for undo-by-restore.
	async fn get_at_version(&self, itinerary_id: &str, version: u64) -> CoreResult<Itinerary>;

	/// Creates a new document. `PersistFailed` if the key already exists.
	async fn create(&self, doc: &Itinerary) -> CoreResult<()>;
}
