/*
 * src/places.rs
 *
 * External places service used by the enrichment agent. The Google Maps
 * implementation geocodes a query and matches a nearby place by name; a
 * fixture-backed mock serves tests and offline runs.
 */

use std::collections::HashMap;

use async_trait::async_trait;
use google_maps::places_new::{Field, FieldMask};
use num_traits::ToPrimitive;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::global::GOOGLE_MAPS_API_KEY;
use crate::models::itinerary::Coordinates;

/// What enrichment wants to know about a place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaceInfo {
	pub place_id: String,
	pub name: String,
	pub address: Option<String>,
	pub coordinates: Option<Coordinates>,
	pub rating: Option<f64>,
	pub website: Option<String>,
	pub opening_hours: Vec<String>,
}

#[async_trait]
pub trait PlacesClient: Send + Sync {
	/// Converts a free-text location into coordinates.
	async fn geocode(&self, query: &str) -> CoreResult<Coordinates>;

	/// Best-effort lookup of a named place near the given coordinates.
	async fn find_place(
		&self,
		query: &str,
		near: Option<&Coordinates>,
	) -> CoreResult<Option<PlaceInfo>>;
}

pub struct GoogleMapsPlaces {
	client: google_maps::Client,
}

impl GoogleMapsPlaces {
	/// Reads `GOOGLE_MAPS_API_KEY` from the environment.
	pub fn from_env() -> CoreResult<Self> {
		dotenvy::dotenv().ok();
		let api_key = std::env::var(GOOGLE_MAPS_API_KEY)
			.map_err(|_| CoreError::PlacesFailed("GOOGLE_MAPS_API_KEY is not set".to_string()))?;
		let client = google_maps::Client::try_new(api_key)
			.map_err(|_| CoreError::PlacesFailed("could not create Google Maps client".to_string()))?;
		Ok(Self { client })
	}
}

#[async_trait]
impl PlacesClient for GoogleMapsPlaces {
	async fn geocode(&self, query: &str) -> CoreResult<Coordinates> {
		let res = self
			.client
			.geocoding()
			.with_address(query)
			.execute()
			.await
			.map_err(|e| CoreError::PlacesFailed(format!("geocoding request failed: {e}")))?;
		if let Some(err) = res.error_message {
			return Err(CoreError::PlacesFailed(format!(
				"geocoding failed with status {} - {err}",
				res.status
			)));
		}
		let first = res
			.results
			.first()
			.ok_or_else(|| CoreError::PlacesFailed(format!("no geocoding result for {query}")))?;
		let lat = first.geometry.location.lat.to_f64();
		let lng = first.geometry.location.lng.to_f64();
		match (lat, lng) {
			(Some(lat), Some(lng)) => Ok(Coordinates { lat, lng }),
			_ => Err(CoreError::PlacesFailed("coordinates out of range".to_string())),
		}
	}

	async fn find_place(
		&self,
		query: &str,
		near: Option<&Coordinates>,
	) -> CoreResult<Option<PlaceInfo>> {
		let center = match near {
			Some(c) => *c,
			None => self.geocode(query).await?,
		};

		let search = self
			.client
			.nearby_search((center.lat, center.lng, 5_000.))
			.map_err(|e| CoreError::PlacesFailed(format!("nearby search setup failed: {e}")))?
			.field_mask(FieldMask::Specific(vec![
				Field::PlacesId,
				Field::PlacesDisplayName,
				Field::PlacesAdrFormatAddress,
				Field::PlacesLocation,
				Field::PlacesRating,
				Field::PlacesWebsiteUri,
				Field::PlacesRegularOpeningHours,
			]))
			.execute()
			.await
			.map_err(|e| CoreError::PlacesFailed(format!("nearby search failed: {e}")))?;

		if let Some(err) = search.error() {
			return Err(CoreError::PlacesFailed(format!("nearby search failed - {err}")));
		}

		let wanted = query.to_lowercase();
		let places = search.places();
		let hit = places.into_iter().find(|p| {
			p.display_name
				.as_ref()
				.map(|n| {
					let name = n.text.to_lowercase();
					wanted.contains(&name) || name.contains(&wanted)
				})
				.unwrap_or(false)
		});
		let Some(place) = hit else {
			debug!(target: "places", query, "No nearby place matched by name");
			return Ok(None);
		};

		Ok(Some(PlaceInfo {
			place_id: place.id.clone().unwrap_or_default(),
			name: place
				.display_name
				.as_ref()
				.map(|n| n.text.clone())
				.unwrap_or_else(|| query.to_string()),
			address: place.adr_format_address.clone(),
			coordinates: place.location.as_ref().and_then(|loc| {
				Some(Coordinates {
					lat: loc.latitude.to_f64()?,
					lng: loc.longitude.to_f64()?,
				})
			}),
			rating: place.rating.as_ref().and_then(|r| r.to_f64()),
			website: place.website_uri.as_ref().map(|u| u.to_string()),
			opening_hours: place
				.regular_opening_hours
				.as_ref()
				.map(|h| h.weekday_descriptions.clone())
				.unwrap_or_default(),
		}))
	}
}

/// Fixture-backed places client for tests and offline runs. Keys are
/// matched case-insensitively against the query.
#[derive(Default)]
pub struct MockPlaces {
	fixtures: HashMap<String, PlaceInfo>,
}

impl MockPlaces {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_place(mut self, query: impl Into<String>, info: PlaceInfo) -> Self {
		self.fixtures.insert(query.into().to_lowercase(), info);
		self
	}
}

#[async_trait]
impl PlacesClient for MockPlaces {
	async fn geocode(&self, _query: &str) -> CoreResult<Coordinates> {
		Ok(Coordinates { lat: 0.0, lng: 0.0 })
	}

	async fn find_place(
		&self,
		query: &str,
		_near: Option<&Coordinates>,
	) -> CoreResult<Option<PlaceInfo>> {
		let wanted = query.to_lowercase();
		Ok(self
			.fixtures
			.iter()
			.find(|(k, _)| wanted.contains(*k) || k.contains(&wanted))
			.map(|(_, v)| v.clone()))
	}
}
