pub mod changeset;
pub mod chat;
pub mod itinerary;

/// Current wall-clock time in epoch milliseconds, the document timestamp unit.
pub fn now_ms() -> i64 {
	chrono::Utc::now().timestamp_millis()
}

/// Serde helper for `HH:MM` times (`"13:30"`), the wire format for node times.
///
/// Accepts `HH:MM:SS` on input for tolerance; always writes `HH:MM`.
pub(crate) mod hhmm {
	use chrono::NaiveTime;
	use serde::{Deserialize, Deserializer, Serializer};

	const FORMAT: &str = "%H:%M";

	pub fn serialize<S: Serializer>(t: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
		match t {
			Some(t) => s.serialize_some(&t.format(FORMAT).to_string()),
			None => s.serialize_none(),
		}
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
		let raw: Option<String> = Option::deserialize(d)?;
		match raw {
			Some(s) => NaiveTime::parse_from_str(&s, FORMAT)
				.or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M:%S"))
				.map(Some)
				.map_err(serde::de::Error::custom),
			None => Ok(None),
		}
	}
}
