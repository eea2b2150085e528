//! Stored form of a cached response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached response body stamped with the time it was stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
	pub key: String,
	/// Response body, kept as opaque bytes.
	#[serde(with = "hex_payload")]
	pub payload: Vec<u8>,
	pub stored_at: DateTime<Utc>,
	pub ttl_seconds: u64,
}

impl CacheEntry {
	pub fn new(key: impl Into<String>, payload: Vec<u8>, stored_at: DateTime<Utc>, ttl_seconds: u64) -> Self {
		Self {
			key: key.into(),
			payload,
			stored_at,
			ttl_seconds,
		}
	}

	/// An entry is valid iff `now - stored_at < ttl_seconds`.
	pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
		let age = (now - self.stored_at).num_seconds();
		age < i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX)
	}
}

mod hex_payload {
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&hex::encode(bytes))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
		let encoded = String::deserialize(deserializer)?;
		hex::decode(encoded).map_err(serde::de::Error::custom)
	}
}
