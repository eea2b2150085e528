//! Response cache for the bistro service.
//!
//! Implements cache-aside in front of the catalog read endpoints. Callers
//! compute a [`CacheKey`] from the request, and [`ResponseCache::get_or_fetch`]
//! either replays the stored body or runs the backing query and stores its
//! serialized result. Writes evict a whole [`CacheFamily`] with
//! [`ResponseCache::invalidate`].
//!
//! The cache never fails a request: backend errors and timeouts are logged,
//! counted in [`CacheStats`] and treated as misses.

use bistro_storage::{StorageError, StorageInterface};
use bistro_types::Clock;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

pub mod entry;
pub mod key;
pub mod stats;

pub use entry::CacheEntry;
pub use key::{canonical_query, CacheFamily, CacheKey, CachePrefix};
pub use stats::{CacheStats, CacheStatsSnapshot};

/// Errors that can occur inside the cache layer.
///
/// Only `Serialization` of a freshly fetched value ever reaches callers; the
/// other variants are logged and recovered from.
#[derive(Debug, Error)]
pub enum CacheError {
	/// The cache backend failed or did not answer in time.
	#[error("Cache unavailable: {0}")]
	Unavailable(String),
	/// Evicting a key pattern failed.
	#[error("Cache invalidation failed: {0}")]
	InvalidationFailed(String),
	/// A value could not be encoded or a stored entry could not be decoded.
	#[error("Cache serialization error: {0}")]
	Serialization(String),
}

/// Runtime settings of the response cache.
#[derive(Debug, Clone)]
pub struct CacheSettings {
	/// When false every lookup misses and nothing is stored.
	pub enabled: bool,
	/// TTL for families without an override.
	pub default_ttl: Duration,
	/// Per-family TTL overrides.
	pub family_ttls: HashMap<CacheFamily, Duration>,
	/// Upper bound for a single backend call.
	pub operation_timeout: Duration,
}

impl CacheSettings {
	pub fn ttl_for(&self, family: CacheFamily) -> Duration {
		self.family_ttls
			.get(&family)
			.copied()
			.unwrap_or(self.default_ttl)
	}
}

impl Default for CacheSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			default_ttl: Duration::from_secs(3600),
			family_ttls: HashMap::new(),
			operation_timeout: Duration::from_millis(250),
		}
	}
}

/// Response body returned by [`ResponseCache::get_or_fetch`].
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
	/// Serialized JSON body.
	pub body: Vec<u8>,
	/// Whether the body was replayed from the cache.
	pub from_cache: bool,
}

/// Cache-aside layer over a key-value storage backend.
pub struct ResponseCache {
	backend: Arc<dyn StorageInterface>,
	settings: CacheSettings,
	clock: Arc<dyn Clock>,
	stats: CacheStats,
}

impl ResponseCache {
	pub fn new(
		backend: Arc<dyn StorageInterface>,
		settings: CacheSettings,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			backend,
			settings,
			clock,
			stats: CacheStats::default(),
		}
	}

	pub fn settings(&self) -> &CacheSettings {
		&self.settings
	}

	pub fn stats(&self) -> CacheStatsSnapshot {
		self.stats.snapshot()
	}

	/// Runs a backend call under the configured operation timeout.
	async fn bounded<T>(
		&self,
		operation: impl Future<Output = Result<T, StorageError>>,
	) -> Result<T, StorageError> {
		timeout(self.settings.operation_timeout, operation)
			.await
			.map_err(|_| {
				StorageError::Backend(format!(
					"timed out after {}ms",
					self.settings.operation_timeout.as_millis()
				))
			})?
	}

	async fn try_lookup(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
		let bytes = match self.bounded(self.backend.get_bytes(key.as_str())).await {
			Ok(bytes) => bytes,
			Err(StorageError::NotFound) => return Ok(None),
			Err(e) => return Err(CacheError::Unavailable(e.to_string())),
		};

		let entry: CacheEntry = serde_json::from_slice(&bytes)
			.map_err(|e| CacheError::Serialization(e.to_string()))?;

		if entry.key != key.as_str() || !entry.is_valid(self.clock.now()) {
			return Ok(None);
		}
		Ok(Some(entry.payload))
	}

	/// Returns the stored body for `key`, or `None` on miss, expiry or failure.
	pub async fn lookup(&self, key: &CacheKey) -> Option<Vec<u8>> {
		if !self.settings.enabled {
			return None;
		}

		match self.try_lookup(key).await {
			Ok(Some(payload)) => {
				self.stats.record_hit();
				tracing::debug!(key = %key, "Cache hit");
				Some(payload)
			},
			Ok(None) => {
				self.stats.record_miss();
				tracing::debug!(key = %key, "Cache miss");
				None
			},
			Err(e) => {
				self.stats.record_lookup_failure();
				tracing::warn!(key = %key, error = %e, "Cache lookup failed, falling through");
				None
			},
		}
	}

	async fn try_store(&self, entry: &CacheEntry, ttl: Duration) -> Result<(), CacheError> {
		let bytes =
			serde_json::to_vec(entry).map_err(|e| CacheError::Serialization(e.to_string()))?;
		self.bounded(self.backend.set_bytes(&entry.key, bytes, Some(ttl)))
			.await
			.map_err(|e| CacheError::Unavailable(e.to_string()))
	}

	/// Overwrites the entry for `key`. `None` uses the family TTL.
	pub async fn store(&self, key: &CacheKey, payload: Vec<u8>, ttl: Option<Duration>) {
		if !self.settings.enabled {
			return;
		}

		let ttl = ttl.unwrap_or_else(|| self.settings.ttl_for(key.family()));
		let ttl_seconds = ttl.as_secs().max(1);
		let entry = CacheEntry::new(key.as_str(), payload, self.clock.now(), ttl_seconds);

		match self.try_store(&entry, Duration::from_secs(ttl_seconds)).await {
			Ok(()) => self.stats.record_store(),
			Err(e) => {
				self.stats.record_store_failure();
				tracing::warn!(key = %key, error = %e, "Failed to store cache entry");
			},
		}
	}

	async fn try_invalidate(&self, pattern: &str) -> Result<usize, CacheError> {
		let keys = self
			.bounded(self.backend.scan_keys(pattern))
			.await
			.map_err(|e| CacheError::InvalidationFailed(e.to_string()))?;
		if keys.is_empty() {
			return Ok(0);
		}
		self.bounded(self.backend.delete_many(&keys))
			.await
			.map_err(|e| CacheError::InvalidationFailed(e.to_string()))
	}

	/// Removes every entry whose key matches the glob `pattern`.
	///
	/// Best effort: failures are logged and reported as zero removals.
	pub async fn invalidate(&self, pattern: &str) -> usize {
		if !self.settings.enabled {
			return 0;
		}

		match self.try_invalidate(pattern).await {
			Ok(removed) => {
				self.stats.record_invalidation();
				tracing::debug!(pattern, removed, "Invalidated cache entries");
				removed
			},
			Err(e) => {
				self.stats.record_invalidation_failure();
				tracing::warn!(pattern, error = %e, "Cache invalidation failed, stale reads possible");
				0
			},
		}
	}

	/// Removes every entry of a resource family.
	pub async fn invalidate_family(&self, family: CacheFamily) -> usize {
		self.invalidate(&family.pattern()).await
	}

	/// Replays the cached body for `key`, or runs `fetch` and caches its
	/// JSON encoding. A failed fetch is returned as is and nothing is stored.
	pub async fn get_or_fetch<T, E, F, Fut>(&self, key: &CacheKey, fetch: F) -> Result<CachedResponse, E>
	where
		T: Serialize,
		E: From<CacheError>,
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		if let Some(body) = self.lookup(key).await {
			return Ok(CachedResponse {
				body,
				from_cache: true,
			});
		}

		let value = fetch().await?;
		let body =
			serde_json::to_vec(&value).map_err(|e| E::from(CacheError::Serialization(e.to_string())))?;
		self.store(key, body.clone(), None).await;

		Ok(CachedResponse {
			body,
			from_cache: false,
		})
	}
}
