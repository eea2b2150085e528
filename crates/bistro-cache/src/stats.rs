//! Cache statistics.
//!
//! Cache failures never reach callers, so these counters are the only way to
//! tell that reads may be stale or that the cache is not being used.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CacheStats {
	hits: AtomicU64,
	misses: AtomicU64,
	stores: AtomicU64,
	store_failures: AtomicU64,
	lookup_failures: AtomicU64,
	invalidations: AtomicU64,
	invalidation_failures: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsSnapshot {
	pub hits: u64,
	pub misses: u64,
	pub stores: u64,
	pub store_failures: u64,
	pub lookup_failures: u64,
	pub invalidations: u64,
	pub invalidation_failures: u64,
}

fn bump(counter: &AtomicU64) {
	counter.fetch_add(1, Ordering::Relaxed);
}

impl CacheStats {
	pub(crate) fn record_hit(&self) {
		bump(&self.hits);
	}

	pub(crate) fn record_miss(&self) {
		bump(&self.misses);
	}

	pub(crate) fn record_store(&self) {
		bump(&self.stores);
	}

	pub(crate) fn record_store_failure(&self) {
		bump(&self.store_failures);
	}

	pub(crate) fn record_lookup_failure(&self) {
		bump(&self.lookup_failures);
	}

	pub(crate) fn record_invalidation(&self) {
		bump(&self.invalidations);
	}

	pub(crate) fn record_invalidation_failure(&self) {
		bump(&self.invalidation_failures);
	}

	pub fn snapshot(&self) -> CacheStatsSnapshot {
		CacheStatsSnapshot {
			hits: self.hits.load(Ordering::Relaxed),
			misses: self.misses.load(Ordering::Relaxed),
			stores: self.stores.load(Ordering::Relaxed),
			store_failures: self.store_failures.load(Ordering::Relaxed),
			lookup_failures: self.lookup_failures.load(Ordering::Relaxed),
			invalidations: self.invalidations.load(Ordering::Relaxed),
			invalidation_failures: self.invalidation_failures.load(Ordering::Relaxed),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_snapshot_serializes_camel_case() {
		let stats = CacheStats::default();
		stats.record_hit();
		stats.record_hit();
		stats.record_invalidation_failure();

		let json = serde_json::to_value(stats.snapshot()).unwrap();
		assert_eq!(json["hits"], 2);
		assert_eq!(json["invalidationFailures"], 1);
		assert_eq!(json["misses"], 0);
	}
}
