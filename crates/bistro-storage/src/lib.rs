//! Storage module for the bistro service.
//!
//! This module provides abstractions for the key-value store behind both the
//! document collections (orders, menu items, recipes) and the response cache.
//! Backends implement [`StorageInterface`]; callers use the typed
//! [`StorageService`] wrapper.

use async_trait::async_trait;
use bistro_types::{ConfigSchema, ImplementationRegistry};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod pattern;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

pub use pattern::glob_match;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// A conditional write found a different value than expected.
	#[error("Conflict: value for '{0}' changed concurrently")]
	Conflict(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Keys are flat strings of the form `<namespace>:<id>`. Values are opaque
/// bytes with an optional time-to-live; an expired value must never be
/// returned by any read.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, overwriting any previous value.
	///
	/// `None` or a zero TTL means the backend default for the key.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Deletes several keys, returning how many were present.
	async fn delete_many(&self, keys: &[String]) -> Result<usize, StorageError> {
		let mut removed = 0;
		for key in keys {
			if self.exists(key).await? {
				self.delete(key).await?;
				removed += 1;
			}
		}
		Ok(removed)
	}

	/// Checks if a live (non-expired) key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists live keys matching a glob pattern (`*` and `?`), sorted.
	async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StorageError>;

	/// Atomically replaces the value of `key` if it currently equals `expected`.
	///
	/// Returns `Ok(false)` without writing when the stored value differs or
	/// the key is missing.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: &[u8],
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Removes expired entries from storage (optional operation).
	/// Returns the number of entries removed.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0)
	}
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns `(name, factory)` pairs used by the builder to resolve the
/// backends named in the configuration.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// A decoded document and the stored bytes it came from.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
	pub value: T,
	bytes: Vec<u8>,
}

/// High-level storage service that provides typed operations.
///
/// Documents are serialized to JSON and stored under `<namespace>:<id>`.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

fn key_for(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

fn to_json<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Gives access to the raw backend, used by the response cache.
	pub fn backend(&self) -> &dyn StorageInterface {
		self.backend.as_ref()
	}

	/// Stores a serializable value with optional time-to-live.
	pub async fn store_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let bytes = to_json(data)?;
		self.backend
			.set_bytes(&key_for(namespace, id), bytes, ttl)
			.await
	}

	/// Stores a serializable value without time-to-live.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(namespace, id, data, None).await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&key_for(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Retrieves every document of a namespace, ordered by key.
	///
	/// Documents that expire between the scan and the read are skipped.
	pub async fn list<T: DeserializeOwned>(&self, namespace: &str) -> Result<Vec<T>, StorageError> {
		let keys = self.backend.scan_keys(&key_for(namespace, "*")).await?;
		let mut documents = Vec::with_capacity(keys.len());
		for key in keys {
			match self.backend.get_bytes(&key).await {
				Ok(bytes) => documents.push(
					serde_json::from_slice(&bytes)
						.map_err(|e| StorageError::Serialization(e.to_string()))?,
				),
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			}
		}
		Ok(documents)
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&key_for(namespace, id)).await
	}

	/// Updates an existing value in storage.
	///
	/// Returns `NotFound` if the key doesn't exist, making it semantically
	/// different from store() which will create or overwrite.
	pub async fn update<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = key_for(namespace, id);
		if !self.backend.exists(&key).await? {
			return Err(StorageError::NotFound);
		}
		self.backend.set_bytes(&key, to_json(data)?, None).await
	}

	/// Retrieves a value together with the exact bytes it was decoded from,
	/// for use as the precondition of [`StorageService::compare_and_swap`].
	pub async fn retrieve_snapshot<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Snapshot<T>, StorageError> {
		let bytes = self.backend.get_bytes(&key_for(namespace, id)).await?;
		let value =
			serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
		Ok(Snapshot { value, bytes })
	}

	/// Replaces the document with `next` only if storage still holds the
	/// bytes `expected` was read from.
	///
	/// Fails with `Conflict` when another writer got there first and with
	/// `NotFound` when the document disappeared.
	pub async fn compare_and_swap<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		expected: &Snapshot<T>,
		next: &T,
	) -> Result<(), StorageError> {
		let key = key_for(namespace, id);
		let swapped = self
			.backend
			.compare_and_swap(&key, &expected.bytes, to_json(next)?, None)
			.await?;

		if swapped {
			Ok(())
		} else if self.backend.exists(&key).await? {
			Err(StorageError::Conflict(key))
		} else {
			Err(StorageError::NotFound)
		}
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&key_for(namespace, id)).await
	}

	/// Removes expired entries from storage.
	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}
}
