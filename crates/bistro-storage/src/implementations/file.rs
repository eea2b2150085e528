//! File-based storage backend.
//!
//! Every key is stored in its own file below `storage_path`. Files start with
//! a fixed header carrying the expiry time and the original key, so that key
//! scans can recover keys and expired data is never served. Writes go through
//! an exclusive lock on a directory-wide lock file, which keeps
//! compare-and-swap atomic across tasks and processes sharing the directory.

use crate::{glob_match, StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use bistro_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, StorageKey, ValidationError,
};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;

const LOCK_FILE: &str = ".bistro.lock";
/// Longest hex prefix used in a file name before falling back to a hash suffix.
const MAX_HEX_NAME: usize = 160;

fn unix_now() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}

/// Fixed-size file header.
///
/// Binary layout (64 bytes total):
/// - [0-3]: Magic bytes "BSTR"
/// - [4-5]: Version (u16, little-endian)
/// - [6-13]: Expiration timestamp (u64, little-endian, Unix seconds, 0 = never)
/// - [14-15]: Length of the key that follows the header (u16, little-endian)
/// - [16-63]: Reserved
#[derive(Debug, Clone, PartialEq)]
struct FileHeader {
	expires_at: u64,
	key_len: u16,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"BSTR";
	const VERSION: u16 = 1;
	const SIZE: usize = 64;

	fn new(ttl: Duration, key_len: u16) -> Self {
		let expires_at = if ttl.is_zero() {
			0
		} else {
			unix_now().saturating_add(ttl.as_secs().max(1))
		};
		Self {
			expires_at,
			key_len,
		}
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&Self::VERSION.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes[14..16].copy_from_slice(&self.key_len.to_le_bytes());
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(StorageError::Backend("File too small for header".into()));
		}
		if &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Unknown file format".into()));
		}
		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}

		let mut expires_bytes = [0u8; 8];
		expires_bytes.copy_from_slice(&bytes[6..14]);

		Ok(Self {
			expires_at: u64::from_le_bytes(expires_bytes),
			key_len: u16::from_le_bytes([bytes[14], bytes[15]]),
		})
	}

	fn is_expired(&self) -> bool {
		self.expires_at != 0 && unix_now() >= self.expires_at
	}
}

/// A decoded storage file.
struct Record {
	header: FileHeader,
	key: String,
	value: Vec<u8>,
}

impl Record {
	fn encode(key: &str, value: &[u8], ttl: Duration) -> Result<Vec<u8>, StorageError> {
		let key_len = u16::try_from(key.len())
			.map_err(|_| StorageError::Backend(format!("Key too long: {} bytes", key.len())))?;
		let header = FileHeader::new(ttl, key_len);

		let mut data = Vec::with_capacity(FileHeader::SIZE + key.len() + value.len());
		data.extend_from_slice(&header.serialize());
		data.extend_from_slice(key.as_bytes());
		data.extend_from_slice(value);
		Ok(data)
	}

	fn decode(data: &[u8]) -> Result<Self, StorageError> {
		let header = FileHeader::deserialize(data)?;
		let key_end = FileHeader::SIZE + header.key_len as usize;
		if data.len() < key_end {
			return Err(StorageError::Backend("Truncated storage file".into()));
		}
		let key = String::from_utf8(data[FileHeader::SIZE..key_end].to_vec())
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		Ok(Self {
			header,
			key,
			value: data[key_end..].to_vec(),
		})
	}

	/// The value, if this record holds `key` and has not expired.
	fn live_value_for(self, key: &str) -> Option<Vec<u8>> {
		(self.key == key && !self.header.is_expired()).then_some(self.value)
	}
}

/// 64-bit FNV-1a, used to keep long keys within file name limits.
fn fnv1a(data: &[u8]) -> u64 {
	data.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
		(hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
	})
}

/// Maps a key to a file name. Short keys are hex encoded verbatim; long keys
/// keep a hex prefix and gain a hash suffix. The full key is stored in the
/// file, so a hash collision reads as a miss instead of returning wrong data.
fn file_name_for(key: &str) -> String {
	let encoded = hex::encode(key.as_bytes());
	if encoded.len() <= MAX_HEX_NAME {
		format!("{}.bin", encoded)
	} else {
		format!(
			"{}-{:016x}.bin",
			&encoded[..MAX_HEX_NAME],
			fnv1a(key.as_bytes())
		)
	}
}

/// Exclusive lock on the storage directory, released on drop.
struct DirLock {
	file: File,
}

impl DirLock {
	fn acquire(base_path: &Path) -> Result<Self, StorageError> {
		std::fs::create_dir_all(base_path).map_err(|e| StorageError::Backend(e.to_string()))?;
		let file = OpenOptions::new()
			.create(true)
			.truncate(false)
			.write(true)
			.open(base_path.join(LOCK_FILE))
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		file.lock_exclusive()
			.map_err(|e| StorageError::Backend(format!("Failed to lock storage: {}", e)))?;
		Ok(Self { file })
	}
}

impl Drop for DirLock {
	fn drop(&mut self) {
		let _ = FileExt::unlock(&self.file);
	}
}

fn read_record(path: &Path) -> Result<Option<Record>, StorageError> {
	match std::fs::read(path) {
		Ok(data) => Record::decode(&data).map(Some),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
		Err(e) => Err(StorageError::Backend(e.to_string())),
	}
}

/// Writes via a temp file and rename so readers never see a partial file.
fn write_atomically(path: &Path, data: &[u8]) -> Result<(), StorageError> {
	let temp_path = path.with_extension("tmp");
	std::fs::write(&temp_path, data).map_err(|e| StorageError::Backend(e.to_string()))?;
	std::fs::rename(&temp_path, path).map_err(|e| StorageError::Backend(e.to_string()))
}

async fn blocking<T, F>(task: F) -> Result<T, StorageError>
where
	F: FnOnce() -> Result<T, StorageError> + Send + 'static,
	T: Send + 'static,
{
	tokio::task::spawn_blocking(task)
		.await
		.map_err(|e| StorageError::Backend(e.to_string()))?
}

/// TTL configuration for different storage namespaces.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<StorageKey, Duration>,
}

impl TtlConfig {
	/// Creates TTL config from TOML configuration (`ttl_<namespace>` keys).
	fn from_config(config: &toml::Value) -> Self {
		let mut ttls = HashMap::new();

		if let Some(table) = config.as_table() {
			for storage_key in StorageKey::all() {
				let config_key = format!("ttl_{}", storage_key.as_str());
				if let Some(ttl_value) = table
					.get(&config_key)
					.and_then(|v| v.as_integer())
					.and_then(|v| u64::try_from(v).ok())
				{
					ttls.insert(storage_key, Duration::from_secs(ttl_value));
				}
			}
		}

		Self { ttls }
	}

	fn get_ttl(&self, storage_key: StorageKey) -> Duration {
		self.ttls
			.get(&storage_key)
			.copied()
			.unwrap_or(Duration::ZERO)
	}
}

/// File-based storage implementation.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
	/// TTL defaults for writes that do not specify one.
	ttl_config: TtlConfig,
}

impl FileStorage {
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path,
			ttl_config,
		}
	}

	fn get_file_path(&self, key: &str) -> PathBuf {
		self.base_path.join(file_name_for(key))
	}

	/// Resolves the TTL for a write: explicit values win, otherwise the
	/// namespace default applies (e.g. "orders:123" -> `ttl_orders`).
	fn effective_ttl(&self, key: &str, ttl: Option<Duration>) -> Duration {
		match ttl {
			Some(ttl) if !ttl.is_zero() => ttl,
			_ => {
				let namespace = key.split(':').next().unwrap_or("");
				namespace
					.parse::<StorageKey>()
					.map(|sk| self.ttl_config.get_ttl(sk))
					.unwrap_or(Duration::ZERO)
			},
		}
	}

	/// Reads every record in the directory, skipping foreign or broken files.
	async fn read_all(&self) -> Result<Vec<(PathBuf, Record)>, StorageError> {
		let mut records = Vec::new();
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(records),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("bin")) {
				continue;
			}
			match fs::read(&path).await {
				Ok(data) => match Record::decode(&data) {
					Ok(record) => records.push((path, record)),
					Err(e) => tracing::debug!("Skipping file {:?}: {}", path, e),
				},
				Err(e) => {
					tracing::debug!("Skipping file {:?}: could not be read: {}", path, e);
				},
			}
		}
		Ok(records)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let data = match fs::read(self.get_file_path(key)).await {
			Ok(data) => data,
			Err(e) if e.kind() == ErrorKind::NotFound => return Err(StorageError::NotFound),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		Record::decode(&data)?
			.live_value_for(key)
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let data = Record::encode(key, &value, self.effective_ttl(key, ttl))?;
		let base_path = self.base_path.clone();
		let path = self.get_file_path(key);

		blocking(move || {
			let _lock = DirLock::acquire(&base_path)?;
			write_atomically(&path, &data)
		})
		.await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let base_path = self.base_path.clone();
		let path = self.get_file_path(key);

		blocking(move || {
			let _lock = DirLock::acquire(&base_path)?;
			match std::fs::remove_file(&path) {
				Ok(_) => Ok(()),
				Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
				Err(e) => Err(StorageError::Backend(e.to_string())),
			}
		})
		.await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		match self.get_bytes(key).await {
			Ok(_) => Ok(true),
			Err(StorageError::NotFound) => Ok(false),
			Err(e) => Err(e),
		}
	}

	async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StorageError> {
		let mut keys: Vec<String> = self
			.read_all()
			.await?
			.into_iter()
			.filter(|(_, record)| !record.header.is_expired() && glob_match(pattern, &record.key))
			.map(|(_, record)| record.key)
			.collect();
		keys.sort();
		Ok(keys)
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: &[u8],
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		let data = Record::encode(key, &value, self.effective_ttl(key, ttl))?;
		let base_path = self.base_path.clone();
		let path = self.get_file_path(key);
		let key = key.to_string();
		let expected = expected.to_vec();

		blocking(move || {
			let _lock = DirLock::acquire(&base_path)?;
			let current = read_record(&path)?.and_then(|record| record.live_value_for(&key));
			if current.as_deref() != Some(expected.as_slice()) {
				return Ok(false);
			}
			write_atomically(&path, &data)?;
			Ok(true)
		})
		.await
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let mut removed = 0;
		for (path, record) in self.read_all().await? {
			if !record.header.is_expired() {
				continue;
			}
			if let Err(e) = fs::remove_file(&path).await {
				tracing::warn!("Failed to remove expired file {:?}: {}", path, e);
			} else {
				removed += 1;
			}
		}
		Ok(removed)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let mut optional_fields = vec![Field::new("storage_path", FieldType::String)];

		for storage_key in StorageKey::all() {
			optional_fields.push(Field::new(
				format!("ttl_{}", storage_key.as_str()),
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			));
		}

		Schema::new(vec![], optional_fields).validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
/// - `ttl_orders`, `ttl_menu_items`, `ttl_recipe_docs`: default TTL in seconds (0 = never)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage")
		.to_string();

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config),
	)))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
