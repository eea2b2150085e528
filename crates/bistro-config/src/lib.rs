//! Configuration module for the bistro service.
//!
//! This module provides the structures and utilities for loading the service
//! configuration from TOML files and validating it before any component is
//! built.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["storage.toml", "cache.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub use loader::ConfigLoader;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message without the input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the bistro service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service instance.
	pub service: ServiceConfig,
	/// Document storage backends.
	pub storage: StorageConfig,
	/// Response cache settings.
	#[serde(default)]
	pub cache: CacheConfig,
	/// HTTP API server settings.
	pub api: Option<ApiConfig>,
}

/// Service instance identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Identifier used in logs.
	pub id: String,
}

/// Configuration for the storage backends.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Implementation holding orders, menu items and recipes.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	#[serde(default = "default_cleanup_interval")]
	pub cleanup_interval_seconds: u64,
}

/// TTL override for one cache family.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheFamilyConfig {
	pub ttl_seconds: u64,
}

/// Configuration for the response cache.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
	#[serde(default = "default_true")]
	pub enabled: bool,
	/// Storage implementation holding cache entries.
	#[serde(default = "default_cache_backend")]
	pub backend: String,
	#[serde(default = "default_cache_ttl")]
	pub default_ttl_seconds: u64,
	/// Budget for a single cache backend call before it counts as a miss.
	#[serde(default = "default_cache_operation_timeout")]
	pub operation_timeout_ms: u64,
	/// Per-family overrides keyed by family name (`menu`, `recipes`).
	#[serde(default)]
	pub families: HashMap<String, CacheFamilyConfig>,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			enabled: default_true(),
			backend: default_cache_backend(),
			default_ttl_seconds: default_cache_ttl(),
			operation_timeout_ms: default_cache_operation_timeout(),
			families: HashMap::new(),
		}
	}
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
}

fn default_true() -> bool {
	true
}

fn default_cleanup_interval() -> u64 {
	300
}

fn default_cache_backend() -> String {
	"memory".to_string()
}

/// One hour, matching the TTL of every cached read endpoint.
fn default_cache_ttl() -> u64 {
	3600
}

fn default_cache_operation_timeout() -> u64 {
	250
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

fn default_max_request_size() -> usize {
	1024 * 1024 // 1MB
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let var_name = var_name.as_str();

		let value = match (std::env::var(var_name), cap.get(2)) {
			(Ok(v), _) => v,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					var_name
				)));
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates cross-section references and numeric bounds.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}
		if !(1..=86400).contains(&self.storage.cleanup_interval_seconds) {
			return Err(ConfigError::Validation(format!(
				"storage.cleanup_interval_seconds must be between 1 and 86400, got {}",
				self.storage.cleanup_interval_seconds
			)));
		}

		if self.cache.enabled {
			if !self.storage.implementations.contains_key(&self.cache.backend) {
				return Err(ConfigError::Validation(format!(
					"Cache backend '{}' not found in storage implementations",
					self.cache.backend
				)));
			}
			if self.cache.default_ttl_seconds == 0 {
				return Err(ConfigError::Validation(
					"cache.default_ttl_seconds must be greater than 0".into(),
				));
			}
			if self.cache.operation_timeout_ms == 0 {
				return Err(ConfigError::Validation(
					"cache.operation_timeout_ms must be greater than 0".into(),
				));
			}
			for (family, family_config) in &self.cache.families {
				if family_config.ttl_seconds == 0 {
					return Err(ConfigError::Validation(format!(
						"cache.families.{}.ttl_seconds must be greater than 0",
						family
					)));
				}
			}
		}

		if let Some(api) = &self.api {
			if api.timeout_seconds == 0 {
				return Err(ConfigError::Validation(
					"api.timeout_seconds must be greater than 0".into(),
				));
			}
			if api.max_request_size == 0 {
				return Err(ConfigError::Validation(
					"api.max_request_size must be greater than 0".into(),
				));
			}
		}

		Ok(())
	}
}

/// Parses configuration from a TOML string.
///
/// Environment variables are resolved and the configuration is validated
/// after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
