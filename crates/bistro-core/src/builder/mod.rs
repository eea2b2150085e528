//! Builder for constructing the bistro engine.
//!
//! Resolves the storage backends named in the configuration through factory
//! functions, then wires the response cache, the catalog services and the
//! order service on top of them.

use crate::catalog::{MenuService, RecipeService};
use crate::engine::BistroEngine;
use crate::orders::OrderService;
use crate::state::OrderStateMachine;
use bistro_cache::{CacheFamily, CacheSettings, ResponseCache};
use bistro_config::{CacheConfig, Config};
use bistro_storage::implementations::memory::MemoryStorage;
use bistro_storage::{glob_match, StorageError, StorageInterface, StorageService};
use bistro_types::{Clock, StorageKey, SystemClock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during engine construction.
///
/// These errors indicate problems with configuration or missing required components
/// when building an engine instance.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for the storage implementations, keyed by name.
pub struct BistroFactories<SF> {
	pub storage_factories: HashMap<String, SF>,
}

impl BistroFactories<bistro_storage::StorageFactory> {
	/// Factories for every storage backend compiled into the crate.
	pub fn with_all_storage() -> Self {
		Self {
			storage_factories: bistro_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}
}

/// Builder for constructing a [`BistroEngine`] with pluggable storage.
pub struct BistroBuilder {
	config: Config,
	clock: Arc<dyn Clock>,
}

impl BistroBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			clock: Arc::new(SystemClock),
		}
	}

	/// Replaces the system clock, mostly for tests.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	/// Builds the engine using the given storage factories.
	pub fn build<SF>(self, factories: BistroFactories<SF>) -> Result<BistroEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		// Cache and documents may live in the same backend instance or
		// directory; invalidation must never reach a stored document.
		if let Some((family, namespace)) =
			namespace_collision(StorageKey::all().map(|key| key.as_str()))
		{
			return Err(BuilderError::Config(format!(
				"Cache family '{}' would invalidate documents of namespace '{}'",
				family, namespace
			)));
		}

		let primary = &self.config.storage.primary;
		let storage = Arc::new(StorageService::new(self.create_storage(
			"storage",
			primary,
			&factories,
		)?));

		let cache_config = &self.config.cache;
		let cache_backend: Arc<dyn StorageInterface> = if cache_config.enabled {
			Arc::from(self.create_storage("cache", &cache_config.backend, &factories)?)
		} else {
			tracing::info!(component = "cache", "Response cache disabled");
			Arc::new(MemoryStorage::new())
		};
		let cache = Arc::new(ResponseCache::new(
			cache_backend,
			cache_settings(cache_config)?,
			self.clock.clone(),
		));

		let menu = Arc::new(MenuService::new(
			storage.clone(),
			cache.clone(),
			self.clock.clone(),
		));
		let recipes = Arc::new(RecipeService::new(
			storage.clone(),
			cache.clone(),
			self.clock.clone(),
		));
		let state_machine = Arc::new(OrderStateMachine::new(storage.clone(), self.clock.clone()));
		let orders = Arc::new(OrderService::new(
			state_machine,
			menu.clone(),
			self.clock.clone(),
		));

		Ok(BistroEngine::new(
			self.config, storage, cache, menu, recipes, orders,
		))
	}

	/// Instantiates the storage implementation `name` for `component`.
	fn create_storage<SF>(
		&self,
		component: &'static str,
		name: &str,
		factories: &BistroFactories<SF>,
	) -> Result<Box<dyn StorageInterface>, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		let config = self.config.storage.implementations.get(name).ok_or_else(|| {
			BuilderError::Config(format!(
				"Storage implementation '{}' is not configured",
				name
			))
		})?;
		let factory = factories.storage_factories.get(name).ok_or_else(|| {
			BuilderError::MissingComponent(format!("storage implementation '{}'", name))
		})?;

		match factory(config) {
			Ok(implementation) => {
				tracing::info!(component, implementation = %name, "Loaded");
				Ok(implementation)
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create storage implementation"
				);
				Err(BuilderError::Config(format!(
					"Failed to create storage implementation '{}': {}",
					name, e
				)))
			},
		}
	}
}

/// Finds a document namespace whose keys match a cache family pattern.
fn namespace_collision<'a>(
	namespaces: impl Iterator<Item = &'a str>,
) -> Option<(CacheFamily, &'a str)> {
	let namespaces: Vec<&str> = namespaces.collect();
	CacheFamily::all().find_map(|family| {
		let pattern = family.pattern();
		namespaces
			.iter()
			.find(|ns| glob_match(&pattern, &format!("{}:any-id", ns)))
			.map(|ns| (family, *ns))
	})
}

/// Translates the cache section into runtime settings.
fn cache_settings(config: &CacheConfig) -> Result<CacheSettings, BuilderError> {
	let mut family_ttls = HashMap::new();
	for (name, family) in &config.families {
		let family_key: CacheFamily = name.parse().map_err(BuilderError::Config)?;
		family_ttls.insert(family_key, Duration::from_secs(family.ttl_seconds));
	}

	Ok(CacheSettings {
		enabled: config.enabled,
		default_ttl: Duration::from_secs(config.default_ttl_seconds),
		family_ttls,
		operation_timeout: Duration::from_millis(config.operation_timeout_ms),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	const CONFIG: &str = r#"
[service]
id = "bistro-test"

[storage]
primary = "memory"
[storage.implementations.memory]

[cache]
backend = "memory"
default_ttl_seconds = 600
[cache.families.recipes]
ttl_seconds = 60
"#;

	#[test]
	fn test_build_from_config() {
		let config: Config = CONFIG.parse().unwrap();
		let engine = BistroBuilder::new(config)
			.build(BistroFactories::with_all_storage())
			.unwrap();

		let settings = engine.cache().settings();
		assert_eq!(settings.ttl_for(CacheFamily::Menu), Duration::from_secs(600));
		assert_eq!(settings.ttl_for(CacheFamily::Recipes), Duration::from_secs(60));
		assert_eq!(engine.config().service.id, "bistro-test");
	}

	#[test]
	fn test_unknown_cache_family_is_rejected() {
		let config: Config = format!("{}[cache.families.drinks]\nttl_seconds = 5\n", CONFIG)
			.parse()
			.unwrap();
		let result = BistroBuilder::new(config).build(BistroFactories::with_all_storage());
		assert!(matches!(result, Err(BuilderError::Config(msg)) if msg.contains("drinks")));
	}

	#[test]
	fn test_document_namespaces_are_outside_cache_families() {
		assert_eq!(namespace_collision(StorageKey::all().map(|key| key.as_str())), None);
		assert_eq!(
			namespace_collision(["orders", "recipes"].into_iter()),
			Some((CacheFamily::Recipes, "recipes"))
		);
	}

	#[test]
	fn test_missing_factory() {
		let config: Config = CONFIG.parse().unwrap();
		let factories = BistroFactories::<bistro_storage::StorageFactory> {
			storage_factories: HashMap::new(),
		};
		let result = BistroBuilder::new(config).build(factories);
		assert!(matches!(result, Err(BuilderError::MissingComponent(_))));
	}

	#[test]
	fn test_disabled_cache_uses_throwaway_backend() {
		let config: Config = CONFIG
			.replace("backend = \"memory\"", "enabled = false\nbackend = \"missing\"")
			.parse()
			.unwrap();
		let engine = BistroBuilder::new(config)
			.build(BistroFactories::with_all_storage())
			.unwrap();
		assert!(!engine.cache().settings().enabled);
	}
}
