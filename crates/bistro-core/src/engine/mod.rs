//! The assembled bistro engine.
//!
//! Holds the services built by [`BistroBuilder`](crate::BistroBuilder) and
//! the process-level storage janitor.

use crate::catalog::{MenuService, RecipeService};
use crate::orders::OrderService;
use bistro_cache::ResponseCache;
use bistro_config::Config;
use bistro_storage::StorageService;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Shared handles to every service of a running bistro instance.
#[derive(Clone)]
pub struct BistroEngine {
	config: Config,
	storage: Arc<StorageService>,
	cache: Arc<ResponseCache>,
	menu: Arc<MenuService>,
	recipes: Arc<RecipeService>,
	orders: Arc<OrderService>,
}

impl BistroEngine {
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		cache: Arc<ResponseCache>,
		menu: Arc<MenuService>,
		recipes: Arc<RecipeService>,
		orders: Arc<OrderService>,
	) -> Self {
		Self {
			config,
			storage,
			cache,
			menu,
			recipes,
			orders,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn cache(&self) -> &Arc<ResponseCache> {
		&self.cache
	}

	pub fn menu(&self) -> &Arc<MenuService> {
		&self.menu
	}

	pub fn recipes(&self) -> &Arc<RecipeService> {
		&self.recipes
	}

	pub fn orders(&self) -> &Arc<OrderService> {
		&self.orders
	}

	/// Removes expired documents once. Returns how many were removed.
	pub async fn cleanup_once(&self) -> usize {
		match self.storage.cleanup_expired().await {
			Ok(count) => {
				if count > 0 {
					tracing::debug!("Storage cleanup: removed {} expired entries", count);
				}
				count
			},
			Err(e) => {
				tracing::warn!("Storage cleanup failed: {}", e);
				0
			},
		}
	}

	/// Starts the periodic storage cleanup task.
	///
	/// The task runs until the returned handle is aborted.
	pub fn spawn_cleanup(&self) -> JoinHandle<()> {
		let engine = self.clone();
		let period = Duration::from_secs(self.config.storage.cleanup_interval_seconds);
		tokio::spawn(async move {
			let mut interval = tokio::time::interval(period);
			loop {
				interval.tick().await;
				engine.cleanup_once().await;
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use crate::{BistroBuilder, BistroFactories};
	use bistro_config::Config;
	use bistro_types::StorageKey;
	use std::time::Duration;

	fn engine() -> crate::BistroEngine {
		let config: Config = r#"
[service]
id = "janitor-test"

[storage]
primary = "memory"
cleanup_interval_seconds = 10
[storage.implementations.memory]
"#
		.parse()
		.unwrap();
		BistroBuilder::new(config)
			.build(BistroFactories::with_all_storage())
			.unwrap()
	}

	#[tokio::test(start_paused = true)]
	async fn test_cleanup_removes_expired_documents() {
		let engine = engine();
		engine
			.storage()
			.store_with_ttl(
				StorageKey::Orders.as_str(),
				"draft",
				&"temporary",
				Some(Duration::from_secs(5)),
			)
			.await
			.unwrap();

		assert_eq!(engine.cleanup_once().await, 0);
		tokio::time::advance(Duration::from_secs(6)).await;
		assert_eq!(engine.cleanup_once().await, 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_spawned_cleanup_runs_on_interval() {
		let engine = engine();
		engine
			.storage()
			.store_with_ttl(
				StorageKey::Orders.as_str(),
				"draft",
				&"temporary",
				Some(Duration::from_secs(5)),
			)
			.await
			.unwrap();

		let handle = engine.spawn_cleanup();
		tokio::time::sleep(Duration::from_secs(11)).await;
		handle.abort();

		// The janitor already removed it on its second tick
		assert_eq!(engine.cleanup_once().await, 0);
	}
}
