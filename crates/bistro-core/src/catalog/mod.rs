//! Catalog services: the backing queries behind the cached read endpoints.
//!
//! Queries run over every document of a namespace, then filter, sort and
//! paginate in memory. Write operations evict the matching cache family
//! before they return, so a client re-reading right after a write never sees
//! the previous payload.

use bistro_cache::CacheError;
use bistro_storage::StorageError;
use thiserror::Error;

pub mod menu;
pub mod recipes;

pub use menu::{MenuQuery, MenuService, MenuSort};
pub use recipes::{
	MealPlanQuery, RecipeQuery, RecipeService, RecipeSort, SubstituteQuery, SuggestionQuery,
};

/// Errors that can occur in catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
	#[error("{kind} not found: {id}")]
	NotFound { kind: &'static str, id: String },
	#[error("Validation error: {0}")]
	Validation(String),
	/// The backing query failed; nothing is cached for it.
	#[error("Storage error: {0}")]
	Storage(String),
	#[error(transparent)]
	Cache(#[from] CacheError),
}

impl CatalogError {
	fn from_storage(kind: &'static str, id: &str, e: StorageError) -> Self {
		match e {
			StorageError::NotFound => CatalogError::NotFound {
				kind,
				id: id.to_string(),
			},
			other => CatalogError::Storage(other.to_string()),
		}
	}
}

impl From<StorageError> for CatalogError {
	fn from(e: StorageError) -> Self {
		CatalogError::Storage(e.to_string())
	}
}

/// Splits a comma separated filter value, dropping blanks.
fn split_list(value: &str) -> Vec<String> {
	value
		.split(',')
		.map(str::trim)
		.filter(|v| !v.is_empty())
		.map(str::to_string)
		.collect()
}

fn contains_ignore_case(haystack: &str, needle_lower: &str) -> bool {
	haystack.to_lowercase().contains(needle_lower)
}
