//! Storage-related types for the bistro service.

use std::str::FromStr;

/// Storage keys for different data collections.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Key for storing order documents
	Orders,
	/// Key for storing menu item documents
	MenuItems,
	/// Key for storing recipe documents. Kept apart from the `recipes`
	/// cache family so invalidation never reaches stored recipes.
	Recipes,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::MenuItems => "menu_items",
			StorageKey::Recipes => "recipe_docs",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Orders, Self::MenuItems, Self::Recipes].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"orders" => Ok(Self::Orders),
			"menu_items" => Ok(Self::MenuItems),
			"recipe_docs" => Ok(Self::Recipes),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
