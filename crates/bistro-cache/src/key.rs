//! Cache key definitions.
//!
//! A key is `<prefix>:<path>` followed by `?<query>` when the request carried
//! a query string. Query pairs are sorted so that the same parameter set in
//! any order maps to the same key.

use std::fmt;
use std::str::FromStr;

/// Group of cached resources invalidated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheFamily {
	Menu,
	Recipes,
}

impl CacheFamily {
	pub fn as_str(&self) -> &'static str {
		match self {
			CacheFamily::Menu => "menu",
			CacheFamily::Recipes => "recipes",
		}
	}

	/// Glob matching every key of the family, e.g. `menu:*`.
	pub fn pattern(&self) -> String {
		format!("{}:*", self.as_str())
	}

	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Menu, Self::Recipes].into_iter()
	}
}

impl fmt::Display for CacheFamily {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for CacheFamily {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"menu" => Ok(Self::Menu),
			"recipes" => Ok(Self::Recipes),
			other => Err(format!("Unknown cache family: {}", other)),
		}
	}
}

/// Resource prefix of a cached read endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachePrefix {
	/// Menu listing
	MenuAll,
	/// Single menu item
	MenuItem,
	/// Menu full-text search
	MenuSearch,
	/// Menu items of one category
	MenuCategory,
	/// Recipe listing
	RecipesList,
	/// Single recipe
	RecipesDetail,
	/// Recipe suggestions for nutrition targets
	RecipesSuggestions,
	/// Generated meal plan
	RecipesMealPlan,
	/// Ingredient substitutes
	RecipesSubstitutes,
}

impl CachePrefix {
	pub fn as_str(&self) -> &'static str {
		match self {
			CachePrefix::MenuAll => "menu:all",
			CachePrefix::MenuItem => "menu:item",
			CachePrefix::MenuSearch => "menu:search",
			CachePrefix::MenuCategory => "menu:category",
			CachePrefix::RecipesList => "recipes:list",
			CachePrefix::RecipesDetail => "recipes:detail",
			CachePrefix::RecipesSuggestions => "recipes:suggestions",
			CachePrefix::RecipesMealPlan => "recipes:mealplan",
			CachePrefix::RecipesSubstitutes => "recipes:substitutes",
		}
	}

	pub fn family(&self) -> CacheFamily {
		match self {
			CachePrefix::MenuAll
			| CachePrefix::MenuItem
			| CachePrefix::MenuSearch
			| CachePrefix::MenuCategory => CacheFamily::Menu,
			CachePrefix::RecipesList
			| CachePrefix::RecipesDetail
			| CachePrefix::RecipesSuggestions
			| CachePrefix::RecipesMealPlan
			| CachePrefix::RecipesSubstitutes => CacheFamily::Recipes,
		}
	}
}

/// Canonical form of a raw query string: non-empty `&`-separated pairs in
/// lexicographic order. Values are kept exactly as sent.
pub fn canonical_query(query: &str) -> String {
	let mut pairs: Vec<&str> = query.split('&').filter(|pair| !pair.is_empty()).collect();
	pairs.sort_unstable();
	pairs.join("&")
}

/// Deterministic key of a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
	family: CacheFamily,
	value: String,
}

impl CacheKey {
	/// Builds the key for a request path and its optional raw query string.
	pub fn new(prefix: CachePrefix, path: &str, query: Option<&str>) -> Self {
		let query = query.map(canonical_query).unwrap_or_default();
		let value = if query.is_empty() {
			format!("{}:{}", prefix.as_str(), path)
		} else {
			format!("{}:{}?{}", prefix.as_str(), path, query)
		};

		Self {
			family: prefix.family(),
			value,
		}
	}

	pub fn family(&self) -> CacheFamily {
		self.family
	}

	pub fn as_str(&self) -> &str {
		&self.value
	}
}

impl fmt::Display for CacheKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.value)
	}
}
