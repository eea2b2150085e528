//! Menu items.

use super::{contains_ignore_case, split_list, CatalogError};
use bistro_cache::{CacheFamily, ResponseCache};
use bistro_storage::StorageService;
use bistro_types::{
	Clock, MenuCategory, MenuItem, MenuItemPatch, NewMenuItem, Page, PageRequest, StorageKey,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Filters of the menu listing. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuQuery {
	pub category: Option<MenuCategory>,
	/// Comma separated; an item matches if it has any of the tags.
	pub tags: Option<String>,
	/// Comma separated; items containing any of these allergens are dropped.
	pub exclude_allergens: Option<String>,
	pub min_price: Option<Decimal>,
	pub max_price: Option<Decimal>,
	pub max_calories: Option<f64>,
	/// Case-insensitive match on name, English name and description.
	pub search: Option<String>,
	/// `field:asc` or `field:desc`.
	pub sort: Option<String>,
	pub page: Option<usize>,
	pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuSortField {
	Name,
	Price,
	PreparationTime,
	Rating,
	CreatedAt,
}

/// Sort order of the menu listing, newest first by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuSort {
	field: MenuSortField,
	descending: bool,
}

impl Default for MenuSort {
	fn default() -> Self {
		Self {
			field: MenuSortField::CreatedAt,
			descending: true,
		}
	}
}

impl FromStr for MenuSort {
	type Err = CatalogError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (field, direction) = s.split_once(':').unwrap_or((s, "asc"));
		let field = match field {
			"name" => MenuSortField::Name,
			"price" => MenuSortField::Price,
			"preparationTime" | "preparation_time" => MenuSortField::PreparationTime,
			"rating" => MenuSortField::Rating,
			"createdAt" | "created_at" => MenuSortField::CreatedAt,
			other => {
				return Err(CatalogError::Validation(format!(
					"Unsupported sort field: {}",
					other
				)))
			},
		};

		Ok(Self {
			field,
			descending: direction == "desc",
		})
	}
}

impl MenuSort {
	fn compare(&self, a: &MenuItem, b: &MenuItem) -> Ordering {
		let ordering = match self.field {
			MenuSortField::Name => a.name.cmp(&b.name),
			MenuSortField::Price => a.price.cmp(&b.price),
			MenuSortField::PreparationTime => a.preparation_time.cmp(&b.preparation_time),
			MenuSortField::Rating => a.rating.average.total_cmp(&b.rating.average),
			MenuSortField::CreatedAt => a.created_at.cmp(&b.created_at),
		};
		let ordering = if self.descending {
			ordering.reverse()
		} else {
			ordering
		};
		ordering.then_with(|| a.id.cmp(&b.id))
	}
}

/// Parsed form of a [`MenuQuery`].
struct MenuFilter {
	category: Option<MenuCategory>,
	tags: Vec<String>,
	exclude_allergens: Vec<String>,
	min_price: Option<Decimal>,
	max_price: Option<Decimal>,
	max_calories: Option<f64>,
	search: Option<String>,
}

impl MenuFilter {
	fn new(query: &MenuQuery) -> Self {
		Self {
			category: query.category,
			tags: query.tags.as_deref().map(split_list).unwrap_or_default(),
			exclude_allergens: query
				.exclude_allergens
				.as_deref()
				.map(split_list)
				.unwrap_or_default(),
			min_price: query.min_price,
			max_price: query.max_price,
			max_calories: query.max_calories,
			search: query
				.search
				.as_deref()
				.map(str::trim)
				.filter(|s| !s.is_empty())
				.map(str::to_lowercase),
		}
	}

	fn matches(&self, item: &MenuItem) -> bool {
		if !item.is_available {
			return false;
		}
		if self.category.is_some_and(|c| c != item.category) {
			return false;
		}
		if !self.tags.is_empty() && !item.tags.iter().any(|t| self.tags.contains(t)) {
			return false;
		}
		if item
			.allergens
			.iter()
			.any(|a| self.exclude_allergens.contains(a))
		{
			return false;
		}
		if self.min_price.is_some_and(|min| item.price < min)
			|| self.max_price.is_some_and(|max| item.price > max)
		{
			return false;
		}
		// Items without calorie data cannot satisfy a calorie bound.
		if let Some(max) = self.max_calories {
			if item.nutrition_info.calories.is_none_or(|c| c > max) {
				return false;
			}
		}
		if let Some(needle) = &self.search {
			return contains_ignore_case(&item.name, needle)
				|| contains_ignore_case(&item.name_en, needle)
				|| contains_ignore_case(&item.description, needle);
		}
		true
	}
}

/// Number of search terms found in the item's names and descriptions.
fn relevance(item: &MenuItem, terms: &[String]) -> usize {
	let text = format!(
		"{} {} {} {}",
		item.name, item.name_en, item.description, item.description_en
	)
	.to_lowercase();
	terms.iter().filter(|term| text.contains(term.as_str())).count()
}

fn validate_price(price: Decimal) -> Result<(), CatalogError> {
	if price.is_sign_negative() {
		return Err(CatalogError::Validation("Price cannot be negative".into()));
	}
	Ok(())
}

/// Menu item queries and mutations.
pub struct MenuService {
	storage: Arc<StorageService>,
	cache: Arc<ResponseCache>,
	clock: Arc<dyn Clock>,
}

impl MenuService {
	pub fn new(storage: Arc<StorageService>, cache: Arc<ResponseCache>, clock: Arc<dyn Clock>) -> Self {
		Self {
			storage,
			cache,
			clock,
		}
	}

	async fn all_items(&self) -> Result<Vec<MenuItem>, CatalogError> {
		Ok(self.storage.list(StorageKey::MenuItems.as_str()).await?)
	}

	/// Lists available items matching `query`, one page at a time.
	pub async fn list(&self, query: &MenuQuery) -> Result<Page<MenuItem>, CatalogError> {
		let sort = match query.sort.as_deref() {
			Some(sort) => sort.parse()?,
			None => MenuSort::default(),
		};
		let filter = MenuFilter::new(query);

		let mut items: Vec<MenuItem> = self
			.all_items()
			.await?
			.into_iter()
			.filter(|item| filter.matches(item))
			.collect();
		items.sort_by(|a, b| sort.compare(a, b));

		Ok(Page::from_sorted(items, PageRequest::new(query.page, query.limit)))
	}

	pub async fn get(&self, id: &str) -> Result<MenuItem, CatalogError> {
		self.storage
			.retrieve(StorageKey::MenuItems.as_str(), id)
			.await
			.map_err(|e| CatalogError::from_storage("Menu item", id, e))
	}

	/// Available items matching any word of `text`, best matches first.
	pub async fn search(&self, text: &str) -> Result<Vec<MenuItem>, CatalogError> {
		let terms: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
		if terms.is_empty() {
			return Err(CatalogError::Validation("Search text cannot be empty".into()));
		}

		let mut scored: Vec<(usize, MenuItem)> = self
			.all_items()
			.await?
			.into_iter()
			.filter(|item| item.is_available)
			.map(|item| (relevance(&item, &terms), item))
			.filter(|(score, _)| *score > 0)
			.collect();
		scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| a.name.cmp(&b.name)));

		Ok(scored.into_iter().map(|(_, item)| item).collect())
	}

	/// Available items of one category, by name.
	pub async fn by_category(&self, category: MenuCategory) -> Result<Vec<MenuItem>, CatalogError> {
		let mut items: Vec<MenuItem> = self
			.all_items()
			.await?
			.into_iter()
			.filter(|item| item.is_available && item.category == category)
			.collect();
		items.sort_by(|a, b| a.name.cmp(&b.name));
		Ok(items)
	}

	pub async fn create(&self, input: NewMenuItem) -> Result<MenuItem, CatalogError> {
		if input.name.trim().is_empty() {
			return Err(CatalogError::Validation("Menu item name is required".into()));
		}
		validate_price(input.price)?;

		let item = MenuItem::from_new(Uuid::new_v4().to_string(), input, self.clock.now());
		self.storage
			.store(StorageKey::MenuItems.as_str(), &item.id, &item)
			.await?;
		self.cache.invalidate_family(CacheFamily::Menu).await;

		tracing::info!(menu_item = %item.id, name = %item.name, "Menu item created");
		Ok(item)
	}

	pub async fn update(&self, id: &str, patch: MenuItemPatch) -> Result<MenuItem, CatalogError> {
		if let Some(price) = patch.price {
			validate_price(price)?;
		}
		if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
			return Err(CatalogError::Validation("Menu item name is required".into()));
		}

		let mut item = self.get(id).await?;
		item.apply_patch(patch, self.clock.now());
		self.storage
			.update(StorageKey::MenuItems.as_str(), id, &item)
			.await
			.map_err(|e| CatalogError::from_storage("Menu item", id, e))?;
		self.cache.invalidate_family(CacheFamily::Menu).await;

		tracing::info!(menu_item = %id, "Menu item updated");
		Ok(item)
	}

	pub async fn delete(&self, id: &str) -> Result<(), CatalogError> {
		if !self
			.storage
			.exists(StorageKey::MenuItems.as_str(), id)
			.await?
		{
			return Err(CatalogError::NotFound {
				kind: "Menu item",
				id: id.to_string(),
			});
		}
		self.storage
			.remove(StorageKey::MenuItems.as_str(), id)
			.await?;
		self.cache.invalidate_family(CacheFamily::Menu).await;

		tracing::info!(menu_item = %id, "Menu item deleted");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bistro_cache::{CacheKey, CachePrefix, CacheSettings};
	use bistro_storage::implementations::memory::MemoryStorage;
	use bistro_types::{ManualClock, NutritionInfo};

	struct Fixture {
		menu: MenuService,
		cache: Arc<ResponseCache>,
		clock: ManualClock,
	}

	fn fixture() -> Fixture {
		let clock = ManualClock::default();
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let cache = Arc::new(ResponseCache::new(
			Arc::new(MemoryStorage::new()),
			CacheSettings::default(),
			Arc::new(clock.clone()),
		));
		Fixture {
			menu: MenuService::new(storage, cache.clone(), Arc::new(clock.clone())),
			cache,
			clock,
		}
	}

	fn new_item(name: &str, category: MenuCategory, price: i64) -> NewMenuItem {
		NewMenuItem {
			name: name.into(),
			name_en: format!("{} (en)", name),
			category,
			price: Decimal::from(price),
			description: format!("Fresh {}", name.to_lowercase()),
			description_en: String::new(),
			nutrition_info: NutritionInfo::default(),
			ingredients: vec![],
			allergens: vec![],
			image: "/img/placeholder.png".into(),
			is_available: true,
			preparation_time: 10,
			tags: vec![],
			created_by: "staff-1".into(),
		}
	}

	async fn seed(f: &Fixture) -> Vec<MenuItem> {
		let mut created = Vec::new();
		let specs = [
			("Tomato Soup", MenuCategory::Soup, 12, vec!["vegan"], vec![], Some(180.0)),
			("Beef Noodles", MenuCategory::Staple, 28, vec!["spicy"], vec!["gluten"], Some(650.0)),
			("Caesar Salad", MenuCategory::Salad, 22, vec![], vec!["egg", "dairy"], None),
			("Lemon Tea", MenuCategory::Drink, 8, vec!["vegan", "cold"], vec![], Some(60.0)),
		];
		for (name, category, price, tags, allergens, calories) in specs {
			let mut input = new_item(name, category, price);
			input.tags = tags.into_iter().map(String::from).collect();
			input.allergens = allergens.into_iter().map(String::from).collect();
			input.nutrition_info.calories = calories;
			created.push(f.menu.create(input).await.unwrap());
			f.clock.advance_secs(1);
		}
		created
	}

	fn names(page: &Page<MenuItem>) -> Vec<&str> {
		page.data.iter().map(|i| i.name.as_str()).collect()
	}

	#[tokio::test]
	async fn test_default_listing_is_newest_first() {
		let f = fixture();
		seed(&f).await;

		let page = f.menu.list(&MenuQuery::default()).await.unwrap();
		assert_eq!(
			names(&page),
			vec!["Lemon Tea", "Caesar Salad", "Beef Noodles", "Tomato Soup"]
		);
		assert_eq!(page.total, 4);
		assert_eq!(page.pagination.pages, 1);
	}

	#[tokio::test]
	async fn test_filters() {
		let f = fixture();
		seed(&f).await;

		let query = MenuQuery {
			tags: Some("vegan,spicy".into()),
			exclude_allergens: Some("gluten".into()),
			sort: Some("price:asc".into()),
			..Default::default()
		};
		let page = f.menu.list(&query).await.unwrap();
		assert_eq!(names(&page), vec!["Lemon Tea", "Tomato Soup"]);

		let query = MenuQuery {
			min_price: Some(Decimal::from(10)),
			max_price: Some(Decimal::from(25)),
			..Default::default()
		};
		let page = f.menu.list(&query).await.unwrap();
		assert_eq!(names(&page), vec!["Caesar Salad", "Tomato Soup"]);

		let query = MenuQuery {
			max_calories: Some(200.0),
			sort: Some("name:asc".into()),
			..Default::default()
		};
		let page = f.menu.list(&query).await.unwrap();
		assert_eq!(names(&page), vec!["Lemon Tea", "Tomato Soup"]);

		let query = MenuQuery {
			search: Some("NOODLE".into()),
			..Default::default()
		};
		let page = f.menu.list(&query).await.unwrap();
		assert_eq!(names(&page), vec!["Beef Noodles"]);
	}

	#[tokio::test]
	async fn test_pagination() {
		let f = fixture();
		seed(&f).await;

		let query = MenuQuery {
			sort: Some("price:desc".into()),
			page: Some(2),
			limit: Some(3),
			..Default::default()
		};
		let page = f.menu.list(&query).await.unwrap();
		assert_eq!(names(&page), vec!["Lemon Tea"]);
		assert_eq!(page.count, 1);
		assert_eq!(page.total, 4);
		assert_eq!(page.pagination.current, 2);
		assert_eq!(page.pagination.pages, 2);
	}

	#[tokio::test]
	async fn test_unavailable_items_are_hidden() {
		let f = fixture();
		let items = seed(&f).await;
		f.menu
			.update(
				&items[0].id,
				MenuItemPatch {
					is_available: Some(false),
					..Default::default()
				},
			)
			.await
			.unwrap();

		let page = f.menu.list(&MenuQuery::default()).await.unwrap();
		assert_eq!(page.total, 3);
		assert!(f.menu.by_category(MenuCategory::Soup).await.unwrap().is_empty());
		// Still reachable directly
		assert!(!f.menu.get(&items[0].id).await.unwrap().is_available);
	}

	#[tokio::test]
	async fn test_search_ranks_by_matched_terms() {
		let f = fixture();
		seed(&f).await;

		let found = f.menu.search("fresh soup").await.unwrap();
		assert_eq!(found[0].name, "Tomato Soup");
		assert_eq!(found.len(), 4);
		assert!(f.menu.search("pizza").await.unwrap().is_empty());
		assert!(matches!(
			f.menu.search("   ").await,
			Err(CatalogError::Validation(_))
		));
	}

	#[tokio::test]
	async fn test_unknown_sort_field_rejected() {
		let f = fixture();
		let query = MenuQuery {
			sort: Some("color:asc".into()),
			..Default::default()
		};
		assert!(matches!(
			f.menu.list(&query).await,
			Err(CatalogError::Validation(_))
		));
	}

	#[tokio::test]
	async fn test_writes_invalidate_menu_family() {
		let f = fixture();
		let items = seed(&f).await;
		let listing = CacheKey::new(CachePrefix::MenuAll, "/api/menu", None);
		let recipes = CacheKey::new(CachePrefix::RecipesList, "/api/recipes", None);

		f.cache.store(&listing, b"[]".to_vec(), None).await;
		f.cache.store(&recipes, b"[]".to_vec(), None).await;
		f.menu.delete(&items[1].id).await.unwrap();

		assert_eq!(f.cache.lookup(&listing).await, None);
		assert_eq!(f.cache.lookup(&recipes).await, Some(b"[]".to_vec()));
		assert!(matches!(
			f.menu.get(&items[1].id).await,
			Err(CatalogError::NotFound { .. })
		));
	}

	#[tokio::test]
	async fn test_validation() {
		let f = fixture();
		let mut input = new_item("Soup", MenuCategory::Soup, 5);
		input.price = Decimal::from(-1);
		assert!(matches!(
			f.menu.create(input).await,
			Err(CatalogError::Validation(_))
		));

		assert!(matches!(
			f.menu.update("missing", MenuItemPatch::default()).await,
			Err(CatalogError::NotFound { .. })
		));
		assert!(matches!(
			f.menu.delete("missing").await,
			Err(CatalogError::NotFound { .. })
		));
	}
}
