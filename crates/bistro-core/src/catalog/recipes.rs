//! Recipes.

use super::{contains_ignore_case, split_list, CatalogError};
use bistro_cache::{CacheFamily, ResponseCache};
use bistro_storage::StorageService;
use bistro_types::{
	Clock, DailyNutrition, Difficulty, MealPlanDay, NewRecipe, Page, PageRequest, PlannedMeal,
	Recipe, RecipeDetail, StorageKey, Substitute,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Longest accepted preparation or cooking time: one week, in minutes.
pub const MAX_STEP_MINUTES: u32 = 7 * 24 * 60;
/// Most suggestions returned at once.
const SUGGESTION_LIMIT: usize = 10;
const MAX_PLAN_DAYS: u32 = 31;
const MAX_MEALS_PER_DAY: u32 = 10;

/// Ordering of the recipe listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipeSort {
	/// Best rated first.
	#[default]
	Rating,
	/// Quickest first, by preparation then cooking time.
	Time,
}

/// Filters of the recipe listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeQuery {
	/// Case-insensitive match on title, description, cuisine and ingredients.
	pub search: Option<String>,
	/// Comma separated; a recipe must belong to every listed category.
	pub dietary: Option<String>,
	pub difficulty: Option<Difficulty>,
	/// Upper bound on preparation plus cooking time, in minutes.
	pub max_time: Option<u32>,
	pub min_rating: Option<f64>,
	pub cuisine: Option<String>,
	pub page: Option<usize>,
	pub limit: Option<usize>,
	#[serde(default)]
	pub sort_by: RecipeSort,
}

impl RecipeQuery {
	fn matches(&self, recipe: &Recipe, dietary: &[String], search: Option<&str>) -> bool {
		if !dietary
			.iter()
			.all(|d| recipe.dietary_categories.contains(d))
		{
			return false;
		}
		if self.difficulty.is_some_and(|d| d != recipe.difficulty) {
			return false;
		}
		if self.max_time.is_some_and(|max| recipe.total_time() > max) {
			return false;
		}
		if self.min_rating.is_some_and(|min| recipe.rating.average < min) {
			return false;
		}
		if self
			.cuisine
			.as_deref()
			.is_some_and(|c| !c.eq_ignore_ascii_case(&recipe.cuisine))
		{
			return false;
		}
		match search {
			Some(needle) => {
				contains_ignore_case(&recipe.title, needle)
					|| contains_ignore_case(&recipe.description, needle)
					|| contains_ignore_case(&recipe.cuisine, needle)
					|| recipe
						.ingredients
						.iter()
						.any(|i| contains_ignore_case(&i.name, needle))
			},
			None => true,
		}
	}
}

/// Targets for recipe suggestions. Daily targets are spread evenly over
/// `meal_count` meals and a recipe qualifies within 20% of the per-meal
/// share.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionQuery {
	/// Comma separated; any one listed category is enough.
	pub dietary_preferences: Option<String>,
	pub calorie_target: Option<f64>,
	pub protein_target: Option<f64>,
	/// Defaults to 3.
	pub meal_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealPlanQuery {
	/// Defaults to 7.
	pub days: Option<u32>,
	/// Defaults to 3.
	pub meals_per_day: Option<u32>,
	/// Daily calories, spread over the meals of a day.
	pub calorie_target: Option<f64>,
	pub dietary_preferences: Option<String>,
	/// Comma separated ingredient names a recipe must not use.
	pub exclude_ingredients: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubstituteQuery {
	pub ingredient: Option<String>,
	/// Only substitutes suitable for this dietary category.
	pub dietary: Option<String>,
}

fn within_band(value: f64, target: f64) -> bool {
	value >= target * 0.8 && value <= target * 1.2
}

fn matches_any_preference(recipe: &Recipe, preferences: &[String]) -> bool {
	preferences.is_empty()
		|| preferences
			.iter()
			.any(|p| recipe.dietary_categories.contains(p))
}

fn by_rating(recipes: &mut [Recipe]) {
	recipes.sort_by(|a, b| {
		b.rating
			.average
			.total_cmp(&a.rating.average)
			.then_with(|| a.title.cmp(&b.title))
	});
}

/// Recipe queries and mutations.
pub struct RecipeService {
	storage: Arc<StorageService>,
	cache: Arc<ResponseCache>,
	clock: Arc<dyn Clock>,
}

impl RecipeService {
	pub fn new(storage: Arc<StorageService>, cache: Arc<ResponseCache>, clock: Arc<dyn Clock>) -> Self {
		Self {
			storage,
			cache,
			clock,
		}
	}

	pub async fn list(&self, query: &RecipeQuery) -> Result<Page<Recipe>, CatalogError> {
		let dietary = query.dietary.as_deref().map(split_list).unwrap_or_default();
		let search = query
			.search
			.as_deref()
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.map(str::to_lowercase);

		let mut recipes: Vec<Recipe> = self
			.storage
			.list::<Recipe>(StorageKey::Recipes.as_str())
			.await?
			.into_iter()
			.filter(|r| query.matches(r, &dietary, search.as_deref()))
			.collect();

		match query.sort_by {
			RecipeSort::Rating => by_rating(&mut recipes),
			RecipeSort::Time => recipes.sort_by(|a, b| {
				(a.preparation_time, a.cooking_time)
					.cmp(&(b.preparation_time, b.cooking_time))
					.then_with(|| a.title.cmp(&b.title))
			}),
		}

		Ok(Page::from_sorted(recipes, PageRequest::new(query.page, query.limit)))
	}

	pub async fn get(&self, id: &str) -> Result<Recipe, CatalogError> {
		self.storage
			.retrieve(StorageKey::Recipes.as_str(), id)
			.await
			.map_err(|e| CatalogError::from_storage("Recipe", id, e))
	}

	/// The recipe together with its per-serving nutrition.
	pub async fn detail(&self, id: &str) -> Result<RecipeDetail, CatalogError> {
		self.get(id).await.map(RecipeDetail::from)
	}

	/// Best rated recipes close to the per-meal calorie and protein targets.
	pub async fn suggestions(&self, query: &SuggestionQuery) -> Result<Vec<Recipe>, CatalogError> {
		let meal_count = query.meal_count.unwrap_or(3);
		if meal_count == 0 {
			return Err(CatalogError::Validation("mealCount must be at least 1".into()));
		}
		let meals = f64::from(meal_count);
		let preferences = query
			.dietary_preferences
			.as_deref()
			.map(split_list)
			.unwrap_or_default();
		let calories = query.calorie_target.map(|t| t / meals);
		let protein = query.protein_target.map(|t| t / meals);

		let mut recipes: Vec<Recipe> = self
			.storage
			.list::<Recipe>(StorageKey::Recipes.as_str())
			.await?
			.into_iter()
			.filter(|r| matches_any_preference(r, &preferences))
			.filter(|r| calories.is_none_or(|t| within_band(r.nutrition.calories, t)))
			.filter(|r| protein.is_none_or(|t| within_band(r.nutrition.protein, t)))
			.collect();

		by_rating(&mut recipes);
		recipes.truncate(SUGGESTION_LIMIT);
		Ok(recipes)
	}

	/// Fills `days` x `meals_per_day` slots with the best rated matching
	/// recipes, each used at most once. Days run short when recipes run out.
	pub async fn meal_plan(&self, query: &MealPlanQuery) -> Result<Vec<MealPlanDay>, CatalogError> {
		let days = query.days.unwrap_or(7);
		let meals_per_day = query.meals_per_day.unwrap_or(3);
		if !(1..=MAX_PLAN_DAYS).contains(&days) {
			return Err(CatalogError::Validation(format!(
				"days must be between 1 and {}",
				MAX_PLAN_DAYS
			)));
		}
		if !(1..=MAX_MEALS_PER_DAY).contains(&meals_per_day) {
			return Err(CatalogError::Validation(format!(
				"mealsPerDay must be between 1 and {}",
				MAX_MEALS_PER_DAY
			)));
		}

		let preferences = query
			.dietary_preferences
			.as_deref()
			.map(split_list)
			.unwrap_or_default();
		let excluded = query
			.exclude_ingredients
			.as_deref()
			.map(split_list)
			.unwrap_or_default();
		let calories = query.calorie_target.map(|t| t / f64::from(meals_per_day));

		let mut recipes: Vec<Recipe> = self
			.storage
			.list::<Recipe>(StorageKey::Recipes.as_str())
			.await?
			.into_iter()
			.filter(|r| matches_any_preference(r, &preferences))
			.filter(|r| !r.ingredients.iter().any(|i| excluded.contains(&i.name)))
			.filter(|r| calories.is_none_or(|t| within_band(r.nutrition.calories, t)))
			.collect();
		by_rating(&mut recipes);
		recipes.truncate((days * meals_per_day) as usize);

		let mut remaining = recipes.into_iter();
		let plan = (1..=days)
			.map(|day| {
				let mut daily_nutrition = DailyNutrition::default();
				let meals = remaining
					.by_ref()
					.take(meals_per_day as usize)
					.zip(1..)
					.map(|(recipe, meal_number)| {
						daily_nutrition.add(&recipe.nutrition);
						PlannedMeal {
							meal_number,
							recipe,
						}
					})
					.collect();
				MealPlanDay {
					day,
					meals,
					daily_nutrition,
				}
			})
			.collect();
		Ok(plan)
	}

	/// Substitutes recorded for `ingredient` across all recipes, first
	/// occurrence of each name wins.
	pub async fn substitutes(&self, query: &SubstituteQuery) -> Result<Vec<Substitute>, CatalogError> {
		let ingredient = query
			.ingredient
			.as_deref()
			.map(str::trim)
			.filter(|i| !i.is_empty())
			.ok_or_else(|| CatalogError::Validation("ingredient is required".into()))?;
		let dietary = query.dietary.as_deref().filter(|d| !d.is_empty());

		let recipes = self
			.storage
			.list::<Recipe>(StorageKey::Recipes.as_str())
			.await?;

		let mut seen = HashSet::new();
		let substitutes = recipes
			.into_iter()
			.flat_map(|r| r.ingredients)
			.filter(|i| i.name == ingredient)
			.flat_map(|i| i.substitutes)
			.filter(|s| dietary.is_none_or(|d| s.dietary_categories.iter().any(|c| c == d)))
			.filter(|s| seen.insert(s.name.clone()))
			.collect();
		Ok(substitutes)
	}

	pub async fn create(&self, input: NewRecipe) -> Result<Recipe, CatalogError> {
		if input.title.trim().is_empty() {
			return Err(CatalogError::Validation("Recipe title is required".into()));
		}
		if input.servings == 0 {
			return Err(CatalogError::Validation(
				"Recipe must serve at least one person".into(),
			));
		}
		if input.preparation_time > MAX_STEP_MINUTES || input.cooking_time > MAX_STEP_MINUTES {
			return Err(CatalogError::Validation(format!(
				"Preparation and cooking time must not exceed {} minutes",
				MAX_STEP_MINUTES
			)));
		}

		let recipe = Recipe::from_new(Uuid::new_v4().to_string(), input, self.clock.now());
		self.storage
			.store(StorageKey::Recipes.as_str(), &recipe.id, &recipe)
			.await?;
		self.cache.invalidate_family(CacheFamily::Recipes).await;

		tracing::info!(recipe = %recipe.id, title = %recipe.title, "Recipe created");
		Ok(recipe)
	}
}
