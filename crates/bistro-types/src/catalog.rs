//! Catalog types: menu items and recipes.
//!
//! These are the documents served by the cached read endpoints. Input
//! types (`NewMenuItem`, `MenuItemPatch`, `NewRecipe`) carry only the
//! fields a client may set; identifiers and timestamps are assigned by
//! the catalog services.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Menu section an item is listed under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MenuCategory {
	Staple,
	Salad,
	Soup,
	Drink,
	Snack,
}

impl MenuCategory {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Staple => "staple",
			Self::Salad => "salad",
			Self::Soup => "soup",
			Self::Drink => "drink",
			Self::Snack => "snack",
		}
	}
}

impl fmt::Display for MenuCategory {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for MenuCategory {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"staple" => Ok(Self::Staple),
			"salad" => Ok(Self::Salad),
			"soup" => Ok(Self::Soup),
			"drink" => Ok(Self::Drink),
			"snack" => Ok(Self::Snack),
			other => Err(format!("Unknown menu category: {}", other)),
		}
	}
}

/// Nutrition facts of a menu item, per portion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NutritionInfo {
	#[serde(default)]
	pub calories: Option<f64>,
	#[serde(default)]
	pub protein: Option<f64>,
	#[serde(default)]
	pub carbs: Option<f64>,
	#[serde(default)]
	pub fat: Option<f64>,
	#[serde(default)]
	pub fiber: Option<f64>,
}

/// An ingredient line of a menu item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MenuIngredient {
	pub name: String,
	#[serde(default)]
	pub quantity: Option<f64>,
	#[serde(default)]
	pub unit: Option<String>,
}

/// Aggregated user rating.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Rating {
	pub average: f64,
	pub count: u32,
}

/// A dish offered on the menu.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
	pub id: String,
	pub name: String,
	pub name_en: String,
	pub category: MenuCategory,
	pub price: Decimal,
	pub description: String,
	pub description_en: String,
	#[serde(default)]
	pub nutrition_info: NutritionInfo,
	#[serde(default)]
	pub ingredients: Vec<MenuIngredient>,
	#[serde(default)]
	pub allergens: Vec<String>,
	pub image: String,
	pub is_available: bool,
	/// Minutes.
	pub preparation_time: u32,
	#[serde(default)]
	pub tags: Vec<String>,
	#[serde(default)]
	pub rating: Rating,
	pub created_by: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Client supplied fields for a new menu item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMenuItem {
	pub name: String,
	pub name_en: String,
	pub category: MenuCategory,
	pub price: Decimal,
	pub description: String,
	pub description_en: String,
	#[serde(default)]
	pub nutrition_info: NutritionInfo,
	#[serde(default)]
	pub ingredients: Vec<MenuIngredient>,
	#[serde(default)]
	pub allergens: Vec<String>,
	pub image: String,
	#[serde(default = "default_available")]
	pub is_available: bool,
	pub preparation_time: u32,
	#[serde(default)]
	pub tags: Vec<String>,
	pub created_by: String,
}

fn default_available() -> bool {
	true
}

/// Partial update of a menu item. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItemPatch {
	pub name: Option<String>,
	pub name_en: Option<String>,
	pub category: Option<MenuCategory>,
	pub price: Option<Decimal>,
	pub description: Option<String>,
	pub description_en: Option<String>,
	pub nutrition_info: Option<NutritionInfo>,
	pub ingredients: Option<Vec<MenuIngredient>>,
	pub allergens: Option<Vec<String>>,
	pub image: Option<String>,
	pub is_available: Option<bool>,
	pub preparation_time: Option<u32>,
	pub tags: Option<Vec<String>>,
}

impl MenuItem {
	/// Builds a stored menu item from client input.
	pub fn from_new(id: String, input: NewMenuItem, now: DateTime<Utc>) -> Self {
		Self {
			id,
			name: input.name,
			name_en: input.name_en,
			category: input.category,
			price: input.price,
			description: input.description,
			description_en: input.description_en,
			nutrition_info: input.nutrition_info,
			ingredients: input.ingredients,
			allergens: input.allergens,
			image: input.image,
			is_available: input.is_available,
			preparation_time: input.preparation_time,
			tags: input.tags,
			rating: Rating::default(),
			created_by: input.created_by,
			created_at: now,
			updated_at: now,
		}
	}

	/// Applies a partial update.
	pub fn apply_patch(&mut self, patch: MenuItemPatch, now: DateTime<Utc>) {
		macro_rules! set {
			($($field:ident),* $(,)?) => {
				$(if let Some(value) = patch.$field {
					self.$field = value;
				})*
			};
		}
		set!(
			name,
			name_en,
			category,
			price,
			description,
			description_en,
			nutrition_info,
			ingredients,
			allergens,
			image,
			is_available,
			preparation_time,
			tags,
		);
		self.updated_at = now;
	}
}

/// How hard a recipe is to cook.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
	Easy,
	Medium,
	Hard,
}

impl FromStr for Difficulty {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"easy" => Ok(Self::Easy),
			"medium" => Ok(Self::Medium),
			"hard" => Ok(Self::Hard),
			other => Err(format!("Unknown difficulty: {}", other)),
		}
	}
}

/// Whole-recipe nutrition facts. Missing values read as zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecipeNutrition {
	pub calories: f64,
	pub protein: f64,
	pub carbohydrates: f64,
	pub fat: f64,
	pub fiber: f64,
	pub sugar: f64,
	pub sodium: f64,
}

/// A replacement for an ingredient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Substitute {
	pub name: String,
	#[serde(default)]
	pub amount: Option<f64>,
	#[serde(default)]
	pub unit: Option<String>,
	#[serde(default)]
	pub dietary_categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecipeIngredient {
	pub name: String,
	pub amount: f64,
	pub unit: String,
	#[serde(default)]
	pub substitutes: Vec<Substitute>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
	pub step: u32,
	pub text: String,
	#[serde(default)]
	pub estimated_time: Option<u32>,
}

/// A cooking recipe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
	pub id: String,
	pub title: String,
	pub description: String,
	#[serde(default)]
	pub ingredients: Vec<RecipeIngredient>,
	#[serde(default)]
	pub instructions: Vec<Instruction>,
	pub nutrition: RecipeNutrition,
	/// Minutes.
	pub preparation_time: u32,
	/// Minutes.
	pub cooking_time: u32,
	pub servings: u32,
	pub difficulty: Difficulty,
	#[serde(default)]
	pub dietary_categories: Vec<String>,
	pub cuisine: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub image_url: Option<String>,
	#[serde(default)]
	pub rating: Rating,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Client supplied fields for a new recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecipe {
	pub title: String,
	pub description: String,
	#[serde(default)]
	pub ingredients: Vec<RecipeIngredient>,
	#[serde(default)]
	pub instructions: Vec<Instruction>,
	pub nutrition: RecipeNutrition,
	pub preparation_time: u32,
	pub cooking_time: u32,
	pub servings: u32,
	pub difficulty: Difficulty,
	#[serde(default)]
	pub dietary_categories: Vec<String>,
	pub cuisine: String,
	#[serde(default)]
	pub image_url: Option<String>,
}

impl Recipe {
	/// Builds a stored recipe from client input.
	pub fn from_new(id: String, input: NewRecipe, now: DateTime<Utc>) -> Self {
		Self {
			id,
			title: input.title,
			description: input.description,
			ingredients: input.ingredients,
			instructions: input.instructions,
			nutrition: input.nutrition,
			preparation_time: input.preparation_time,
			cooking_time: input.cooking_time,
			servings: input.servings,
			difficulty: input.difficulty,
			dietary_categories: input.dietary_categories,
			cuisine: input.cuisine,
			image_url: input.image_url,
			rating: Rating::default(),
			created_at: now,
			updated_at: now,
		}
	}

	/// Preparation plus cooking time, in minutes.
	pub fn total_time(&self) -> u32 {
		self.preparation_time.saturating_add(self.cooking_time)
	}

	/// Nutrition divided by the number of servings.
	///
	/// A recipe with zero servings reports the whole-recipe values.
	pub fn nutrition_per_serving(&self) -> RecipeNutrition {
		let servings = f64::from(self.servings.max(1));
		let n = &self.nutrition;
		RecipeNutrition {
			calories: n.calories / servings,
			protein: n.protein / servings,
			carbohydrates: n.carbohydrates / servings,
			fat: n.fat / servings,
			fiber: n.fiber / servings,
			sugar: n.sugar / servings,
			sodium: n.sodium / servings,
		}
	}
}

/// A recipe with its per-serving nutrition, as served by the detail
/// endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecipeDetail {
	#[serde(flatten)]
	pub recipe: Recipe,
	pub nutrition_per_serving: RecipeNutrition,
}

impl From<Recipe> for RecipeDetail {
	fn from(recipe: Recipe) -> Self {
		Self {
			nutrition_per_serving: recipe.nutrition_per_serving(),
			recipe,
		}
	}
}

/// Macronutrient totals of one planned day.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct DailyNutrition {
	pub calories: f64,
	pub protein: f64,
	pub carbohydrates: f64,
	pub fat: f64,
}

impl DailyNutrition {
	pub fn add(&mut self, nutrition: &RecipeNutrition) {
		self.calories += nutrition.calories;
		self.protein += nutrition.protein;
		self.carbohydrates += nutrition.carbohydrates;
		self.fat += nutrition.fat;
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlannedMeal {
	/// 1-based position within the day.
	pub meal_number: u32,
	pub recipe: Recipe,
}

/// One day of a generated meal plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MealPlanDay {
	/// 1-based.
	pub day: u32,
	pub meals: Vec<PlannedMeal>,
	pub daily_nutrition: DailyNutrition,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_item() -> MenuItem {
		MenuItem::from_new(
			"m1".into(),
			NewMenuItem {
				name: "Tomato soup".into(),
				name_en: "Tomato soup".into(),
				category: MenuCategory::Soup,
				price: Decimal::from(12),
				description: "Warm".into(),
				description_en: "Warm".into(),
				nutrition_info: NutritionInfo::default(),
				ingredients: vec![],
				allergens: vec![],
				image: "soup.jpg".into(),
				is_available: true,
				preparation_time: 10,
				tags: vec![],
				created_by: "staff".into(),
			},
			Utc::now(),
		)
	}

	#[test]
	fn test_patch_only_touches_present_fields() {
		let mut item = sample_item();
		item.apply_patch(
			MenuItemPatch {
				price: Some(Decimal::from(15)),
				is_available: Some(false),
				..Default::default()
			},
			Utc::now(),
		);
		assert_eq!(item.price, Decimal::from(15));
		assert!(!item.is_available);
		assert_eq!(item.name, "Tomato soup");
	}

	#[test]
	fn test_category_parse() {
		assert_eq!("salad".parse::<MenuCategory>(), Ok(MenuCategory::Salad));
		assert!("dessert".parse::<MenuCategory>().is_err());
	}

	fn sample_recipe() -> Recipe {
		Recipe::from_new(
			"r1".into(),
			NewRecipe {
				title: "Pasta".into(),
				description: "Simple".into(),
				ingredients: vec![],
				instructions: vec![],
				nutrition: RecipeNutrition {
					calories: 800.0,
					protein: 40.0,
					..Default::default()
				},
				preparation_time: 10,
				cooking_time: 20,
				servings: 4,
				difficulty: Difficulty::Easy,
				dietary_categories: vec![],
				cuisine: "italian".into(),
				image_url: None,
			},
			Utc::now(),
		)
	}

	#[test]
	fn test_nutrition_per_serving() {
		let recipe = sample_recipe();
		let per_serving = recipe.nutrition_per_serving();
		assert_eq!(per_serving.calories, 200.0);
		assert_eq!(per_serving.protein, 10.0);
		assert_eq!(recipe.total_time(), 30);

		let detail = serde_json::to_value(RecipeDetail::from(recipe)).unwrap();
		assert_eq!(detail["title"], "Pasta");
		assert_eq!(detail["nutritionPerServing"]["calories"], 200.0);
	}

	#[test]
	fn test_total_time_saturates() {
		let mut recipe = sample_recipe();
		recipe.preparation_time = u32::MAX;
		recipe.cooking_time = 1;
		assert_eq!(recipe.total_time(), u32::MAX);
	}

	#[test]
	fn test_daily_nutrition_sums_macros() {
		let mut day = DailyNutrition::default();
		let nutrition = RecipeNutrition {
			calories: 500.0,
			protein: 30.0,
			carbohydrates: 40.0,
			fat: 10.0,
			fiber: 99.0,
			..Default::default()
		};
		day.add(&nutrition);
		day.add(&nutrition);
		assert_eq!(day.calories, 1000.0);
		assert_eq!(day.fat, 20.0);
	}
}
