//! Recipe endpoints.

use super::{cached_json, catalog_error};
use crate::server::AppState;
use axum::{
	extract::{OriginalUri, Path, Query, State},
	http::StatusCode,
	response::{IntoResponse, Json, Response},
};
use bistro_cache::CachePrefix;
use bistro_core::{MealPlanQuery, RecipeQuery, SubstituteQuery, SuggestionQuery};
use bistro_types::{APIError, NewRecipe};

/// Handles GET /api/recipes.
pub async fn list_recipes(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Query(query): Query<RecipeQuery>,
) -> Result<Response, APIError> {
	let recipes = state.engine.recipes().clone();
	cached_json(&state, CachePrefix::RecipesList, &uri, || async move {
		recipes.list(&query).await
	})
	.await
}

/// Handles GET /api/recipes/{id}.
pub async fn get_recipe(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Path(id): Path<String>,
) -> Result<Response, APIError> {
	let recipes = state.engine.recipes().clone();
	cached_json(&state, CachePrefix::RecipesDetail, &uri, || async move {
		recipes.detail(&id).await
	})
	.await
}

/// Handles GET /api/recipes/suggestions.
pub async fn recipe_suggestions(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Query(query): Query<SuggestionQuery>,
) -> Result<Response, APIError> {
	let recipes = state.engine.recipes().clone();
	cached_json(&state, CachePrefix::RecipesSuggestions, &uri, || async move {
		recipes.suggestions(&query).await
	})
	.await
}

/// Handles GET /api/meal-plan.
pub async fn meal_plan(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Query(query): Query<MealPlanQuery>,
) -> Result<Response, APIError> {
	let recipes = state.engine.recipes().clone();
	cached_json(&state, CachePrefix::RecipesMealPlan, &uri, || async move {
		recipes.meal_plan(&query).await
	})
	.await
}

/// Handles GET /api/substitutes.
pub async fn substitutes(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Query(query): Query<SubstituteQuery>,
) -> Result<Response, APIError> {
	let recipes = state.engine.recipes().clone();
	cached_json(&state, CachePrefix::RecipesSubstitutes, &uri, || async move {
		recipes.substitutes(&query).await
	})
	.await
}

/// Handles POST /api/recipes.
pub async fn create_recipe(
	State(state): State<AppState>,
	Json(input): Json<NewRecipe>,
) -> Result<impl IntoResponse, APIError> {
	let recipe = state
		.engine
		.recipes()
		.create(input)
		.await
		.map_err(catalog_error)?;
	Ok((StatusCode::CREATED, Json(recipe)))
}
