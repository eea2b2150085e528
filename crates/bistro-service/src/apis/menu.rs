//! Menu endpoints.

use super::{cached_json, catalog_error};
use crate::server::AppState;
use axum::{
	extract::{OriginalUri, Path, Query, State},
	http::StatusCode,
	response::{IntoResponse, Json, Response},
};
use bistro_cache::CachePrefix;
use bistro_core::MenuQuery;
use bistro_types::{APIError, MenuCategory, MenuItemPatch, NewMenuItem};

/// Handles GET /api/menu.
pub async fn list_menu(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Query(query): Query<MenuQuery>,
) -> Result<Response, APIError> {
	let menu = state.engine.menu().clone();
	cached_json(&state, CachePrefix::MenuAll, &uri, || async move {
		menu.list(&query).await
	})
	.await
}

/// Handles GET /api/menu/{id}.
pub async fn get_menu_item(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Path(id): Path<String>,
) -> Result<Response, APIError> {
	let menu = state.engine.menu().clone();
	cached_json(&state, CachePrefix::MenuItem, &uri, || async move {
		menu.get(&id).await
	})
	.await
}

/// Handles GET /api/menu/search/{query}.
pub async fn search_menu(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Path(text): Path<String>,
) -> Result<Response, APIError> {
	let menu = state.engine.menu().clone();
	cached_json(&state, CachePrefix::MenuSearch, &uri, || async move {
		menu.search(&text).await
	})
	.await
}

/// Handles GET /api/menu/category/{category}.
pub async fn menu_by_category(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Path(category): Path<String>,
) -> Result<Response, APIError> {
	let category: MenuCategory = category
		.parse()
		.map_err(|e: String| APIError::bad_request("INVALID_CATEGORY", e))?;
	let menu = state.engine.menu().clone();
	cached_json(&state, CachePrefix::MenuCategory, &uri, || async move {
		menu.by_category(category).await
	})
	.await
}

/// Handles POST /api/menu.
pub async fn create_menu_item(
	State(state): State<AppState>,
	Json(input): Json<NewMenuItem>,
) -> Result<impl IntoResponse, APIError> {
	let item = state
		.engine
		.menu()
		.create(input)
		.await
		.map_err(catalog_error)?;
	Ok((StatusCode::CREATED, Json(item)))
}

/// Handles PUT /api/menu/{id}.
pub async fn update_menu_item(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Json(patch): Json<MenuItemPatch>,
) -> Result<impl IntoResponse, APIError> {
	let item = state
		.engine
		.menu()
		.update(&id, patch)
		.await
		.map_err(catalog_error)?;
	Ok(Json(item))
}

/// Handles DELETE /api/menu/{id}.
pub async fn delete_menu_item(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<StatusCode, APIError> {
	state
		.engine
		.menu()
		.delete(&id)
		.await
		.map_err(catalog_error)?;
	Ok(StatusCode::NO_CONTENT)
}
