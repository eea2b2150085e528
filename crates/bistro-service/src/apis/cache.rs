//! Cache statistics endpoint.

use crate::server::AppState;
use axum::{extract::State, response::Json};
use bistro_cache::CacheStatsSnapshot;

/// Handles GET /api/cache/stats.
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStatsSnapshot> {
	Json(state.engine.cache().stats())
}
