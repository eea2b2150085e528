//! HTTP handlers grouped by resource.
//!
//! Cached read endpoints go through [`cached_json`], which keys the response
//! cache on the original request path and query and replays stored bodies
//! unchanged.

pub mod cache;
pub mod menu;
pub mod orders;
pub mod recipes;

use crate::server::AppState;
use axum::{
	http::{header, HeaderName, Uri},
	response::{IntoResponse, Response},
};
use bistro_cache::{CacheKey, CachePrefix};
use bistro_core::{CatalogError, OrderError, OrderStateError};
use bistro_types::APIError;
use serde::Serialize;
use std::future::Future;

/// Header telling clients whether a body was replayed from the cache.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Serves a cached read endpoint: replays the stored body or runs `fetch`.
pub async fn cached_json<T, F, Fut>(
	state: &AppState,
	prefix: CachePrefix,
	uri: &Uri,
	fetch: F,
) -> Result<Response, APIError>
where
	T: Serialize,
	F: FnOnce() -> Fut,
	Fut: Future<Output = Result<T, CatalogError>>,
{
	let key = CacheKey::new(prefix, uri.path(), uri.query());
	let cached = state
		.engine
		.cache()
		.get_or_fetch(&key, fetch)
		.await
		.map_err(catalog_error)?;

	let marker = if cached.from_cache { "HIT" } else { "MISS" };
	Ok((
		[
			(header::CONTENT_TYPE, "application/json"),
			(X_CACHE, marker),
		],
		cached.body,
	)
		.into_response())
}

/// Maps catalog failures to API errors.
pub fn catalog_error(e: CatalogError) -> APIError {
	match e {
		CatalogError::NotFound { kind, .. } => APIError::not_found(
			format!("{}_NOT_FOUND", kind.to_uppercase().replace(' ', "_")),
			e.to_string(),
		),
		CatalogError::Validation(message) => APIError::bad_request("VALIDATION_ERROR", message),
		CatalogError::Storage(_) | CatalogError::Cache(_) => {
			tracing::error!(error = %e, "Catalog query failed");
			APIError::internal(e.to_string())
		},
	}
}

/// Maps order failures to API errors.
pub fn order_error(e: OrderError) -> APIError {
	match e {
		OrderError::Validation(message) => APIError::bad_request("VALIDATION_ERROR", message),
		OrderError::MenuItemNotFound(_) => APIError::bad_request("MENU_ITEM_NOT_FOUND", e.to_string()),
		OrderError::MenuItemUnavailable(_) => {
			APIError::bad_request("MENU_ITEM_UNAVAILABLE", e.to_string())
		},
		OrderError::State(OrderStateError::InvalidTransition { from, to }) => APIError::BadRequest {
			error_type: "INVALID_STATUS_TRANSITION".to_string(),
			message: format!("Cannot change order status from {} to {}", from, to),
			details: Some(serde_json::json!({
				"from": from,
				"to": to,
				"allowed": from.allowed_transitions(),
			})),
		},
		OrderError::State(OrderStateError::ConcurrentTransition(_)) => APIError::Conflict {
			error_type: "ORDER_STATUS_CONFLICT".to_string(),
			message: e.to_string(),
			retry_after: Some(1),
		},
		OrderError::State(OrderStateError::OrderNotFound(_)) => {
			APIError::not_found("ORDER_NOT_FOUND", e.to_string())
		},
		OrderError::State(OrderStateError::NotEditable { .. }) => APIError::UnprocessableEntity {
			error_type: "ORDER_NOT_EDITABLE".to_string(),
			message: e.to_string(),
			details: None,
		},
		OrderError::Catalog(_) | OrderError::State(OrderStateError::Storage(_)) => {
			tracing::error!(error = %e, "Order operation failed");
			APIError::internal(e.to_string())
		},
	}
}
