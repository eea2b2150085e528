//! Order endpoints.
//!
//! Orders are never cached; every read goes to storage.

use super::order_error;
use crate::server::AppState;
use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	response::{IntoResponse, Json},
};
use bistro_core::{CreateOrderRequest, OrderFilter, OrderItemRequest};
use bistro_types::{APIError, Order, OrderStatus, Page};
use serde::Deserialize;

/// Body of PUT /api/orders/{id}/status.
#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
	pub status: String,
	#[serde(default)]
	pub note: Option<String>,
}

/// Body of PUT /api/orders/{id}/items.
#[derive(Debug, Deserialize)]
pub struct ReplaceItemsRequest {
	pub items: Vec<OrderItemRequest>,
}

/// Query of PATCH /api/orders/{id}/cancel.
#[derive(Debug, Default, Deserialize)]
pub struct CancelParams {
	pub note: Option<String>,
}

/// Handles POST /api/orders.
pub async fn create_order(
	State(state): State<AppState>,
	Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, APIError> {
	let order = state
		.engine
		.orders()
		.create_order(request)
		.await
		.map_err(order_error)?;
	Ok((StatusCode::CREATED, Json(order)))
}

/// Handles GET /api/orders.
pub async fn list_orders(
	State(state): State<AppState>,
	Query(filter): Query<OrderFilter>,
) -> Result<Json<Page<Order>>, APIError> {
	let page = state
		.engine
		.orders()
		.list_orders(&filter)
		.await
		.map_err(order_error)?;
	Ok(Json(page))
}

/// Handles GET /api/orders/{id}.
pub async fn get_order(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<Order>, APIError> {
	let order = state
		.engine
		.orders()
		.get_order(&id)
		.await
		.map_err(order_error)?;
	Ok(Json(order))
}

/// Handles PUT /api/orders/{id}/status.
pub async fn update_order_status(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<Order>, APIError> {
	let status: OrderStatus = request
		.status
		.parse()
		.map_err(|e: String| APIError::bad_request("INVALID_STATUS", e))?;

	match state
		.engine
		.orders()
		.update_status(&id, status, request.note)
		.await
	{
		Ok(order) => Ok(Json(order)),
		Err(e) => {
			tracing::warn!(order_id = %id, error = %e, "Order status update rejected");
			Err(order_error(e))
		},
	}
}

/// Handles PATCH /api/orders/{id}/cancel.
pub async fn cancel_order(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Query(params): Query<CancelParams>,
) -> Result<Json<Order>, APIError> {
	let order = state
		.engine
		.orders()
		.cancel_order(&id, params.note)
		.await
		.map_err(order_error)?;
	Ok(Json(order))
}

/// Handles PUT /api/orders/{id}/items.
pub async fn replace_order_items(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Json(request): Json<ReplaceItemsRequest>,
) -> Result<Json<Order>, APIError> {
	let order = state
		.engine
		.orders()
		.replace_items(&id, request.items)
		.await
		.map_err(order_error)?;
	Ok(Json(order))
}
