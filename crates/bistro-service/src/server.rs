//! HTTP server for the bistro API.
//!
//! Builds the router under `/api` and serves it until the shutdown signal
//! fires.

use crate::apis::{cache, menu, orders, recipes};
use axum::{
	extract::DefaultBodyLimit,
	routing::{get, patch, put},
	Router,
};
use bistro_config::ApiConfig;
use bistro_core::BistroEngine;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Reference to the engine serving every request.
	pub engine: Arc<BistroEngine>,
}

/// Builds the API router with its middleware stack.
pub fn build_router(state: AppState, api_config: &ApiConfig) -> Router {
	let api = Router::new()
		.route("/menu", get(menu::list_menu).post(menu::create_menu_item))
		.route("/menu/search/{query}", get(menu::search_menu))
		.route("/menu/category/{category}", get(menu::menu_by_category))
		.route(
			"/menu/{id}",
			get(menu::get_menu_item)
				.put(menu::update_menu_item)
				.delete(menu::delete_menu_item),
		)
		.route(
			"/recipes",
			get(recipes::list_recipes).post(recipes::create_recipe),
		)
		.route("/recipes/suggestions", get(recipes::recipe_suggestions))
		.route("/recipes/{id}", get(recipes::get_recipe))
		.route("/meal-plan", get(recipes::meal_plan))
		.route("/substitutes", get(recipes::substitutes))
		.route(
			"/orders",
			get(orders::list_orders).post(orders::create_order),
		)
		.route("/orders/{id}", get(orders::get_order))
		.route("/orders/{id}/status", put(orders::update_order_status))
		.route("/orders/{id}/cancel", patch(orders::cancel_order))
		.route("/orders/{id}/items", put(orders::replace_order_items))
		.route("/cache/stats", get(cache::cache_stats));

	Router::new()
		.nest("/api", api)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(CorsLayer::permissive())
				.layer(TimeoutLayer::new(Duration::from_secs(
					api_config.timeout_seconds,
				)))
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(state)
}

/// Starts the HTTP server and runs it until `shutdown` resolves.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<BistroEngine>,
	shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = build_router(AppState { engine }, &api_config);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Bistro API server starting on {}", bind_address);

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown)
		.await?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::{to_bytes, Body};
	use axum::http::{Request, StatusCode};
	use bistro_config::Config;
	use bistro_core::{BistroBuilder, BistroFactories};
	use serde_json::{json, Value};
	use tower::ServiceExt;

	const CONFIG: &str = r#"
[service]
id = "bistro-http-test"

[storage]
primary = "memory"
[storage.implementations.memory]

[cache]
backend = "memory"

[api]
enabled = true
"#;

	fn app() -> Router {
		app_from(CONFIG)
	}

	fn app_from(config: &str) -> Router {
		let config: Config = config.parse().unwrap();
		let api_config = config.api.clone().unwrap();
		let engine = BistroBuilder::new(config)
			.build(BistroFactories::with_all_storage())
			.unwrap();
		build_router(
			AppState {
				engine: Arc::new(engine),
			},
			&api_config,
		)
	}

	async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Option<String>, Vec<u8>) {
		let builder = Request::builder().method(method).uri(uri);
		let request = match body {
			Some(body) => builder
				.header("content-type", "application/json")
				.body(Body::from(body.to_string()))
				.unwrap(),
			None => builder.body(Body::empty()).unwrap(),
		};
		let response = app.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let cache = response
			.headers()
			.get("x-cache")
			.map(|v| v.to_str().unwrap().to_string());
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		(status, cache, bytes.to_vec())
	}

	fn json_body(bytes: &[u8]) -> Value {
		serde_json::from_slice(bytes).unwrap()
	}

	fn dish(name: &str, price: &str) -> Value {
		json!({
			"name": name,
			"nameEn": name,
			"category": "staple",
			"price": price,
			"description": "house special",
			"descriptionEn": "house special",
			"image": "/img/dish.png",
			"preparationTime": 15,
			"createdBy": "chef"
		})
	}

	async fn create_dish(app: &Router, name: &str, price: &str) -> String {
		let (status, _, body) = send(app, "POST", "/api/menu", Some(dish(name, price))).await;
		assert_eq!(status, StatusCode::CREATED);
		json_body(&body)["id"].as_str().unwrap().to_string()
	}

	#[tokio::test]
	async fn test_menu_listing_is_replayed_from_cache() {
		let app = app();
		create_dish(&app, "Dumplings", "18").await;

		let (status, cache, first) = send(&app, "GET", "/api/menu?page=1&limit=5", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(cache.as_deref(), Some("MISS"));

		// Same parameters in another order hit the same entry
		let (_, cache, second) = send(&app, "GET", "/api/menu?limit=5&page=1", None).await;
		assert_eq!(cache.as_deref(), Some("HIT"));
		assert_eq!(first, second);
		assert_eq!(json_body(&second)["total"], 1);

		let (_, _, stats) = send(&app, "GET", "/api/cache/stats", None).await;
		let stats = json_body(&stats);
		assert_eq!(stats["hits"], 1);
		assert_eq!(stats["misses"], 1);
	}

	#[tokio::test]
	async fn test_menu_write_invalidates_before_responding() {
		let app = app();
		let id = create_dish(&app, "Dumplings", "18").await;

		let (_, _, before) = send(&app, "GET", &format!("/api/menu/{}", id), None).await;
		assert_eq!(json_body(&before)["price"], "18");

		let (status, _, _) = send(
			&app,
			"PUT",
			&format!("/api/menu/{}", id),
			Some(json!({ "price": "21" })),
		)
		.await;
		assert_eq!(status, StatusCode::OK);

		let (_, cache, after) = send(&app, "GET", &format!("/api/menu/{}", id), None).await;
		assert_eq!(cache.as_deref(), Some("MISS"));
		assert_eq!(json_body(&after)["price"], "21");

		let (status, _, _) = send(&app, "DELETE", &format!("/api/menu/{}", id), None).await;
		assert_eq!(status, StatusCode::NO_CONTENT);
		let (status, _, body) = send(&app, "GET", &format!("/api/menu/{}", id), None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(json_body(&body)["error"], "MENU_ITEM_NOT_FOUND");
	}

	#[tokio::test]
	async fn test_unknown_category_is_rejected() {
		let app = app();
		let (status, _, body) = send(&app, "GET", "/api/menu/category/pizza", None).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(json_body(&body)["error"], "INVALID_CATEGORY");
	}

	#[tokio::test]
	async fn test_order_lifecycle_over_http() {
		let app = app();
		let noodles = create_dish(&app, "Noodles", "10").await;
		let tea = create_dish(&app, "Tea", "5").await;

		let (status, _, body) = send(
			&app,
			"POST",
			"/api/orders",
			Some(json!({
				"customer": "alice",
				"items": [
					{ "menuItem": noodles, "quantity": 2 },
					{ "menuItem": tea, "quantity": 1 }
				],
				"paymentMethod": "wechat_pay",
				"discountAmount": "3"
			})),
		)
		.await;
		assert_eq!(status, StatusCode::CREATED);
		let order = json_body(&body);
		assert_eq!(order["totalAmount"], "22");
		assert_eq!(order["status"], "pending_payment");
		let id = order["id"].as_str().unwrap().to_string();
		let status_uri = format!("/api/orders/{}/status", id);

		let (status, _, _) = send(&app, "PUT", &status_uri, Some(json!({ "status": "paid" }))).await;
		assert_eq!(status, StatusCode::OK);

		let (status, _, body) =
			send(&app, "PUT", &status_uri, Some(json!({ "status": "completed" }))).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		let error = json_body(&body);
		assert_eq!(error["error"], "INVALID_STATUS_TRANSITION");
		assert_eq!(error["details"]["allowed"], json!(["preparing", "cancelled"]));

		let (status, _, body) =
			send(&app, "PUT", &status_uri, Some(json!({ "status": "shipped" }))).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(json_body(&body)["error"], "INVALID_STATUS");

		let (status, _, body) = send(
			&app,
			"PUT",
			&format!("/api/orders/{}/items", id),
			Some(json!({ "items": [{ "menuItem": tea, "quantity": 1 }] })),
		)
		.await;
		assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
		assert_eq!(json_body(&body)["error"], "ORDER_NOT_EDITABLE");

		let (status, _, body) = send(
			&app,
			"PATCH",
			&format!("/api/orders/{}/cancel?note=kitchen%20closed", id),
			None,
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		let order = json_body(&body);
		assert_eq!(order["status"], "cancelled");
		assert_eq!(order["statusHistory"].as_array().unwrap().len(), 3);
		assert_eq!(order["statusHistory"][2]["note"], "kitchen closed");

		let (_, _, body) = send(&app, "GET", "/api/orders?customer=alice&status=cancelled", None).await;
		assert_eq!(json_body(&body)["total"], 1);

		let (_, _, body) = send(
			&app,
			"GET",
			"/api/orders?startDate=2000-01-01T00:00:00Z&endDate=2100-01-01T00:00:00Z",
			None,
		)
		.await;
		assert_eq!(json_body(&body)["total"], 1);
		let (_, _, body) = send(&app, "GET", "/api/orders?to=2000-01-02T00:00:00Z", None).await;
		assert_eq!(json_body(&body)["total"], 0);
	}

	#[tokio::test]
	async fn test_multibyte_order_id_is_not_found() {
		// Span fields are only evaluated with a subscriber installed.
		let _guard = tracing::subscriber::set_default(
			tracing_subscriber::fmt().with_test_writer().finish(),
		);
		let app = app();
		let uri = "/api/orders/%E8%AE%A2%E5%8D%95%E5%8F%B7%E7%A0%81123/status";
		let (status, _, body) = send(&app, "PUT", uri, Some(json!({ "status": "paid" }))).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(json_body(&body)["error"], "ORDER_NOT_FOUND");

		let (status, _, _) = send(
			&app,
			"PUT",
			"/api/orders/%E8%AE%A2%E5%8D%95%E5%8F%B7%E7%A0%81123/items",
			Some(json!({ "items": [] })),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn test_missing_order_is_not_found() {
		let app = app();
		let (status, _, body) = send(&app, "GET", "/api/orders/nope", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(json_body(&body)["error"], "ORDER_NOT_FOUND");
	}

	fn recipe(title: &str) -> Value {
		json!({
			"title": title,
			"description": "Spicy tofu",
			"ingredients": [{ "name": "tofu", "amount": 400.0, "unit": "g" }],
			"instructions": [],
			"nutrition": { "calories": 900.0 },
			"preparationTime": 10,
			"cookingTime": 15,
			"servings": 3,
			"difficulty": "medium",
			"cuisine": "Sichuan"
		})
	}

	#[tokio::test]
	async fn test_recipe_create_invalidates_listing() {
		let app = app();
		let (_, _, empty) = send(&app, "GET", "/api/recipes", None).await;
		assert_eq!(json_body(&empty)["total"], 0);

		let (status, _, _) = send(&app, "POST", "/api/recipes", Some(recipe("Mapo Tofu"))).await;
		assert_eq!(status, StatusCode::CREATED);

		let (_, cache, listing) = send(&app, "GET", "/api/recipes", None).await;
		assert_eq!(cache.as_deref(), Some("MISS"));
		assert_eq!(json_body(&listing)["total"], 1);
	}

	#[tokio::test]
	async fn test_cache_and_documents_share_one_directory() {
		let dir = tempfile::tempdir().unwrap();
		let app = app_from(&format!(
			r#"
[service]
id = "bistro-shared-dir"

[storage]
primary = "file"
[storage.implementations.file]
storage_path = "{}"

[cache]
backend = "file"

[api]
enabled = true
"#,
			dir.path().display()
		));

		let (status, _, body) = send(&app, "POST", "/api/recipes", Some(recipe("Mapo Tofu"))).await;
		assert_eq!(status, StatusCode::CREATED);
		let id = json_body(&body)["id"].as_str().unwrap().to_string();

		let (_, cache, listing) = send(&app, "GET", "/api/recipes", None).await;
		assert_eq!(cache.as_deref(), Some("MISS"));
		assert_eq!(json_body(&listing)["total"], 1);

		// The cached listing sits next to the recipe documents without
		// being mistaken for one.
		let (status, cache, listing) = send(&app, "GET", "/api/recipes", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(cache.as_deref(), Some("HIT"));
		assert_eq!(json_body(&listing)["total"], 1);

		// Creating a second recipe clears the family but keeps the first one.
		let (status, _, _) = send(&app, "POST", "/api/recipes", Some(recipe("Kung Pao"))).await;
		assert_eq!(status, StatusCode::CREATED);
		let (status, _, detail) = send(&app, "GET", &format!("/api/recipes/{}", id), None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(json_body(&detail)["title"], "Mapo Tofu");

		let (_, cache, listing) = send(&app, "GET", "/api/recipes", None).await;
		assert_eq!(cache.as_deref(), Some("MISS"));
		assert_eq!(json_body(&listing)["total"], 2);
	}

	#[tokio::test]
	async fn test_recipe_feature_routes() {
		let app = app();
		let (_, _, body) = send(&app, "POST", "/api/recipes", Some(recipe("Mapo Tofu"))).await;
		let id = json_body(&body)["id"].as_str().unwrap().to_string();

		let (status, _, detail) = send(&app, "GET", &format!("/api/recipes/{}", id), None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(json_body(&detail)["nutritionPerServing"]["calories"], 300.0);

		// 2700 kcal over 3 meals puts the 900 kcal recipe in the band.
		let uri = "/api/recipes/suggestions?calorieTarget=2700";
		let (status, cache, body) = send(&app, "GET", uri, None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(cache.as_deref(), Some("MISS"));
		assert_eq!(json_body(&body)[0]["title"], "Mapo Tofu");
		let (_, cache, _) = send(&app, "GET", uri, None).await;
		assert_eq!(cache.as_deref(), Some("HIT"));

		let (status, _, body) = send(&app, "GET", "/api/meal-plan?days=2&mealsPerDay=1", None).await;
		assert_eq!(status, StatusCode::OK);
		let plan = json_body(&body);
		assert_eq!(plan.as_array().unwrap().len(), 2);
		assert_eq!(plan[0]["meals"][0]["mealNumber"], 1);
		assert_eq!(plan[0]["dailyNutrition"]["calories"], 900.0);

		let (status, _, body) = send(&app, "GET", "/api/substitutes?ingredient=tofu", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(json_body(&body), json!([]));

		let (status, _, body) = send(&app, "GET", "/api/substitutes", None).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(json_body(&body)["error"], "VALIDATION_ERROR");

		// A new recipe evicts the feature reads too.
		send(&app, "POST", "/api/recipes", Some(recipe("Kung Pao"))).await;
		let (_, cache, _) = send(&app, "GET", uri, None).await;
		assert_eq!(cache.as_deref(), Some("MISS"));
	}
}
