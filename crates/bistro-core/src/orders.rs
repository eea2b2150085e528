//! Order service.
//!
//! Creates orders from client requests, snapshotting the catalog price of
//! every line, and routes every later change through the
//! [`OrderStateMachine`].

use crate::catalog::{CatalogError, MenuService};
use crate::state::{OrderStateError, OrderStateMachine};
use bistro_types::{
	truncate_id, Clock, DeliveryAddress, Order, OrderDraft, OrderItem, OrderStatus, Page,
	PageRequest, PaymentMethod,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur in order operations.
#[derive(Debug, Error)]
pub enum OrderError {
	#[error("Validation error: {0}")]
	Validation(String),
	#[error("Menu item not found: {0}")]
	MenuItemNotFound(String),
	#[error("Menu item is not available: {0}")]
	MenuItemUnavailable(String),
	#[error("Catalog error: {0}")]
	Catalog(String),
	#[error(transparent)]
	State(#[from] OrderStateError),
}

/// One requested line. The price is taken from the catalog, never from the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
	pub menu_item: String,
	pub quantity: u32,
	#[serde(default)]
	pub special_instructions: Option<String>,
}

/// Body of an order creation request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
	pub customer: String,
	pub items: Vec<OrderItemRequest>,
	#[serde(default)]
	pub payment_method: Option<PaymentMethod>,
	#[serde(default)]
	pub delivery_address: DeliveryAddress,
	#[serde(default)]
	pub requested_delivery: Option<DateTime<Utc>>,
	#[serde(default)]
	pub special_requirements: Option<String>,
	#[serde(default)]
	pub coupon_applied: Option<String>,
	#[serde(default)]
	pub discount_amount: Decimal,
}

/// Filters of the order listing. Date bounds apply to the creation time and
/// are inclusive.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilter {
	pub customer: Option<String>,
	pub status: Option<OrderStatus>,
	#[serde(alias = "startDate")]
	pub from: Option<DateTime<Utc>>,
	#[serde(alias = "endDate")]
	pub to: Option<DateTime<Utc>>,
	pub page: Option<usize>,
	pub limit: Option<usize>,
}

impl OrderFilter {
	fn matches(&self, order: &Order) -> bool {
		self.customer.as_deref().is_none_or(|c| c == order.customer)
			&& self.status.is_none_or(|s| s == order.status)
			&& self.from.is_none_or(|from| order.created_at >= from)
			&& self.to.is_none_or(|to| order.created_at <= to)
	}
}

/// Service for placing and managing orders.
pub struct OrderService {
	state_machine: Arc<OrderStateMachine>,
	menu: Arc<MenuService>,
	clock: Arc<dyn Clock>,
}

impl OrderService {
	pub fn new(
		state_machine: Arc<OrderStateMachine>,
		menu: Arc<MenuService>,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			state_machine,
			menu,
			clock,
		}
	}

	/// Places a new order in `PendingPayment`.
	#[instrument(skip_all, fields(customer = %request.customer))]
	pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order, OrderError> {
		if request.customer.trim().is_empty() {
			return Err(OrderError::Validation("Customer is required".into()));
		}
		let items = self.price_items(request.items).await?;
		check_discount(request.discount_amount, &items)?;

		let draft = OrderDraft {
			customer: request.customer,
			items,
			payment_method: request.payment_method,
			delivery_address: request.delivery_address,
			requested_delivery: request.requested_delivery,
			special_requirements: request.special_requirements,
			coupon_applied: request.coupon_applied,
			discount_amount: request.discount_amount,
		};
		let order = Order::new(draft, self.clock.now());
		self.state_machine.store_order(&order).await?;

		tracing::info!(
			order_id = %truncate_id(&order.id),
			order_number = %order.order_number,
			total = %order.total_amount,
			"Order created"
		);
		Ok(order)
	}

	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderError> {
		Ok(self.state_machine.get_order(order_id).await?)
	}

	/// Lists orders matching `filter`, newest first.
	pub async fn list_orders(&self, filter: &OrderFilter) -> Result<Page<Order>, OrderError> {
		let mut orders: Vec<Order> = self
			.state_machine
			.list_orders()
			.await?
			.into_iter()
			.filter(|o| filter.matches(o))
			.collect();
		orders.sort_by(|a, b| {
			b.created_at
				.cmp(&a.created_at)
				.then_with(|| b.order_number.cmp(&a.order_number))
		});

		Ok(Page::from_sorted(orders, PageRequest::new(filter.page, filter.limit)))
	}

	pub async fn update_status(
		&self,
		order_id: &str,
		status: OrderStatus,
		note: Option<String>,
	) -> Result<Order, OrderError> {
		Ok(self
			.state_machine
			.transition_order_status(order_id, status, note)
			.await?)
	}

	pub async fn cancel_order(&self, order_id: &str, note: Option<String>) -> Result<Order, OrderError> {
		self.update_status(order_id, OrderStatus::Cancelled, note).await
	}

	/// Replaces the items of an order still awaiting payment.
	///
	/// Prices are snapshotted again from the current catalog.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn replace_items(
		&self,
		order_id: &str,
		items: Vec<OrderItemRequest>,
	) -> Result<Order, OrderError> {
		let items = self.price_items(items).await?;

		let order = self
			.state_machine
			.update_order_with(order_id, |order| {
				if order.status != OrderStatus::PendingPayment {
					return Err(OrderError::State(OrderStateError::NotEditable {
						status: order.status,
					}));
				}
				check_discount(order.discount_amount, &items)?;
				order.set_items(items);
				Ok(())
			})
			.await?;

		tracing::info!(total = %order.total_amount, "Order items replaced");
		Ok(order)
	}

	/// Resolves every requested line against the catalog.
	async fn price_items(&self, requests: Vec<OrderItemRequest>) -> Result<Vec<OrderItem>, OrderError> {
		if requests.is_empty() {
			return Err(OrderError::Validation(
				"Order must contain at least one item".into(),
			));
		}

		let mut items = Vec::with_capacity(requests.len());
		for request in requests {
			if request.quantity == 0 {
				return Err(OrderError::Validation(format!(
					"Quantity for {} must be at least 1",
					request.menu_item
				)));
			}
			let menu_item = match self.menu.get(&request.menu_item).await {
				Ok(item) => item,
				Err(CatalogError::NotFound { id, .. }) => return Err(OrderError::MenuItemNotFound(id)),
				Err(e) => return Err(OrderError::Catalog(e.to_string())),
			};
			if !menu_item.is_available {
				return Err(OrderError::MenuItemUnavailable(menu_item.id));
			}
			items.push(OrderItem {
				menu_item: menu_item.id,
				quantity: request.quantity,
				price: menu_item.price,
				special_instructions: request.special_instructions,
			});
		}
		Ok(items)
	}
}

fn check_discount(discount: Decimal, items: &[OrderItem]) -> Result<(), OrderError> {
	let subtotal: Decimal = items.iter().map(OrderItem::line_total).sum();
	if discount.is_sign_negative() || discount > subtotal {
		return Err(OrderError::Validation(format!(
			"Discount {} must be between 0 and the subtotal {}",
			discount, subtotal
		)));
	}
	Ok(())
}
