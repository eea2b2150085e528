//! Order types for the bistro service.
//!
//! This module defines orders, their line items, and the status lifecycle.
//! The lifecycle is a closed transition table: orders start in
//! `PendingPayment`, move forward one step at a time, and may be cancelled
//! from any non-terminal state.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Status of an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	/// Order has been placed and awaits payment.
	PendingPayment,
	/// Payment has been received.
	Paid,
	/// The kitchen is preparing the order.
	Preparing,
	/// The order is out for delivery.
	Delivering,
	/// The order was delivered.
	Completed,
	/// The order was cancelled.
	Cancelled,
}

/// Static transition table - each state maps to allowed next states.
static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	use OrderStatus::*;

	let mut m = HashMap::new();
	m.insert(PendingPayment, HashSet::from([Paid, Cancelled]));
	m.insert(Paid, HashSet::from([Preparing, Cancelled]));
	m.insert(Preparing, HashSet::from([Delivering, Cancelled]));
	m.insert(Delivering, HashSet::from([Completed, Cancelled]));
	m.insert(Completed, HashSet::new()); // terminal
	m.insert(Cancelled, HashSet::new()); // terminal
	m
});

impl OrderStatus {
	/// Returns every status in lifecycle order.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::PendingPayment,
			Self::Paid,
			Self::Preparing,
			Self::Delivering,
			Self::Completed,
			Self::Cancelled,
		]
		.into_iter()
	}

	/// Returns the wire name of the status.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::PendingPayment => "pending_payment",
			Self::Paid => "paid",
			Self::Preparing => "preparing",
			Self::Delivering => "delivering",
			Self::Completed => "completed",
			Self::Cancelled => "cancelled",
		}
	}

	/// Checks whether moving from this status to `to` is a legal transition.
	pub fn can_transition_to(&self, to: OrderStatus) -> bool {
		TRANSITIONS.get(self).is_some_and(|set| set.contains(&to))
	}

	/// Returns the statuses reachable from this one, in lifecycle order.
	pub fn allowed_transitions(&self) -> Vec<OrderStatus> {
		Self::all().filter(|to| self.can_transition_to(*to)).collect()
	}

	/// Terminal statuses accept no further transitions.
	pub fn is_terminal(&self) -> bool {
		TRANSITIONS.get(self).is_none_or(|set| set.is_empty())
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all()
			.find(|status| status.as_str() == s)
			.ok_or_else(|| format!("Unknown order status: {}", s))
	}
}

/// Error returned when a status change is not permitted by the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid state transition from {from} to {to}")]
pub struct IllegalTransition {
	pub from: OrderStatus,
	pub to: OrderStatus,
}

/// One entry of an order's append-only status history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusChange {
	pub status: OrderStatus,
	pub timestamp: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
}

/// Requested and actual delivery times.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeliveryTime {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub requested: Option<DateTime<Utc>>,
	/// Set once, when the order starts delivering.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub actual: Option<DateTime<Utc>>,
}

/// Where an order is delivered to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAddress {
	#[serde(default)]
	pub street: Option<String>,
	#[serde(default)]
	pub city: Option<String>,
	#[serde(default)]
	pub state: Option<String>,
	#[serde(default)]
	pub zip_code: Option<String>,
	#[serde(default)]
	pub contact_number: Option<String>,
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
	WechatPay,
	Alipay,
	BankCard,
}

/// State of the payment attached to an order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
	#[default]
	Pending,
	Succeeded,
	Failed,
	Refunded,
}

/// A line of an order.
///
/// `price` is a snapshot of the catalog price taken when the item was added
/// and is never refreshed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
	/// Identifier of the referenced menu item.
	pub menu_item: String,
	pub quantity: u32,
	pub price: Decimal,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub special_instructions: Option<String>,
}

impl OrderItem {
	/// Price multiplied by quantity.
	pub fn line_total(&self) -> Decimal {
		self.price * Decimal::from(self.quantity)
	}
}

/// Everything needed to open a new order, with prices already snapshotted.
#[derive(Debug, Clone, Default)]
pub struct OrderDraft {
	pub customer: String,
	pub items: Vec<OrderItem>,
	pub payment_method: Option<PaymentMethod>,
	pub delivery_address: DeliveryAddress,
	pub requested_delivery: Option<DateTime<Utc>>,
	pub special_requirements: Option<String>,
	pub coupon_applied: Option<String>,
	pub discount_amount: Decimal,
}

/// A customer order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
	/// Unique identifier for this order.
	pub id: String,
	/// Human readable number, `ORD<yyMMdd><4 digits>`.
	pub order_number: String,
	/// Customer that placed the order.
	pub customer: String,
	pub items: Vec<OrderItem>,
	/// Sum of line totals minus `discount_amount`.
	pub total_amount: Decimal,
	pub status: OrderStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub payment_method: Option<PaymentMethod>,
	#[serde(default)]
	pub payment_status: PaymentStatus,
	#[serde(default)]
	pub delivery_address: DeliveryAddress,
	#[serde(default)]
	pub delivery_time: DeliveryTime,
	/// Append-only, oldest first.
	pub status_history: Vec<StatusChange>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub special_requirements: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub coupon_applied: Option<String>,
	#[serde(default)]
	pub discount_amount: Decimal,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Order {
	/// Opens a new order in `PendingPayment` and records the initial history entry.
	pub fn new(draft: OrderDraft, now: DateTime<Utc>) -> Self {
		let id = Uuid::new_v4();
		let order_number = format!("ORD{}{:04}", now.format("%y%m%d"), id.as_u128() % 10_000);

		let mut order = Self {
			id: id.to_string(),
			order_number,
			customer: draft.customer,
			items: Vec::new(),
			total_amount: Decimal::ZERO,
			status: OrderStatus::PendingPayment,
			payment_method: draft.payment_method,
			payment_status: PaymentStatus::Pending,
			delivery_address: draft.delivery_address,
			delivery_time: DeliveryTime {
				requested: draft.requested_delivery,
				actual: None,
			},
			status_history: vec![StatusChange {
				status: OrderStatus::PendingPayment,
				timestamp: now,
				note: None,
			}],
			special_requirements: draft.special_requirements,
			coupon_applied: draft.coupon_applied,
			discount_amount: draft.discount_amount,
			created_at: now,
			updated_at: now,
		};
		order.set_items(draft.items);
		order
	}

	/// Replaces the item list and recomputes the total.
	pub fn set_items(&mut self, items: Vec<OrderItem>) {
		self.items = items;
		self.recompute_total();
	}

	/// Sum of all line totals before discount.
	pub fn subtotal(&self) -> Decimal {
		self.items.iter().map(OrderItem::line_total).sum()
	}

	/// Recomputes `total_amount` from the items and the discount.
	///
	/// A discount larger than the subtotal yields a negative total; callers
	/// validate discounts before they reach the order.
	pub fn recompute_total(&mut self) {
		self.total_amount = self.subtotal() - self.discount_amount;
	}

	/// Moves the order to `to`, appending a history entry.
	///
	/// On failure the order is left untouched. Entering `Delivering` also
	/// stamps the actual delivery time.
	pub fn apply_transition(
		&mut self,
		to: OrderStatus,
		note: Option<String>,
		now: DateTime<Utc>,
	) -> Result<(), IllegalTransition> {
		if !self.status.can_transition_to(to) {
			return Err(IllegalTransition {
				from: self.status,
				to,
			});
		}

		self.status = to;
		self.status_history.push(StatusChange {
			status: to,
			timestamp: now,
			note,
		});
		if to == OrderStatus::Delivering {
			self.delivery_time.actual = Some(now);
		}
		self.updated_at = now;
		Ok(())
	}
}
