//! Order state machine implementation.
//!
//! Every change to a stored order goes through [`OrderStateMachine`], which
//! reads the order, applies the change to a copy and writes it back with a
//! compare-and-swap on the bytes it read. Two concurrent writers therefore
//! cannot both succeed off the same observed state.

use bistro_storage::{StorageError, StorageService};
use bistro_types::{truncate_id, Clock, IllegalTransition, Order, OrderStatus, StorageKey};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	/// Another writer changed the order between read and write. Retryable.
	#[error("Order {0} was modified concurrently")]
	ConcurrentTransition(String),
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	/// The change is only allowed while the order awaits payment.
	#[error("Order can no longer be modified in status {status}")]
	NotEditable { status: OrderStatus },
}

impl From<IllegalTransition> for OrderStateError {
	fn from(e: IllegalTransition) -> Self {
		OrderStateError::InvalidTransition {
			from: e.from,
			to: e.to,
		}
	}
}

fn storage_error(order_id: &str, e: StorageError) -> OrderStateError {
	match e {
		StorageError::NotFound => OrderStateError::OrderNotFound(order_id.to_string()),
		StorageError::Conflict(_) => OrderStateError::ConcurrentTransition(order_id.to_string()),
		other => OrderStateError::Storage(other.to_string()),
	}
}

/// Manages order state transitions and persistence
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
	clock: Arc<dyn Clock>,
}

impl OrderStateMachine {
	pub fn new(storage: Arc<StorageService>, clock: Arc<dyn Clock>) -> Self {
		Self { storage, clock }
	}

	/// Applies `updater` to the stored order and persists the result if no
	/// other writer changed the order in the meantime.
	pub async fn update_order_with<F, E>(&self, order_id: &str, updater: F) -> Result<Order, E>
	where
		F: FnOnce(&mut Order) -> Result<(), E>,
		E: From<OrderStateError>,
	{
		let snapshot = self
			.storage
			.retrieve_snapshot::<Order>(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| E::from(storage_error(order_id, e)))?;

		let mut order = snapshot.value.clone();
		updater(&mut order)?;
		order.updated_at = self.clock.now();

		self.storage
			.compare_and_swap(StorageKey::Orders.as_str(), order_id, &snapshot, &order)
			.await
			.map_err(|e| E::from(storage_error(order_id, e)))?;

		Ok(order)
	}

	/// Transitions an order to a new status with validation.
	///
	/// A caller that loses a race gets `InvalidTransition` when the winning
	/// write made its transition illegal, and `ConcurrentTransition` when it
	/// would still be legal and may be retried.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), to = %new_status))]
	pub async fn transition_order_status(
		&self,
		order_id: &str,
		new_status: OrderStatus,
		note: Option<String>,
	) -> Result<Order, OrderStateError> {
		let now = self.clock.now();
		let result: Result<Order, OrderStateError> = self
			.update_order_with(order_id, |order| {
				order
					.apply_transition(new_status, note, now)
					.map_err(OrderStateError::from)
			})
			.await;

		match result {
			Ok(order) => {
				tracing::info!(status = %order.status, "Order status updated");
				Ok(order)
			},
			Err(OrderStateError::ConcurrentTransition(_)) => {
				let latest = self.get_order(order_id).await?;
				tracing::debug!(current = %latest.status, "Lost status update race");
				if latest.status.can_transition_to(new_status) {
					Err(OrderStateError::ConcurrentTransition(order_id.to_string()))
				} else {
					Err(OrderStateError::InvalidTransition {
						from: latest.status,
						to: new_status,
					})
				}
			},
			Err(e) => Err(e),
		}
	}

	/// Gets an order by ID
	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderStateError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| storage_error(order_id, e))
	}

	/// Stores a new order
	pub async fn store_order(&self, order: &Order) -> Result<(), OrderStateError> {
		self.storage
			.store(StorageKey::Orders.as_str(), &order.id, order)
			.await
			.map_err(|e| storage_error(&order.id, e))
	}

	/// Lists every stored order.
	pub async fn list_orders(&self) -> Result<Vec<Order>, OrderStateError> {
		self.storage
			.list(StorageKey::Orders.as_str())
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use bistro_storage::implementations::memory::MemoryStorage;
	use bistro_storage::StorageInterface;
	use bistro_types::{ConfigSchema, ManualClock, OrderDraft, OrderItem};
	use rust_decimal::Decimal;
	use std::time::Duration;
	use tokio::sync::Barrier;

	fn machine() -> (OrderStateMachine, ManualClock) {
		let clock = ManualClock::default();
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		(
			OrderStateMachine::new(storage, Arc::new(clock.clone())),
			clock,
		)
	}

	async fn stored_order(machine: &OrderStateMachine, clock: &ManualClock) -> Order {
		let draft = OrderDraft {
			customer: "customer-1".into(),
			items: vec![OrderItem {
				menu_item: "noodles".into(),
				quantity: 2,
				price: Decimal::from(10),
				special_instructions: None,
			}],
			..Default::default()
		};
		let order = Order::new(draft, clock.now());
		machine.store_order(&order).await.unwrap();
		order
	}

	async fn advance_to(machine: &OrderStateMachine, id: &str, statuses: &[OrderStatus]) {
		for status in statuses {
			machine
				.transition_order_status(id, *status, None)
				.await
				.unwrap();
		}
	}

	#[tokio::test]
	async fn test_full_lifecycle_history() {
		let (machine, clock) = machine();
		let order = stored_order(&machine, &clock).await;
		let path = [
			OrderStatus::Paid,
			OrderStatus::Preparing,
			OrderStatus::Delivering,
			OrderStatus::Completed,
		];
		advance_to(&machine, &order.id, &path).await;

		let stored = machine.get_order(&order.id).await.unwrap();
		assert_eq!(stored.status, OrderStatus::Completed);
		assert_eq!(stored.status_history.len(), path.len() + 1);
		let history: Vec<_> = stored.status_history.iter().map(|h| h.status).collect();
		assert_eq!(history[0], OrderStatus::PendingPayment);
		assert_eq!(&history[1..], &path);
	}

	#[tokio::test]
	async fn test_illegal_transition_leaves_stored_order_unchanged() {
		let (machine, clock) = machine();
		let order = stored_order(&machine, &clock).await;
		advance_to(&machine, &order.id, &[OrderStatus::Paid]).await;

		let result = machine
			.transition_order_status(&order.id, OrderStatus::Completed, None)
			.await;
		assert!(matches!(
			result,
			Err(OrderStateError::InvalidTransition {
				from: OrderStatus::Paid,
				to: OrderStatus::Completed
			})
		));

		let stored = machine.get_order(&order.id).await.unwrap();
		assert_eq!(stored.status, OrderStatus::Paid);
		assert_eq!(stored.status_history.len(), 2);
	}

	#[tokio::test]
	async fn test_delivering_stamps_actual_delivery_time() {
		let (machine, clock) = machine();
		let order = stored_order(&machine, &clock).await;
		advance_to(&machine, &order.id, &[OrderStatus::Paid, OrderStatus::Preparing]).await;
		clock.advance_secs(600);

		let updated = machine
			.transition_order_status(
				&order.id,
				OrderStatus::Delivering,
				Some("out for delivery".into()),
			)
			.await
			.unwrap();

		assert_eq!(updated.delivery_time.actual, Some(clock.now()));
		assert_eq!(updated.status_history.len(), 4);
		let last = updated.status_history.last().unwrap();
		assert_eq!(last.note.as_deref(), Some("out for delivery"));
		assert_eq!(updated.updated_at, clock.now());
	}

	#[tokio::test]
	async fn test_terminal_states_reject_everything() {
		let (machine, clock) = machine();
		let order = stored_order(&machine, &clock).await;
		advance_to(&machine, &order.id, &[OrderStatus::Cancelled]).await;

		for status in OrderStatus::all() {
			let result = machine.transition_order_status(&order.id, status, None).await;
			assert!(matches!(result, Err(OrderStateError::InvalidTransition { .. })));
		}
	}

	#[tokio::test]
	async fn test_missing_order() {
		let (machine, _clock) = machine();
		let result = machine
			.transition_order_status("missing", OrderStatus::Paid, None)
			.await;
		assert!(matches!(result, Err(OrderStateError::OrderNotFound(id)) if id == "missing"));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_transitions_never_overwrite_history() {
		let (machine, clock) = machine();
		let machine = Arc::new(machine);
		let order = stored_order(&machine, &clock).await;
		advance_to(&machine, &order.id, &[OrderStatus::Paid]).await;

		let targets = [
			OrderStatus::Preparing,
			OrderStatus::Cancelled,
			OrderStatus::Preparing,
			OrderStatus::Cancelled,
		];
		let results = futures::future::join_all(targets.iter().map(|status| {
			let machine = Arc::clone(&machine);
			let id = order.id.clone();
			let status = *status;
			tokio::spawn(async move { machine.transition_order_status(&id, status, None).await })
		}))
		.await;

		let mut winners = 0;
		for result in results {
			match result.unwrap() {
				Ok(_) => winners += 1,
				Err(OrderStateError::InvalidTransition { .. })
				| Err(OrderStateError::ConcurrentTransition(_)) => {},
				Err(other) => panic!("unexpected error: {other}"),
			}
		}
		assert!(winners >= 1);

		// Every success left a trace in the history; nothing was overwritten.
		let stored = machine.get_order(&order.id).await.unwrap();
		assert_eq!(stored.status_history.len(), 2 + winners);
	}

	/// Memory storage whose compare-and-swap waits until every racing
	/// writer has read the order.
	struct GatedStorage {
		inner: MemoryStorage,
		gate: Barrier,
	}

	#[async_trait]
	impl StorageInterface for GatedStorage {
		async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
			self.inner.get_bytes(key).await
		}

		async fn set_bytes(
			&self,
			key: &str,
			value: Vec<u8>,
			ttl: Option<Duration>,
		) -> Result<(), StorageError> {
			self.inner.set_bytes(key, value, ttl).await
		}

		async fn delete(&self, key: &str) -> Result<(), StorageError> {
			self.inner.delete(key).await
		}

		async fn exists(&self, key: &str) -> Result<bool, StorageError> {
			self.inner.exists(key).await
		}

		async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StorageError> {
			self.inner.scan_keys(pattern).await
		}

		async fn compare_and_swap(
			&self,
			key: &str,
			expected: &[u8],
			value: Vec<u8>,
			ttl: Option<Duration>,
		) -> Result<bool, StorageError> {
			self.gate.wait().await;
			self.inner.compare_and_swap(key, expected, value, ttl).await
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			self.inner.config_schema()
		}
	}

	/// Runs two transitions that both observe `paid` before either writes.
	async fn race(
		targets: [OrderStatus; 2],
	) -> (
		Result<Order, OrderStateError>,
		Result<Order, OrderStateError>,
		Order,
	) {
		let clock = ManualClock::default();
		let storage = Arc::new(StorageService::new(Box::new(GatedStorage {
			inner: MemoryStorage::new(),
			gate: Barrier::new(2),
		})));
		let machine = OrderStateMachine::new(storage, Arc::new(clock.clone()));

		// Stored already paid so setup needs no compare-and-swap.
		let mut order = Order::new(OrderDraft::default(), clock.now());
		order
			.apply_transition(OrderStatus::Paid, None, clock.now())
			.unwrap();
		machine.store_order(&order).await.unwrap();

		let (first, second) = tokio::join!(
			machine.transition_order_status(&order.id, targets[0], None),
			machine.transition_order_status(&order.id, targets[1], None),
		);
		let stored = machine.get_order(&order.id).await.unwrap();
		(first, second, stored)
	}

	#[tokio::test]
	async fn test_same_transition_race_has_one_winner() {
		let (first, second, stored) = race([OrderStatus::Preparing, OrderStatus::Preparing]).await;

		let (winner, loser) = match (first, second) {
			(Ok(order), Err(e)) | (Err(e), Ok(order)) => (order, e),
			(first, second) => panic!("expected one winner, got {first:?} and {second:?}"),
		};
		assert_eq!(winner.status, OrderStatus::Preparing);
		assert!(matches!(
			loser,
			OrderStateError::InvalidTransition {
				from: OrderStatus::Preparing,
				to: OrderStatus::Preparing
			}
		));
		assert_eq!(stored.status_history.len(), 3);
	}

	#[tokio::test]
	async fn test_conflicting_transition_race_reports_loser_outcome() {
		let (first, second, stored) = race([OrderStatus::Preparing, OrderStatus::Cancelled]).await;

		let (winner, loser) = match (first, second) {
			(Ok(order), Err(e)) | (Err(e), Ok(order)) => (order, e),
			(first, second) => panic!("expected one winner, got {first:?} and {second:?}"),
		};
		assert_eq!(stored.status, winner.status);
		assert_eq!(stored.status_history.len(), 3);
		match winner.status {
			// Cancelling a preparing order is still legal: retryable.
			OrderStatus::Preparing => {
				assert!(matches!(loser, OrderStateError::ConcurrentTransition(_)))
			},
			OrderStatus::Cancelled => assert!(matches!(
				loser,
				OrderStateError::InvalidTransition {
					from: OrderStatus::Cancelled,
					to: OrderStatus::Preparing
				}
			)),
			other => panic!("unexpected winner status {other}"),
		}
	}

	#[tokio::test]
	async fn test_stale_writer_gets_invalid_transition() {
		let (machine, clock) = machine();
		let order = stored_order(&machine, &clock).await;
		advance_to(&machine, &order.id, &[OrderStatus::Paid]).await;

		// Both callers read "paid"; the first moves to cancelled before the
		// second writes.
		let snapshot = machine
			.storage
			.retrieve_snapshot::<Order>(StorageKey::Orders.as_str(), &order.id)
			.await
			.unwrap();
		machine
			.transition_order_status(&order.id, OrderStatus::Cancelled, None)
			.await
			.unwrap();

		let mut stale = snapshot.value.clone();
		stale
			.apply_transition(OrderStatus::Preparing, None, clock.now())
			.unwrap();
		let result = machine
			.storage
			.compare_and_swap(StorageKey::Orders.as_str(), &order.id, &snapshot, &stale)
			.await;
		assert!(matches!(result, Err(StorageError::Conflict(_))));

		let retry = machine
			.transition_order_status(&order.id, OrderStatus::Preparing, None)
			.await;
		assert!(matches!(
			retry,
			Err(OrderStateError::InvalidTransition {
				from: OrderStatus::Cancelled,
				..
			})
		));
	}
}
