//! State management for stored orders.

pub mod order;

pub use order::{OrderStateError, OrderStateMachine};
