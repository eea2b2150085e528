//! Core services of the bistro backend.
//!
//! Wires storage, the response cache, the catalog services and the order
//! lifecycle together. Order status changes go through
//! [`state::OrderStateMachine`], which guards every write with an optimistic
//! compare-and-swap on the stored document.

pub mod builder;
pub mod catalog;
pub mod engine;
pub mod orders;
pub mod state;

pub use builder::{BistroBuilder, BistroFactories, BuilderError};
pub use catalog::{
	CatalogError, MealPlanQuery, MenuQuery, MenuService, MenuSort, RecipeQuery, RecipeService,
	RecipeSort, SubstituteQuery, SuggestionQuery,
};
pub use engine::BistroEngine;
pub use orders::{CreateOrderRequest, OrderError, OrderFilter, OrderItemRequest, OrderService};
pub use state::{OrderStateError, OrderStateMachine};
