//! Common types module for the bistro service.
//!
//! This module defines the core data types shared by the storage, cache,
//! order and catalog components. Keeping them in one place ensures every
//! crate agrees on wire formats and on the order lifecycle rules.

/// API types for HTTP responses and structured errors.
pub mod api;
/// Catalog types for menu items and recipes.
pub mod catalog;
/// Clock abstraction used for timestamps and TTL checks.
pub mod clock;
/// Order types including the status transition table.
pub mod order;
/// Pagination types shared by list queries.
pub mod pagination;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Storage namespace types.
pub mod storage;
/// Small string helpers.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use api::*;
pub use catalog::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use order::*;
pub use pagination::*;
pub use registry::ImplementationRegistry;
pub use storage::*;
pub use utils::truncate_id;
pub use validation::*;
