//! Registry trait for self-registering implementations.
//!
//! Pluggable backends declare the name they are referenced by in the
//! configuration file together with the factory that builds them.

/// Base trait for implementation registries.
///
/// Each backend module (for example the storage backends) provides a
/// `Registry` struct implementing this trait, so the service can discover
/// every available implementation without a hand-maintained match.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	///
	/// This matches the key used in the TOML configuration, for example
	/// `memory` for `[storage.implementations.memory]`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Returns the factory function that builds this implementation from
	/// its configuration table.
	fn factory() -> Self::Factory;
}
