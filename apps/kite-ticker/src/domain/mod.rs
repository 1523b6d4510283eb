//! Domain Layer - Core streaming types and business logic.
//!
//! This layer contains the core domain types for the ticker with no I/O.
//! All types here are pure Rust with serialization support.

/// Market data types (ticks, depth, modes, segments).
pub mod streaming;

/// Subscription registry and reconnect replay plan.
pub mod subscription;

/// Order updates pushed over the ticker socket.
pub mod order;
