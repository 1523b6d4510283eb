//! Application Layer - Event delivery and port definitions.
//!
//! This layer contains the callback plumbing and the port interfaces
//! that define how the ticker talks to the network.

/// Port interfaces for external systems (transport, session).
pub mod ports;

/// Ticker events and callback slots.
pub mod services;
