//! Configuration Module
//!
//! Environment-driven configuration for the ticker binary.

mod settings;

pub use settings::{ConfigError, ReconnectSettings, StartupSubscription, TickerSettings};
