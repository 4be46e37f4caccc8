// Library exports for the service binary and integration tests
pub mod error;
pub mod lightning;
pub mod metrics;
pub mod monitor;
pub mod observability;
pub mod service;

#[cfg(feature = "api")]
pub mod api;
#[cfg(feature = "api")]
pub mod config;
#[cfg(feature = "api")]
pub mod health;
#[cfg(feature = "api")]
pub mod state;
