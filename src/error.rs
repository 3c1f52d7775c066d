//! ==============================================================================
//! error.rs - typed errors for the node and the coordinator
//! ==============================================================================
//!
//! purpose:
//!     the failure conditions that cross module boundaries. radio, codec and
//!     storage errors live next to their modules (radio.rs, advertisement.rs,
//!     storage.rs).
//!
//! relationships:
//!     - used by: hal.rs, controller.rs, relay.rs, network.rs, coordinator.rs
//!
//! ==============================================================================

use std::time::Duration;

/// Errors from the weighing sensor.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("sensor not ready")]
    NotReady,
}

/// Errors that end the node before its first duty cycle.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("sensor not ready after {attempts} attempts ({waited:?})")]
    SensorInitTimeout { attempts: u32, waited: Duration },
}

/// Errors from pushing an observation to the remote store.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("remote store answered {0}")]
    Status(u16),
    #[error("invalid remote store url {0}")]
    BadUrl(String),
}

/// Conditions that keep the coordinator out of normal operation.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("no stored network credentials")]
    ConfigurationMissing,
    #[error("could not join network {network:?} after {attempts} attempts")]
    ConnectivityFailure { network: String, attempts: u32 },
}
