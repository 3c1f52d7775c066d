//! ==============================================================================
//! potmesh - duty-cycled weighing nodes and the coordinator that hears them
//! ==============================================================================
//!
//! node side:
//!     hal.rs -> controller.rs -> broadcaster.rs / radio.rs
//!                            \-> power.rs (suspend + wake)
//!
//! coordinator side:
//!     radio.rs (scanner) -> coordinator.rs -> scan.rs, registry.rs, relay.rs
//!                                          \-> network.rs, provisioning.rs
//!
//! shared:
//!     config.rs, domain.rs, error.rs, storage.rs, advertisement.rs, logging.rs,
//!     shutdown.rs
//!
//! ==============================================================================

pub mod advertisement;
pub mod broadcaster;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod hal;
pub mod logging;
pub mod network;
pub mod power;
pub mod provisioning;
pub mod radio;
pub mod registry;
pub mod relay;
pub mod scan;
pub mod shutdown;
pub mod storage;
