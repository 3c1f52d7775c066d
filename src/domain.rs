//! ==============================================================================
//! domain.rs - shared data model for nodes and the coordinator
//! ==============================================================================
//!
//! purpose:
//!     the types that cross module boundaries: measurements, node identities,
//!     registry rows, duty-cycle states, wake sources, retained state and
//!     network credentials.
//!
//! relationships:
//!     - used by: controller.rs, registry.rs, scan.rs, relay.rs, provisioning.rs
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// monotonic timestamp, pausable under `tokio::test(start_paused = true)`
pub type Timestamp = tokio::time::Instant;

/// wire text carried instead of a value when the sensor could not be read
pub const UNAVAILABLE_TEXT: &str = "ERR";

/// get current timestamp in milliseconds (unix epoch)
///
/// only used where a time leaves the process (measurement capture, relay body).
pub fn timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ==============================================================================
// measurement
// ==============================================================================

/// one weighing result as produced on the node
#[derive(Clone, Debug, PartialEq)]
pub enum Measurement {
    Reading {
        value: i64,
        unit: String,
        /// unix timestamp (ms) of capture
        captured_at_ms: u64,
    },
    /// sensor not ready or read failed; still broadcast
    Unavailable,
}

impl Measurement {
    pub fn grams(value: i64) -> Self {
        Measurement::Reading {
            value,
            unit: "g".to_string(),
            captured_at_ms: timestamp_ms(),
        }
    }

    /// text placed in the advertisement payload, e.g. "120g" or "ERR"
    pub fn payload_text(&self) -> String {
        match self {
            Measurement::Reading { value, unit, .. } => format!("{}{}", value, unit),
            Measurement::Unavailable => UNAVAILABLE_TEXT.to_string(),
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.payload_text())
    }
}

// ==============================================================================
// coordinator side
// ==============================================================================

/// identifier of a node, taken verbatim from its advertised name
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeIdentity(pub String);

impl NodeIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeIdentity {
    fn from(s: &str) -> Self {
        NodeIdentity(s.to_string())
    }
}

/// a recognized advertisement, normalized by the scan listener
#[derive(Clone, Debug, PartialEq)]
pub struct NodeObservation {
    pub id: NodeIdentity,
    /// opaque measurement text, never parsed
    pub weight: String,
    pub seen_at: Timestamp,
}

/// one row of the coordinator registry
#[derive(Clone, Debug, PartialEq)]
pub struct RegistryEntry {
    pub id: NodeIdentity,
    pub last_measurement: String,
    pub last_seen: Timestamp,
}

/// read-only view of a registry row for reporting
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SnapshotRow {
    pub id: String,
    pub weight: String,
    pub seconds_since_seen: u64,
}

// ==============================================================================
// node side
// ==============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DutyCycleState {
    /// active, and still inside the post cold-start boot window
    BootWindow,
    Active,
    Suspended,
}

/// what resumes the node from suspension
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeSource {
    TimerDeadline(Duration),
    /// tilt switch edge, no timer bound
    ExternalSignal,
}

/// why the node is running the current cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeCause {
    ColdStart,
    Timer,
    Tilt,
}

/// state that survives a low-power suspend but not a full power loss.
///
/// created once at cold start and handed to the controller by reference;
/// nothing else reads or writes it.
#[derive(Clone, Copy, Debug)]
pub struct RetainedState {
    pub is_first_boot: bool,
    pub boot_time: Timestamp,
}

impl RetainedState {
    pub fn cold_start() -> Self {
        Self {
            is_first_boot: true,
            boot_time: Timestamp::now(),
        }
    }
}

// ==============================================================================
// credentials
// ==============================================================================

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub network_name: String,
    pub network_secret: String,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        !self.network_name.is_empty() && !self.network_secret.is_empty()
    }
}

// secret stays out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("network_name", &self.network_name)
            .field("network_secret", &"<redacted>")
            .finish()
    }
}
