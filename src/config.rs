//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `host.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - ClusterConfig: which side of the mesh this process plays (node/coordinator).
//!     - NodeConfig: duty-cycle timing and the init barrier limits.
//!     - SensorsConfig: HX711 pins and scale, tilt switch pin.
//!     - RadioConfig: udp addresses standing in for the radio medium.
//!     - CoordinatorConfig: marker, ttl, sweep/snapshot cadence, http bind.
//!     - RelayConfig / NetworkConfig / StorageConfig: remote store, wifi join, prefs file.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct HostConfig {
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub sensors: SensorsConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Node,
    #[default]
    Coordinator,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ClusterConfig {
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "text" or "json"
    pub format: String,
    pub show_readings: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "text".to_string(), show_readings: true }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RadioConfig {
    /// where the coordinator listens for advertisements
    pub bind: String,
    /// where nodes send advertisements
    pub target: String,
    pub advertising_interval_ms: u64,
    pub service_uuid: String,
    pub company_id: u16,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:47600".to_string(),
            target: "255.255.255.255:47600".to_string(),
            advertising_interval_ms: 1000,
            service_uuid: "12345678-1234-5678-9abc-123456789abc".to_string(),
            company_id: 0xFFFF,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NodeConfig {
    /// used when the prefs store has no name for this node
    pub default_name: String,
    pub active_seconds: u64,
    pub boot_window_seconds: u64,
    pub tilt_poll_ms: u64,
    pub init_retry_ms: u64,
    /// 0 waits forever
    pub init_retry_limit: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            default_name: "SmartPot_01".to_string(),
            active_seconds: 300,
            boot_window_seconds: 1800,
            tilt_poll_ms: 1000,
            init_retry_ms: 100,
            init_retry_limit: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SensorsConfig {
    #[serde(default)]
    pub hx711: Hx711Config,
    #[serde(default)]
    pub tilt: TiltConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Hx711Config {
    pub dout_pin: u8,
    pub sck_pin: u8,
    /// raw counts per gram
    pub scale: f32,
    /// readings averaged per measurement
    pub samples: u8,
    /// value reported by the mock HAL
    pub mock_grams: i64,
}

impl Default for Hx711Config {
    fn default() -> Self {
        Self { dout_pin: 4, sck_pin: 5, scale: 2280.0, samples: 5, mock_grams: 120 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TiltConfig {
    pub gpio_pin: u8,
}

impl Default for TiltConfig {
    fn default() -> Self {
        Self { gpio_pin: 6 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// substring a node name must contain
    pub marker: String,
    pub placeholder_weight: String,
    pub ttl_seconds: u64,
    pub sweep_seconds: u64,
    pub snapshot_seconds: u64,
    pub link_check_seconds: u64,
    pub scan_queue_depth: usize,
    pub http_bind: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            marker: "SmartPot".to_string(),
            placeholder_weight: "0g".to_string(),
            ttl_seconds: 300,
            sweep_seconds: 1,
            snapshot_seconds: 30,
            link_check_seconds: 10,
            scan_queue_depth: 1,
            http_bind: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RelayConfig {
    pub base_url: String,
    pub collection: String,
    pub secret: Option<String>,
    pub status: String,
    pub timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://your-project-default-rtdb.firebaseio.com".to_string(),
            collection: "smartpots".to_string(),
            secret: None,
            status: "active".to_string(),
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkConfig {
    pub join_attempts: u32,
    pub join_retry_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { join_attempts: 20, join_retry_ms: 500 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("data").join("prefs.json") }
    }
}

impl NodeConfig {
    pub fn active(&self) -> Duration {
        Duration::from_secs(self.active_seconds)
    }

    pub fn boot_window(&self) -> Duration {
        Duration::from_secs(self.boot_window_seconds)
    }

    pub fn tilt_poll(&self) -> Duration {
        Duration::from_millis(self.tilt_poll_ms.max(1))
    }

    pub fn init_retry(&self) -> Duration {
        Duration::from_millis(self.init_retry_ms.max(1))
    }
}

impl RadioConfig {
    pub fn advertising_interval(&self) -> Duration {
        Duration::from_millis(self.advertising_interval_ms.max(1))
    }
}

impl CoordinatorConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl HostConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config: HostConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        Ok(config)
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            PathBuf::from("config").join("host.toml"),
            PathBuf::from("..").join("config").join("host.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Self::default()
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│           HOST CONFIGURATION            │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Role: {:?}", self.cluster.role);
        println!("│ Log Level: {}", self.logging.level);
        match self.cluster.role {
            Role::Node => {
                println!("│ Active Window: {}s", self.node.active_seconds);
                println!("│ Boot Window: {}s", self.node.boot_window_seconds);
                println!("│ Advertise To: {}", self.radio.target);
            }
            Role::Coordinator => {
                println!("│ Marker: {}", self.coordinator.marker);
                println!("│ TTL: {}s", self.coordinator.ttl_seconds);
                println!("│ Listening On: {}", self.radio.bind);
                println!("│ Relay: {}/{}", self.relay.base_url, self.relay.collection);
            }
        }
        println!("└─────────────────────────────────────────┘");
    }
}
