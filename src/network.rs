//! ==============================================================================
//! network.rs - joining the coordinator's uplink network
//! ==============================================================================
//!
//! purpose:
//!     brings the coordinator onto the wifi network named in its stored
//!     credentials before it starts relaying, and re-checks the link while it
//!     runs.
//!
//! implementations:
//!     - feature="hardware": drives NetworkManager through `nmcli` subprocesses
//!     - otherwise: a mock link that is always up
//!
//! relationships:
//!     - used by: coordinator.rs (bootstrap, periodic link check)
//!
//! ==============================================================================

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::NetworkConfig;
use crate::domain::Credentials;
use crate::error::CoordinatorError;

pub trait NetworkLink: Send {
    /// start joining; completion is observed through `is_connected`
    fn begin(&mut self, credentials: &Credentials) -> impl Future<Output = ()> + Send;
    fn is_connected(&mut self) -> impl Future<Output = bool> + Send;
}

/// begin a join and poll for the link up to `join_attempts` times
pub async fn join<L: NetworkLink>(
    link: &mut L,
    credentials: &Credentials,
    config: &NetworkConfig,
) -> Result<(), CoordinatorError> {
    info!("Connecting to WiFi: {}", credentials.network_name);
    link.begin(credentials).await;

    let attempts = config.join_attempts.max(1);
    for attempt in 1..=attempts {
        if link.is_connected().await {
            info!("WiFi connected after {} check(s)", attempt);
            return Ok(());
        }
        debug!("link down, check {}/{}", attempt, attempts);
        tokio::time::sleep(Duration::from_millis(config.join_retry_ms)).await;
    }

    Err(CoordinatorError::ConnectivityFailure {
        network: credentials.network_name.clone(),
        attempts,
    })
}

// ==============================================================================
// mock link (development machines)
// ==============================================================================
#[cfg(not(feature = "hardware"))]
pub use mock::MockLink as HostLink;

#[cfg(not(feature = "hardware"))]
mod mock {
    use super::*;

    #[derive(Default)]
    pub struct MockLink;

    impl NetworkLink for MockLink {
        async fn begin(&mut self, credentials: &Credentials) {
            tracing::debug!("[MOCK NET] pretending to join {}", credentials.network_name);
        }

        async fn is_connected(&mut self) -> bool {
            true
        }
    }
}

// ==============================================================================
// nmcli link (Raspberry Pi)
// ==============================================================================
#[cfg(feature = "hardware")]
pub use nmcli::NmcliLink as HostLink;

#[cfg(feature = "hardware")]
mod nmcli {
    use super::*;
    use std::process::Command;

    #[derive(Default)]
    pub struct NmcliLink;

    impl NetworkLink for NmcliLink {
        async fn begin(&mut self, credentials: &Credentials) {
            let ssid = credentials.network_name.clone();
            let secret = credentials.network_secret.clone();
            // offload blocking subprocess to dedicated thread
            let output = tokio::task::spawn_blocking(move || {
                Command::new("nmcli")
                    .args(["dev", "wifi", "connect", ssid.as_str(), "password", secret.as_str()])
                    .output()
            })
            .await;

            match output {
                Ok(Ok(out)) if out.status.success() => {}
                Ok(Ok(out)) => tracing::warn!("nmcli connect failed: {}", String::from_utf8_lossy(&out.stderr).trim()),
                Ok(Err(e)) => tracing::warn!("failed to run nmcli: {}", e),
                Err(e) => tracing::warn!("nmcli task failed: {}", e),
            }
        }

        async fn is_connected(&mut self) -> bool {
            let output = tokio::task::spawn_blocking(|| {
                Command::new("nmcli").args(["-t", "-f", "STATE", "general"]).output()
            })
            .await;

            match output {
                Ok(Ok(out)) => String::from_utf8_lossy(&out.stdout).trim() == "connected",
                _ => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// comes up after `up_after` checks; `None` never comes up
    struct ScriptedLink {
        up_after: Option<u32>,
        checks: u32,
        begun: bool,
    }

    impl NetworkLink for ScriptedLink {
        async fn begin(&mut self, _credentials: &Credentials) {
            self.begun = true;
        }

        async fn is_connected(&mut self) -> bool {
            self.checks += 1;
            matches!(self.up_after, Some(n) if self.checks > n)
        }
    }

    fn creds() -> Credentials {
        Credentials { network_name: "greenhouse".into(), network_secret: "pw".into() }
    }

    #[tokio::test(start_paused = true)]
    async fn join_polls_until_link_is_up() {
        let mut link = ScriptedLink { up_after: Some(3), checks: 0, begun: false };
        join(&mut link, &creds(), &NetworkConfig::default()).await.unwrap();
        assert!(link.begun);
        assert_eq!(link.checks, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn join_gives_up_after_configured_attempts() {
        let mut link = ScriptedLink { up_after: None, checks: 0, begun: false };
        let config = NetworkConfig { join_attempts: 20, join_retry_ms: 500 };

        let started = tokio::time::Instant::now();
        match join(&mut link, &creds(), &config).await {
            Err(CoordinatorError::ConnectivityFailure { network, attempts }) => {
                assert_eq!(network, "greenhouse");
                assert_eq!(attempts, 20);
            }
            other => panic!("expected connectivity failure, got {:?}", other),
        }
        assert_eq!(link.checks, 20);
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[cfg(not(feature = "hardware"))]
    #[tokio::test]
    async fn mock_link_is_always_up() {
        let mut link = HostLink::default();
        assert!(join(&mut link, &creds(), &NetworkConfig::default()).await.is_ok());
    }
}
