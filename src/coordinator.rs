//! ==============================================================================
//! coordinator.rs - the coordinator's single-task engine
//! ==============================================================================
//!
//! purpose:
//!     turns the scanner's stream of advertisements into registry updates and
//!     relay calls, sweeps out nodes that went quiet, and periodically reports
//!     what it knows.
//!
//! responsibilities:
//!     - recognize + upsert every matching advertisement
//!     - forward each observation to the remote store, inline
//!     - evict entries older than the ttl on a fixed cadence
//!     - publish a read-only snapshot for the http api
//!     - re-check the network link and rejoin when it drops
//!     - bootstrap: load credentials and join before any of the above
//!
//! relationships:
//!     - uses: scan.rs, registry.rs, relay.rs, network.rs, storage.rs
//!     - used by: main.rs (coordinator role)
//!
//! architecture:
//!
//! ```text
//!     ┌──────────────┐  mpsc (depth 1)  ┌────────────────────────────┐
//!     │ UdpScanner   │ ───────────────> │ Coordinator::run           │
//!     │ (radio.rs)   │                  │  select!:                  │
//!     └──────────────┘                  │   advertisement -> upsert  │──> HttpRelay
//!                                       │   sweep tick   -> evict    │
//!                                       │   report tick  -> snapshot │──> RegistryReport
//!                                       │   link tick    -> rejoin   │        │
//!                                       └────────────────────────────┘        ▼
//!                                                                      GET /api/pots
//! ```
//!
//! ==============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::MissedTickBehavior;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::advertisement::RawAdvertisement;
use crate::config::{CoordinatorConfig, NetworkConfig};
use crate::domain::{timestamp_ms, Credentials, NodeObservation, RegistryEntry, SnapshotRow, Timestamp};
use crate::error::CoordinatorError;
use crate::network::{self, NetworkLink};
use crate::registry::{PotRegistry, Upsert};
use crate::relay::{RelayForwarder, RelayRecord};
use crate::scan::ScanListener;
use crate::storage::CredentialStore;

// ==============================================================================
// shared report
// ==============================================================================
// the registry itself stays owned by the engine task. the http api only ever
// sees this copy, refreshed on the snapshot cadence.

#[derive(Clone, Debug, Default, Serialize)]
pub struct RegistryReport {
    pub pots: Vec<SnapshotRow>,
    /// unix timestamp (ms) of the last publish
    pub last_update: u64,
}

pub type SharedReport = Arc<RwLock<RegistryReport>>;

/// cadences of the engine's periodic work
#[derive(Clone, Copy, Debug)]
pub struct EngineTiming {
    pub sweep: Duration,
    pub snapshot: Duration,
    pub link_check: Duration,
}

impl From<&CoordinatorConfig> for EngineTiming {
    fn from(config: &CoordinatorConfig) -> Self {
        Self {
            sweep: Duration::from_secs(config.sweep_seconds.max(1)),
            snapshot: Duration::from_secs(config.snapshot_seconds.max(1)),
            link_check: Duration::from_secs(config.link_check_seconds.max(1)),
        }
    }
}

pub struct Coordinator<R> {
    listener: ScanListener,
    registry: PotRegistry,
    relay: R,
    status: String,
    report: SharedReport,
}

impl<R: RelayForwarder> Coordinator<R> {
    pub fn new(config: &CoordinatorConfig, status: impl Into<String>, relay: R) -> Self {
        Self {
            listener: ScanListener::from_config(config),
            registry: PotRegistry::new(config.ttl()),
            relay,
            status: status.into(),
            report: Arc::default(),
        }
    }

    pub fn registry(&self) -> &PotRegistry {
        &self.registry
    }

    pub fn report_handle(&self) -> SharedReport {
        self.report.clone()
    }

    /// recognize, upsert, then forward; the relay call is awaited before
    /// returning and its failure never touches the registry
    pub async fn handle_advertisement(
        &mut self,
        adv: &RawAdvertisement,
        now: Timestamp,
    ) -> Option<NodeObservation> {
        let observation = self.listener.recognize(adv, now)?;
        info!("Found Smart Pot: {} | Weight: {}", observation.id, observation.weight);

        if self.registry.upsert(&observation.id, &observation.weight, observation.seen_at) == Upsert::Inserted {
            info!("New pot added: {}", observation.id);
        }

        let record = RelayRecord {
            id: observation.id.to_string(),
            weight: observation.weight.clone(),
            timestamp: timestamp_ms(),
            status: self.status.clone(),
        };
        match self.relay.forward(&record).await {
            Ok(()) => debug!("relayed {} ({})", record.id, record.weight),
            Err(e) => warn!("relay of {} failed: {}", record.id, e),
        }

        Some(observation)
    }

    pub fn sweep(&mut self, now: Timestamp) -> Vec<RegistryEntry> {
        let evicted = self.registry.evict_stale(now);
        for entry in &evicted {
            info!("Removing inactive pot: {}", entry.id);
        }
        evicted
    }

    pub async fn publish_snapshot(&self, now: Timestamp) -> Vec<SnapshotRow> {
        let rows = self.registry.snapshot(now);

        info!("=== Current Pots ({}) ===", rows.len());
        for row in &rows {
            info!("  {} | Weight: {} | Last seen: {}s ago", row.id, row.weight, row.seconds_since_seen);
        }

        let mut report = self.report.write().await;
        report.pots = rows.clone();
        report.last_update = timestamp_ms();
        rows
    }

    /// the engine loop; returns when the event channel closes or shutdown is signalled
    pub async fn run<L: NetworkLink>(
        &mut self,
        mut events: mpsc::Receiver<RawAdvertisement>,
        link: &mut L,
        credentials: &Credentials,
        network_config: &NetworkConfig,
        timing: EngineTiming,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), CoordinatorError> {
        let mut sweep = tokio::time::interval(timing.sweep);
        let mut snapshot = tokio::time::interval(timing.snapshot);
        let mut link_check = tokio::time::interval(timing.link_check);
        for ticker in [&mut sweep, &mut snapshot, &mut link_check] {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }
        // the immediate first ticks carry nothing useful
        sweep.tick().await;
        snapshot.tick().await;
        link_check.tick().await;

        info!("Coordinator running, scanning for pots");
        loop {
            tokio::select! {
                maybe_adv = events.recv() => {
                    let Some(adv) = maybe_adv else {
                        info!("scanner stopped, coordinator exiting");
                        return Ok(());
                    };
                    self.handle_advertisement(&adv, Timestamp::now()).await;
                }
                _ = sweep.tick() => {
                    self.sweep(Timestamp::now());
                }
                _ = snapshot.tick() => {
                    self.publish_snapshot(Timestamp::now()).await;
                }
                _ = link_check.tick() => {
                    if !link.is_connected().await {
                        warn!("WiFi link down, rejoining {}", credentials.network_name);
                        if let Err(e) = network::join(link, credentials, network_config).await {
                            warn!("rejoin failed: {}", e);
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("coordinator shutting down");
                    return Ok(());
                }
            }
        }
    }
}

/// startup: stored credentials must exist and the link must come up
pub async fn bootstrap<S, L>(
    store: &S,
    link: &mut L,
    config: &NetworkConfig,
) -> Result<Credentials, CoordinatorError>
where
    S: CredentialStore,
    L: NetworkLink,
{
    let credentials = store.load().ok_or(CoordinatorError::ConfigurationMissing)?;
    network::join(link, &credentials, config).await?;
    Ok(credentials)
}

// ==============================================================================
// http api
// ==============================================================================

async fn pots_handler(State(report): State<SharedReport>) -> Json<RegistryReport> {
    let report = report.read().await;
    Json(report.clone())
}

fn api_router(report: SharedReport) -> Router {
    Router::new()
        .route("/api/pots", get(pots_handler))
        .layer(CorsLayer::permissive())
        .with_state(report)
}

pub async fn serve_api_on(listener: tokio::net::TcpListener, report: SharedReport) -> Result<()> {
    axum::serve(listener, api_router(report))
        .await
        .context("registry api server failed")
}

pub async fn serve_api(bind: SocketAddr, report: SharedReport) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind registry api on {}", bind))?;
    info!("Registry api live at http://{}/api/pots", bind);
    serve_api_on(listener, report).await
}
