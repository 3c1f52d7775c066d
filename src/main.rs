//! ==============================================================================
//! main.rs - potmesh entry point
//! ==============================================================================
//!
//! purpose:
//!     one binary for both sides of the mesh. `[cluster] role` in
//!     config/host.toml picks which one this process runs.
//!
//! responsibilities:
//!     - load configuration (path from argv, else config/host.toml, else defaults)
//!     - initialize logging
//!     - node: wire the hal, radio and power into the duty-cycle controller
//!     - coordinator: bootstrap credentials, fall back to provisioning, then
//!       run the scanner, the engine and the registry api
//!
//! architecture:
//!
//!     ┌─────────────────────── coordinator ───────────────────────┐
//!     │  bootstrap ──(missing / no link)──> provisioning (http)   │
//!     │      │                                   │ saved          │
//!     │      │ <─────────────── restart ─────────┘                │
//!     │      ▼                                                    │
//!     │  scanner task ──mpsc──> engine task ──> remote store      │
//!     │                              │                            │
//!     │                              └──> /api/pots (http)        │
//!     └───────────────────────────────────────────────────────────┘
//!
//! ==============================================================================

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use potmesh::broadcaster::AdvertisingIdentity;
use potmesh::config::{HostConfig, Role};
use potmesh::controller::{DutyCycleController, DutyCycleTiming};
use potmesh::coordinator::{self, Coordinator, EngineTiming};
use potmesh::domain::{Credentials, RetainedState};
use potmesh::hal::Hal;
use potmesh::network::HostLink;
use potmesh::power::HostPower;
use potmesh::radio::{self, UdpBroadcaster, UdpScanner};
use potmesh::relay::HttpRelay;
use potmesh::storage::{KeyValueStore, NAME_KEY, POT_NAMESPACE};
use potmesh::shutdown::shutdown_on;
use potmesh::{logging, provisioning};

#[tokio::main]
async fn main() -> Result<()> {
    println!("===========================================================");
    println!("  potmesh - Smart Pot Mesh");
    println!("===========================================================");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            println!("[CONFIG] Loading {}", path);
            HostConfig::load(&path)?
        }
        None => HostConfig::load_or_default(),
    };
    config.print_summary();
    logging::init(&config.logging);

    match config.cluster.role {
        Role::Node => run_node(&config).await,
        Role::Coordinator => run_coordinator(&config).await,
    }
}

// ==============================================================================
// node
// ==============================================================================

async fn run_node(config: &HostConfig) -> Result<()> {
    let store = KeyValueStore::open(&config.storage.path)?;
    let name = store.get_or(POT_NAMESPACE, NAME_KEY, &config.node.default_name);
    info!("Pot name: {}", name);

    let hal = Hal::new(&config.sensors)?;
    let identity = AdvertisingIdentity::from_config(name, &config.radio)?;
    let broadcaster = UdpBroadcaster::bind(
        identity,
        radio::parse_addr(&config.radio.target)?,
        config.radio.advertising_interval(),
    )
    .await?;
    let power = HostPower::new(hal.tilt.clone());

    let mut controller = DutyCycleController::new(
        hal.sensor,
        hal.tilt,
        broadcaster,
        power,
        DutyCycleTiming::from(&config.node),
    )
    .show_readings(config.logging.show_readings);

    controller.wait_for_sensor().await?;

    let mut retained = RetainedState::cold_start();
    let mut shutdown = shutdown_on(tokio::signal::ctrl_c());
    tokio::select! {
        _ = controller.run(&mut retained) => {}
        _ = shutdown.changed() => info!("node shutting down"),
    }
    Ok(())
}

// ==============================================================================
// coordinator
// ==============================================================================

async fn run_coordinator(config: &HostConfig) -> Result<()> {
    let http_bind = radio::parse_addr(&config.coordinator.http_bind)?;
    let mut link = HostLink::default();

    loop {
        let store = KeyValueStore::open(&config.storage.path)?;
        match coordinator::bootstrap(&store, &mut link, &config.network).await {
            Ok(credentials) => return run_mesh(config, credentials, link).await,
            // ConfigurationMissing or ConnectivityFailure
            Err(e) => {
                warn!("{}, entering provisioning mode", e);
                let credentials = provisioning::serve(http_bind, store).await?;
                info!("Credentials for {} received, restarting", credentials.network_name);
            }
        }
    }
}

async fn run_mesh(config: &HostConfig, credentials: Credentials, mut link: HostLink) -> Result<()> {
    let relay = HttpRelay::new(&config.relay)?;
    let mut engine = Coordinator::new(&config.coordinator, config.relay.status.clone(), relay);

    let scanner = UdpScanner::bind(radio::parse_addr(&config.radio.bind)?).await?;
    let (tx, rx) = mpsc::channel(config.coordinator.scan_queue_depth.max(1));
    let stop_rx = shutdown_on(tokio::signal::ctrl_c());
    let scan_task = tokio::spawn(scanner.run(tx, stop_rx.clone()));

    let api_bind = radio::parse_addr(&config.coordinator.http_bind)?;
    let report = engine.report_handle();
    tokio::spawn(async move {
        if let Err(e) = coordinator::serve_api(api_bind, report).await {
            error!("registry api error: {:#}", e);
        }
    });

    engine
        .run(
            rx,
            &mut link,
            &credentials,
            &config.network,
            EngineTiming::from(&config.coordinator),
            stop_rx,
        )
        .await?;

    if let Err(e) = scan_task.await {
        warn!("scanner task ended abnormally: {}", e);
    }
    Ok(())
}
