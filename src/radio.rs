//! ==============================================================================
//! radio.rs - udp stand-in for the advertising radio
//! ==============================================================================
//!
//! purpose:
//!     one datagram carries one encoded advertisement. nodes broadcast on the
//!     lan and the coordinator listens on a fixed port. datagrams are atomic,
//!     so there is no framing.
//!
//! relationships:
//!     - uses: advertisement.rs (codec), broadcaster.rs (Broadcaster trait)
//!     - used by: main.rs (node: UdpBroadcaster, coordinator: UdpScanner)
//!
//! ==============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::advertisement::{AdvertisementError, RawAdvertisement};
use crate::broadcaster::{AdvertisingIdentity, Broadcaster};

/// Size of the receive buffer for `UdpSocket::recv_from`.
pub const RECV_BUFFER: usize = 2048;

/// Shortest advertising interval a BLE controller accepts.
pub const MIN_ADVERTISING_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("advertisement error: {0}")]
    Codec(#[from] AdvertisementError),
    #[error("invalid radio address {0:?}")]
    Address(String),
    #[error("advertising task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub fn parse_addr(text: &str) -> Result<SocketAddr, RadioError> {
    text.parse().map_err(|_| RadioError::Address(text.to_string()))
}

// ---------------------------------------------------------------------------
// Node side
// ---------------------------------------------------------------------------

struct Advertising {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Re-sends the current advertisement every `interval` until stopped.
pub struct UdpBroadcaster {
    identity: AdvertisingIdentity,
    socket: Arc<UdpSocket>,
    target: SocketAddr,
    interval: Duration,
    running: Option<Advertising>,
}

impl UdpBroadcaster {
    pub async fn bind(
        identity: AdvertisingIdentity,
        target: SocketAddr,
        interval: Duration,
    ) -> Result<Self, RadioError> {
        let bind_addr: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.set_broadcast(true)?;
        if interval < MIN_ADVERTISING_INTERVAL {
            warn!("advertising interval {:?} raised to {:?}", interval, MIN_ADVERTISING_INTERVAL);
        }
        let interval = interval.max(MIN_ADVERTISING_INTERVAL);
        info!("{}: advertising to {} every {:?}", identity.name, target, interval);

        Ok(Self { identity, socket: Arc::new(socket), target, interval, running: None })
    }

    async fn advertise_loop(
        socket: Arc<UdpSocket>,
        target: SocketAddr,
        frame: Vec<u8>,
        interval: Duration,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = socket.send_to(&frame, target).await {
                        // the node keeps advertising; a dropped frame is not fatal
                        warn!("advertisement send to {} failed: {}", target, e);
                    }
                }
                _ = stop_rx.changed() => break,
            }
        }
    }
}

impl Broadcaster for UdpBroadcaster {
    async fn start(&mut self, payload: &str) -> Result<(), RadioError> {
        self.stop().await?;

        let frame = self.identity.advertisement(payload).encode()?;
        trace!("advertisement frame {}", hex::encode(&frame));

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(Self::advertise_loop(
            self.socket.clone(),
            self.target,
            frame,
            self.interval,
            stop_rx,
        ));
        self.running = Some(Advertising { stop_tx, handle });
        debug!("{}: advertising payload {:?}", self.identity.name, payload);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RadioError> {
        if let Some(advertising) = self.running.take() {
            let _ = advertising.stop_tx.send(true);
            advertising.handle.await?;
            debug!("{}: advertising stopped", self.identity.name);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Coordinator side
// ---------------------------------------------------------------------------

/// Passive listener that turns datagrams into `RawAdvertisement` events.
pub struct UdpScanner {
    socket: UdpSocket,
}

impl UdpScanner {
    pub async fn bind(addr: SocketAddr) -> Result<Self, RadioError> {
        let socket = UdpSocket::bind(addr).await?;
        info!("scanning for advertisements on {}", socket.local_addr()?);
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RadioError> {
        Ok(self.socket.local_addr()?)
    }

    /// Run the receive loop until `stop_rx` flips or the consumer goes away.
    ///
    /// `send().await` on a bounded channel: while the consumer is busy this
    /// loop stops reading the socket.
    pub async fn run(self, tx: mpsc::Sender<RawAdvertisement>, mut stop_rx: watch::Receiver<bool>) {
        let mut buf = vec![0u8; RECV_BUFFER];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((n, src)) => {
                            match RawAdvertisement::decode(&buf[..n]) {
                                Ok(adv) => {
                                    if tx.send(adv).await.is_err() {
                                        // Receiver dropped - stop
                                        return;
                                    }
                                }
                                Err(e) => {
                                    debug!("ignoring malformed datagram from {}: {} ({})", src, e, hex::encode(&buf[..n]));
                                }
                            }
                        }
                        Err(e) => {
                            // UDP errors are typically transient; keep going
                            warn!("scan recv error: {}", e);
                        }
                    }
                }
                _ = stop_rx.changed() => break,
            }
        }
    }
}
