//! ==============================================================================
//! provisioning.rs - bootstrapping network credentials
//! ==============================================================================
//!
//! purpose:
//!     when the coordinator has no usable credentials it exposes a tiny
//!     provisioning channel. each field arrives separately; once both are
//!     non-empty they are persisted and the coordinator restarts its startup
//!     sequence, which reloads them from the store.
//!
//! transport:
//!     PUT /provisioning/network_name     body: the network name (text)
//!     PUT /provisioning/network_secret   body: the secret (text)
//!     -> {"status": "pending"} until both are set, then {"status": "complete"}
//!
//! relationships:
//!     - uses: storage.rs (CredentialStore)
//!     - used by: main.rs (coordinator role, on ConfigurationMissing/ConnectivityFailure)
//!
//! ==============================================================================

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::put;
use axum::Router;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::domain::Credentials;
use crate::storage::{CredentialStore, StorageError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialField {
    NetworkName,
    NetworkSecret,
}

impl FromStr for CredentialField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network_name" => Ok(CredentialField::NetworkName),
            "network_secret" => Ok(CredentialField::NetworkSecret),
            other => Err(format!("unknown credential field {:?}", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisioningStatus {
    Pending,
    Complete,
}

impl ProvisioningStatus {
    fn as_str(self) -> &'static str {
        match self {
            ProvisioningStatus::Pending => "pending",
            ProvisioningStatus::Complete => "complete",
        }
    }
}

/// collects credential fields until both are present, then persists them
pub struct ProvisioningSession<S> {
    pending: Credentials,
    store: S,
}

impl<S: CredentialStore> ProvisioningSession<S> {
    pub fn new(store: S) -> Self {
        Self {
            pending: Credentials { network_name: String::new(), network_secret: String::new() },
            store,
        }
    }

    pub fn set_credential_field(
        &mut self,
        field: CredentialField,
        value: &str,
    ) -> Result<ProvisioningStatus, StorageError> {
        match field {
            CredentialField::NetworkName => {
                self.pending.network_name = value.to_string();
                info!("network name received: {}", value);
            }
            CredentialField::NetworkSecret => {
                self.pending.network_secret = value.to_string();
                info!("network secret received");
            }
        }

        if !self.pending.is_complete() {
            return Ok(ProvisioningStatus::Pending);
        }
        self.store.save(&self.pending)?;
        info!("credentials saved");
        Ok(ProvisioningStatus::Complete)
    }

    /// the saved credentials, once both fields are set
    pub fn credentials(&self) -> Option<&Credentials> {
        self.pending.is_complete().then_some(&self.pending)
    }
}

// ==============================================================================
// http transport
// ==============================================================================

struct Channel<S> {
    session: Mutex<ProvisioningSession<S>>,
    done: watch::Sender<Option<Credentials>>,
}

async fn set_field_handler<S: CredentialStore + 'static>(
    State(channel): State<Arc<Channel<S>>>,
    Path(field): Path<String>,
    body: String,
) -> (StatusCode, Json<serde_json::Value>) {
    let field = match field.parse::<CredentialField>() {
        Ok(f) => f,
        Err(message) => {
            return (StatusCode::NOT_FOUND, Json(serde_json::json!({"status": "error", "message": message})));
        }
    };

    let mut session = channel.session.lock().await;
    match session.set_credential_field(field, body.trim()) {
        Ok(status) => {
            if status == ProvisioningStatus::Complete {
                let _ = channel.done.send(session.credentials().cloned());
            }
            (StatusCode::OK, Json(serde_json::json!({"status": status.as_str()})))
        }
        Err(e) => {
            warn!("failed to persist credentials: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"status": "error", "message": e.to_string()})),
            )
        }
    }
}

fn router<S: CredentialStore + 'static>(channel: Arc<Channel<S>>) -> Router {
    Router::new()
        .route("/provisioning/:field", put(set_field_handler::<S>))
        .with_state(channel)
}

/// serve the provisioning channel on an already bound listener until both
/// fields are saved; returns the saved credentials
pub async fn serve_on<S: CredentialStore + 'static>(
    listener: tokio::net::TcpListener,
    store: S,
) -> Result<Credentials> {
    let (done, mut done_rx) = watch::channel(None);
    let channel = Arc::new(Channel { session: Mutex::new(ProvisioningSession::new(store)), done });

    info!("Provisioning channel open on http://{}/provisioning/{{network_name,network_secret}}", listener.local_addr()?);
    let mut shutdown_rx = done_rx.clone();
    axum::serve(listener, router(channel))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(Option::is_some).await;
        })
        .await
        .context("provisioning server failed")?;

    let credentials = done_rx.borrow_and_update().clone();
    credentials.ok_or_else(|| anyhow::anyhow!("provisioning server stopped before credentials were complete"))
}

pub async fn serve<S: CredentialStore + 'static>(bind: SocketAddr, store: S) -> Result<Credentials> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind provisioning channel on {}", bind))?;
    serve_on(listener, store).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::KeyValueStore;

    #[derive(Default)]
    struct MemoryStore {
        saved: Option<Credentials>,
        saves: usize,
    }

    impl CredentialStore for MemoryStore {
        fn load(&self) -> Option<Credentials> {
            self.saved.clone()
        }

        fn save(&mut self, credentials: &Credentials) -> Result<(), StorageError> {
            self.saves += 1;
            self.saved = Some(credentials.clone());
            Ok(())
        }
    }

    #[test]
    fn persists_only_once_both_fields_are_set() {
        let mut session = ProvisioningSession::new(MemoryStore::default());

        let status = session.set_credential_field(CredentialField::NetworkSecret, "pw").unwrap();
        assert_eq!(status, ProvisioningStatus::Pending);
        let status = session.set_credential_field(CredentialField::NetworkName, "").unwrap();
        assert_eq!(status, ProvisioningStatus::Pending);
        assert_eq!(session.store.saves, 0);

        let status = session.set_credential_field(CredentialField::NetworkName, "greenhouse").unwrap();
        assert_eq!(status, ProvisioningStatus::Complete);

        assert_eq!(session.credentials().map(|c| c.network_name.as_str()), Some("greenhouse"));
        assert_eq!(session.store.saves, 1);
        assert_eq!(
            session.store.load(),
            Some(Credentials { network_name: "greenhouse".into(), network_secret: "pw".into() })
        );
    }

    #[test]
    fn field_names() {
        assert_eq!("network_name".parse::<CredentialField>(), Ok(CredentialField::NetworkName));
        assert_eq!("network_secret".parse::<CredentialField>(), Ok(CredentialField::NetworkSecret));
        assert!("ssid".parse::<CredentialField>().is_err());
    }

    #[tokio::test]
    async fn http_channel_saves_credentials_and_shuts_down() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyValueStore::open(dir.path().join("prefs.json")).unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/provisioning", listener.local_addr().unwrap());
        let server = tokio::spawn(serve_on(listener, store));

        let client = reqwest::Client::new();
        let bogus = client.put(format!("{}/ssid", base)).body("x").send().await.unwrap();
        assert_eq!(bogus.status().as_u16(), 404);

        let first: serde_json::Value = client
            .put(format!("{}/network_name", base))
            .body("greenhouse\n")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(first["status"], "pending");

        let second: serde_json::Value = client
            .put(format!("{}/network_secret", base))
            .body("pw")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(second["status"], "complete");

        let expected = Credentials { network_name: "greenhouse".into(), network_secret: "pw".into() };
        assert_eq!(server.await.unwrap().unwrap(), expected);

        let reopened = KeyValueStore::open(dir.path().join("prefs.json")).unwrap();
        assert_eq!(reopened.load(), Some(expected));
    }
}
