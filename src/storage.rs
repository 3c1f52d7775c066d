//! ==============================================================================
//! storage.rs - persisted key-value store
//! ==============================================================================
//!
//! purpose:
//!     a single json file of namespaces, each a flat string map. writes go to
//!     a `.tmp` sibling first and are renamed into place.
//!
//! namespaces in use:
//!     - `wifi`: `ssid`, `pass` (coordinator credentials)
//!     - `potdata`: `name` (node identity, read-only from the node's side)
//!
//! relationships:
//!     - used by: main.rs (node name), coordinator.rs (bootstrap),
//!       provisioning.rs (saving credentials)
//!
//! ==============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::debug;

use crate::domain::Credentials;

pub const WIFI_NAMESPACE: &str = "wifi";
pub const SSID_KEY: &str = "ssid";
pub const PASS_KEY: &str = "pass";

pub const POT_NAMESPACE: &str = "potdata";
pub const NAME_KEY: &str = "name";

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed store file: {0}")]
    Format(#[from] serde_json::Error),
}

type Namespaces = BTreeMap<String, BTreeMap<String, String>>;

pub struct KeyValueStore {
    path: PathBuf,
    data: Namespaces,
}

impl KeyValueStore {
    /// Open the store, starting empty if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let data = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Namespaces::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Namespaces::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("opened key-value store at {}", path.display());
        Ok(Self { path, data })
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<&str> {
        self.data.get(namespace)?.get(key).map(String::as_str)
    }

    pub fn get_or(&self, namespace: &str, key: &str, default: &str) -> String {
        self.get(namespace, key).unwrap_or(default).to_string()
    }

    pub fn put(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError> {
        self.data
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn flush(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&self.data)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

// ==============================================================================
// credential store
// ==============================================================================

/// Where the coordinator keeps its network credentials.
pub trait CredentialStore: Send {
    /// Stored credentials, only if both fields are non-empty.
    fn load(&self) -> Option<Credentials>;
    fn save(&mut self, credentials: &Credentials) -> Result<(), StorageError>;
}

impl CredentialStore for KeyValueStore {
    fn load(&self) -> Option<Credentials> {
        let credentials = Credentials {
            network_name: self.get_or(WIFI_NAMESPACE, SSID_KEY, ""),
            network_secret: self.get_or(WIFI_NAMESPACE, PASS_KEY, ""),
        };
        credentials.is_complete().then_some(credentials)
    }

    fn save(&mut self, credentials: &Credentials) -> Result<(), StorageError> {
        self.put(WIFI_NAMESPACE, SSID_KEY, &credentials.network_name)?;
        self.put(WIFI_NAMESPACE, PASS_KEY, &credentials.network_secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyValueStore::open(dir.path().join("prefs.json")).unwrap();
        assert_eq!(store.get(POT_NAMESPACE, NAME_KEY), None);
        assert_eq!(store.get_or(POT_NAMESPACE, NAME_KEY, "SmartPot_01"), "SmartPot_01");
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");

        let mut store = KeyValueStore::open(&path).unwrap();
        store.put(POT_NAMESPACE, NAME_KEY, "SmartPot_Kitchen").unwrap();

        let reopened = KeyValueStore::open(&path).unwrap();
        assert_eq!(reopened.get(POT_NAMESPACE, NAME_KEY), Some("SmartPot_Kitchen"));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(KeyValueStore::open(&path), Err(StorageError::Format(_))));
    }

    #[test]
    fn credentials_need_both_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KeyValueStore::open(dir.path().join("prefs.json")).unwrap();
        assert!(store.load().is_none());

        store.put(WIFI_NAMESPACE, SSID_KEY, "home").unwrap();
        assert!(store.load().is_none());

        let creds = Credentials { network_name: "home".into(), network_secret: "pw".into() };
        store.save(&creds).unwrap();
        assert_eq!(store.load(), Some(creds));
    }
}
