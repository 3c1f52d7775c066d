//! ==============================================================================
//! relay.rs - best-effort push of observations to the remote store
//! ==============================================================================
//!
//! purpose:
//!     one call per observation, one attempt per call. the remote store is an
//!     idempotent upsert keyed by node id, so duplicate writes of an unchanged
//!     reading are harmless.
//!
//! wire:
//!     PUT {base_url}/{collection}/{id}.json[?auth={secret}]
//!     {"id": "...", "weight": "...", "timestamp": 1700000000000, "status": "active"}
//!
//! relationships:
//!     - used by: coordinator.rs (awaited inline, errors logged and dropped)
//!
//! ==============================================================================

use std::future::Future;
use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use tracing::debug;

use crate::config::RelayConfig;
use crate::error::RelayError;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RelayRecord {
    pub id: String,
    pub weight: String,
    pub timestamp: u64,
    pub status: String,
}

pub trait RelayForwarder: Send {
    fn forward(&mut self, record: &RelayRecord) -> impl Future<Output = Result<(), RelayError>> + Send;
}

pub struct HttpRelay {
    client: reqwest::Client,
    base_url: Url,
    collection: Vec<String>,
    secret: Option<String>,
}

impl HttpRelay {
    pub fn new(config: &RelayConfig) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| RelayError::BadUrl(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RelayError::BadUrl(config.base_url.clone()));
        }

        Ok(Self {
            client,
            base_url,
            collection: config
                .collection
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            secret: config.secret.clone().filter(|s| !s.is_empty()),
        })
    }

    /// node ids are pushed as one percent-encoded path segment, so `/`, `?`
    /// or `#` in a name stay part of that node's key
    fn url_for(&self, id: &str) -> Result<Url, RelayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RelayError::BadUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(&self.collection)
            .push(&format!("{}.json", id));
        Ok(url)
    }
}

impl RelayForwarder for HttpRelay {
    async fn forward(&mut self, record: &RelayRecord) -> Result<(), RelayError> {
        let mut request = self.client.put(self.url_for(&record.id)?).json(record);
        if let Some(secret) = &self.secret {
            request = request.query(&[("auth", secret)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Status(status.as_u16()));
        }
        debug!("remote store accepted {} ({})", record.id, status);
        Ok(())
    }
}
