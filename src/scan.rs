//! ==============================================================================
//! scan.rs - picking node advertisements out of everything the scanner hears
//! ==============================================================================
//!
//! purpose:
//!     a node is recognized by its advertised name containing the marker
//!     (default "SmartPot"). the name becomes the node id verbatim and the
//!     manufacturer payload, as text, becomes the weight.
//!
//! relationships:
//!     - uses: advertisement.rs (RawAdvertisement)
//!     - used by: coordinator.rs (handle_advertisement)
//!
//! ==============================================================================

use crate::advertisement::RawAdvertisement;
use crate::config::CoordinatorConfig;
use crate::domain::{NodeIdentity, NodeObservation, Timestamp};

pub struct ScanListener {
    marker: String,
    placeholder_weight: String,
}

impl ScanListener {
    pub fn new(marker: impl Into<String>, placeholder_weight: impl Into<String>) -> Self {
        Self { marker: marker.into(), placeholder_weight: placeholder_weight.into() }
    }

    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self::new(config.marker.clone(), config.placeholder_weight.clone())
    }

    /// `None` unless the advertised name contains the marker.
    ///
    /// The weight is the manufacturer payload as text, unparsed; without one
    /// the placeholder stands in.
    pub fn recognize(&self, adv: &RawAdvertisement, seen_at: Timestamp) -> Option<NodeObservation> {
        let name = adv.name.as_deref()?;
        if !name.contains(self.marker.as_str()) {
            return None;
        }

        let weight = match &adv.manufacturer_data {
            Some(mfg) => String::from_utf8_lossy(&mfg.data).into_owned(),
            None => self.placeholder_weight.clone(),
        };

        Some(NodeObservation { id: NodeIdentity(name.to_string()), weight, seen_at })
    }
}
