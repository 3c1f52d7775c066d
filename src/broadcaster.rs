//! ==============================================================================
//! broadcaster.rs - node side advertisement publisher
//! ==============================================================================
//!
//! purpose:
//!     the seam between the duty-cycle controller and the radio. the
//!     controller only ever says "advertise this payload" and "stop"; the
//!     implementation owns repetition on air.
//!
//! relationships:
//!     - used by: controller.rs
//!     - implemented by: radio.rs (UdpBroadcaster)
//!
//! ==============================================================================

use std::future::Future;

use crate::advertisement::{parse_uuid128, Advertisement, AdvertisementError};
use crate::config::RadioConfig;
use crate::radio::RadioError;

pub trait Broadcaster: Send {
    /// begin advertising `payload`. a running advertisement is replaced.
    fn start(&mut self, payload: &str) -> impl Future<Output = Result<(), RadioError>> + Send;

    /// stop advertising. stopping an idle broadcaster is a no-op.
    fn stop(&mut self) -> impl Future<Output = Result<(), RadioError>> + Send;
}

/// the fixed part of a node's advertisement
#[derive(Clone, Debug)]
pub struct AdvertisingIdentity {
    pub name: String,
    pub service_uuid: Option<[u8; 16]>,
    pub company_id: u16,
}

impl AdvertisingIdentity {
    pub fn from_config(name: impl Into<String>, radio: &RadioConfig) -> Result<Self, AdvertisementError> {
        let service_uuid = if radio.service_uuid.is_empty() {
            None
        } else {
            Some(parse_uuid128(&radio.service_uuid)?)
        };
        Ok(Self { name: name.into(), service_uuid, company_id: radio.company_id })
    }

    pub fn advertisement(&self, payload: &str) -> Advertisement {
        Advertisement {
            name: self.name.clone(),
            service_uuid: self.service_uuid,
            company_id: self.company_id,
            payload: payload.to_string(),
        }
    }
}
