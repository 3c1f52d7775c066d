//! ==============================================================================
//! advertisement.rs - advertisement wire format
//! ==============================================================================
//!
//! purpose:
//!     encodes and decodes the advertisement a node broadcasts. the layout is
//!     the ble advertising-data format: a run of ad structures, each
//!     `[len][type][data...]` where `len` counts the type byte plus data.
//!
//! ad types used:
//!     0x01  flags
//!     0x07  complete list of 128-bit service uuids (little-endian)
//!     0x08  shortened local name (decode only)
//!     0x09  complete local name
//!     0xFF  manufacturer specific data: company id (u16 le) + payload
//!
//! relationships:
//!     - used by: radio.rs (node side encodes, coordinator side decodes)
//!     - used by: scan.rs (reads name and manufacturer payload)
//!
//! ==============================================================================

pub const AD_FLAGS: u8 = 0x01;
pub const AD_UUID128_COMPLETE: u8 = 0x07;
pub const AD_NAME_SHORT: u8 = 0x08;
pub const AD_NAME_COMPLETE: u8 = 0x09;
pub const AD_MANUFACTURER: u8 = 0xFF;

/// le general discoverable, br/edr not supported
pub const FLAGS_GENERAL_DISCOVERABLE: u8 = 0x06;

/// largest data field that fits behind a one byte length
pub const MAX_AD_DATA: usize = 254;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AdvertisementError {
    #[error("ad structure at offset {offset} claims {len} bytes, only {available} left")]
    Truncated { offset: usize, len: usize, available: usize },
    #[error("ad type 0x{ad_type:02X} data is {len} bytes, limit is 254")]
    TooLong { ad_type: u8, len: usize },
    #[error("malformed service uuid {0:?}")]
    BadUuid(String),
}

/// vendor payload carried in the manufacturer specific ad structure
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManufacturerData {
    pub company_id: u16,
    pub data: Vec<u8>,
}

/// a decoded advertisement as seen by a scanner
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawAdvertisement {
    pub name: Option<String>,
    pub service_uuids: Vec<[u8; 16]>,
    pub manufacturer_data: Option<ManufacturerData>,
}

/// what a node broadcasts
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Advertisement {
    pub name: String,
    pub service_uuid: Option<[u8; 16]>,
    pub company_id: u16,
    /// measurement text, e.g. "120g"
    pub payload: String,
}

impl Advertisement {
    pub fn encode(&self) -> Result<Vec<u8>, AdvertisementError> {
        let mut out = Vec::with_capacity(32 + self.name.len() + self.payload.len());
        push_structure(&mut out, AD_FLAGS, &[FLAGS_GENERAL_DISCOVERABLE])?;
        push_structure(&mut out, AD_NAME_COMPLETE, self.name.as_bytes())?;

        if let Some(uuid) = self.service_uuid {
            // uuids go on air least significant byte first
            let mut wire = uuid;
            wire.reverse();
            push_structure(&mut out, AD_UUID128_COMPLETE, &wire)?;
        }

        let mut mfg = Vec::with_capacity(2 + self.payload.len());
        mfg.extend_from_slice(&self.company_id.to_le_bytes());
        mfg.extend_from_slice(self.payload.as_bytes());
        push_structure(&mut out, AD_MANUFACTURER, &mfg)?;

        Ok(out)
    }
}

fn push_structure(out: &mut Vec<u8>, ad_type: u8, data: &[u8]) -> Result<(), AdvertisementError> {
    if data.len() > MAX_AD_DATA {
        return Err(AdvertisementError::TooLong { ad_type, len: data.len() });
    }
    out.push(data.len() as u8 + 1);
    out.push(ad_type);
    out.extend_from_slice(data);
    Ok(())
}

impl RawAdvertisement {
    /// decode a run of ad structures. unknown types are skipped and a zero
    /// length byte ends the data (trailing padding).
    pub fn decode(bytes: &[u8]) -> Result<Self, AdvertisementError> {
        let mut adv = RawAdvertisement::default();
        let mut offset = 0;

        while offset < bytes.len() {
            let len = bytes[offset] as usize;
            if len == 0 {
                break;
            }
            let available = bytes.len() - offset - 1;
            if len > available {
                return Err(AdvertisementError::Truncated { offset, len, available });
            }

            let ad_type = bytes[offset + 1];
            let data = &bytes[offset + 2..offset + 1 + len];

            match ad_type {
                AD_NAME_COMPLETE => adv.name = Some(String::from_utf8_lossy(data).into_owned()),
                // a complete name wins over a shortened one
                AD_NAME_SHORT if adv.name.is_none() => {
                    adv.name = Some(String::from_utf8_lossy(data).into_owned())
                }
                AD_UUID128_COMPLETE => {
                    for chunk in data.chunks_exact(16) {
                        let mut uuid = [0u8; 16];
                        uuid.copy_from_slice(chunk);
                        uuid.reverse();
                        adv.service_uuids.push(uuid);
                    }
                }
                AD_MANUFACTURER if data.len() >= 2 => {
                    adv.manufacturer_data = Some(ManufacturerData {
                        company_id: u16::from_le_bytes([data[0], data[1]]),
                        data: data[2..].to_vec(),
                    });
                }
                _ => {}
            }

            offset += 1 + len;
        }

        Ok(adv)
    }
}

/// parse "12345678-1234-5678-9abc-123456789abc" into big-endian bytes
pub fn parse_uuid128(text: &str) -> Result<[u8; 16], AdvertisementError> {
    let compact: String = text.chars().filter(|c| *c != '-').collect();
    let bytes = hex::decode(&compact).map_err(|_| AdvertisementError::BadUuid(text.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| AdvertisementError::BadUuid(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Advertisement {
        Advertisement {
            name: "SmartPot_01".to_string(),
            service_uuid: Some(parse_uuid128("12345678-1234-5678-9abc-123456789abc").unwrap()),
            company_id: 0xFFFF,
            payload: "120g".to_string(),
        }
    }

    #[test]
    fn node_advertisement_decodes_on_the_scanner_side() {
        let decoded = RawAdvertisement::decode(&sample().encode().unwrap()).unwrap();

        assert_eq!(decoded.name.as_deref(), Some("SmartPot_01"));
        assert_eq!(hex::encode(decoded.service_uuids[0]), "12345678123456789abc123456789abc");
        let mfg = decoded.manufacturer_data.unwrap();
        assert_eq!(mfg.company_id, 0xFFFF);
        assert_eq!(mfg.data, b"120g");
    }

    #[test]
    fn wire_layout_starts_with_flags_then_name() {
        let bytes = sample().encode().unwrap();
        assert_eq!(&bytes[..3], &[0x02, AD_FLAGS, FLAGS_GENERAL_DISCOVERABLE]);
        assert_eq!(bytes[3] as usize, 1 + "SmartPot_01".len());
        assert_eq!(bytes[4], AD_NAME_COMPLETE);
    }

    #[test]
    fn unknown_types_and_padding_are_skipped() {
        // tx power (0x0A), then name, then zero padding
        let bytes = [0x02, 0x0A, 0x04, 0x04, AD_NAME_COMPLETE, b'P', b'o', b't', 0x00, 0x00];
        let decoded = RawAdvertisement::decode(&bytes).unwrap();
        assert_eq!(decoded.name.as_deref(), Some("Pot"));
        assert!(decoded.manufacturer_data.is_none());
    }

    #[test]
    fn shortened_name_used_only_without_complete_name() {
        let bytes = [0x03, AD_NAME_SHORT, b'S', b'P', 0x04, AD_NAME_COMPLETE, b'A', b'B', b'C'];
        let decoded = RawAdvertisement::decode(&bytes).unwrap();
        assert_eq!(decoded.name.as_deref(), Some("ABC"));
    }

    #[test]
    fn truncated_structure_is_rejected() {
        let bytes = [0x05, AD_NAME_COMPLETE, b'a'];
        assert_eq!(
            RawAdvertisement::decode(&bytes),
            Err(AdvertisementError::Truncated { offset: 0, len: 5, available: 2 })
        );
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let mut adv = sample();
        adv.payload = "x".repeat(300);
        assert!(matches!(adv.encode(), Err(AdvertisementError::TooLong { ad_type: AD_MANUFACTURER, .. })));
    }

    #[test]
    fn bad_uuid_text() {
        assert!(parse_uuid128("not-a-uuid").is_err());
        assert!(parse_uuid128("1234").is_err());
    }
}
