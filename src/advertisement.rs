//! # Advertisement Packet Module
//!
//! Typed representation of BLE advertisement data and its conversion from
//! `btleplug` properties and advertisement events.
//!
//! ## Keys
//! Packets are keyed by the well-known advertisement data names so that
//! fragments coming from different platform events land on the same key:
//! - `kCBAdvDataLocalName`: advertised local name
//! - `kCBAdvDataTxPowerLevel`: transmit power in dBm
//! - `kCBAdvDataManufacturerData`: company id (little-endian) + payload
//! - `kCBAdvDataServiceData`: per-service payloads keyed by UUID
//! - `kCBAdvDataServiceUUIDs`: advertised service UUIDs
//!
//! Fields the platform did not report produce no key, so a partial packet
//! never overwrites data learned from an earlier one.

use btleplug::api::PeripheralProperties;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

pub const LOCAL_NAME: &str = "kCBAdvDataLocalName";
pub const TX_POWER_LEVEL: &str = "kCBAdvDataTxPowerLevel";
pub const MANUFACTURER_DATA: &str = "kCBAdvDataManufacturerData";
pub const SERVICE_DATA: &str = "kCBAdvDataServiceData";
pub const SERVICE_UUIDS: &str = "kCBAdvDataServiceUUIDs";

/// One advertised value. The set of payload shapes is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdValue {
    Text(String),
    Bytes(Vec<u8>),
    Number(i64),
    Uuids(Vec<Uuid>),
    Attributes(BTreeMap<String, AdValue>),
}

impl fmt::Display for AdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdValue::Text(text) => write!(f, "{}", text),
            AdValue::Bytes(bytes) => write!(f, "{}", hex::encode(bytes)),
            AdValue::Number(number) => write!(f, "{}", number),
            AdValue::Uuids(uuids) => write!(f, "{} UUIDs", uuids.len()),
            AdValue::Attributes(attributes) => write!(f, "{} Attributes", attributes.len()),
        }
    }
}

/// Key/value advertisement packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisementPacket {
    entries: BTreeMap<String, AdValue>,
}

impl AdvertisementPacket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: AdValue) {
        self.entries.insert(key.into(), value);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: AdValue) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&AdValue> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AdValue)> {
        self.entries.iter()
    }

    /// Folds `other` into this packet. Keys missing here, or present with a
    /// different value, take the value from `other`; nothing is ever removed.
    ///
    /// Returns `true` if any value changed.
    pub fn merge_from(&mut self, other: &AdvertisementPacket) -> bool {
        let mut changed = false;
        for (key, value) in &other.entries {
            match self.entries.get_mut(key) {
                Some(existing) if existing == value => {}
                Some(existing) => {
                    *existing = value.clone();
                    changed = true;
                }
                None => {
                    self.entries.insert(key.clone(), value.clone());
                    changed = true;
                }
            }
        }
        changed
    }

    /// Advertised local name, if one has been seen.
    pub fn local_name(&self) -> Option<&str> {
        match self.entries.get(LOCAL_NAME) {
            Some(AdValue::Text(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    /// Builds a packet from everything the platform knows about a peripheral.
    pub fn from_properties(props: &PeripheralProperties) -> Self {
        let mut packet = Self::new();

        if let Some(name) = &props.local_name {
            packet.insert(LOCAL_NAME, AdValue::Text(name.clone()));
        }
        if let Some(tx_power) = props.tx_power_level {
            packet.insert(TX_POWER_LEVEL, AdValue::Number(i64::from(tx_power)));
        }
        if let Some(value) = manufacturer_value(&props.manufacturer_data) {
            packet.insert(MANUFACTURER_DATA, value);
        }
        if let Some(value) = service_data_value(&props.service_data) {
            packet.insert(SERVICE_DATA, value);
        }
        if let Some(value) = services_value(&props.services) {
            packet.insert(SERVICE_UUIDS, value);
        }

        packet
    }

    /// Partial packet from a manufacturer data advertisement event.
    pub fn from_manufacturer_data(data: &HashMap<u16, Vec<u8>>) -> Self {
        let mut packet = Self::new();
        if let Some(value) = manufacturer_value(data) {
            packet.insert(MANUFACTURER_DATA, value);
        }
        packet
    }

    /// Partial packet from a service data advertisement event.
    pub fn from_service_data(data: &HashMap<Uuid, Vec<u8>>) -> Self {
        let mut packet = Self::new();
        if let Some(value) = service_data_value(data) {
            packet.insert(SERVICE_DATA, value);
        }
        packet
    }

    /// Partial packet from a services advertisement event.
    pub fn from_services(services: &[Uuid]) -> Self {
        let mut packet = Self::new();
        if let Some(value) = services_value(services) {
            packet.insert(SERVICE_UUIDS, value);
        }
        packet
    }
}

fn company_payload(company_id: u16, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(payload.len() + 2);
    bytes.extend_from_slice(&company_id.to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

fn manufacturer_value(data: &HashMap<u16, Vec<u8>>) -> Option<AdValue> {
    match data.len() {
        0 => None,
        1 => data
            .iter()
            .next()
            .map(|(company_id, payload)| AdValue::Bytes(company_payload(*company_id, payload))),
        _ => {
            let attributes = data
                .iter()
                .map(|(company_id, payload)| {
                    (
                        format!("0x{:04X}", company_id),
                        AdValue::Bytes(company_payload(*company_id, payload)),
                    )
                })
                .collect();
            Some(AdValue::Attributes(attributes))
        }
    }
}

fn service_data_value(data: &HashMap<Uuid, Vec<u8>>) -> Option<AdValue> {
    if data.is_empty() {
        return None;
    }
    let attributes = data
        .iter()
        .map(|(uuid, payload)| (uuid.to_string(), AdValue::Bytes(payload.clone())))
        .collect();
    Some(AdValue::Attributes(attributes))
}

fn services_value(services: &[Uuid]) -> Option<AdValue> {
    if services.is_empty() {
        return None;
    }
    let mut uuids = services.to_vec();
    // Platforms report these in no particular order
    uuids.sort();
    uuids.dedup();
    Some(AdValue::Uuids(uuids))
}
