//! # GATT Explorer Module
//!
//! Builds the service tree shown in the services pane for a connected
//! peripheral and reads the values of its readable characteristics.
//!
//! ## Sequence
//! 1. Discover services (characteristics come back with them)
//! 2. Publish the tree with empty values so the pane can render immediately
//! 3. Read each readable characteristic and publish values as they arrive

use crate::error::GattError;
use btleplug::api::{CharPropFlags, Characteristic, Peripheral as _};
use btleplug::platform::Peripheral;
use uuid::Uuid;

/// A characteristic and its last known value.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacteristicNode {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub properties: CharPropFlags,
    /// Rendered value, `None` until read (or when not readable)
    pub value: Option<String>,
}

impl CharacteristicNode {
    fn from_characteristic(characteristic: &Characteristic) -> Self {
        Self {
            uuid: characteristic.uuid,
            service_uuid: characteristic.service_uuid,
            properties: characteristic.properties,
            value: None,
        }
    }

    pub fn is_readable(&self) -> bool {
        self.properties.contains(CharPropFlags::READ)
    }

    pub fn flags(&self) -> String {
        property_flags(self.properties)
    }
}

/// A service with its characteristics.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceNode {
    pub uuid: Uuid,
    pub primary: bool,
    pub characteristics: Vec<CharacteristicNode>,
}

impl ServiceNode {
    /// Stores a freshly read value on the matching characteristic.
    /// Returns `false` if the characteristic is not part of this service.
    pub fn set_value(&mut self, characteristic: Uuid, value: String) -> bool {
        match self
            .characteristics
            .iter_mut()
            .find(|node| node.uuid == characteristic)
        {
            Some(node) => {
                node.value = Some(value);
                true
            }
            None => false,
        }
    }
}

/// Short flag list for characteristic properties, e.g. `R,W,N`.
pub fn property_flags(properties: CharPropFlags) -> String {
    let mut flags = Vec::new();
    if properties.contains(CharPropFlags::READ) {
        flags.push("R");
    }
    if properties.contains(CharPropFlags::WRITE) {
        flags.push("W");
    }
    if properties.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE) {
        flags.push("Wn");
    }
    if properties.contains(CharPropFlags::NOTIFY) {
        flags.push("N");
    }
    if properties.contains(CharPropFlags::INDICATE) {
        flags.push("I");
    }
    flags.join(",")
}

/// Text shown for a characteristic read result.
pub fn render_value(result: &Result<Vec<u8>, GattError>) -> String {
    match result {
        Ok(data) if data.is_empty() => "Empty".to_string(),
        Ok(data) => match std::str::from_utf8(data) {
            Ok(text) => text.to_string(),
            Err(_) => hex::encode_upper(data),
        },
        Err(e) => e.to_string(),
    }
}

/// Discovers services on a connected peripheral and returns them as a tree
/// ordered by UUID, characteristics included but not yet read.
pub async fn load_services(peripheral: &Peripheral) -> Result<Vec<ServiceNode>, GattError> {
    peripheral
        .discover_services()
        .await
        .map_err(GattError::ServiceDiscovery)?;

    let services = peripheral
        .services()
        .into_iter()
        .map(|service| ServiceNode {
            uuid: service.uuid,
            primary: service.primary,
            characteristics: service
                .characteristics
                .iter()
                .map(CharacteristicNode::from_characteristic)
                .collect(),
        })
        .collect::<Vec<_>>();

    log::debug!("Discovered {} services", services.len());
    Ok(services)
}

/// Reads one characteristic, if it is readable.
pub async fn read_value(
    peripheral: &Peripheral,
    node: &CharacteristicNode,
) -> Option<Result<Vec<u8>, GattError>> {
    if !node.is_readable() {
        return None;
    }

    let characteristic = peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == node.uuid && c.service_uuid == node.service_uuid)?;

    Some(peripheral.read(&characteristic).await.map_err(GattError::Read))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(uuid: u128, properties: CharPropFlags) -> CharacteristicNode {
        CharacteristicNode {
            uuid: Uuid::from_u128(uuid),
            service_uuid: Uuid::from_u128(0x180a),
            properties,
            value: None,
        }
    }

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(&Ok(Vec::new())), "Empty");
        assert_eq!(render_value(&Ok(b"Harald".to_vec())), "Harald");
        assert_eq!(render_value(&Ok(vec![0xde, 0xad, 0xbe, 0xef])), "DEADBEEF");
    }

    #[test]
    fn test_render_read_error() {
        let rendered = render_value(&Err(GattError::Read(btleplug::Error::NotConnected)));
        assert!(rendered.starts_with("Failed to read value"));
    }

    #[test]
    fn test_property_flags() {
        assert_eq!(property_flags(CharPropFlags::READ), "R");
        assert_eq!(
            property_flags(CharPropFlags::READ | CharPropFlags::WRITE | CharPropFlags::NOTIFY),
            "R,W,N"
        );
        assert_eq!(property_flags(CharPropFlags::empty()), "");
    }

    #[test]
    fn test_readable() {
        assert!(node(1, CharPropFlags::READ | CharPropFlags::NOTIFY).is_readable());
        assert!(!node(2, CharPropFlags::WRITE).is_readable());
    }

    #[test]
    fn test_set_value() {
        let mut service = ServiceNode {
            uuid: Uuid::from_u128(0x180a),
            primary: true,
            characteristics: vec![node(1, CharPropFlags::READ), node(2, CharPropFlags::READ)],
        };

        assert!(service.set_value(Uuid::from_u128(2), "v2".to_string()));
        assert!(!service.set_value(Uuid::from_u128(3), "v3".to_string()));
        assert_eq!(service.characteristics[0].value, None);
        assert_eq!(service.characteristics[1].value.as_deref(), Some("v2"));
    }
}
