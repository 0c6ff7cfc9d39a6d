//! # Peripheral List Module
//!
//! Presentation rules applied on top of the discovery cache before the
//! peripherals pane renders it: name requirement, search filter, display
//! names, ordering and the status line.

use crate::discovery::KnownPeripheral;

/// Prefix some stacks put in front of the advertised name.
const LOW_ENERGY_PREFIX: &str = "LE-";

/// Name shown for peripherals that never advertised one.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Name used for display and searching.
pub fn display_name(peripheral: &KnownPeripheral) -> &str {
    match peripheral.packet.local_name() {
        Some(name) => name.strip_prefix(LOW_ENERGY_PREFIX).unwrap_or(name),
        None => UNKNOWN_NAME,
    }
}

/// Filter settings for the peripherals list.
#[derive(Debug, Clone, Default)]
pub struct PeripheralFilter {
    pub require_name: bool,
    pub search: String,
}

impl PeripheralFilter {
    pub fn new(require_name: bool) -> Self {
        Self {
            require_name,
            search: String::new(),
        }
    }

    pub fn matches(&self, peripheral: &KnownPeripheral) -> bool {
        if self.require_name && peripheral.packet.local_name().is_none() {
            return false;
        }

        let term = self.search.trim();
        if term.is_empty() {
            return true;
        }

        display_name(peripheral)
            .to_lowercase()
            .contains(&term.to_lowercase())
    }

    /// Applies the filter and orders the result by display name, then id.
    pub fn apply<'a>(&self, peripherals: Vec<&'a KnownPeripheral>) -> Vec<&'a KnownPeripheral> {
        let mut listed: Vec<&KnownPeripheral> = peripherals
            .into_iter()
            .filter(|peripheral| self.matches(peripheral))
            .collect();
        listed.sort_by(|a, b| {
            display_name(a)
                .to_lowercase()
                .cmp(&display_name(b).to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        listed
    }
}

/// Status line text for the number of listed peripherals.
pub fn discovery_descriptor(count: usize) -> String {
    match count {
        0 => "No peripherals discovered".to_string(),
        1 => "1 peripheral discovered".to_string(),
        n => format!("{} peripherals discovered", n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advertisement::{AdValue, AdvertisementPacket, LOCAL_NAME};
    use crate::discovery::PeripheralKey;
    use std::time::SystemTime;

    fn peripheral(id: &str, name: Option<&str>) -> KnownPeripheral {
        let mut packet = AdvertisementPacket::new();
        if let Some(name) = name {
            packet.insert(LOCAL_NAME, AdValue::Text(name.to_string()));
        }
        KnownPeripheral {
            id: PeripheralKey::new(id),
            packet,
            rssi: None,
            last_seen: SystemTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(&peripheral("a", Some("LE-Keyboard"))), "Keyboard");
        assert_eq!(display_name(&peripheral("a", Some("Mouse"))), "Mouse");
        assert_eq!(display_name(&peripheral("a", None)), UNKNOWN_NAME);
    }

    #[test]
    fn test_require_name() {
        let filter = PeripheralFilter::new(true);
        assert!(filter.matches(&peripheral("a", Some("Mouse"))));
        assert!(!filter.matches(&peripheral("b", None)));

        let filter = PeripheralFilter::new(false);
        assert!(filter.matches(&peripheral("b", None)));
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let mut filter = PeripheralFilter::new(true);
        filter.search = "key".to_string();
        assert!(filter.matches(&peripheral("a", Some("LE-Keyboard"))));
        assert!(!filter.matches(&peripheral("b", Some("Mouse"))));

        filter.search = "  ".to_string();
        assert!(filter.matches(&peripheral("b", Some("Mouse"))));
    }

    #[test]
    fn test_apply_sorts_by_name_then_id() {
        let a = peripheral("2", Some("beta"));
        let b = peripheral("1", Some("Alpha"));
        let c = peripheral("0", Some("beta"));
        let filter = PeripheralFilter::new(true);

        let listed = filter.apply(vec![&a, &b, &c]);
        let ids: Vec<&str> = listed.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "0", "2"]);
    }

    #[test]
    fn test_discovery_descriptor() {
        assert_eq!(discovery_descriptor(0), "No peripherals discovered");
        assert_eq!(discovery_descriptor(1), "1 peripheral discovered");
        assert_eq!(discovery_descriptor(7), "7 peripherals discovered");
    }
}
