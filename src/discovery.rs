//! # Discovery Cache Module
//!
//! Reduces the raw stream of advertisement sightings to the set of
//! peripherals that are currently visible.
//!
//! ## Behaviour
//! - One entry per peripheral identity, stored in a map keyed by identity
//! - Repeated sightings merge into the entry's packet; keys are never lost
//! - Entries not seen within the freshness window expire passively: every
//!   ingest drops them and every query filters them out, no timer involved
//!
//! ## Ownership
//! The cache is a plain synchronous value mutated through `&mut self`. The
//! UI thread owns it and applies sightings in the order they arrive on the
//! update channel, so no internal locking is needed.

use crate::advertisement::AdvertisementPacket;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime};

/// Default freshness window for discovered peripherals.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(45);

/// Opaque platform identifier of a peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeripheralKey(String);

impl PeripheralKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single advertisement observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    pub peripheral: PeripheralKey,
    pub packet: AdvertisementPacket,
    /// Signal strength in dBm, when the platform reported one
    pub rssi: Option<f64>,
    pub timestamp: SystemTime,
}

impl Sighting {
    pub fn new(
        peripheral: PeripheralKey,
        packet: AdvertisementPacket,
        rssi: Option<f64>,
        timestamp: SystemTime,
    ) -> Self {
        Self {
            peripheral,
            packet,
            rssi,
            timestamp,
        }
    }
}

/// Merged view of every sighting of one peripheral.
#[derive(Debug, Clone, PartialEq)]
pub struct KnownPeripheral {
    pub id: PeripheralKey,
    pub packet: AdvertisementPacket,
    pub rssi: Option<f64>,
    pub last_seen: SystemTime,
}

impl KnownPeripheral {
    fn from_sighting(sighting: Sighting) -> Self {
        Self {
            id: sighting.peripheral,
            packet: sighting.packet,
            rssi: sighting.rssi,
            last_seen: sighting.timestamp,
        }
    }

    fn merge(&mut self, sighting: &Sighting, now: SystemTime) {
        self.packet.merge_from(&sighting.packet);
        // Fragment events carry no signal strength; keep the last known one
        if sighting.rssi.is_some() {
            self.rssi = sighting.rssi;
        }
        self.last_seen = now;
    }

    /// Age relative to `now`. Timestamps from the future count as fresh.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.last_seen).unwrap_or(Duration::ZERO)
    }

    fn is_fresh(&self, now: SystemTime, window: Duration) -> bool {
        self.age(now) <= window
    }
}

/// Source of "now" for freshness decisions.
pub trait Clock {
    fn now(&self) -> SystemTime;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Deduplicated, freshness-bounded set of known peripherals.
pub struct DiscoveryCache<C: Clock = SystemClock> {
    entries: HashMap<PeripheralKey, KnownPeripheral>,
    window: Duration,
    clock: C,
}

impl DiscoveryCache<SystemClock> {
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, SystemClock)
    }
}

impl<C: Clock> DiscoveryCache<C> {
    pub fn with_clock(window: Duration, clock: C) -> Self {
        Self {
            entries: HashMap::new(),
            window,
            clock,
        }
    }

    /// Applies one sighting and returns the peripherals still visible.
    ///
    /// A new identity is inserted as-is. A known identity has the sighting's
    /// packet merged into its own and its last-seen time moved to now.
    /// Entries outside the freshness window are dropped afterwards.
    pub fn ingest(&mut self, sighting: Sighting) -> Vec<&KnownPeripheral> {
        let now = self.clock.now();

        match self.entries.get_mut(&sighting.peripheral) {
            Some(existing) => existing.merge(&sighting, now),
            None => {
                log::debug!("Discovered new peripheral {}", sighting.peripheral);
                self.entries.insert(
                    sighting.peripheral.clone(),
                    KnownPeripheral::from_sighting(sighting),
                );
            }
        }

        self.retain_fresh(now);
        self.entries.values().collect()
    }

    /// Peripherals seen within the freshness window.
    pub fn visible(&self) -> Vec<&KnownPeripheral> {
        let now = self.clock.now();
        self.entries
            .values()
            .filter(|entry| entry.is_fresh(now, self.window))
            .collect()
    }

    pub fn get(&self, id: &PeripheralKey) -> Option<&KnownPeripheral> {
        let now = self.clock.now();
        self.entries
            .get(id)
            .filter(|entry| entry.is_fresh(now, self.window))
    }

    /// Number of visible peripherals.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .values()
            .filter(|entry| entry.is_fresh(now, self.window))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops expired entries. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let now = self.clock.now();
        self.retain_fresh(now)
    }

    /// Forgets everything, as when a fresh scan is requested.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn retain_fresh(&mut self, now: SystemTime) -> usize {
        let before = self.entries.len();
        let window = self.window;
        self.entries.retain(|id, entry| {
            let fresh = entry.is_fresh(now, window);
            if !fresh {
                log::debug!("Peripheral {} expired", id);
            }
            fresh
        });
        before - self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advertisement::{AdValue, LOCAL_NAME};
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Clone)]
    struct ManualClock {
        now: Rc<Cell<SystemTime>>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                now: Rc::new(Cell::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000))),
            }
        }

        fn at(&self, secs: u64) -> SystemTime {
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_000 + secs)
        }

        fn set(&self, secs: u64) {
            self.now.set(self.at(secs));
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> SystemTime {
            self.now.get()
        }
    }

    fn cache() -> (DiscoveryCache<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (
            DiscoveryCache::with_clock(DEFAULT_FRESHNESS_WINDOW, clock.clone()),
            clock,
        )
    }

    fn sighting(clock: &ManualClock, id: &str, packet: AdvertisementPacket, secs: u64) -> Sighting {
        Sighting::new(PeripheralKey::new(id), packet, Some(-60.0), clock.at(secs))
    }

    fn named(name: &str) -> AdvertisementPacket {
        AdvertisementPacket::new().with(LOCAL_NAME, AdValue::Text(name.to_string()))
    }

    #[test]
    fn test_new_identity_adds_entry() {
        let (mut cache, clock) = cache();
        cache.ingest(sighting(&clock, "P1", named("X"), 0));
        let view = cache.ingest(sighting(&clock, "P2", named("Y"), 0));
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn test_existing_identity_keeps_count() {
        let (mut cache, clock) = cache();
        cache.ingest(sighting(&clock, "P1", named("X"), 0));
        cache.ingest(sighting(&clock, "P2", named("Y"), 0));

        clock.set(1);
        let view = cache.ingest(sighting(&clock, "P1", named("Z"), 1));
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn test_fragments_accumulate() {
        let (mut cache, clock) = cache();
        cache.ingest(sighting(&clock, "P1", named("X"), 0));

        clock.set(1);
        let hint = AdvertisementPacket::new().with("rssiHint", AdValue::Number(5));
        cache.ingest(sighting(&clock, "P1", hint, 1));

        let entry = cache.get(&PeripheralKey::new("P1")).expect("entry present");
        let expected = named("X").with("rssiHint", AdValue::Number(5));
        assert_eq!(entry.packet, expected);
    }

    #[test]
    fn test_last_writer_wins_per_key() {
        let (mut cache, clock) = cache();
        let packets = [
            named("A").with("k1", AdValue::Number(1)),
            AdvertisementPacket::new().with("k2", AdValue::Number(2)),
            named("B").with("k1", AdValue::Number(3)),
        ];
        for (secs, packet) in packets.into_iter().enumerate() {
            clock.set(secs as u64);
            cache.ingest(sighting(&clock, "P1", packet, secs as u64));
        }

        let entry = cache.get(&PeripheralKey::new("P1")).expect("entry present");
        let expected = named("B")
            .with("k1", AdValue::Number(3))
            .with("k2", AdValue::Number(2));
        assert_eq!(entry.packet, expected);
    }

    #[test]
    fn test_repeated_sighting_is_idempotent() {
        let (mut cache, clock) = cache();
        let first = sighting(&clock, "P1", named("X"), 0);
        cache.ingest(first.clone());
        let once = cache.get(&PeripheralKey::new("P1")).cloned().expect("entry present");

        clock.set(2);
        let mut again = first;
        again.rssi = Some(-40.0);
        cache.ingest(again);
        let twice = cache.get(&PeripheralKey::new("P1")).expect("entry present");

        assert_eq!(twice.packet, once.packet);
        assert_eq!(twice.rssi, Some(-40.0));
        assert_eq!(twice.last_seen, clock.at(2));
    }

    #[test]
    fn test_missing_rssi_keeps_last_known() {
        let (mut cache, clock) = cache();
        cache.ingest(sighting(&clock, "P1", named("X"), 0));

        let fragment = Sighting::new(
            PeripheralKey::new("P1"),
            AdvertisementPacket::new().with("k", AdValue::Number(1)),
            None,
            clock.at(0),
        );
        cache.ingest(fragment);

        let entry = cache.get(&PeripheralKey::new("P1")).expect("entry present");
        assert_eq!(entry.rssi, Some(-60.0));
    }

    #[test]
    fn test_entry_expires_without_new_sightings() {
        let (mut cache, clock) = cache();
        cache.ingest(sighting(&clock, "P1", named("X"), 0));

        clock.set(10);
        let entry = cache.get(&PeripheralKey::new("P1")).expect("fresh at t=10");
        assert_eq!(entry.packet.local_name(), Some("X"));

        clock.set(50);
        assert!(cache.get(&PeripheralKey::new("P1")).is_none());
        assert!(cache.visible().is_empty());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_ingest_drops_stale_entries() {
        let (mut cache, clock) = cache();
        cache.ingest(sighting(&clock, "P1", named("X"), 0));

        clock.set(60);
        let view = cache.ingest(sighting(&clock, "P2", named("Y"), 60));
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, PeripheralKey::new("P2"));
    }

    #[test]
    fn test_entry_at_window_edge_is_fresh() {
        let (mut cache, clock) = cache();
        cache.ingest(sighting(&clock, "P1", named("X"), 0));

        clock.set(45);
        assert_eq!(cache.prune(), 0);
        assert!(cache.get(&PeripheralKey::new("P1")).is_some());

        clock.set(46);
        assert!(cache.get(&PeripheralKey::new("P1")).is_none());
    }

    #[test]
    fn test_new_entry_keeps_sighting_timestamp() {
        let (mut cache, clock) = cache();
        clock.set(100);

        let view = cache.ingest(sighting(&clock, "P1", named("X"), 0));
        assert!(view.is_empty());
        assert!(cache.is_empty());

        let view = cache.ingest(sighting(&clock, "P2", named("Y"), 90));
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].last_seen, clock.at(90));
    }

    #[test]
    fn test_merge_refreshes_last_seen() {
        let (mut cache, clock) = cache();
        cache.ingest(sighting(&clock, "P1", named("X"), 0));

        clock.set(40);
        cache.ingest(sighting(&clock, "P1", named("X"), 40));

        clock.set(70);
        assert!(cache.get(&PeripheralKey::new("P1")).is_some());
    }

    #[test]
    fn test_nameless_peripheral_is_cached() {
        let (mut cache, clock) = cache();
        let view = cache.ingest(sighting(&clock, "P1", AdvertisementPacket::new(), 0));
        assert_eq!(view.len(), 1);
        assert!(view[0].packet.local_name().is_none());
    }

    #[test]
    fn test_prune_and_clear() {
        let (mut cache, clock) = cache();
        cache.ingest(sighting(&clock, "P1", named("X"), 0));
        cache.ingest(sighting(&clock, "P2", named("Y"), 0));

        clock.set(46);
        assert_eq!(cache.prune(), 2);
        assert!(cache.is_empty());

        cache.ingest(sighting(&clock, "P3", named("Z"), 46));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_window_is_configurable() {
        let clock = ManualClock::new();
        let mut cache = DiscoveryCache::with_clock(Duration::from_secs(70), clock.clone());
        cache.ingest(sighting(&clock, "P1", named("X"), 0));

        clock.set(50);
        assert_eq!(cache.len(), 1);
        clock.set(71);
        assert_eq!(cache.len(), 0);
    }
}
