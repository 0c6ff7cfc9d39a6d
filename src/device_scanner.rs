//! # Device Scanner Module
//!
//! Turns the adapter's event stream into sightings and drives the periodic
//! scan cycle.
//!
//! ## Scan Cycle
//! Once the adapter is up a scan is started every `interval` and stopped
//! again after `duration`, leaving the radio idle for the rest of the period.
//! Peripherals that stop advertising age out of the discovery cache while
//! the radio is idle.
//!
//! ## Sightings
//! `DeviceDiscovered`/`DeviceUpdated` carry only an id, so the peripheral's
//! properties are fetched to build a full packet. The manufacturer data,
//! service data and services events already carry their payload and become
//! partial sightings without signal strength.

use crate::advertisement::AdvertisementPacket;
use crate::connection::BluetoothUpdate;
use crate::discovery::{PeripheralKey, Sighting};
use crate::error::ScanError;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use crossbeam_channel::Sender;
use futures::stream::StreamExt;
use std::time::{Duration, SystemTime};

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Timing of the scan cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSchedule {
    interval: Duration,
    duration: Duration,
}

impl ScanSchedule {
    /// A `duration` longer than `interval` is clamped, so the cycle never overlaps.
    pub fn new(interval: Duration, duration: Duration) -> Self {
        let interval = interval.max(MIN_INTERVAL);
        Self {
            interval,
            duration: duration.min(interval),
        }
    }

    /// How long the radio scans in each period.
    pub fn scanning_time(&self) -> Duration {
        self.duration
    }

    /// How long the radio stays idle after each scan.
    pub fn idle_time(&self) -> Duration {
        self.interval - self.duration
    }
}

/// Returns the first Bluetooth adapter of the platform manager.
pub async fn first_adapter() -> Result<Adapter, ScanError> {
    let manager = Manager::new().await.map_err(ScanError::ManagerInit)?;

    let adapters = manager
        .adapters()
        .await
        .map_err(ScanError::AdapterQuery)?;

    adapters.into_iter().next().ok_or(ScanError::NoAdapters)
}

/// Runs the start/stop scan cycle until the task is aborted.
pub async fn run_scan_cycle(
    adapter: Adapter,
    schedule: ScanSchedule,
    sender: Sender<BluetoothUpdate>,
) {
    loop {
        log::info!("Starting scan...");
        if let Err(e) = adapter.start_scan(ScanFilter::default()).await {
            let error = ScanError::ScanFailed(e);
            log::error!("{}", error);
            let _ = sender.send(BluetoothUpdate::AdapterError(error.to_string()));
            return;
        }
        let _ = sender.send(BluetoothUpdate::Scanning(true));

        tokio::time::sleep(schedule.scanning_time()).await;

        log::info!("Stopping scan...");
        if let Err(e) = adapter.stop_scan().await {
            log::warn!("{}", ScanError::ScanFailed(e));
        }
        let _ = sender.send(BluetoothUpdate::Scanning(false));

        tokio::time::sleep(schedule.idle_time()).await;
    }
}

/// Forwards adapter events as sightings until the event stream ends.
pub async fn pump_events(adapter: Adapter, sender: Sender<BluetoothUpdate>) {
    let mut events = match adapter.events().await {
        Ok(events) => events,
        Err(e) => {
            let error = ScanError::Events(e);
            log::error!("{}", error);
            let _ = sender.send(BluetoothUpdate::AdapterError(error.to_string()));
            return;
        }
    };

    while let Some(event) = events.next().await {
        let update = match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                full_sighting(&adapter, &id).await.map(BluetoothUpdate::Sighting)
            }
            CentralEvent::ManufacturerDataAdvertisement {
                id,
                manufacturer_data,
            } => Some(BluetoothUpdate::Sighting(partial_sighting(
                &id,
                AdvertisementPacket::from_manufacturer_data(&manufacturer_data),
            ))),
            CentralEvent::ServiceDataAdvertisement { id, service_data } => {
                Some(BluetoothUpdate::Sighting(partial_sighting(
                    &id,
                    AdvertisementPacket::from_service_data(&service_data),
                )))
            }
            CentralEvent::ServicesAdvertisement { id, services } => {
                Some(BluetoothUpdate::Sighting(partial_sighting(
                    &id,
                    AdvertisementPacket::from_services(&services),
                )))
            }
            CentralEvent::DeviceDisconnected(id) => {
                log::debug!("Device disconnected: {}", id);
                Some(BluetoothUpdate::Disconnected(PeripheralKey::new(id.to_string())))
            }
            CentralEvent::DeviceConnected(id) => {
                log::debug!("Device connected: {}", id);
                None
            }
            _ => None,
        };

        if let Some(update) = update {
            if sender.send(update).is_err() {
                log::debug!("Update channel closed, stopping event pump");
                return;
            }
        }
    }

    log::info!("Adapter event stream ended");
}

async fn full_sighting(adapter: &Adapter, id: &PeripheralId) -> Option<Sighting> {
    let peripheral = match adapter.peripheral(id).await {
        Ok(peripheral) => peripheral,
        Err(e) => {
            log::trace!("Failed to get peripheral {}: {}", id, e);
            return None;
        }
    };

    let properties = match peripheral.properties().await {
        Ok(Some(properties)) => properties,
        Ok(None) => return None,
        Err(e) => {
            log::trace!("Failed to get properties of {}: {}", id, e);
            return None;
        }
    };

    Some(Sighting::new(
        PeripheralKey::new(id.to_string()),
        AdvertisementPacket::from_properties(&properties),
        properties.rssi.map(f64::from),
        SystemTime::now(),
    ))
}

fn partial_sighting(id: &PeripheralId, packet: AdvertisementPacket) -> Sighting {
    Sighting::new(
        PeripheralKey::new(id.to_string()),
        packet,
        None,
        SystemTime::now(),
    )
}
