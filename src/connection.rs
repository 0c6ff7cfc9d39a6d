//! # Connection Management Module
//!
//! Owns everything that talks to the Bluetooth adapter: the scan cycle, the
//! adapter event pump and the connection to the peripheral being inspected.
//!
//! ## Key Components
//! - `ConnectionManager`: Runs the async runtime and processes UI commands
//! - `ConnectionCommand`: Commands sent from UI to the Bluetooth thread
//! - `BluetoothUpdate`: Everything the Bluetooth thread reports back
//!
//! ## Threading
//! The manager runs on a dedicated thread with its own Tokio runtime so the
//! UI never blocks on the adapter. Updates go to the UI over a single
//! channel; sightings therefore reach the discovery cache one at a time and
//! in arrival order.

use crate::device_scanner::{first_adapter, pump_events, run_scan_cycle, ScanSchedule};
use crate::discovery::{PeripheralKey, Sighting};
use crate::error::ConnectionError;
use crate::gatt::{self, ServiceNode};
use btleplug::api::{Central, Peripheral as _};
use btleplug::platform::{Adapter, Peripheral};
use crossbeam_channel::Sender;
use std::sync::mpsc;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum ConnectionCommand {
    /// Connect to a peripheral and load its service tree
    Inspect(PeripheralKey),
    Disconnect,
    /// Drop the current connection and restart scanning from scratch
    Rescan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error(String),
}

#[derive(Debug)]
pub enum BluetoothUpdate {
    Sighting(Sighting),
    Scanning(bool),
    AdapterError(String),
    Disconnected(PeripheralKey),
    ConnectionStatus(PeripheralKey, ConnectionStatus),
    Services(PeripheralKey, Vec<ServiceNode>),
    CharacteristicValue {
        peripheral: PeripheralKey,
        service: Uuid,
        characteristic: Uuid,
        value: String,
    },
}

/// Manages the Bluetooth side of the application.
///
/// Runs in a dedicated thread with its own Tokio runtime. Scanning and the
/// event pump run as background tasks; inspecting a peripheral spawns one
/// connection task at a time.
pub struct ConnectionManager {
    command_receiver: mpsc::Receiver<ConnectionCommand>,
    update_sender: Sender<BluetoothUpdate>,
    schedule: ScanSchedule,
}

impl ConnectionManager {
    /// Creates a new ConnectionManager.
    ///
    /// Returns the manager and a sender for issuing commands from the UI thread.
    pub fn new(
        update_sender: Sender<BluetoothUpdate>,
        schedule: ScanSchedule,
    ) -> (Self, mpsc::Sender<ConnectionCommand>) {
        let (command_sender, command_receiver) = mpsc::channel();

        let manager = ConnectionManager {
            command_receiver,
            update_sender,
            schedule,
        };

        (manager, command_sender)
    }

    /// Runs the connection management loop.
    ///
    /// This should be called in a spawned thread. It will block until the command
    /// channel is closed.
    pub fn run(self) {
        let rt = match Runtime::new() {
            Ok(runtime) => runtime,
            Err(e) => {
                let error = ConnectionError::RuntimeCreation(e);
                log::error!("{}", error);
                let _ = self
                    .update_sender
                    .send(BluetoothUpdate::AdapterError(error.to_string()));
                return;
            }
        };

        let adapter = match rt.block_on(first_adapter()) {
            Ok(adapter) => adapter,
            Err(e) => {
                log::error!("{}", e);
                let _ = self
                    .update_sender
                    .send(BluetoothUpdate::AdapterError(e.to_string()));
                return;
            }
        };

        let _pump = rt.spawn(pump_events(adapter.clone(), self.update_sender.clone()));
        let mut scan_task = self.spawn_scan_cycle(&rt, &adapter);
        let mut inspection: Option<(PeripheralKey, JoinHandle<()>)> = None;

        while let Ok(command) = self.command_receiver.recv() {
            match command {
                ConnectionCommand::Inspect(key) => {
                    log::info!("Connection manager: Inspecting peripheral {}", key);
                    let previous = inspection.take().map(|(previous, task)| {
                        task.abort();
                        previous
                    });

                    let task = rt.spawn(inspect(
                        adapter.clone(),
                        key.clone(),
                        previous,
                        self.update_sender.clone(),
                    ));
                    inspection = Some((key, task));
                }
                ConnectionCommand::Disconnect => {
                    log::info!("Connection manager: Disconnect requested");
                    if let Some((key, task)) = inspection.take() {
                        task.abort();
                        rt.spawn(disconnect(adapter.clone(), key.clone()));
                        let _ = self.update_sender.send(BluetoothUpdate::ConnectionStatus(
                            key,
                            ConnectionStatus::Disconnected,
                        ));
                    }
                }
                ConnectionCommand::Rescan => {
                    log::info!("Connection manager: Rescan requested");
                    if let Some((key, task)) = inspection.take() {
                        task.abort();
                        rt.spawn(disconnect(adapter.clone(), key));
                    }

                    scan_task.abort();
                    if let Err(e) = rt.block_on(adapter.stop_scan()) {
                        log::debug!("Connection manager: stop_scan before rescan failed: {}", e);
                    }
                    scan_task = self.spawn_scan_cycle(&rt, &adapter);
                }
            }
        }

        log::info!("Connection manager: Command channel closed, shutting down");
        scan_task.abort();
        if let Err(e) = rt.block_on(adapter.stop_scan()) {
            log::debug!("Connection manager: stop_scan on shutdown failed: {}", e);
        }
    }

    fn spawn_scan_cycle(&self, rt: &Runtime, adapter: &Adapter) -> JoinHandle<()> {
        rt.spawn(run_scan_cycle(
            adapter.clone(),
            self.schedule,
            self.update_sender.clone(),
        ))
    }
}

async fn find_peripheral(adapter: &Adapter, key: &PeripheralKey) -> Option<Peripheral> {
    let peripherals = match adapter.peripherals().await {
        Ok(peripherals) => peripherals,
        Err(e) => {
            log::warn!("Failed to list peripherals: {}", e);
            return None;
        }
    };

    peripherals
        .into_iter()
        .find(|peripheral| peripheral.id().to_string() == key.as_str())
}

async fn connect(adapter: &Adapter, key: &PeripheralKey) -> Result<Peripheral, ConnectionError> {
    let peripheral = find_peripheral(adapter, key)
        .await
        .ok_or_else(|| ConnectionError::UnknownPeripheral(key.to_string()))?;

    let connected = peripheral.is_connected().await.unwrap_or(false);
    if !connected {
        peripheral
            .connect()
            .await
            .map_err(|source| ConnectionError::DeviceConnection {
                device_id: key.to_string(),
                source,
            })?;
    }

    Ok(peripheral)
}

/// Drops the `previous` link, even when it is the same peripheral, then
/// connects, publishes the service tree and reads every readable value.
async fn inspect(
    adapter: Adapter,
    key: PeripheralKey,
    previous: Option<PeripheralKey>,
    sender: Sender<BluetoothUpdate>,
) {
    let status = |state| BluetoothUpdate::ConnectionStatus(key.clone(), state);

    if let Some(previous) = previous {
        disconnect(adapter.clone(), previous).await;
    }

    let _ = sender.send(status(ConnectionStatus::Connecting));
    let peripheral = match connect(&adapter, &key).await {
        Ok(peripheral) => peripheral,
        Err(e) => {
            log::error!("{}", e);
            let _ = sender.send(status(ConnectionStatus::Error(e.to_string())));
            return;
        }
    };
    let _ = sender.send(status(ConnectionStatus::Connected));

    let services = match gatt::load_services(&peripheral).await {
        Ok(services) => services,
        Err(e) => {
            log::error!("{}", e);
            let _ = sender.send(status(ConnectionStatus::Error(e.to_string())));
            return;
        }
    };
    let _ = sender.send(BluetoothUpdate::Services(key.clone(), services.clone()));

    for service in &services {
        for characteristic in &service.characteristics {
            let Some(result) = gatt::read_value(&peripheral, characteristic).await else {
                continue;
            };
            if let Err(e) = &result {
                log::warn!("{} ({})", e, characteristic.uuid);
            }

            let update = BluetoothUpdate::CharacteristicValue {
                peripheral: key.clone(),
                service: service.uuid,
                characteristic: characteristic.uuid,
                value: gatt::render_value(&result),
            };
            if sender.send(update).is_err() {
                return;
            }
        }
    }

    log::info!("Finished reading {} services of {}", services.len(), key);
}

async fn disconnect(adapter: Adapter, key: PeripheralKey) {
    let Some(peripheral) = find_peripheral(&adapter, &key).await else {
        return;
    };

    if peripheral.is_connected().await.unwrap_or(false) {
        log::debug!("Connection manager: Disconnecting {}", key);
        if let Err(e) = peripheral.disconnect().await {
            log::warn!("Failed to disconnect {}: {}", key, e);
        }
    }
}
