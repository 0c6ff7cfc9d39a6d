use crate::advertisement::AdValue;
use crate::config::Config;
use crate::connection::{BluetoothUpdate, ConnectionCommand, ConnectionStatus};
use crate::discovery::{DiscoveryCache, KnownPeripheral, PeripheralKey};
use crate::gatt::{CharacteristicNode, ServiceNode};
use crate::peripherals::{discovery_descriptor, display_name, PeripheralFilter};
use crate::ui::styles;
use crossbeam_channel::Receiver;
use iced::widget::{button, column, container, row, scrollable, text, text_input, Space};
use iced::{Element, Length, Subscription, Task};
use std::sync::mpsc::Sender;
use uuid::Uuid;

// Iced Application State
pub struct Harald {
    pub cache: DiscoveryCache,
    pub filter: PeripheralFilter,
    receiver: Receiver<BluetoothUpdate>,
    command_sender: Sender<ConnectionCommand>,
    pub scanning: bool,
    pub adapter_error: Option<String>,
    pub selected_peripheral: Option<PeripheralKey>,
    pub connection_status: Option<ConnectionStatus>,
    pub services: Vec<ServiceNode>,
    /// (service, characteristic)
    pub selected_characteristic: Option<(Uuid, Uuid)>,
}

#[derive(Debug, Clone)]
pub enum Message {
    Tick,
    SearchChanged(String),
    SelectPeripheral(PeripheralKey),
    SelectCharacteristic(Uuid, Uuid),
    Rescan,
    Disconnect,
}

impl Harald {
    pub fn new(
        receiver: Receiver<BluetoothUpdate>,
        command_sender: Sender<ConnectionCommand>,
        config: &Config,
    ) -> (Self, Task<Message>) {
        (
            Harald {
                cache: DiscoveryCache::new(config.freshness_window()),
                filter: PeripheralFilter::new(config.require_name),
                receiver,
                command_sender,
                scanning: false,
                adapter_error: None,
                selected_peripheral: None,
                connection_status: None,
                services: Vec::new(),
                selected_characteristic: None,
            },
            Task::none(),
        )
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Tick => {
                // Process all pending updates without blocking
                while let Ok(update) = self.receiver.try_recv() {
                    self.apply(update);
                }
                self.cache.prune();
            }
            Message::SearchChanged(term) => {
                self.filter.search = term;
            }
            Message::SelectPeripheral(key) => {
                if self.is_selected(&key) && self.is_linked() {
                    return Task::none();
                }
                self.selected_peripheral = Some(key.clone());
                self.services.clear();
                self.selected_characteristic = None;
                self.connection_status = Some(ConnectionStatus::Connecting);
                self.send(ConnectionCommand::Inspect(key));
            }
            Message::SelectCharacteristic(service, characteristic) => {
                self.selected_characteristic = Some((service, characteristic));
            }
            Message::Rescan => {
                // Sightings queued before the rescan belong to the old scan
                let pending: Vec<_> = self
                    .receiver
                    .try_iter()
                    .filter(|update| !matches!(update, BluetoothUpdate::Sighting(_)))
                    .collect();
                for update in pending {
                    self.apply(update);
                }
                self.cache.clear();
                self.selected_peripheral = None;
                self.services.clear();
                self.selected_characteristic = None;
                self.connection_status = None;
                self.send(ConnectionCommand::Rescan);
            }
            Message::Disconnect => {
                log::debug!("UI: Sending disconnect command");
                self.send(ConnectionCommand::Disconnect);
                // State will be updated when we receive ConnectionStatus::Disconnected
            }
        }
        Task::none()
    }

    fn send(&self, command: ConnectionCommand) {
        if let Err(e) = self.command_sender.send(command) {
            log::error!("Failed to send command to Bluetooth thread: {}", e);
        }
    }

    fn is_selected(&self, key: &PeripheralKey) -> bool {
        self.selected_peripheral.as_ref() == Some(key)
    }

    /// Whether the selected peripheral is connected or on its way there.
    fn is_linked(&self) -> bool {
        matches!(
            self.connection_status,
            Some(ConnectionStatus::Connecting | ConnectionStatus::Connected)
        )
    }

    fn apply(&mut self, update: BluetoothUpdate) {
        match update {
            BluetoothUpdate::Sighting(sighting) => {
                self.cache.ingest(sighting);
            }
            BluetoothUpdate::Scanning(scanning) => {
                self.scanning = scanning;
                if scanning {
                    self.adapter_error = None;
                }
            }
            BluetoothUpdate::AdapterError(error) => {
                self.scanning = false;
                self.adapter_error = Some(error);
            }
            BluetoothUpdate::Disconnected(key) => {
                if self.is_selected(&key) {
                    self.connection_status = Some(ConnectionStatus::Disconnected);
                }
            }
            BluetoothUpdate::ConnectionStatus(key, status) => {
                if self.is_selected(&key) {
                    self.connection_status = Some(status);
                }
            }
            BluetoothUpdate::Services(key, services) => {
                if self.is_selected(&key) {
                    self.services = services;
                }
            }
            BluetoothUpdate::CharacteristicValue {
                peripheral,
                service,
                characteristic,
                value,
            } => {
                if !self.is_selected(&peripheral) {
                    return;
                }
                if let Some(node) = self.services.iter_mut().find(|node| node.uuid == service) {
                    node.set_value(characteristic, value);
                }
            }
        }
    }

    fn selected_characteristic_node(&self) -> Option<&CharacteristicNode> {
        let (service, characteristic) = self.selected_characteristic?;
        self.services
            .iter()
            .find(|node| node.uuid == service)?
            .characteristics
            .iter()
            .find(|node| node.uuid == characteristic)
    }

    pub fn subscription(&self) -> Subscription<Message> {
        iced::time::every(std::time::Duration::from_millis(100)).map(|_| Message::Tick)
    }

    pub fn view(&'_ self) -> Element<'_, Message> {
        let content = row![
            self.peripherals_pane(),
            self.services_pane(),
            self.detail_pane()
        ]
        .spacing(0);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn peripherals_pane(&self) -> Element<'_, Message> {
        let title = text("Peripherals").size(20);

        let search = text_input("Search", &self.filter.search)
            .on_input(Message::SearchChanged)
            .padding(8);

        let listed = self.filter.apply(self.cache.visible());
        let status = match &self.adapter_error {
            Some(error) => error.clone(),
            None => discovery_descriptor(listed.len()),
        };

        let rows = listed.into_iter().map(|peripheral| {
            let rssi = peripheral
                .rssi
                .map(|rssi| format!("{:.0} dBm", rssi))
                .unwrap_or_else(|| "? dBm".to_string());

            button(text(format!("{}\n{}", display_name(peripheral), rssi)).size(14))
                .on_press(Message::SelectPeripheral(peripheral.id.clone()))
                .width(Length::Fill)
                .padding(10)
                .style(styles::list_item_style(self.is_selected(&peripheral.id)))
                .into()
        });

        let rescan = button(text("Rescan"))
            .on_press(Message::Rescan)
            .padding(10)
            .width(Length::Fill)
            .style(styles::rescan_button_style());

        let scan_state = text(if self.scanning { "Scanning..." } else { "Idle" }).size(12);

        let pane = column![
            title,
            search,
            scrollable(column(rows).spacing(5)).height(Length::Fill),
            text(status).size(12),
            scan_state,
            rescan
        ]
        .spacing(10)
        .padding(20);

        container(pane)
            .style(container::bordered_box)
            .width(Length::Fixed(300.0))
            .height(Length::Fill)
            .into()
    }

    fn services_pane(&self) -> Element<'_, Message> {
        let title = text("Services").size(20);

        let status = match &self.connection_status {
            None => "Select a peripheral".to_string(),
            Some(ConnectionStatus::Connecting) => "Connecting...".to_string(),
            Some(ConnectionStatus::Connected) if self.services.is_empty() => {
                "Discovering services...".to_string()
            }
            Some(ConnectionStatus::Connected) => format!("{} services", self.services.len()),
            Some(ConnectionStatus::Disconnected) => "Disconnected".to_string(),
            Some(ConnectionStatus::Error(error)) => error.clone(),
        };

        let mut nodes: Vec<Element<'_, Message>> = Vec::new();
        for service in &self.services {
            let label = if service.primary {
                format!("{} (primary)", service.uuid)
            } else {
                service.uuid.to_string()
            };
            nodes.push(text(label).size(16).into());

            for characteristic in &service.characteristics {
                let is_selected =
                    self.selected_characteristic == Some((service.uuid, characteristic.uuid));
                let label = format!(
                    "{} [{}]\n{}",
                    characteristic.uuid,
                    characteristic.flags(),
                    characteristic.value.as_deref().unwrap_or("")
                );
                let item = button(text(label).size(13))
                    .on_press(Message::SelectCharacteristic(service.uuid, characteristic.uuid))
                    .width(Length::Fill)
                    .padding(6)
                    .style(styles::list_item_style(is_selected));

                nodes.push(row![Space::with_width(Length::Fixed(16.0)), item].into());
            }
        }

        let connected = matches!(
            self.connection_status,
            Some(ConnectionStatus::Connecting) | Some(ConnectionStatus::Connected)
        );
        let disconnect = button(text("Disconnect"))
            .on_press_maybe(connected.then_some(Message::Disconnect))
            .padding(10)
            .width(Length::Fill)
            .style(styles::disconnect_button_style());

        let pane = column![
            title,
            text(status).size(12),
            scrollable(column(nodes).spacing(5)).height(Length::Fill),
            disconnect
        ]
        .spacing(10)
        .padding(20);

        container(pane)
            .style(container::bordered_box)
            .width(Length::FillPortion(1))
            .height(Length::Fill)
            .into()
    }

    fn detail_pane(&self) -> Element<'_, Message> {
        let title = text("Details").size(20);

        let peripheral = self
            .selected_peripheral
            .as_ref()
            .and_then(|key| self.cache.get(key));

        let mut rows: Vec<Element<'_, Message>> = Vec::new();
        match peripheral {
            Some(peripheral) => rows.extend(peripheral_rows(peripheral)),
            None if self.selected_peripheral.is_some() => {
                rows.push(text("Peripheral is no longer advertising").into());
            }
            None => {}
        }

        if let Some(characteristic) = self.selected_characteristic_node() {
            rows.push(text("Characteristic").size(16).into());
            rows.push(detail_row("UUID", characteristic.uuid.to_string(), 0));
            rows.push(detail_row("Properties", characteristic.flags(), 0));
            rows.push(detail_row(
                "Value",
                characteristic.value.clone().unwrap_or_default(),
                0,
            ));
        }

        let pane = column![title, scrollable(column(rows).spacing(4)).height(Length::Fill)]
            .spacing(10)
            .padding(20);

        container(pane)
            .width(Length::FillPortion(1))
            .height(Length::Fill)
            .into()
    }
}

fn peripheral_rows(peripheral: &KnownPeripheral) -> Vec<Element<'_, Message>> {
    let last_seen = chrono::DateTime::<chrono::Local>::from(peripheral.last_seen)
        .format("%H:%M:%S")
        .to_string();
    let rssi = peripheral
        .rssi
        .map(|rssi| format!("{:.0} dBm", rssi))
        .unwrap_or_default();

    let mut rows = vec![
        text(display_name(peripheral).to_string()).size(16).into(),
        detail_row("Identifier", peripheral.id.to_string(), 0),
        detail_row("RSSI", rssi, 0),
        detail_row("Last seen", last_seen, 0),
        text("Advertisement").size(16).into(),
    ];

    for (key, value) in peripheral.packet.iter() {
        rows.push(detail_row(key, value.to_string(), 0));
        if let AdValue::Attributes(attributes) = value {
            for (name, nested) in attributes {
                rows.push(detail_row(name, nested.to_string(), 1));
            }
        }
    }

    rows
}

fn detail_row<'a>(name: &str, value: String, depth: u16) -> Element<'a, Message> {
    let indent = Space::with_width(Length::Fixed(f32::from(depth) * 16.0));
    row![
        indent,
        text(name.to_string()).size(13).width(Length::FillPortion(1)),
        text(value).size(13).width(Length::FillPortion(2))
    ]
    .spacing(8)
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advertisement::{AdvertisementPacket, LOCAL_NAME};
    use crate::discovery::Sighting;
    use btleplug::api::CharPropFlags;
    use std::sync::mpsc;
    use std::time::SystemTime;

    fn app() -> (
        Harald,
        crossbeam_channel::Sender<BluetoothUpdate>,
        mpsc::Receiver<ConnectionCommand>,
    ) {
        let (update_sender, update_receiver) = crossbeam_channel::unbounded();
        let (command_sender, command_receiver) = mpsc::channel();
        let (app, _) = Harald::new(update_receiver, command_sender, &Config::default());
        (app, update_sender, command_receiver)
    }

    fn sighting(id: &str, name: &str) -> BluetoothUpdate {
        BluetoothUpdate::Sighting(Sighting::new(
            PeripheralKey::new(id),
            AdvertisementPacket::new().with(LOCAL_NAME, AdValue::Text(name.to_string())),
            Some(-50.0),
            SystemTime::now(),
        ))
    }

    fn service(uuid: u128) -> ServiceNode {
        ServiceNode {
            uuid: Uuid::from_u128(uuid),
            primary: true,
            characteristics: vec![CharacteristicNode {
                uuid: Uuid::from_u128(1),
                service_uuid: Uuid::from_u128(uuid),
                properties: CharPropFlags::READ,
                value: None,
            }],
        }
    }

    #[test]
    fn test_tick_ingests_sightings() {
        let (mut app, updates, _commands) = app();
        updates.send(sighting("P1", "Thermo")).unwrap();
        updates.send(sighting("P2", "Scale")).unwrap();
        updates.send(sighting("P1", "Thermo")).unwrap();

        let _ = app.update(Message::Tick);
        assert_eq!(app.cache.len(), 2);
    }

    #[test]
    fn test_select_peripheral_sends_inspect_once() {
        let (mut app, _updates, commands) = app();
        let key = PeripheralKey::new("P1");

        let _ = app.update(Message::SelectPeripheral(key.clone()));
        let _ = app.update(Message::SelectPeripheral(key.clone()));

        assert!(matches!(commands.try_recv(), Ok(ConnectionCommand::Inspect(k)) if k == key));
        assert!(commands.try_recv().is_err());
        assert_eq!(app.connection_status, Some(ConnectionStatus::Connecting));
    }

    #[test]
    fn test_reselect_after_disconnect_inspects_again() {
        let (mut app, updates, commands) = app();
        let key = PeripheralKey::new("P1");

        let _ = app.update(Message::SelectPeripheral(key.clone()));
        assert!(matches!(commands.try_recv(), Ok(ConnectionCommand::Inspect(_))));

        let _ = app.update(Message::Disconnect);
        assert!(matches!(commands.try_recv(), Ok(ConnectionCommand::Disconnect)));
        updates
            .send(BluetoothUpdate::ConnectionStatus(
                key.clone(),
                ConnectionStatus::Disconnected,
            ))
            .unwrap();
        let _ = app.update(Message::Tick);
        assert_eq!(app.connection_status, Some(ConnectionStatus::Disconnected));

        let _ = app.update(Message::SelectPeripheral(key.clone()));
        assert!(matches!(commands.try_recv(), Ok(ConnectionCommand::Inspect(k)) if k == key));
        assert_eq!(app.connection_status, Some(ConnectionStatus::Connecting));
    }

    #[test]
    fn test_reselect_after_failed_connect_retries() {
        let (mut app, updates, commands) = app();
        let key = PeripheralKey::new("P1");

        let _ = app.update(Message::SelectPeripheral(key.clone()));
        let _ = commands.try_recv();
        updates
            .send(BluetoothUpdate::ConnectionStatus(
                key.clone(),
                ConnectionStatus::Error("Peripheral not found: P1".to_string()),
            ))
            .unwrap();
        let _ = app.update(Message::Tick);

        let _ = app.update(Message::SelectPeripheral(key.clone()));
        assert!(matches!(commands.try_recv(), Ok(ConnectionCommand::Inspect(k)) if k == key));
    }

    #[test]
    fn test_updates_for_other_peripherals_are_ignored() {
        let (mut app, updates, _commands) = app();
        let _ = app.update(Message::SelectPeripheral(PeripheralKey::new("P1")));

        updates
            .send(BluetoothUpdate::Services(PeripheralKey::new("P2"), vec![service(0x180a)]))
            .unwrap();
        let _ = app.update(Message::Tick);
        assert!(app.services.is_empty());

        updates
            .send(BluetoothUpdate::Services(PeripheralKey::new("P1"), vec![service(0x180a)]))
            .unwrap();
        let _ = app.update(Message::Tick);
        assert_eq!(app.services.len(), 1);
    }

    #[test]
    fn test_characteristic_values_fill_the_tree() {
        let (mut app, updates, _commands) = app();
        let key = PeripheralKey::new("P1");
        let _ = app.update(Message::SelectPeripheral(key.clone()));

        updates
            .send(BluetoothUpdate::Services(key.clone(), vec![service(0x180a)]))
            .unwrap();
        updates
            .send(BluetoothUpdate::CharacteristicValue {
                peripheral: key,
                service: Uuid::from_u128(0x180a),
                characteristic: Uuid::from_u128(1),
                value: "Harald".to_string(),
            })
            .unwrap();
        let _ = app.update(Message::Tick);

        let _ = app.update(Message::SelectCharacteristic(
            Uuid::from_u128(0x180a),
            Uuid::from_u128(1),
        ));
        let node = app.selected_characteristic_node().expect("characteristic selected");
        assert_eq!(node.value.as_deref(), Some("Harald"));
    }

    #[test]
    fn test_rescan_resets_state() {
        let (mut app, updates, commands) = app();
        updates.send(sighting("P1", "Thermo")).unwrap();
        let _ = app.update(Message::Tick);
        let _ = app.update(Message::SelectPeripheral(PeripheralKey::new("P1")));
        let _ = commands.try_recv();

        let _ = app.update(Message::Rescan);
        assert!(app.cache.is_empty());
        assert!(app.selected_peripheral.is_none());
        assert!(app.connection_status.is_none());
        assert!(matches!(commands.try_recv(), Ok(ConnectionCommand::Rescan)));
    }

    #[test]
    fn test_rescan_discards_queued_sightings() {
        let (mut app, updates, _commands) = app();
        updates.send(sighting("P1", "Thermo")).unwrap();
        let _ = app.update(Message::Tick);

        updates.send(sighting("P2", "Scale")).unwrap();
        updates.send(BluetoothUpdate::Scanning(true)).unwrap();
        let _ = app.update(Message::Rescan);
        let _ = app.update(Message::Tick);

        assert!(app.cache.is_empty());
        assert!(app.scanning);
    }

    #[test]
    fn test_adapter_error_is_reported() {
        let (mut app, updates, _commands) = app();
        updates
            .send(BluetoothUpdate::AdapterError("No Bluetooth adapter found".to_string()))
            .unwrap();
        let _ = app.update(Message::Tick);
        assert_eq!(app.adapter_error.as_deref(), Some("No Bluetooth adapter found"));
        assert!(!app.scanning);
    }
}
