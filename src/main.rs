// Hide console window on Windows in release builds
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod advertisement;
mod app;
mod config;
mod connection;
mod device_scanner;
mod discovery;
mod error;
mod gatt;
mod peripherals;
mod ui;

use app::Harald;
use config::Config;
use connection::{BluetoothUpdate, ConnectionManager};
use device_scanner::ScanSchedule;
use iced::Theme;

fn main() -> iced::Result {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load_or_default();
    log::info!(
        "Freshness window {}s, scanning {}s every {}s",
        config.freshness_window().as_secs(),
        config.scan_duration().as_secs(),
        config.scan_interval().as_secs()
    );

    // Updates from the Bluetooth thread to the UI thread
    let (sender, receiver) = crossbeam_channel::unbounded::<BluetoothUpdate>();

    let schedule = ScanSchedule::new(config.scan_interval(), config.scan_duration());
    let (manager, command_sender) = ConnectionManager::new(sender, schedule);

    // The Bluetooth thread exits once the UI drops its command sender
    std::thread::spawn(move || {
        manager.run();
    });

    iced::application("Harald", Harald::update, Harald::view)
        .subscription(Harald::subscription)
        .theme(|_| Theme::Light)
        .window_size((1200.0, 800.0))
        .run_with(move || Harald::new(receiver, command_sender, &config))
}
