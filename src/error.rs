//! # Error Types Module
//!
//! Centralized error handling for Harald.
//! Provides custom error types for each module with proper context and error chaining.
//!
//! ## Error Types
//! - `ScanError`: Adapter acquisition and scan control failures
//! - `ConnectionError`: Runtime and peripheral connection failures
//! - `GattError`: Service discovery and characteristic read failures
//! - `ConfigError`: Configuration file I/O and parsing errors
//!
//! ## Usage Examples
//! ```rust
//! // Config module uses ConfigError
//! pub fn load() -> Result<Config, ConfigError> { ... }
//!
//! // Scanner module uses ScanError
//! pub async fn first_adapter() -> Result<Adapter, ScanError> { ... }
//!
//! // GATT module uses GattError
//! pub async fn load_services(...) -> Result<Vec<ServiceNode>, GattError> { ... }
//! ```

use std::fmt;

/// Errors that can occur while acquiring the adapter or controlling scans
#[derive(Debug)]
pub enum ScanError {
    /// Bluetooth manager initialization failed
    ManagerInit(btleplug::Error),
    /// Listing adapters failed
    AdapterQuery(btleplug::Error),
    /// No Bluetooth adapters available
    NoAdapters,
    /// Subscribing to adapter events failed
    Events(btleplug::Error),
    /// Starting or stopping a scan failed
    ScanFailed(btleplug::Error),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::ManagerInit(e) => {
                write!(f, "Failed to initialize Bluetooth manager: {}", e)
            }
            ScanError::AdapterQuery(e) => {
                write!(f, "Failed to query Bluetooth adapters: {}", e)
            }
            ScanError::NoAdapters => {
                write!(f, "No Bluetooth adapter found. Please ensure Bluetooth is enabled.")
            }
            ScanError::Events(e) => {
                write!(f, "Failed to subscribe to adapter events: {}", e)
            }
            ScanError::ScanFailed(e) => {
                write!(f, "Scan operation failed: {}", e)
            }
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScanError::ManagerInit(e)
            | ScanError::AdapterQuery(e)
            | ScanError::Events(e)
            | ScanError::ScanFailed(e) => Some(e),
            ScanError::NoAdapters => None,
        }
    }
}

/// Errors that can occur during connection management
#[derive(Debug)]
pub enum ConnectionError {
    /// Failed to create Tokio runtime
    RuntimeCreation(std::io::Error),
    /// The peripheral is not (or no longer) known to the adapter
    UnknownPeripheral(String),
    /// Failed to connect to specific device
    DeviceConnection {
        device_id: String,
        source: btleplug::Error,
    },
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::RuntimeCreation(e) => {
                write!(f, "Failed to create async runtime: {}", e)
            }
            ConnectionError::UnknownPeripheral(device_id) => {
                write!(f, "Peripheral {} is no longer available", device_id)
            }
            ConnectionError::DeviceConnection { device_id, source } => {
                write!(f, "Failed to connect to device {}: {}", device_id, source)
            }
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectionError::RuntimeCreation(e) => Some(e),
            ConnectionError::DeviceConnection { source, .. } => Some(source),
            ConnectionError::UnknownPeripheral(_) => None,
        }
    }
}

/// Errors that can occur while exploring a connected peripheral
#[derive(Debug)]
pub enum GattError {
    /// Service discovery failed
    ServiceDiscovery(btleplug::Error),
    /// Reading a characteristic value failed
    Read(btleplug::Error),
}

impl fmt::Display for GattError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GattError::ServiceDiscovery(e) => {
                write!(f, "Failed to discover services: {}", e)
            }
            GattError::Read(e) => {
                write!(f, "Failed to read value: {}", e)
            }
        }
    }
}

impl std::error::Error for GattError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GattError::ServiceDiscovery(e) | GattError::Read(e) => Some(e),
        }
    }
}

/// Errors that can occur during configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed(std::io::Error),
    /// Failed to write config file
    WriteFailed(std::io::Error),
    /// Failed to parse config file
    ParseFailed(toml::de::Error),
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Failed to read config file: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Failed to write config file: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Failed to parse config file: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
        }
    }
}
