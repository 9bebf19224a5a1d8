// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # mysming-ble
//!
//! A Rust driver for the MySming wearable: a Bluetooth Low Energy peripheral
//! exposing a standard Heart Rate service plus custom LSM330 inertial sensor
//! and measurement-control services.
//!
//! ## Features
//!
//! - **Connection lifecycle**: Connect by address, reuse the link on reconnect
//! - **Service discovery**: Browse the peripheral's attribute table
//! - **Characteristic I/O**: Reads, writes and notification subscriptions
//! - **Measurement runs**: Timed begin/steady/end sequences that arm the
//!   sensors, poll the temperature and tear down in order
//! - **Decoded events**: Heart rate, temperature and raw payloads as text
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mysming_ble::{BleDriver, DriverConfig, DriverEvent, Result, HEART_RATE_MEASUREMENT};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let driver = BleDriver::platform(DriverConfig::default());
//!     let mut events = driver.subscribe();
//!
//!     driver.initialize().await?;
//!     driver.connect("C0:FF:EE:00:00:01").await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             DriverEvent::ServicesDiscovered => {
//!                 driver.set_notification(HEART_RATE_MEASUREMENT, true).await?;
//!                 driver.start_measurement()?;
//!             }
//!             DriverEvent::DataAvailable { characteristic, value } => {
//!                 println!("{}: {:?}", characteristic, value);
//!             }
//!             _ => {}
//!         }
//!     }
//!
//!     driver.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps. Peripherals are addressed by their
//! platform identifier rather than a MAC address.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! The peripheral must have been seen by the adapter (for example through a
//! prior scan) before it can be connected by address.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod events;
pub mod protocol;
pub mod sequencer;

// Re-exports for convenience
pub use config::DriverConfig;
pub use driver::BleDriver;
pub use error::{Error, Result};
pub use events::{CallbackHandle, DriverEvent};
pub use sequencer::{MeasurementRun, TimerTag};

// Re-export commonly used types from submodules
pub use ble::connection::{ConnectionState, NotificationTarget};
pub use ble::transport::{
    BleBackend, CharacteristicId, GattCharacteristic, GattEvent, GattService, GattStatus,
};
pub use ble::uuids::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<BleDriver>();
        let _ = std::any::TypeId::of::<DriverConfig>();
        let _ = std::any::TypeId::of::<DriverEvent>();
        let _ = std::any::TypeId::of::<ConnectionState>();
        let _ = std::any::TypeId::of::<MeasurementRun>();
        let _ = std::any::TypeId::of::<Error>();
    }

    #[test]
    fn test_characteristic_ids_exported() {
        assert_eq!(HEART_RATE_MEASUREMENT.service, HEART_RATE_SERVICE_UUID);
        assert_eq!(MEASURE_START.service, MEASURE_SERVICE_UUID);
    }
}
