//! BLE communication module.
//!
//! The transport traits abstract the platform GATT client; [`platform`]
//! implements them on btleplug. [`ConnectionManager`] owns the link to a
//! single peripheral and the discovered attribute table.

pub mod catalog;
pub mod connection;
#[cfg(test)]
pub(crate) mod fake;
pub mod platform;
pub mod transport;
pub mod uuids;

pub use catalog::ServiceCatalog;
pub use connection::{ConnectionManager, ConnectionState, NotificationTarget};
pub use platform::BtleplugBackend;
pub use transport::{
    BleAdapter, BleBackend, CharacteristicId, GattCharacteristic, GattConnection, GattEvent,
    GattEventSender, GattService, GattStatus,
};
pub use uuids::*;
