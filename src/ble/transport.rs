//! GATT transport abstraction.
//!
//! The driver talks to the radio stack only through the traits in this module.
//! Every operation is fire-and-forget: the call returns once the request has
//! been handed to the transport, and the outcome is reported later as a
//! [`GattEvent`] on the channel passed to [`BleBackend::acquire_adapter`].

use async_trait::async_trait;
use btleplug::api::CharPropFlags;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

/// A (service UUID, characteristic UUID) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CharacteristicId {
    /// UUID of the owning service.
    pub service: Uuid,
    /// UUID of the characteristic itself.
    pub characteristic: Uuid,
}

impl CharacteristicId {
    /// Create a new characteristic identity.
    pub const fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }
}

impl fmt::Display for CharacteristicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.characteristic)
    }
}

/// A characteristic as discovered on the peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    /// Identity of the characteristic.
    pub id: CharacteristicId,
    /// Declared properties (read, write, notify, ...).
    pub properties: CharPropFlags,
    /// UUIDs of the descriptors attached to the characteristic.
    pub descriptors: Vec<Uuid>,
}

impl GattCharacteristic {
    /// Check whether a descriptor is attached.
    pub fn has_descriptor(&self, uuid: &Uuid) -> bool {
        self.descriptors.contains(uuid)
    }
}

/// A service as discovered on the peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    /// UUID of the service.
    pub uuid: Uuid,
    /// Characteristics contained in the service.
    pub characteristics: Vec<GattCharacteristic>,
}

/// Completion status reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattStatus {
    /// The operation completed.
    Success,
    /// The operation failed with a transport-specific code.
    Failure(u8),
}

impl GattStatus {
    /// Check if the status is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Asynchronous event produced by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattEvent {
    /// The link went up (`connected == true`) or down.
    ConnectionStateChanged {
        /// New link state.
        connected: bool,
        /// Status accompanying the change.
        status: GattStatus,
    },
    /// Service discovery finished.
    ServicesDiscovered {
        /// Discovery outcome.
        status: GattStatus,
    },
    /// A read requested by the driver finished.
    CharacteristicRead {
        /// Characteristic that was read.
        characteristic: CharacteristicId,
        /// Read outcome.
        status: GattStatus,
        /// Value read from the peripheral.
        value: Vec<u8>,
    },
    /// A write requested by the driver finished.
    CharacteristicWrite {
        /// Characteristic that was written.
        characteristic: CharacteristicId,
        /// Write outcome.
        status: GattStatus,
        /// Value that was written.
        value: Vec<u8>,
    },
    /// The peripheral pushed a new value (notification or indication).
    CharacteristicChanged {
        /// Characteristic that changed.
        characteristic: CharacteristicId,
        /// New value.
        value: Vec<u8>,
    },
}

/// Sending half of the transport event channel.
pub type GattEventSender = mpsc::UnboundedSender<GattEvent>;

/// Receiving half of the transport event channel.
pub type GattEventReceiver = mpsc::UnboundedReceiver<GattEvent>;

/// Entry point into a platform BLE stack.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BleBackend: Send + Sync {
    /// Acquire the local adapter. Events from every connection opened through
    /// the adapter are delivered on `events`.
    async fn acquire_adapter(&self, events: GattEventSender) -> Result<Arc<dyn BleAdapter>>;
}

/// Handle to the local BLE adapter.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BleAdapter: Send + Sync {
    /// Resolve `address` and open a GATT connection to it.
    ///
    /// Returns as soon as the connection attempt has been started; the result
    /// arrives as [`GattEvent::ConnectionStateChanged`].
    async fn connect_gatt(
        &self,
        address: &str,
        auto_reconnect: bool,
    ) -> Result<Arc<dyn GattConnection>>;
}

/// Handle to one GATT client connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GattConnection: Send + Sync {
    /// Re-establish the link on an existing handle.
    async fn reconnect(&self) -> Result<()>;

    /// Start service discovery.
    async fn discover_services(&self) -> Result<()>;

    /// Request a disconnect.
    async fn disconnect(&self) -> Result<()>;

    /// Release the handle. Further calls on it are invalid.
    async fn close(&self);

    /// Services found by the last discovery.
    fn services(&self) -> Vec<GattService>;

    /// Request a characteristic read.
    async fn read_characteristic(&self, id: CharacteristicId) -> Result<()>;

    /// Request a characteristic write.
    async fn write_characteristic(&self, id: CharacteristicId, value: Vec<u8>) -> Result<()>;

    /// Enable or disable local delivery of notifications for a characteristic.
    async fn set_notification(&self, id: CharacteristicId, enabled: bool) -> Result<()>;

    /// Write a descriptor of a characteristic.
    async fn write_descriptor(
        &self,
        id: CharacteristicId,
        descriptor: Uuid,
        value: Vec<u8>,
    ) -> Result<()>;
}
