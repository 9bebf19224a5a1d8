//! BLE connection management.
//!
//! Owns the adapter, the remembered device address, the GATT handle and the
//! service catalog of the current connection epoch.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ble::catalog::ServiceCatalog;
use crate::ble::transport::{
    BleAdapter, BleBackend, CharacteristicId, GattCharacteristic, GattConnection,
    GattEventSender, GattService,
};
use crate::ble::uuids::{
    is_mysming_service, CLIENT_CHARACTERISTIC_CONFIG_UUID, DISABLE_NOTIFICATION_VALUE,
    ENABLE_NOTIFICATION_VALUE,
};
use crate::error::{Error, Result};

/// Connection state of the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,
    /// Connection requested, waiting for the transport.
    Connecting,
    /// Connected and idle.
    Connected,
    /// Running the measurement begin sequence.
    InitMeasure,
    /// Measurement streaming, temperature being sampled.
    Measuring,
}

impl ConnectionState {
    /// Check if the link is up.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::InitMeasure | Self::Measuring)
    }

    /// Check if a measurement is being set up or running.
    pub fn is_measuring(&self) -> bool {
        matches!(self, Self::InitMeasure | Self::Measuring)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::InitMeasure => write!(f, "InitMeasure"),
            Self::Measuring => write!(f, "Measuring"),
        }
    }
}

/// Which characteristic a notification request targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationTarget {
    /// A characteristic already taken from the catalog.
    Characteristic(GattCharacteristic),
    /// A characteristic to look up in the catalog.
    Id(CharacteristicId),
}

impl From<GattCharacteristic> for NotificationTarget {
    fn from(characteristic: GattCharacteristic) -> Self {
        Self::Characteristic(characteristic)
    }
}

impl From<CharacteristicId> for NotificationTarget {
    fn from(id: CharacteristicId) -> Self {
        Self::Id(id)
    }
}

#[derive(Default)]
struct Link {
    adapter: Option<Arc<dyn BleAdapter>>,
    address: Option<String>,
    gatt: Option<Arc<dyn GattConnection>>,
    catalog: ServiceCatalog,
    state: ConnectionState,
}

/// Manages the connection to one peripheral.
///
/// The lock is never held across an `.await`: handles are cloned out first.
#[derive(Default)]
pub struct ConnectionManager {
    link: Mutex<Link>,
}

impl ConnectionManager {
    /// Create a manager with no adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.link.lock().state
    }

    /// Set the connection state.
    pub fn set_state(&self, new_state: ConnectionState) {
        let old_state = std::mem::replace(&mut self.link.lock().state, new_state);
        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);
        }
    }

    /// Check if an adapter has been acquired.
    pub fn is_initialized(&self) -> bool {
        self.link.lock().adapter.is_some()
    }

    /// Address of the last device `connect` was called with.
    pub fn device_address(&self) -> Option<String> {
        self.link.lock().address.clone()
    }

    /// Current GATT handle, if any.
    pub fn gatt(&self) -> Option<Arc<dyn GattConnection>> {
        self.link.lock().gatt.clone()
    }

    /// Snapshot of the service catalog.
    pub fn catalog(&self) -> ServiceCatalog {
        self.link.lock().catalog.clone()
    }

    /// Acquire the adapter. Does nothing if one is held already.
    pub async fn initialize(&self, backend: &dyn BleBackend, events: GattEventSender) -> Result<()> {
        if self.is_initialized() {
            debug!("Adapter already initialized");
            return Ok(());
        }

        let adapter = backend.acquire_adapter(events).await.map_err(|e| {
            warn!("Unable to obtain a Bluetooth adapter: {}", e);
            Error::AdapterUnavailable
        })?;

        let mut link = self.link.lock();
        if link.adapter.is_none() {
            link.adapter = Some(adapter);
            info!("Bluetooth adapter initialized");
        }
        Ok(())
    }

    /// Start connecting to `address`.
    ///
    /// Returns once the attempt is under way; the outcome is reported by the
    /// transport's connection event.
    pub async fn connect(&self, address: &str) -> Result<()> {
        // Connecting is entered before the transport is called, so a connection
        // event it emits cannot be overwritten afterwards.
        let (adapter, existing, previous) = {
            let mut link = self.link.lock();
            let Some(adapter) = link.adapter.clone() else {
                warn!("Adapter not initialized");
                return Err(Error::NotInitialized);
            };
            if address.is_empty() {
                warn!("Unspecified address");
                return Err(Error::NotInitialized);
            }
            let existing = match (&link.address, &link.gatt) {
                (Some(known), Some(gatt)) if known == address => Some(gatt.clone()),
                _ => None,
            };
            let previous = std::mem::replace(&mut link.state, ConnectionState::Connecting);
            debug!("Connection state changed: {} -> Connecting", previous);
            (adapter, existing, previous)
        };

        // Previously connected device: try to reuse the handle
        if let Some(gatt) = existing {
            debug!("Reusing existing GATT handle for {}", address);
            if let Err(e) = gatt.reconnect().await {
                warn!("Reconnect to {} rejected: {}", address, e);
                self.restore_state(previous);
                return Err(Error::rejected(format!("reconnect to {}", address)));
            }
            return Ok(());
        }

        let gatt = match adapter.connect_gatt(address, false).await {
            Ok(gatt) => gatt,
            Err(e) => {
                self.restore_state(previous);
                return Err(e);
            }
        };
        debug!("Creating a new connection to {}", address);

        let replaced = {
            let mut link = self.link.lock();
            link.address = Some(address.to_string());
            link.catalog = ServiceCatalog::default();
            link.gatt.replace(gatt)
        };

        if let Some(old) = replaced {
            debug!("Closing handle to previous device");
            old.close().await;
        }

        Ok(())
    }

    /// Undo a `Connecting` transition after the transport refused the request.
    fn restore_state(&self, previous: ConnectionState) {
        let mut link = self.link.lock();
        if link.state == ConnectionState::Connecting {
            debug!("Connection state restored: Connecting -> {}", previous);
            link.state = previous;
        }
    }

    /// Request a disconnect. The outcome is reported by the transport.
    pub async fn disconnect(&self) {
        let gatt = {
            let link = self.link.lock();
            if link.adapter.is_none() {
                warn!("Adapter not initialized");
                return;
            }
            link.gatt.clone()
        };

        match gatt {
            Some(gatt) => {
                if let Err(e) = gatt.disconnect().await {
                    warn!("Disconnect request failed: {}", e);
                }
            }
            None => warn!("No connection to disconnect"),
        }
    }

    /// Release the GATT handle and forget the catalog.
    pub async fn close(&self) {
        let gatt = {
            let mut link = self.link.lock();
            link.catalog = ServiceCatalog::default();
            link.gatt.take()
        };

        if let Some(gatt) = gatt {
            info!("Closing GATT connection");
            gatt.close().await;
        }
    }

    /// React to the transport reporting the link up or down.
    pub fn on_connection_changed(&self, connected: bool) {
        if connected {
            self.set_state(ConnectionState::Connected);
            info!("Connected to GATT server");
        } else {
            self.link.lock().catalog = ServiceCatalog::default();
            self.set_state(ConnectionState::Disconnected);
            info!("Disconnected from GATT server");
        }
    }

    /// Start service discovery on the current handle.
    pub async fn discover_services(&self) {
        match self.gatt() {
            Some(gatt) => {
                let started = gatt.discover_services().await;
                info!("Attempting to start service discovery: {}", started.is_ok());
            }
            None => warn!("No GATT handle to discover services on"),
        }
    }

    /// Run `f` against the current catalog without copying it.
    pub fn with_catalog<R>(&self, f: impl FnOnce(&ServiceCatalog) -> R) -> R {
        f(&self.link.lock().catalog)
    }

    /// Load the catalog after a successful discovery.
    pub fn on_services_discovered(&self) {
        let Some(gatt) = self.gatt() else {
            warn!("Services discovered without a GATT handle");
            return;
        };

        let catalog = ServiceCatalog::from_services(gatt.services());
        if catalog.is_empty() {
            warn!("Service discovery returned no services");
        } else if !catalog
            .services()
            .iter()
            .any(|service| is_mysming_service(&service.uuid))
        {
            warn!("Peripheral exposes no MySming service");
        }
        debug!(
            "Discovered {} services, {} characteristics",
            catalog.services().len(),
            catalog.characteristic_count()
        );
        self.link.lock().catalog = catalog;
    }

    /// Discovered services, or `None` without a connection.
    pub fn list_services(&self) -> Option<Vec<GattService>> {
        let link = self.link.lock();
        link.gatt.as_ref()?;
        Some(link.catalog.services().to_vec())
    }

    /// Handle and catalog entry for an operation, or `None` (logged) if either
    /// is missing.
    fn resolve(
        &self,
        id: &CharacteristicId,
        operation: &str,
    ) -> Option<(Arc<dyn GattConnection>, GattCharacteristic)> {
        let link = self.link.lock();
        let Some(gatt) = link.gatt.clone() else {
            warn!("No connection, dropping {} of {}", operation, id);
            return None;
        };
        let Some(characteristic) = link.catalog.get(id).cloned() else {
            warn!("Characteristic {} not discovered, dropping {}", id, operation);
            return None;
        };
        Some((gatt, characteristic))
    }

    /// Request a read. The value arrives as a read event.
    pub async fn read(&self, id: CharacteristicId) {
        let Some((gatt, _)) = self.resolve(&id, "read") else {
            return;
        };

        if let Err(e) = gatt.read_characteristic(id).await {
            warn!("Read of {} failed: {}", id, e);
        }
    }

    /// Request a write. Completion arrives as a write event.
    pub async fn write(&self, id: CharacteristicId, value: Vec<u8>) {
        let Some((gatt, _)) = self.resolve(&id, "write") else {
            return;
        };

        if let Err(e) = gatt.write_characteristic(id, value).await {
            warn!("Write of {} failed: {}", id, e);
        }
    }

    /// Enable or disable notifications, locally and on the peripheral.
    ///
    /// The remote side is switched through the client characteristic
    /// configuration descriptor when the characteristic has one.
    pub async fn set_notification(&self, target: NotificationTarget, enabled: bool) -> Result<()> {
        let (gatt, characteristic) = {
            let link = self.link.lock();
            let Some(gatt) = link.gatt.clone() else {
                warn!("Adapter not initialized");
                return Err(Error::NotInitialized);
            };
            let characteristic = match target {
                NotificationTarget::Characteristic(characteristic) => characteristic,
                NotificationTarget::Id(id) => match link.catalog.get(&id) {
                    Some(characteristic) => characteristic.clone(),
                    None => {
                        warn!("Characteristic {} not discovered, notification unchanged", id);
                        return Ok(());
                    }
                },
            };
            (gatt, characteristic)
        };

        let id = characteristic.id;
        if let Err(e) = gatt.set_notification(id, enabled).await {
            warn!("set_notification failed for {}: {}", id, e);
            return Err(Error::rejected(format!("set notification on {}", id)));
        }

        if !characteristic.has_descriptor(&CLIENT_CHARACTERISTIC_CONFIG_UUID) {
            debug!("{} has no configuration descriptor", id);
            return Ok(());
        }

        let value = if enabled {
            ENABLE_NOTIFICATION_VALUE
        } else {
            DISABLE_NOTIFICATION_VALUE
        };
        if let Err(e) = gatt
            .write_descriptor(id, CLIENT_CHARACTERISTIC_CONFIG_UUID, value.to_vec())
            .await
        {
            warn!("Descriptor write for {} failed: {}", id, e);
        }

        Ok(())
    }

    /// Look up a discovered characteristic, e.g. to build a
    /// [`NotificationTarget::Characteristic`].
    pub fn characteristic(&self, id: &CharacteristicId) -> Option<GattCharacteristic> {
        self.link.lock().catalog.get(id).cloned()
    }
}
